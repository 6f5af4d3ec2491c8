//! Core types shared by the session, live queries and backends.

use crate::error::{LinkError, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Stable unique identifier of an identity.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Uid(pub String);

impl Uid {
    pub fn new(uid: impl Into<String>) -> Self {
        Uid(uid.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Uid({})", self.0)
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Short-lived bearer token issued for an identity.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdToken(pub String);

impl IdToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for IdToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IdToken(<{} bytes>)", self.0.len())
    }
}

/// The signed-in principal as reported by the auth backend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub uid: Uid,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl Identity {
    pub fn new(uid: impl Into<String>) -> Self {
        Self {
            uid: Uid::new(uid),
            email: None,
            display_name: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

/// Federated sign-in providers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    Google,
    Microsoft,
    Apple,
}

impl Provider {
    pub const ALL: [Provider; 3] = [Provider::Google, Provider::Microsoft, Provider::Apple];

    /// Provider id understood by the auth backend.
    pub fn provider_id(&self) -> &'static str {
        match self {
            Provider::Google => "google.com",
            Provider::Microsoft => "microsoft.com",
            Provider::Apple => "apple.com",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Provider::Google => "google",
            Provider::Microsoft => "microsoft",
            Provider::Apple => "apple",
        };
        f.write_str(name)
    }
}

impl FromStr for Provider {
    type Err = LinkError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "google" | "google.com" => Ok(Provider::Google),
            "microsoft" | "microsoft.com" => Ok(Provider::Microsoft),
            "apple" | "apple.com" => Ok(Provider::Apple),
            other => Err(LinkError::Auth(format!("unknown provider: {}", other))),
        }
    }
}

/// Slash-separated path to a collection, e.g. `users/abc123/transactions`.
///
/// Segments are never empty and a collection path always has an odd
/// number of segments (collection / document / collection ...).
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct CollectionPath(String);

impl CollectionPath {
    /// Parse a path string.
    pub fn parse(path: &str) -> Result<Self> {
        let segments: Vec<&str> = path.split('/').collect();
        Self::from_segments(&segments)
    }

    /// Build a path from individual segments.
    ///
    /// A segment containing `/` is rejected rather than silently splitting
    /// into more segments.
    pub fn from_segments(segments: &[&str]) -> Result<Self> {
        let joined = segments.join("/");
        if segments.is_empty() || segments.iter().any(|s| s.is_empty() || s.contains('/')) {
            return Err(LinkError::InvalidPath(joined));
        }
        if segments.len() % 2 == 0 {
            return Err(LinkError::InvalidPath(joined));
        }
        Ok(CollectionPath(joined))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/')
    }
}

impl fmt::Debug for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CollectionPath({})", self.0)
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for CollectionPath {
    type Error = LinkError;

    fn try_from(value: String) -> Result<Self> {
        CollectionPath::parse(&value)
    }
}

impl From<CollectionPath> for String {
    fn from(path: CollectionPath) -> Self {
        path.0
    }
}

/// Sort direction for `OrderBy`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Asc,
    Desc,
}

/// Comparison operator for `Where`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FilterOp {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    NotEq,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Gte,
    In,
    NotIn,
    ArrayContains,
}

/// A single query constraint. Passed through to the backend unvalidated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "args", rename_all = "snake_case")]
pub enum QueryConstraint {
    OrderBy { field: String, direction: Direction },
    Limit(usize),
    Where { field: String, op: FilterOp, value: Value },
}

impl QueryConstraint {
    pub fn order_by(field: impl Into<String>, direction: Direction) -> Self {
        QueryConstraint::OrderBy {
            field: field.into(),
            direction,
        }
    }

    pub fn limit(n: usize) -> Self {
        QueryConstraint::Limit(n)
    }

    pub fn filter(field: impl Into<String>, op: FilterOp, value: Value) -> Self {
        QueryConstraint::Where {
            field: field.into(),
            op,
            value,
        }
    }
}

/// A collection path plus its ordered constraints.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Query {
    pub path: CollectionPath,
    pub constraints: Vec<QueryConstraint>,
}

impl Query {
    pub fn new(path: CollectionPath) -> Self {
        Self {
            path,
            constraints: Vec::new(),
        }
    }

    /// Parse `path` and start an unconstrained query over it.
    pub fn collection(path: &str) -> Result<Self> {
        Ok(Self::new(CollectionPath::parse(path)?))
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.constraints
            .push(QueryConstraint::order_by(field, direction));
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.constraints.push(QueryConstraint::limit(n));
        self
    }

    pub fn filter(mut self, field: impl Into<String>, op: FilterOp, value: Value) -> Self {
        self.constraints
            .push(QueryConstraint::filter(field, op, value));
        self
    }
}

/// A document as delivered by the store.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub fields: Map<String, Value>,
}

impl Document {
    pub fn new(id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            fields,
        }
    }

    /// Build from a JSON object. Non-object values yield an empty field map.
    pub fn from_json(id: impl Into<String>, value: Value) -> Self {
        let fields = match value {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self::new(id, fields)
    }
}

/// Full point-in-time result set of a query.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Snapshot {
    pub documents: Vec<Document>,
}

impl Snapshot {
    pub fn new(documents: Vec<Document>) -> Self {
        Self { documents }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Materialize every document into a [`Record`].
    pub fn to_records(&self) -> Vec<Record> {
        self.documents.iter().map(Record::from_document).collect()
    }
}

/// One event on a snapshot subscription.
pub type SnapshotEvent = std::result::Result<Snapshot, LinkError>;

/// Document fields plus the injected `id`.
///
/// Serializes flat: `{"id": "t1", "amount": 5}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Record {
    /// The document key wins over any `id` field in the body.
    pub fn from_document(doc: &Document) -> Self {
        let mut fields = doc.fields.clone();
        fields.remove("id");
        Self {
            id: doc.id.clone(),
            fields,
        }
    }

    /// Field value by name. `id` resolves to the document key.
    pub fn get(&self, field: &str) -> Option<Value> {
        if field == "id" {
            return Some(Value::String(self.id.clone()));
        }
        self.fields.get(field).cloned()
    }

    pub fn to_value(&self) -> Value {
        let mut map = self.fields.clone();
        map.insert("id".to_string(), Value::String(self.id.clone()));
        Value::Object(map)
    }

    /// Deserialize into a caller-defined shape.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.to_value())?)
    }
}
