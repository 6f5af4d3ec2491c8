//! Backend project credentials and link settings.

use crate::error::{LinkError, Result};
use serde::{Deserialize, Serialize};

/// Default prefix for environment-sourced backend config.
pub const DEFAULT_ENV_PREFIX: &str = "FIREBASE_";

/// Project credentials for the managed backend.
///
/// Absent JSON keys deserialize as empty, so [`BackendConfig::validate`]
/// reports a missing key and an empty one the same way.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackendConfig {
    pub api_key: String,
    pub auth_domain: String,
    pub database_url: Option<String>,
    pub project_id: String,
    pub storage_bucket: Option<String>,
    pub messaging_sender_id: Option<String>,
    pub app_id: String,
    pub measurement_id: Option<String>,
}

impl BackendConfig {
    /// Read from `FIREBASE_API_KEY`, `FIREBASE_AUTH_DOMAIN`, ...
    pub fn from_env() -> Result<Self> {
        Self::from_env_with_prefix(DEFAULT_ENV_PREFIX)
    }

    pub fn from_env_with_prefix(prefix: &str) -> Result<Self> {
        Self::from_lookup(|key| std::env::var(format!("{}{}", prefix, key)).ok())
    }

    /// Build from an arbitrary key lookup. Keys are upper snake case
    /// without prefix (`API_KEY`, `AUTH_DOMAIN`, ...). Empty values count
    /// as absent.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let optional = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required =
            |key: &str| optional(key).ok_or_else(|| LinkError::MissingConfig(key.to_string()));

        Ok(Self {
            api_key: required("API_KEY")?,
            auth_domain: required("AUTH_DOMAIN")?,
            database_url: optional("DATABASE_URL"),
            project_id: required("PROJECT_ID")?,
            storage_bucket: optional("STORAGE_BUCKET"),
            messaging_sender_id: optional("MESSAGING_SENDER_ID"),
            app_id: required("APP_ID")?,
            measurement_id: optional("MEASUREMENT_ID"),
        })
    }

    /// Parse a JSON config object (camelCase keys).
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| LinkError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for (key, value) in [
            ("API_KEY", &self.api_key),
            ("AUTH_DOMAIN", &self.auth_domain),
            ("PROJECT_ID", &self.project_id),
            ("APP_ID", &self.app_id),
        ] {
            if value.trim().is_empty() {
                return Err(LinkError::MissingConfig(key.to_string()));
            }
        }
        Ok(())
    }
}

/// Link configuration.
#[derive(Clone, Debug)]
pub struct LinkConfig {
    /// Backend project credentials.
    pub backend: BackendConfig,

    /// Route to navigate to after sign-out.
    /// Default: "/"
    pub landing_route: String,

    /// Buffered state transitions per watcher before it is dropped.
    /// Default: 64
    pub watch_buffer: usize,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            landing_route: "/".to_string(),
            watch_buffer: 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_from_lookup_all_keys() {
        let config = BackendConfig::from_lookup(lookup_from(&[
            ("API_KEY", "key"),
            ("AUTH_DOMAIN", "demo.example.com"),
            ("DATABASE_URL", "https://demo.db"),
            ("PROJECT_ID", "demo"),
            ("STORAGE_BUCKET", "demo.bucket"),
            ("MESSAGING_SENDER_ID", "42"),
            ("APP_ID", "1:42:web:abc"),
            ("MEASUREMENT_ID", "G-XYZ"),
        ]))
        .unwrap();

        assert_eq!(config.api_key, "key");
        assert_eq!(config.database_url.as_deref(), Some("https://demo.db"));
        assert_eq!(config.measurement_id.as_deref(), Some("G-XYZ"));
    }

    #[test]
    fn test_missing_required_key() {
        let result = BackendConfig::from_lookup(lookup_from(&[
            ("API_KEY", "key"),
            ("AUTH_DOMAIN", "demo.example.com"),
            ("PROJECT_ID", "  "),
            ("APP_ID", "app"),
        ]));

        assert_eq!(result, Err(LinkError::MissingConfig("PROJECT_ID".into())));
    }

    #[test]
    fn test_optional_keys_absent() {
        let config = BackendConfig::from_lookup(lookup_from(&[
            ("API_KEY", "key"),
            ("AUTH_DOMAIN", "demo.example.com"),
            ("PROJECT_ID", "demo"),
            ("APP_ID", "app"),
            ("STORAGE_BUCKET", ""),
        ]))
        .unwrap();

        assert!(config.storage_bucket.is_none());
        assert!(config.messaging_sender_id.is_none());
    }

    #[test]
    fn test_from_json_camel_case() {
        let config = BackendConfig::from_json(
            r#"{"apiKey":"k","authDomain":"d","projectId":"p","appId":"a","storageBucket":"b"}"#,
        )
        .unwrap();
        assert_eq!(config.storage_bucket.as_deref(), Some("b"));

        let empty = BackendConfig::from_json(
            r#"{"apiKey":"","authDomain":"d","projectId":"p","appId":"a"}"#,
        );
        assert_eq!(empty, Err(LinkError::MissingConfig("API_KEY".into())));
    }

    #[test]
    fn test_from_json_absent_key_matches_empty() {
        let absent = BackendConfig::from_json(r#"{"authDomain":"d","projectId":"p","appId":"a"}"#);
        assert_eq!(absent, Err(LinkError::MissingConfig("API_KEY".into())));

        let absent = BackendConfig::from_json(r#"{"apiKey":"k","authDomain":"d","projectId":"p"}"#);
        assert_eq!(absent, Err(LinkError::MissingConfig("APP_ID".into())));
    }
}
