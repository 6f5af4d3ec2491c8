//! Query evaluation over in-memory documents.

use crate::types::{Direction, Document, FilterOp, Query, QueryConstraint, Snapshot};
use serde_json::{Map, Value};
use std::cmp::Ordering;

/// Apply `query`'s constraints to `documents` (in key order).
///
/// - `Where` drops documents missing the field or not matching.
/// - `OrderBy` drops documents missing the field, then sorts by each key in
///   turn. Ties break on the document id.
/// - `Limit` keeps the first n. With several limits, the last one wins.
pub fn evaluate<'a, I>(query: &Query, documents: I) -> Snapshot
where
    I: IntoIterator<Item = (&'a String, &'a Map<String, Value>)>,
{
    let mut order_keys: Vec<(&str, Direction)> = Vec::new();
    let mut limit: Option<usize> = None;

    for constraint in &query.constraints {
        match constraint {
            QueryConstraint::OrderBy { field, direction } => {
                order_keys.push((field.as_str(), *direction))
            }
            QueryConstraint::Limit(n) => limit = Some(*n),
            QueryConstraint::Where { .. } => {}
        }
    }

    let mut matched: Vec<Document> = documents
        .into_iter()
        .filter(|(_, fields)| {
            query.constraints.iter().all(|c| match c {
                QueryConstraint::Where { field, op, value } => {
                    matches_filter(lookup(fields, field), *op, value)
                }
                QueryConstraint::OrderBy { field, .. } => lookup(fields, field).is_some(),
                QueryConstraint::Limit(_) => true,
            })
        })
        .map(|(id, fields)| Document::new(id.clone(), fields.clone()))
        .collect();

    matched.sort_by(|a, b| {
        for (field, direction) in &order_keys {
            let ord = compare_values(
                lookup(&a.fields, field).unwrap_or(&Value::Null),
                lookup(&b.fields, field).unwrap_or(&Value::Null),
            );
            let ord = match direction {
                Direction::Asc => ord,
                Direction::Desc => ord.reverse(),
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        a.id.cmp(&b.id)
    });

    if let Some(n) = limit {
        matched.truncate(n);
    }

    Snapshot::new(matched)
}

/// Resolve a dotted field path (`"balance.amount"`).
fn lookup<'a>(fields: &'a Map<String, Value>, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = fields.get(parts.next()?)?;
    for part in parts {
        current = current.as_object()?.get(part)?;
    }
    Some(current)
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over JSON values: null < bool < number < string < array < object.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or(f64::NAN);
            let y = y.as_f64().unwrap_or(f64::NAN);
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => {
            for (l, r) in x.iter().zip(y.iter()) {
                let ord = compare_values(l, r);
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            x.len().cmp(&y.len())
        }
        (Value::Object(x), Value::Object(y)) => {
            let mut xs: Vec<_> = x.iter().collect();
            let mut ys: Vec<_> = y.iter().collect();
            xs.sort_by(|l, r| l.0.cmp(r.0));
            ys.sort_by(|l, r| l.0.cmp(r.0));
            for ((lk, lv), (rk, rv)) in xs.iter().zip(ys.iter()) {
                let ord = lk.cmp(rk).then_with(|| compare_values(lv, rv));
                if ord != Ordering::Equal {
                    return ord;
                }
            }
            xs.len().cmp(&ys.len())
        }
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn same_type(a: &Value, b: &Value) -> bool {
    type_rank(a) == type_rank(b)
}

fn matches_filter(field: Option<&Value>, op: FilterOp, value: &Value) -> bool {
    let Some(field) = field else {
        return false;
    };

    match op {
        FilterOp::Eq => compare_values(field, value) == Ordering::Equal,
        FilterOp::NotEq => compare_values(field, value) != Ordering::Equal,
        // Range comparisons only match values of the same type.
        FilterOp::Lt | FilterOp::Lte | FilterOp::Gt | FilterOp::Gte => {
            if !same_type(field, value) {
                return false;
            }
            let ord = compare_values(field, value);
            match op {
                FilterOp::Lt => ord == Ordering::Less,
                FilterOp::Lte => ord != Ordering::Greater,
                FilterOp::Gt => ord == Ordering::Greater,
                _ => ord != Ordering::Less,
            }
        }
        FilterOp::In => value
            .as_array()
            .map(|candidates| {
                candidates
                    .iter()
                    .any(|c| compare_values(field, c) == Ordering::Equal)
            })
            .unwrap_or(false),
        FilterOp::NotIn => value
            .as_array()
            .map(|candidates| {
                !candidates
                    .iter()
                    .any(|c| compare_values(field, c) == Ordering::Equal)
            })
            .unwrap_or(false),
        FilterOp::ArrayContains => field
            .as_array()
            .map(|items| items.iter().any(|i| compare_values(i, value) == Ordering::Equal))
            .unwrap_or(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn docs(entries: &[(&str, Value)]) -> BTreeMap<String, Map<String, Value>> {
        entries
            .iter()
            .map(|(id, v)| (id.to_string(), v.as_object().cloned().unwrap_or_default()))
            .collect()
    }

    fn ids(snapshot: &Snapshot) -> Vec<&str> {
        snapshot.documents.iter().map(|d| d.id.as_str()).collect()
    }

    #[test]
    fn test_order_desc_with_limit() {
        let collection = docs(&[
            ("a", json!({"createdAt": 1})),
            ("b", json!({"createdAt": 3})),
            ("c", json!({"createdAt": 2})),
            ("d", json!({"note": "no timestamp"})),
        ]);
        let query = Query::collection("txs")
            .unwrap()
            .order_by("createdAt", Direction::Desc)
            .limit(2);

        let snapshot = evaluate(&query, &collection);
        assert_eq!(ids(&snapshot), vec!["b", "c"]);
    }

    #[test]
    fn test_multi_key_order_and_tiebreak() {
        let collection = docs(&[
            ("x", json!({"symbol": "BTC", "qty": 1})),
            ("y", json!({"symbol": "ETH", "qty": 1})),
            ("z", json!({"symbol": "BTC", "qty": 5})),
            ("w", json!({"symbol": "BTC", "qty": 5})),
        ]);
        let query = Query::collection("assets")
            .unwrap()
            .order_by("symbol", Direction::Asc)
            .order_by("qty", Direction::Desc);

        let snapshot = evaluate(&query, &collection);
        assert_eq!(ids(&snapshot), vec!["w", "z", "x", "y"]);
    }

    #[test]
    fn test_where_filters() {
        let collection = docs(&[
            ("a", json!({"amount": 5, "tags": ["buy"], "meta": {"kind": "spot"}})),
            ("b", json!({"amount": "5", "tags": ["sell"]})),
            ("c", json!({"amount": 12, "tags": ["buy", "fee"], "meta": {"kind": "margin"}})),
        ]);

        let by = |op, value| {
            let query = Query::collection("txs").unwrap().filter("amount", op, value);
            ids(&evaluate(&query, &collection))
                .into_iter()
                .map(String::from)
                .collect::<Vec<_>>()
        };

        assert_eq!(by(FilterOp::Eq, json!(5)), vec!["a"]);
        assert_eq!(by(FilterOp::Gt, json!(4)), vec!["a", "c"]);
        assert_eq!(by(FilterOp::Lte, json!(5)), vec!["a"]);
        assert_eq!(by(FilterOp::In, json!([12, "5"])), vec!["b", "c"]);
        assert_eq!(by(FilterOp::NotIn, json!([5])), vec!["b", "c"]);

        let contains = Query::collection("txs")
            .unwrap()
            .filter("tags", FilterOp::ArrayContains, json!("buy"));
        assert_eq!(ids(&evaluate(&contains, &collection)), vec!["a", "c"]);

        let nested = Query::collection("txs")
            .unwrap()
            .filter("meta.kind", FilterOp::Eq, json!("margin"));
        assert_eq!(ids(&evaluate(&nested, &collection)), vec!["c"]);
    }

    #[test]
    fn test_compare_values_type_order() {
        assert_eq!(compare_values(&json!(null), &json!(false)), Ordering::Less);
        assert_eq!(compare_values(&json!(10), &json!("1")), Ordering::Less);
        assert_eq!(compare_values(&json!(2.5), &json!(2)), Ordering::Greater);
        assert_eq!(compare_values(&json!([1, 2]), &json!([1, 2, 0])), Ordering::Less);
    }
}
