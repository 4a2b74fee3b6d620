//! # Filter Evaluation
//!
//! Matches documents against query filters for the in-memory store.
//!
//! Supported:
//! - implicit equality on dotted paths; array fields match any element
//! - `$eq`, `$ne`, `$gt`, `$gte`, `$lt`, `$lte`, `$in`, `$nin`
//! - `$exists`, `$regex` (with `$options`), `$size`, `$not`
//! - `$and`, `$or`, `$nor`

use std::cmp::Ordering;

use regex::Regex;

use crate::codec::{Document, ExtendedValue};

use super::compare::{compare_values, type_rank, values_equal};
use super::errors::{StoreError, StoreResult};

/// Check whether a document matches a filter
pub fn matches(doc: &Document, filter: &Document) -> StoreResult<bool> {
    for (key, condition) in filter.iter() {
        let ok = match key {
            "$and" => {
                let mut all = true;
                for clause in clauses(key, condition)? {
                    if !matches(doc, clause)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            "$or" => {
                let mut any = false;
                for clause in clauses(key, condition)? {
                    if matches(doc, clause)? {
                        any = true;
                        break;
                    }
                }
                any
            }
            "$nor" => {
                let mut none = true;
                for clause in clauses(key, condition)? {
                    if matches(doc, clause)? {
                        none = false;
                        break;
                    }
                }
                none
            }
            op if op.starts_with('$') => {
                return Err(StoreError::InvalidQuery(format!(
                    "unknown top level operator: {}",
                    op
                )))
            }
            path => matches_field(&lookup(doc, path), condition)?,
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Every value reachable at a dotted path.
///
/// Arrays of sub-documents fan out, so `items.sku` reaches the `sku` of
/// every element of `items`.
pub fn lookup<'a>(doc: &'a Document, path: &str) -> Vec<&'a ExtendedValue> {
    let segments: Vec<&str> = path.split('.').collect();
    let mut out = Vec::new();
    if let Some((head, rest)) = segments.split_first() {
        if let Some(value) = doc.get(head) {
            resolve(value, rest, &mut out);
        }
    }
    out
}

fn resolve<'a>(value: &'a ExtendedValue, segments: &[&str], out: &mut Vec<&'a ExtendedValue>) {
    let Some((head, rest)) = segments.split_first() else {
        out.push(value);
        return;
    };

    match value {
        ExtendedValue::Object(doc) => {
            if let Some(next) = doc.get(head) {
                resolve(next, rest, out);
            }
        }
        ExtendedValue::Array(items) => match head.parse::<usize>() {
            Ok(index) => {
                if let Some(next) = items.get(index) {
                    resolve(next, rest, out);
                }
            }
            Err(_) => {
                for item in items.iter().filter(|i| i.as_document().is_some()) {
                    resolve(item, segments, out);
                }
            }
        },
        _ => {}
    }
}

/// Top-level equality fields of a filter, used to seed upserts
pub fn equality_fields(filter: &Document) -> Document {
    let mut seed = Document::new();
    for (key, condition) in filter.iter() {
        if key.starts_with('$') {
            continue;
        }
        match condition {
            ExtendedValue::Object(ops) if is_operator_document(ops) => {
                if let Some(value) = ops.get("$eq") {
                    seed.insert(key, value.clone());
                }
            }
            other => {
                seed.insert(key, other.clone());
            }
        }
    }
    seed
}

fn clauses<'a>(op: &str, condition: &'a ExtendedValue) -> StoreResult<Vec<&'a Document>> {
    let items = condition
        .as_array()
        .filter(|items| !items.is_empty())
        .ok_or_else(|| StoreError::InvalidQuery(format!("{} must be a nonempty array", op)))?;

    items
        .iter()
        .map(|item| {
            item.as_document().ok_or_else(|| {
                StoreError::InvalidQuery(format!("{} entries must be objects", op))
            })
        })
        .collect()
}

fn is_operator_document(doc: &Document) -> bool {
    doc.keys().next().is_some_and(|k| k.starts_with('$'))
}

fn matches_field(values: &[&ExtendedValue], condition: &ExtendedValue) -> StoreResult<bool> {
    match condition {
        ExtendedValue::Object(ops) if is_operator_document(ops) => matches_operators(values, ops),
        literal => Ok(eq_any(values, literal)),
    }
}

fn matches_operators(values: &[&ExtendedValue], ops: &Document) -> StoreResult<bool> {
    for (op, arg) in ops.iter() {
        let ok = match op {
            "$eq" => eq_any(values, arg),
            "$ne" => !eq_any(values, arg),
            "$gt" => compare_any(values, arg, |o| o == Ordering::Greater),
            "$gte" => compare_any(values, arg, |o| o != Ordering::Less),
            "$lt" => compare_any(values, arg, |o| o == Ordering::Less),
            "$lte" => compare_any(values, arg, |o| o != Ordering::Greater),
            "$in" => in_list(values, op, arg)?,
            "$nin" => !in_list(values, op, arg)?,
            "$exists" => truthy(arg) == !values.is_empty(),
            "$size" => {
                let size = arg.as_f64().ok_or_else(|| {
                    StoreError::InvalidQuery("$size needs a number".to_string())
                })?;
                values
                    .iter()
                    .any(|v| v.as_array().is_some_and(|items| items.len() as f64 == size))
            }
            "$regex" => {
                let options = ops.get("$options").and_then(|o| o.as_str()).unwrap_or("");
                let re = build_regex(arg, options)?;
                any_element(values, |v| v.as_str().is_some_and(|s| re.is_match(s)))
            }
            "$options" => {
                if !ops.contains_key("$regex") {
                    return Err(StoreError::InvalidQuery(
                        "$options needs a $regex".to_string(),
                    ));
                }
                true
            }
            "$not" => match arg {
                ExtendedValue::Object(inner) if is_operator_document(inner) => {
                    !matches_operators(values, inner)?
                }
                _ => {
                    return Err(StoreError::InvalidQuery(
                        "$not needs an operator object".to_string(),
                    ))
                }
            },
            other => {
                return Err(StoreError::InvalidQuery(format!(
                    "unknown operator: {}",
                    other
                )))
            }
        };
        if !ok {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Apply a predicate to each value and, for arrays, to each element
fn any_element(values: &[&ExtendedValue], pred: impl Fn(&ExtendedValue) -> bool) -> bool {
    values.iter().any(|v| {
        pred(v)
            || v
                .as_array()
                .is_some_and(|items| items.iter().any(|item| pred(item)))
    })
}

fn eq_any(values: &[&ExtendedValue], target: &ExtendedValue) -> bool {
    if values.is_empty() {
        return target.is_null();
    }
    any_element(values, |v| values_equal(v, target))
}

fn compare_any(
    values: &[&ExtendedValue],
    target: &ExtendedValue,
    accept: impl Fn(Ordering) -> bool,
) -> bool {
    // range operators only compare within a type bracket
    any_element(values, |v| {
        type_rank(v) == type_rank(target) && accept(compare_values(v, target))
    })
}

fn in_list(values: &[&ExtendedValue], op: &str, arg: &ExtendedValue) -> StoreResult<bool> {
    let candidates = arg
        .as_array()
        .ok_or_else(|| StoreError::InvalidQuery(format!("{} needs an array", op)))?;
    Ok(candidates.iter().any(|c| eq_any(values, c)))
}

fn truthy(value: &ExtendedValue) -> bool {
    match value {
        ExtendedValue::Null => false,
        ExtendedValue::Bool(b) => *b,
        ExtendedValue::Int64(n) => *n != 0,
        ExtendedValue::Float64(f) => *f != 0.0,
        _ => true,
    }
}

fn build_regex(pattern: &ExtendedValue, options: &str) -> StoreResult<Regex> {
    let pattern = pattern
        .as_str()
        .ok_or_else(|| StoreError::InvalidQuery("$regex needs a string".to_string()))?;

    let mut flags = String::new();
    for flag in options.chars() {
        match flag {
            'i' | 'm' | 's' | 'x' => flags.push(flag),
            other => {
                return Err(StoreError::InvalidQuery(format!(
                    "invalid regex option: {}",
                    other
                )))
            }
        }
    }
    let source = if flags.is_empty() {
        pattern.to_string()
    } else {
        format!("(?{}){}", flags, pattern)
    };
    Regex::new(&source).map_err(|e| StoreError::InvalidQuery(format!("invalid $regex: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::decode;
    use serde_json::{json, Value as JsonValue};

    fn doc(value: JsonValue) -> Document {
        decode(&value, "test").unwrap().into_document().unwrap()
    }

    fn check(document: JsonValue, filter: JsonValue) -> bool {
        matches(&doc(document), &doc(filter)).unwrap()
    }

    #[test]
    fn test_implicit_equality() {
        assert!(check(json!({"name": "Alice"}), json!({"name": "Alice"})));
        assert!(!check(json!({"name": "Bob"}), json!({"name": "Alice"})));
        assert!(check(json!({"n": 1}), json!({"n": 1.0})));
        assert!(check(json!({"a": 1}), json!({})));
    }

    #[test]
    fn test_missing_field_matches_null() {
        assert!(check(json!({"a": 1}), json!({"b": null})));
        assert!(!check(json!({"a": 1}), json!({"a": null})));
    }

    #[test]
    fn test_array_membership() {
        assert!(check(json!({"tags": ["x", "y"]}), json!({"tags": "y"})));
        assert!(check(json!({"tags": ["x", "y"]}), json!({"tags": ["x", "y"]})));
        assert!(!check(json!({"tags": ["x", "y"]}), json!({"tags": "z"})));
    }

    #[test]
    fn test_dotted_paths() {
        let d = json!({"address": {"city": "Oslo"}, "items": [{"sku": "a"}, {"sku": "b"}]});
        assert!(check(d.clone(), json!({"address.city": "Oslo"})));
        assert!(check(d.clone(), json!({"items.sku": "b"})));
        assert!(check(d.clone(), json!({"items.0.sku": "a"})));
        assert!(!check(d, json!({"items.1.sku": "a"})));
    }

    #[test]
    fn test_comparison_operators() {
        let d = json!({"age": 21});
        assert!(check(d.clone(), json!({"age": {"$gt": 18}})));
        assert!(check(d.clone(), json!({"age": {"$gte": 21, "$lt": 30}})));
        assert!(!check(d.clone(), json!({"age": {"$lte": 20}})));
        assert!(check(d.clone(), json!({"age": {"$ne": 5}})));
        // no cross-type range matches
        assert!(!check(d, json!({"age": {"$gt": "a"}})));
    }

    #[test]
    fn test_typed_scalars() {
        let d = json!({
            "_id": {"$oid": "507f1f77bcf86cd799439011"},
            "at": {"$date": "2024-06-01T00:00:00Z"}
        });
        assert!(check(d.clone(), json!({"_id": {"$oid": "507f1f77bcf86cd799439011"}})));
        assert!(check(d.clone(), json!({"at": {"$gte": {"$date": "2024-01-01T00:00:00Z"}}})));
        assert!(!check(d, json!({"at": {"$lt": {"$date": "2024-01-01T00:00:00Z"}}})));
    }

    #[test]
    fn test_in_nin_exists() {
        let d = json!({"status": "active"});
        assert!(check(d.clone(), json!({"status": {"$in": ["active", "pending"]}})));
        assert!(!check(d.clone(), json!({"status": {"$nin": ["active"]}})));
        assert!(check(d.clone(), json!({"status": {"$exists": true}})));
        assert!(check(d, json!({"other": {"$exists": false}})));
    }

    #[test]
    fn test_logical_operators() {
        let d = json!({"a": 1, "b": 2});
        assert!(check(d.clone(), json!({"$or": [{"a": 5}, {"b": 2}]})));
        assert!(!check(d.clone(), json!({"$and": [{"a": 1}, {"b": 3}]})));
        assert!(check(d.clone(), json!({"$nor": [{"a": 5}, {"b": 5}]})));
        assert!(check(d, json!({"a": {"$not": {"$gt": 3}}})));
    }

    #[test]
    fn test_regex() {
        let d = json!({"name": "Johnson"});
        assert!(check(d.clone(), json!({"name": {"$regex": "son$"}})));
        assert!(check(d.clone(), json!({"name": {"$regex": "^john", "$options": "i"}})));
        assert!(!check(d, json!({"name": {"$regex": "^john"}})));
    }

    #[test]
    fn test_size() {
        assert!(check(json!({"tags": [1, 2]}), json!({"tags": {"$size": 2}})));
        assert!(!check(json!({"tags": [1]}), json!({"tags": {"$size": 2}})));
    }

    #[test]
    fn test_invalid_queries() {
        let d = doc(json!({"a": 1}));
        for filter in [
            json!({"$where": "1"}),
            json!({"a": {"$near": 1}}),
            json!({"$or": []}),
            json!({"a": {"$in": 1}}),
            json!({"a": {"$regex": "("}}),
        ] {
            assert!(
                matches!(matches(&d, &doc(filter.clone())), Err(StoreError::InvalidQuery(_))),
                "{}",
                filter
            );
        }
    }

    #[test]
    fn test_equality_fields() {
        let seed = equality_fields(&doc(json!({
            "name": "x",
            "age": {"$gt": 3},
            "kind": {"$eq": "y"},
            "$or": [{"a": 1}]
        })));
        assert_eq!(seed, doc(json!({"name": "x", "kind": "y"})));
    }
}
