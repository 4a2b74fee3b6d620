//! # Update Operators
//!
//! Applies operator documents (`$set`, `$unset`, `$inc`, `$push`) to stored
//! documents. Paths are dotted; missing intermediate objects are created.

use crate::codec::{Document, ExtendedValue};

use super::compare::values_equal;
use super::errors::{StoreError, StoreResult};

const ID: &str = "_id";

/// Most null slots a `$set` may pad an array with
pub const MAX_ARRAY_BACKFILL: usize = 1_500_000;

/// Check an update document before touching any data.
///
/// Every top-level key must be a supported operator mapping paths to values.
pub fn validate_update(update: &Document) -> StoreResult<()> {
    if update.is_empty() {
        return Err(StoreError::InvalidQuery(
            "update document must not be empty".to_string(),
        ));
    }

    for (op, arg) in update.iter() {
        if !op.starts_with('$') {
            return Err(StoreError::InvalidQuery(format!(
                "update document requires atomic operators, found '{}'",
                op
            )));
        }
        if !matches!(op, "$set" | "$unset" | "$inc" | "$push") {
            return Err(StoreError::InvalidQuery(format!(
                "unknown update operator: {}",
                op
            )));
        }
        let fields = arg.as_document().ok_or_else(|| {
            StoreError::InvalidQuery(format!("{} needs an object of fields", op))
        })?;
        for (path, value) in fields.iter() {
            if path.is_empty() || path.split('.').any(str::is_empty) {
                return Err(StoreError::InvalidQuery(format!(
                    "invalid field path '{}' in {}",
                    path, op
                )));
            }
            if let Some(segment) = path.split('.').find(|s| s.starts_with('$')) {
                return Err(StoreError::InvalidQuery(format!(
                    "field name '{}' in path '{}' must not start with '$'",
                    segment, path
                )));
            }
            match (op, value) {
                ("$push", ExtendedValue::Object(each)) if each.len() == 1 && each.contains_key("$each") => {
                    if let Some(items) = each.get("$each") {
                        check_value(items, path)?;
                    }
                }
                ("$set" | "$push", value) => check_value(value, path)?,
                _ => {}
            }
            if op == "$inc" && value.as_f64().is_none() {
                return Err(StoreError::InvalidQuery(format!(
                    "cannot increment with non-numeric argument at '{}'",
                    path
                )));
            }
        }
    }
    Ok(())
}

/// Reject `$`-prefixed field names at any depth of a stored document
pub fn check_field_names(doc: &Document) -> StoreResult<()> {
    check_document(doc, "")
}

fn check_document(doc: &Document, prefix: &str) -> StoreResult<()> {
    for (key, value) in doc.iter() {
        let path = if prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}.{}", prefix, key)
        };
        if key.starts_with('$') {
            return Err(StoreError::InvalidQuery(format!(
                "field name '{}' in '{}' must not start with '$'",
                key, path
            )));
        }
        check_value(value, &path)?;
    }
    Ok(())
}

fn check_value(value: &ExtendedValue, path: &str) -> StoreResult<()> {
    match value {
        ExtendedValue::Object(doc) => check_document(doc, path),
        ExtendedValue::Array(items) => items
            .iter()
            .enumerate()
            .try_for_each(|(i, item)| check_value(item, &format!("{}.{}", path, i))),
        _ => Ok(()),
    }
}

/// Apply a validated update in place.
///
/// Returns whether the document content changed.
pub fn apply_update(doc: &mut Document, update: &Document) -> StoreResult<bool> {
    validate_update(update)?;

    let mut changed = false;
    for (op, arg) in update.iter() {
        let Some(fields) = arg.as_document() else {
            continue;
        };
        for (path, value) in fields.iter() {
            guard_id(doc, op, path, value)?;
            changed |= match op {
                "$set" => set_path(doc, path, value.clone())?,
                "$unset" => remove_path(doc, path),
                "$inc" => increment(doc, path, value)?,
                "$push" => push(doc, path, value)?,
                _ => false,
            };
        }
    }
    Ok(changed)
}

/// Set the value at a dotted path, creating intermediate objects
pub fn set_path(doc: &mut Document, path: &str, value: ExtendedValue) -> StoreResult<bool> {
    let segments: Vec<&str> = path.split('.').collect();
    set_in_document(doc, &segments, value)
}

/// Remove the value at a dotted path; array slots are nulled, not shifted
pub fn remove_path(doc: &mut Document, path: &str) -> bool {
    let segments: Vec<&str> = path.split('.').collect();
    remove_in_document(doc, &segments)
}

fn guard_id(doc: &Document, op: &str, path: &str, value: &ExtendedValue) -> StoreResult<()> {
    // an upsert seed without an _id may still receive one
    if (path != ID && !path.starts_with("_id.")) || !doc.contains_key(ID) {
        return Ok(());
    }
    let unchanged = op == "$set" && doc.get_path(path).is_some_and(|old| identical(old, value));
    if unchanged {
        Ok(())
    } else {
        Err(StoreError::InvalidQuery(format!(
            "performing an update on the path '{}' would modify the immutable field '_id'",
            path
        )))
    }
}

fn identical(a: &ExtendedValue, b: &ExtendedValue) -> bool {
    a.type_name() == b.type_name() && values_equal(a, b)
}

fn set_in_document(doc: &mut Document, segments: &[&str], value: ExtendedValue) -> StoreResult<bool> {
    let Some((head, rest)) = segments.split_first() else {
        return Ok(false);
    };

    if rest.is_empty() {
        let changed = doc.get(head).map_or(true, |old| !identical(old, &value));
        if changed {
            doc.insert(*head, value);
        }
        return Ok(changed);
    }

    if !doc.contains_key(head) {
        doc.insert(*head, ExtendedValue::Object(Document::new()));
    }
    match doc.get_mut(head) {
        Some(child) => set_in_value(child, rest, value),
        None => Err(StoreError::Internal(format!("field '{}' vanished", head))),
    }
}

fn set_in_value(target: &mut ExtendedValue, segments: &[&str], value: ExtendedValue) -> StoreResult<bool> {
    let Some((head, rest)) = segments.split_first() else {
        return Ok(false);
    };

    match target {
        ExtendedValue::Object(doc) => set_in_document(doc, segments, value),
        ExtendedValue::Array(items) => {
            let index = head.parse::<usize>().map_err(|_| {
                StoreError::InvalidQuery(format!(
                    "cannot create field '{}' in an array element",
                    head
                ))
            })?;
            if items.len() <= index {
                let len = Some(index)
                    .filter(|index| index - items.len() <= MAX_ARRAY_BACKFILL)
                    .and_then(|index| index.checked_add(1))
                    .ok_or_else(|| {
                        StoreError::InvalidQuery(format!(
                            "cannot pad array to index {}, more than {} null elements",
                            index, MAX_ARRAY_BACKFILL
                        ))
                    })?;
                items.resize(len, ExtendedValue::Null);
            }
            let Some(slot) = items.get_mut(index) else {
                return Err(StoreError::Internal(format!("array slot {} vanished", index)));
            };
            if rest.is_empty() {
                let changed = !identical(slot, &value);
                *slot = value;
                return Ok(changed);
            }
            if slot.is_null() {
                *slot = ExtendedValue::Object(Document::new());
            }
            set_in_value(slot, rest, value)
        }
        other => Err(StoreError::InvalidQuery(format!(
            "cannot create field '{}' in element of type {}",
            head,
            other.type_name()
        ))),
    }
}

fn remove_in_document(doc: &mut Document, segments: &[&str]) -> bool {
    match segments {
        [] => false,
        [last] => doc.remove(last).is_some(),
        [head, rest @ ..] => match doc.get_mut(head) {
            Some(child) => remove_in_value(child, rest),
            None => false,
        },
    }
}

fn remove_in_value(target: &mut ExtendedValue, segments: &[&str]) -> bool {
    match target {
        ExtendedValue::Object(doc) => remove_in_document(doc, segments),
        ExtendedValue::Array(items) => {
            let Some((head, rest)) = segments.split_first() else {
                return false;
            };
            let Some(slot) = head.parse::<usize>().ok().and_then(|i| items.get_mut(i)) else {
                return false;
            };
            if rest.is_empty() {
                let changed = !slot.is_null();
                *slot = ExtendedValue::Null;
                changed
            } else {
                remove_in_value(slot, rest)
            }
        }
        _ => false,
    }
}

fn increment(doc: &mut Document, path: &str, by: &ExtendedValue) -> StoreResult<bool> {
    let next = match doc.get_path(path) {
        None => by.clone(),
        Some(current) => add(current, by).ok_or_else(|| {
            StoreError::InvalidQuery(format!(
                "cannot apply $inc to '{}' of type {}",
                path,
                current.type_name()
            ))
        })??,
    };
    set_path(doc, path, next)
}

fn add(current: &ExtendedValue, by: &ExtendedValue) -> Option<StoreResult<ExtendedValue>> {
    match (current, by) {
        (ExtendedValue::Int64(a), ExtendedValue::Int64(b)) => Some(
            a.checked_add(*b)
                .map(ExtendedValue::Int64)
                .ok_or_else(|| StoreError::InvalidQuery("integer overflow in $inc".to_string())),
        ),
        _ => {
            let sum = current.as_f64()? + by.as_f64()?;
            Some(Ok(ExtendedValue::Float64(sum)))
        }
    }
}

fn push(doc: &mut Document, path: &str, arg: &ExtendedValue) -> StoreResult<bool> {
    let additions: Vec<ExtendedValue> = match arg {
        ExtendedValue::Object(spec) if spec.len() == 1 && spec.contains_key("$each") => spec
            .get("$each")
            .and_then(|each| each.as_array())
            .ok_or_else(|| StoreError::InvalidQuery("$each needs an array".to_string()))?
            .to_vec(),
        other => vec![other.clone()],
    };

    let mut items = match doc.get_path(path) {
        None => Vec::new(),
        Some(ExtendedValue::Array(items)) => items.clone(),
        Some(other) => {
            return Err(StoreError::InvalidQuery(format!(
                "the field '{}' must be an array but is of type {}",
                path,
                other.type_name()
            )))
        }
    };
    if additions.is_empty() && doc.get_path(path).is_some() {
        return Ok(false);
    }
    items.extend(additions);
    set_path(doc, path, ExtendedValue::Array(items))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::decode;
    use serde_json::{json, Value as JsonValue};

    fn doc(value: JsonValue) -> Document {
        decode(&value, "test").unwrap().into_document().unwrap()
    }

    fn updated(document: JsonValue, update: JsonValue) -> (Document, bool) {
        let mut d = doc(document);
        let changed = apply_update(&mut d, &doc(update)).unwrap();
        (d, changed)
    }

    #[test]
    fn test_set_and_nested_set() {
        let (d, changed) = updated(
            json!({"name": "a"}),
            json!({"$set": {"name": "b", "address.city": "Oslo"}}),
        );
        assert!(changed);
        assert_eq!(d, doc(json!({"name": "b", "address": {"city": "Oslo"}})));
    }

    #[test]
    fn test_set_same_value_is_not_a_change() {
        let (_, changed) = updated(json!({"n": 1}), json!({"$set": {"n": 1}}));
        assert!(!changed);
        let (_, changed) = updated(json!({"n": 1}), json!({"$set": {"n": 1.0}}));
        assert!(changed);
    }

    #[test]
    fn test_set_array_index() {
        let (d, _) = updated(json!({"tags": ["a"]}), json!({"$set": {"tags.2": "c"}}));
        assert_eq!(d, doc(json!({"tags": ["a", null, "c"]})));
    }

    #[test]
    fn test_set_array_index_is_bounded() {
        for path in ["tags.18446744073709551615", "tags.100000000000", "tags.1500002"] {
            let mut d = doc(json!({"tags": ["a"]}));
            let err = apply_update(&mut d, &doc(json!({"$set": {path: 1}}))).unwrap_err();
            assert!(matches!(err, StoreError::InvalidQuery(_)), "{}", path);
            assert_eq!(d, doc(json!({"tags": ["a"]})));
        }

        let (d, _) = updated(json!({"tags": ["a"]}), json!({"$set": {"tags.1500001": 1}}));
        assert_eq!(d.get("tags").and_then(|t| t.as_array()).map(<[_]>::len), Some(1_500_002));
    }

    #[test]
    fn test_dollar_field_names_rejected() {
        for update in [
            json!({"$unset": {"a.$numberLong": ""}}),
            json!({"$set": {"a.$oid": "zz"}}),
            json!({"$set": {"a": {"b": {"x": 0, "$date": 1}}}}),
            json!({"$push": {"list": {"$each": [{"$oid": "zz", "y": 1}]}}}),
            json!({"$push": {"list": [{"$gt": 1, "y": 1}]}}),
        ] {
            let mut d = doc(json!({"a": {"x": 0}}));
            let err = apply_update(&mut d, &doc(update.clone())).unwrap_err();
            assert!(matches!(err, StoreError::InvalidQuery(_)), "{}", update);
        }

        let nested = doc(json!({"a": [{"b": {"$numberLong": "5", "x": 0}}]}));
        let err = check_field_names(&nested).unwrap_err();
        assert!(err.to_string().contains("a.0.b.$numberLong"), "{}", err);
        assert!(check_field_names(&doc(json!({"_id": 1, "a": {"b": [1, {"c": 2}]}}))).is_ok());
    }

    #[test]
    fn test_set_through_scalar_fails() {
        let mut d = doc(json!({"a": 5}));
        let err = apply_update(&mut d, &doc(json!({"$set": {"a.b": 1}}))).unwrap_err();
        assert!(matches!(err, StoreError::InvalidQuery(_)));
    }

    #[test]
    fn test_unset() {
        let (d, changed) = updated(
            json!({"a": 1, "b": {"c": 2, "d": 3}}),
            json!({"$unset": {"a": "", "b.c": "", "missing": ""}}),
        );
        assert!(changed);
        assert_eq!(d, doc(json!({"b": {"d": 3}})));
    }

    #[test]
    fn test_inc() {
        let (d, _) = updated(
            json!({"n": 1, "f": 1.5}),
            json!({"$inc": {"n": 2, "f": 1, "new": 3}}),
        );
        assert_eq!(d, doc(json!({"n": 3, "f": 2.5, "new": 3})));
    }

    #[test]
    fn test_inc_rejects_non_numeric() {
        let mut d = doc(json!({"s": "x"}));
        assert!(apply_update(&mut d, &doc(json!({"$inc": {"s": 1}}))).is_err());
        assert!(apply_update(&mut d, &doc(json!({"$inc": {"n": "1"}}))).is_err());
    }

    #[test]
    fn test_push() {
        let (d, _) = updated(
            json!({"tags": ["a"]}),
            json!({"$push": {"tags": "b", "more": {"$each": [1, 2]}}}),
        );
        assert_eq!(d, doc(json!({"tags": ["a", "b"], "more": [1, 2]})));
    }

    #[test]
    fn test_push_onto_scalar_fails() {
        let mut d = doc(json!({"tags": "a"}));
        assert!(apply_update(&mut d, &doc(json!({"$push": {"tags": "b"}}))).is_err());
    }

    #[test]
    fn test_id_is_immutable() {
        let mut d = doc(json!({"_id": 1, "a": 1}));
        assert!(apply_update(&mut d, &doc(json!({"$set": {"_id": 2}}))).is_err());
        assert!(apply_update(&mut d, &doc(json!({"$unset": {"_id": ""}}))).is_err());
        assert!(!apply_update(&mut d, &doc(json!({"$set": {"_id": 1}}))).unwrap());
    }

    #[test]
    fn test_replacement_documents_are_rejected() {
        for update in [json!({"name": "x"}), json!({}), json!({"$rename": {"a": "b"}})] {
            assert!(validate_update(&doc(update.clone())).is_err(), "{}", update);
        }
    }
}
