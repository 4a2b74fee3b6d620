//! # Extended JSON Decoding
//!
//! Turns a loosely typed JSON tree into an [`ExtendedValue`] tree.
//!
//! Rules:
//! - bare integers that fit `i64` become `Int64`, every other number `Float64`
//! - a single-key object whose key is reserved becomes a typed scalar
//! - a reserved payload that fails to parse fails the whole field
//! - everything else is literal data, key order preserved

use bson::oid::ObjectId;
use chrono::DateTime;
use serde_json::{Map, Number, Value as JsonValue};

use super::errors::{CodecError, CodecResult, KeyPath};
use super::value::{Document, ExtendedValue};
use super::{DATE, NUMBER_DOUBLE, NUMBER_INT, NUMBER_LONG, OID};

/// Decode one request field.
///
/// `field` names the request field and roots the key path reported in
/// errors, e.g. `filter` or `pipeline`.
pub fn decode(value: &JsonValue, field: &str) -> CodecResult<ExtendedValue> {
    decode_at(value, &KeyPath::Root(field))
}

/// Numeric inference for bare JSON numbers
pub fn decode_number(n: &Number) -> ExtendedValue {
    match n.as_i64() {
        Some(i) => ExtendedValue::Int64(i),
        // every non-arbitrary-precision number has an f64 view
        None => ExtendedValue::Float64(n.as_f64().unwrap_or(f64::NAN)),
    }
}

fn decode_at(value: &JsonValue, path: &KeyPath<'_>) -> CodecResult<ExtendedValue> {
    match value {
        JsonValue::Null => Ok(ExtendedValue::Null),
        JsonValue::Bool(b) => Ok(ExtendedValue::Bool(*b)),
        JsonValue::Number(n) => Ok(decode_number(n)),
        JsonValue::String(s) => Ok(ExtendedValue::String(s.clone())),
        JsonValue::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| decode_at(item, &path.index(i)))
            .collect::<CodecResult<Vec<_>>>()
            .map(ExtendedValue::Array),
        JsonValue::Object(map) => {
            if let Some(scalar) = decode_reserved(map, path)? {
                return Ok(scalar);
            }
            decode_object(map, path).map(ExtendedValue::Object)
        }
    }
}

fn decode_object(map: &Map<String, JsonValue>, path: &KeyPath<'_>) -> CodecResult<Document> {
    let mut doc = Document::with_capacity(map.len());
    for (key, value) in map {
        doc.insert(key.clone(), decode_at(value, &path.key(key))?);
    }
    Ok(doc)
}

/// Typed scalar for a single-key reserved object, `None` for literal data
fn decode_reserved(
    map: &Map<String, JsonValue>,
    path: &KeyPath<'_>,
) -> CodecResult<Option<ExtendedValue>> {
    if map.len() != 1 {
        return Ok(None);
    }
    let Some((key, payload)) = map.iter().next() else {
        return Ok(None);
    };

    let scalar = match key.as_str() {
        OID => decode_object_id(payload, path)?,
        DATE => decode_date(payload, path)?,
        NUMBER_DOUBLE => ExtendedValue::Float64(decode_double(payload, path)?),
        NUMBER_LONG => ExtendedValue::Int64(decode_long(NUMBER_LONG, payload, path)?),
        NUMBER_INT => {
            let n = decode_long(NUMBER_INT, payload, path)?;
            i32::try_from(n).map_err(|_| number_error(NUMBER_INT, path, "out of 32-bit range"))?;
            ExtendedValue::Int64(n)
        }
        _ => return Ok(None),
    };
    Ok(Some(scalar))
}

fn decode_object_id(payload: &JsonValue, path: &KeyPath<'_>) -> CodecResult<ExtendedValue> {
    let hex = payload.as_str().ok_or_else(|| CodecError::InvalidObjectId {
        path: path.to_string(),
        reason: format!("expected a hex string, found {}", json_type(payload)),
    })?;

    ObjectId::parse_str(hex)
        .map(ExtendedValue::ObjectId)
        .map_err(|e| CodecError::InvalidObjectId {
            path: path.to_string(),
            reason: e.to_string(),
        })
}

fn decode_date(payload: &JsonValue, path: &KeyPath<'_>) -> CodecResult<ExtendedValue> {
    let date_error = |reason: String| CodecError::InvalidDate {
        path: path.to_string(),
        reason,
    };

    match payload {
        JsonValue::String(s) => DateTime::parse_from_rfc3339(s)
            .map(|dt| ExtendedValue::DateTime(dt.timestamp_millis()))
            .map_err(|e| date_error(format!("'{}' is not RFC-3339: {}", s, e))),
        JsonValue::Number(n) => n
            .as_i64()
            .map(ExtendedValue::DateTime)
            .ok_or_else(|| date_error(format!("{} is not integer milliseconds", n))),
        JsonValue::Object(map) if map.len() == 1 => match map.get(NUMBER_LONG) {
            Some(JsonValue::String(s)) => s
                .parse::<i64>()
                .map(ExtendedValue::DateTime)
                .map_err(|_| date_error(format!("'{}' is not integer milliseconds", s))),
            _ => Err(date_error(
                "expected {\"$numberLong\": \"<millis>\"}".to_string(),
            )),
        },
        other => Err(date_error(format!(
            "expected an RFC-3339 string or integer milliseconds, found {}",
            json_type(other)
        ))),
    }
}

fn decode_double(payload: &JsonValue, path: &KeyPath<'_>) -> CodecResult<f64> {
    let s = payload.as_str().ok_or_else(|| {
        number_error(
            NUMBER_DOUBLE,
            path,
            format!("expected a numeric string, found {}", json_type(payload)),
        )
    })?;

    match s {
        "Infinity" => return Ok(f64::INFINITY),
        "-Infinity" => return Ok(f64::NEG_INFINITY),
        "NaN" => return Ok(f64::NAN),
        _ => {}
    }

    // str::parse also accepts "inf" and "nan" spellings the wire format does not
    if s.bytes().any(|b| b.is_ascii_alphabetic() && b != b'e' && b != b'E') {
        return Err(number_error(
            NUMBER_DOUBLE,
            path,
            format!("'{}' is not a number", s),
        ));
    }
    s.parse::<f64>()
        .map_err(|_| number_error(NUMBER_DOUBLE, path, format!("'{}' is not a number", s)))
}

fn decode_long(key: &'static str, payload: &JsonValue, path: &KeyPath<'_>) -> CodecResult<i64> {
    let s = payload.as_str().ok_or_else(|| {
        number_error(
            key,
            path,
            format!("expected a numeric string, found {}", json_type(payload)),
        )
    })?;

    s.parse::<i64>()
        .map_err(|_| number_error(key, path, format!("'{}' is not a 64-bit integer", s)))
}

fn number_error(key: &'static str, path: &KeyPath<'_>, reason: impl Into<String>) -> CodecError {
    CodecError::InvalidNumber {
        path: path.to_string(),
        key,
        reason: reason.into(),
    }
}

fn json_type(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "boolean",
        JsonValue::Number(_) => "number",
        JsonValue::String(_) => "string",
        JsonValue::Array(_) => "array",
        JsonValue::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode_ok(value: JsonValue) -> ExtendedValue {
        decode(&value, "filter").unwrap()
    }

    #[test]
    fn test_scalars() {
        assert_eq!(decode_ok(json!(null)), ExtendedValue::Null);
        assert_eq!(decode_ok(json!(true)), ExtendedValue::Bool(true));
        assert_eq!(decode_ok(json!("hi")), ExtendedValue::from("hi"));
    }

    #[test]
    fn test_integer_vs_float_inference() {
        assert_eq!(decode_ok(json!(42)), ExtendedValue::Int64(42));
        assert_eq!(decode_ok(json!(-7)), ExtendedValue::Int64(-7));
        assert_eq!(decode_ok(json!(42.0)), ExtendedValue::Float64(42.0));
        assert_eq!(decode_ok(json!(1e10)), ExtendedValue::Float64(1e10));
        assert_eq!(
            decode_ok(json!(u64::MAX)),
            ExtendedValue::Float64(u64::MAX as f64)
        );
    }

    #[test]
    fn test_inference_from_text() {
        let parsed: JsonValue = serde_json::from_str("[42, 42.0, 1e10]").unwrap();
        assert_eq!(
            decode(&parsed, "x").unwrap(),
            ExtendedValue::Array(vec![
                ExtendedValue::Int64(42),
                ExtendedValue::Float64(42.0),
                ExtendedValue::Float64(1e10),
            ])
        );
    }

    #[test]
    fn test_object_id() {
        let value = decode_ok(json!({"$oid": "507f1f77bcf86cd799439011"}));
        assert_eq!(
            value,
            ExtendedValue::ObjectId(ObjectId::parse_str("507f1f77bcf86cd799439011").unwrap())
        );
    }

    #[test]
    fn test_invalid_object_id_fails_field() {
        let err = decode(
            &json!({"user": {"_id": {"$oid": "not-hex"}}, "ok": 1}),
            "filter",
        )
        .unwrap_err();
        assert!(matches!(err, CodecError::InvalidObjectId { .. }));
        assert_eq!(err.path(), "filter.user._id");
        assert_eq!(err.reserved_key(), "$oid");
    }

    #[test]
    fn test_object_id_hex_case() {
        let value = decode_ok(json!({"$oid": "507F1F77BCF86CD799439011"}));
        let ExtendedValue::ObjectId(oid) = value else {
            panic!("expected an ObjectId, got {:?}", value);
        };
        assert_eq!(oid.to_hex(), "507f1f77bcf86cd799439011");
    }

    #[test]
    fn test_object_id_bad_length_and_characters() {
        for hex in ["abc", "507f1f77bcf86cd79943901z", "507f1f77bcf86cd7994390é"] {
            let err = decode(&json!({"$oid": hex}), "filter").unwrap_err();
            assert!(matches!(err, CodecError::InvalidObjectId { .. }), "{}", hex);
        }
    }

    #[test]
    fn test_object_id_wrong_payload_type() {
        let err = decode(&json!({"$oid": 12}), "document").unwrap_err();
        assert!(matches!(err, CodecError::InvalidObjectId { .. }));
    }

    #[test]
    fn test_reserved_key_with_siblings_is_literal() {
        let value = decode_ok(json!({"$oid": "507f1f77bcf86cd799439011", "extra": 1}));
        let doc = value.as_document().unwrap();
        assert_eq!(doc.len(), 2);
        assert_eq!(
            doc.get("$oid"),
            Some(&ExtendedValue::from("507f1f77bcf86cd799439011"))
        );
        assert_eq!(doc.get("extra"), Some(&ExtendedValue::Int64(1)));
    }

    #[test]
    fn test_invalid_payload_with_siblings_is_not_checked() {
        // literal objects never interpret reserved keys
        let value = decode_ok(json!({"$date": "yesterday", "tz": "UTC"}));
        assert_eq!(value.as_document().unwrap().len(), 2);
    }

    #[test]
    fn test_operator_objects_are_literal() {
        let value = decode_ok(json!({"$gt": 5}));
        let doc = value.as_document().unwrap();
        assert_eq!(doc.get("$gt"), Some(&ExtendedValue::Int64(5)));
    }

    #[test]
    fn test_date_from_rfc3339() {
        assert_eq!(
            decode_ok(json!({"$date": "2024-01-01T00:00:00Z"})),
            ExtendedValue::DateTime(1_704_067_200_000)
        );
        assert_eq!(
            decode_ok(json!({"$date": "2024-01-01T02:00:00.250+02:00"})),
            ExtendedValue::DateTime(1_704_067_200_250)
        );
    }

    #[test]
    fn test_date_from_millis() {
        assert_eq!(
            decode_ok(json!({"$date": 1_704_067_200_000i64})),
            ExtendedValue::DateTime(1_704_067_200_000)
        );
        assert_eq!(
            decode_ok(json!({"$date": {"$numberLong": "-5"}})),
            ExtendedValue::DateTime(-5)
        );
    }

    #[test]
    fn test_invalid_dates() {
        for payload in [
            json!({"$date": "not a date"}),
            json!({"$date": 1.5}),
            json!({"$date": true}),
            json!({"$date": {"$numberLong": 5}}),
        ] {
            let err = decode(&payload, "filter").unwrap_err();
            assert!(matches!(err, CodecError::InvalidDate { .. }), "{:?}", payload);
        }
    }

    #[test]
    fn test_number_double() {
        assert_eq!(
            decode_ok(json!({"$numberDouble": "1.5"})),
            ExtendedValue::Float64(1.5)
        );
        assert_eq!(
            decode_ok(json!({"$numberDouble": "-Infinity"})),
            ExtendedValue::Float64(f64::NEG_INFINITY)
        );
        match decode_ok(json!({"$numberDouble": "NaN"})) {
            ExtendedValue::Float64(f) => assert!(f.is_nan()),
            other => panic!("expected float, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_number_double() {
        for payload in ["inf", "nan", "abc", "", "1.2.3"] {
            let err = decode(&json!({"$numberDouble": payload}), "update").unwrap_err();
            assert_eq!(err.reserved_key(), "$numberDouble", "{}", payload);
        }
        let err = decode(&json!({"$numberDouble": 1.5}), "update").unwrap_err();
        assert!(matches!(err, CodecError::InvalidNumber { .. }));
    }

    #[test]
    fn test_number_long() {
        assert_eq!(
            decode_ok(json!({"$numberLong": "9223372036854775807"})),
            ExtendedValue::Int64(i64::MAX)
        );
        let err = decode(&json!({"$numberLong": "12.5"}), "filter").unwrap_err();
        assert_eq!(err.reserved_key(), "$numberLong");
        let err = decode(&json!({"$numberLong": 12}), "filter").unwrap_err();
        assert_eq!(err.reserved_key(), "$numberLong");
    }

    #[test]
    fn test_number_int_alias() {
        assert_eq!(
            decode_ok(json!({"$numberInt": "12"})),
            ExtendedValue::Int64(12)
        );
        let err = decode(&json!({"$numberInt": "4294967296"}), "filter").unwrap_err();
        assert_eq!(err.reserved_key(), "$numberInt");
    }

    #[test]
    fn test_key_order_preserved() {
        let parsed: JsonValue =
            serde_json::from_str(r#"{"$project": {"b": 1, "a": 1}}"#).unwrap();
        let value = decode(&parsed, "pipeline").unwrap();
        let project = value.as_document().unwrap().get("$project").unwrap();
        let keys: Vec<_> = project.as_document().unwrap().keys().collect();
        assert_eq!(keys, vec!["b", "a"]);
    }

    #[test]
    fn test_error_path_through_arrays() {
        let err = decode(
            &json!([{"$match": {"ts": {"$gte": {"$date": "bad"}}}}]),
            "pipeline",
        )
        .unwrap_err();
        assert_eq!(err.path(), "pipeline[0].$match.ts.$gte");
    }
}
