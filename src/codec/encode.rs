//! # Extended JSON Encoding
//!
//! Turns an [`ExtendedValue`] tree back into JSON that keeps every type
//! distinction the decoder recovers.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, SecondsFormat};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as JsonValue};

use super::value::{Document, ExtendedValue};
use super::{DATE, NUMBER_DOUBLE, NUMBER_LONG, OID};

/// Largest integer a double-precision JSON consumer reads exactly
pub const MAX_SAFE_INTEGER: i64 = (1 << 53) - 1;

/// How `Float64` values are written
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FloatMode {
    /// `{"$numberDouble": "<repr>"}`, reproduces the exact value and type
    #[default]
    Canonical,
    /// Bare JSON numbers; non-finite values still use `$numberDouble`
    Relaxed,
}

impl FloatMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FloatMode::Canonical => "canonical",
            FloatMode::Relaxed => "relaxed",
        }
    }
}

impl fmt::Display for FloatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FloatMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "canonical" => Ok(FloatMode::Canonical),
            "relaxed" => Ok(FloatMode::Relaxed),
            other => Err(format!(
                "unknown float mode '{}', expected 'canonical' or 'relaxed'",
                other
            )),
        }
    }
}

/// Encode a value for transmission
pub fn encode(value: &ExtendedValue, mode: FloatMode) -> JsonValue {
    match value {
        ExtendedValue::Null => JsonValue::Null,
        ExtendedValue::Bool(b) => JsonValue::Bool(*b),
        ExtendedValue::String(s) => JsonValue::String(s.clone()),
        ExtendedValue::Int64(n) => encode_int(*n),
        ExtendedValue::Float64(f) => encode_float(*f, mode),
        ExtendedValue::ObjectId(oid) => json!({ OID: oid.to_hex() }),
        ExtendedValue::DateTime(millis) => encode_date(*millis),
        ExtendedValue::Array(items) => {
            JsonValue::Array(items.iter().map(|item| encode(item, mode)).collect())
        }
        ExtendedValue::Object(doc) => JsonValue::Object(encode_document(doc, mode)),
    }
}

/// Encode a document, keeping its key order
pub fn encode_document(doc: &Document, mode: FloatMode) -> Map<String, JsonValue> {
    doc.iter()
        .map(|(key, value)| (key.to_string(), encode(value, mode)))
        .collect()
}

fn encode_int(n: i64) -> JsonValue {
    if n.unsigned_abs() <= MAX_SAFE_INTEGER as u64 {
        JsonValue::from(n)
    } else {
        json!({ NUMBER_LONG: n.to_string() })
    }
}

fn encode_float(f: f64, mode: FloatMode) -> JsonValue {
    if mode == FloatMode::Relaxed {
        if let Some(n) = serde_json::Number::from_f64(f) {
            return JsonValue::Number(n);
        }
    }
    json!({ NUMBER_DOUBLE: format_double(f) })
}

/// Shortest decimal that parses back to the same double
pub fn format_double(f: f64) -> String {
    if f.is_nan() {
        "NaN".to_string()
    } else if f == f64::INFINITY {
        "Infinity".to_string()
    } else if f == f64::NEG_INFINITY {
        "-Infinity".to_string()
    } else {
        // Debug keeps a ".0" on integral values and switches to exponent form
        // for very large or small magnitudes
        format!("{:?}", f)
    }
}

fn encode_date(millis: i64) -> JsonValue {
    match DateTime::from_timestamp_millis(millis) {
        Some(dt) if (0..=9999).contains(&dt.year()) => {
            json!({ DATE: dt.to_rfc3339_opts(SecondsFormat::AutoSi, true) })
        }
        _ => json!({ DATE: { NUMBER_LONG: millis.to_string() } }),
    }
}
