//! # Codec Errors
//!
//! Decode failures name the offending key path and reserved key so the
//! client can locate the bad payload.

use std::fmt;

use thiserror::Error;

/// Result type for codec operations
pub type CodecResult<T> = Result<T, CodecError>;

/// A reserved-key payload that did not parse as its scalar type
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("invalid $oid at '{path}': {reason}")]
    InvalidObjectId { path: String, reason: String },

    #[error("invalid $date at '{path}': {reason}")]
    InvalidDate { path: String, reason: String },

    #[error("invalid {key} at '{path}': {reason}")]
    InvalidNumber {
        path: String,
        key: &'static str,
        reason: String,
    },
}

impl CodecError {
    /// Dotted path of the offending value, rooted at the request field
    pub fn path(&self) -> &str {
        match self {
            CodecError::InvalidObjectId { path, .. }
            | CodecError::InvalidDate { path, .. }
            | CodecError::InvalidNumber { path, .. } => path,
        }
    }

    /// The reserved key whose payload failed to parse
    pub fn reserved_key(&self) -> &'static str {
        match self {
            CodecError::InvalidObjectId { .. } => super::OID,
            CodecError::InvalidDate { .. } => super::DATE,
            CodecError::InvalidNumber { key, .. } => key,
        }
    }
}

/// Location inside the tree being decoded.
///
/// Built on the stack as the decoder descends and only rendered when an
/// error is reported.
#[derive(Debug, Clone, Copy)]
pub(crate) enum KeyPath<'a> {
    Root(&'a str),
    Key(&'a KeyPath<'a>, &'a str),
    Index(&'a KeyPath<'a>, usize),
}

impl<'a> KeyPath<'a> {
    pub(crate) fn key(&'a self, key: &'a str) -> KeyPath<'a> {
        KeyPath::Key(self, key)
    }

    pub(crate) fn index(&'a self, index: usize) -> KeyPath<'a> {
        KeyPath::Index(self, index)
    }
}

impl fmt::Display for KeyPath<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPath::Root(field) => f.write_str(field),
            KeyPath::Key(parent, key) => write!(f, "{}.{}", parent, key),
            KeyPath::Index(parent, index) => write!(f, "{}[{}]", parent, index),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_path_rendering() {
        let root = KeyPath::Root("pipeline");
        let stage = root.index(0);
        let op = stage.key("$match");
        let field = op.key("ts");
        assert_eq!(field.to_string(), "pipeline[0].$match.ts");
    }

    #[test]
    fn test_error_accessors() {
        let err = CodecError::InvalidNumber {
            path: "filter.n".to_string(),
            key: "$numberLong",
            reason: "not an integer".to_string(),
        };
        assert_eq!(err.path(), "filter.n");
        assert_eq!(err.reserved_key(), "$numberLong");
        assert_eq!(
            err.to_string(),
            "invalid $numberLong at 'filter.n': not an integer"
        );
    }
}
