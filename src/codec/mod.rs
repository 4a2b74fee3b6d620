//! # Extended-Value Codec
//!
//! Translation between the extended-JSON wire format and typed
//! [`ExtendedValue`] trees.
//!
//! A JSON object with exactly one key from the reserved set denotes a typed
//! scalar:
//!
//! | Key | Payload | Value |
//! |---|---|---|
//! | `$oid` | 24 hex characters | `ObjectId` |
//! | `$date` | RFC-3339 string or integer epoch milliseconds | `DateTime` |
//! | `$numberDouble` | numeric string, `Infinity`, `-Infinity`, `NaN` | `Float64` |
//! | `$numberLong` | numeric string | `Int64` |
//! | `$numberInt` | numeric string (decode only) | `Int64` |
//!
//! Every other shape is literal data. Both directions are pure.

pub mod decode;
pub mod encode;
pub mod errors;
pub mod value;

pub use decode::decode;
pub use encode::{encode, encode_document, FloatMode};
pub use errors::{CodecError, CodecResult};
pub use bson::oid::ObjectId;
pub use value::{Document, ExtendedValue};

pub const OID: &str = "$oid";
pub const DATE: &str = "$date";
pub const NUMBER_DOUBLE: &str = "$numberDouble";
pub const NUMBER_LONG: &str = "$numberLong";
pub const NUMBER_INT: &str = "$numberInt";
