//! # Operations
//!
//! The nine operation kinds, the per-request envelope and its validation
//! into a typed [`Request`].

use std::fmt;

use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::codec::{decode, Document, ExtendedValue};
use crate::store::{FindOptions, Namespace, Update, UpdateOptions};

use super::errors::{ApiError, ApiResult};

/// Operation kinds, one per route
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    InsertOne,
    InsertMany,
    FindOne,
    Find,
    UpdateOne,
    UpdateMany,
    DeleteOne,
    DeleteMany,
    Aggregate,
}

impl OperationKind {
    pub const ALL: [OperationKind; 9] = [
        OperationKind::InsertOne,
        OperationKind::InsertMany,
        OperationKind::FindOne,
        OperationKind::Find,
        OperationKind::UpdateOne,
        OperationKind::UpdateMany,
        OperationKind::DeleteOne,
        OperationKind::DeleteMany,
        OperationKind::Aggregate,
    ];

    /// Route segment and metric label
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::InsertOne => "insertOne",
            OperationKind::InsertMany => "insertMany",
            OperationKind::FindOne => "findOne",
            OperationKind::Find => "find",
            OperationKind::UpdateOne => "updateOne",
            OperationKind::UpdateMany => "updateMany",
            OperationKind::DeleteOne => "deleteOne",
            OperationKind::DeleteMany => "deleteMany",
            OperationKind::Aggregate => "aggregate",
        }
    }

    /// Full request path, e.g. `/api/findOne`
    pub fn path(&self) -> String {
        format!("/api/{}", self.as_str())
    }

    /// Kind served at a request path
    pub fn from_path(path: &str) -> Option<Self> {
        let name = path.strip_prefix("/api/")?;
        Self::ALL.into_iter().find(|kind| kind.as_str() == name)
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request envelope as received. Unknown fields are ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OperationDescriptor {
    #[serde(default)]
    pub database: String,
    #[serde(default)]
    pub collection: String,
    pub document: Option<JsonValue>,
    pub documents: Option<JsonValue>,
    pub filter: Option<JsonValue>,
    pub update: Option<JsonValue>,
    pub projection: Option<JsonValue>,
    pub sort: Option<JsonValue>,
    pub pipeline: Option<JsonValue>,
    pub limit: Option<JsonValue>,
    pub skip: Option<JsonValue>,
    pub upsert: Option<bool>,
}

/// A validated, decoded operation
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    InsertOne {
        document: Document,
    },
    InsertMany {
        documents: Vec<Document>,
    },
    FindOne {
        filter: Document,
        options: FindOptions,
    },
    Find {
        filter: Document,
        options: FindOptions,
    },
    UpdateOne {
        filter: Document,
        update: Update,
        options: UpdateOptions,
    },
    UpdateMany {
        filter: Document,
        update: Update,
        options: UpdateOptions,
    },
    DeleteOne {
        filter: Document,
    },
    DeleteMany {
        filter: Document,
    },
    Aggregate {
        pipeline: Vec<Document>,
    },
}

impl OperationDescriptor {
    /// Parse the envelope from a JSON body
    pub fn from_json(body: JsonValue) -> ApiResult<Self> {
        if !body.is_object() {
            return Err(ApiError::BadRequest(
                "request body must be a JSON object".to_string(),
            ));
        }
        serde_json::from_value(body)
            .map_err(|e| ApiError::BadRequest(format!("invalid request body: {}", e)))
    }

    /// Target namespace; both names must be non-empty
    pub fn namespace(&self) -> ApiResult<Namespace> {
        if self.database.is_empty() {
            return Err(missing("database"));
        }
        if self.collection.is_empty() {
            return Err(missing("collection"));
        }
        Ok(Namespace::new(&self.database, &self.collection))
    }

    /// Decode the fields `kind` uses and check their shapes
    pub fn into_request(self, kind: OperationKind) -> ApiResult<(Namespace, Request)> {
        let ns = self.namespace()?;
        let request = match kind {
            OperationKind::InsertOne => Request::InsertOne {
                document: required_document("document", self.document.as_ref())?,
            },
            OperationKind::InsertMany => {
                let documents = document_list("documents", self.documents.as_ref())?;
                if documents.is_empty() {
                    return Err(ApiError::BadRequest(
                        "field 'documents' must not be empty".to_string(),
                    ));
                }
                Request::InsertMany { documents }
            }
            OperationKind::FindOne => Request::FindOne {
                filter: optional_document("filter", self.filter.as_ref())?.unwrap_or_default(),
                options: FindOptions {
                    projection: optional_document("projection", self.projection.as_ref())?,
                    sort: optional_document("sort", self.sort.as_ref())?,
                    limit: None,
                    skip: None,
                },
            },
            OperationKind::Find => Request::Find {
                filter: optional_document("filter", self.filter.as_ref())?.unwrap_or_default(),
                options: FindOptions {
                    projection: optional_document("projection", self.projection.as_ref())?,
                    sort: optional_document("sort", self.sort.as_ref())?,
                    limit: optional_count("limit", self.limit.as_ref())?,
                    skip: optional_count("skip", self.skip.as_ref())?,
                },
            },
            OperationKind::UpdateOne | OperationKind::UpdateMany => {
                let filter = required_document("filter", self.filter.as_ref())?;
                let update = update_field(self.update.as_ref())?;
                let options = UpdateOptions {
                    upsert: self.upsert.unwrap_or(false),
                };
                if kind == OperationKind::UpdateOne {
                    Request::UpdateOne {
                        filter,
                        update,
                        options,
                    }
                } else {
                    Request::UpdateMany {
                        filter,
                        update,
                        options,
                    }
                }
            }
            OperationKind::DeleteOne => Request::DeleteOne {
                filter: required_document("filter", self.filter.as_ref())?,
            },
            OperationKind::DeleteMany => Request::DeleteMany {
                filter: required_document("filter", self.filter.as_ref())?,
            },
            OperationKind::Aggregate => Request::Aggregate {
                pipeline: document_list("pipeline", self.pipeline.as_ref())?,
            },
        };
        Ok((ns, request))
    }
}

fn missing(field: &str) -> ApiError {
    ApiError::BadRequest(format!("missing required field '{}'", field))
}

fn present(value: Option<&JsonValue>) -> Option<&JsonValue> {
    value.filter(|v| !v.is_null())
}

fn optional_document(field: &str, value: Option<&JsonValue>) -> ApiResult<Option<Document>> {
    let Some(raw) = present(value) else {
        return Ok(None);
    };
    match decode(raw, field)? {
        ExtendedValue::Object(doc) => Ok(Some(doc)),
        other => Err(ApiError::BadRequest(format!(
            "field '{}' must be an object, found {}",
            field,
            other.type_name()
        ))),
    }
}

fn required_document(field: &str, value: Option<&JsonValue>) -> ApiResult<Document> {
    optional_document(field, value)?.ok_or_else(|| missing(field))
}

fn document_list(field: &str, value: Option<&JsonValue>) -> ApiResult<Vec<Document>> {
    let raw = present(value).ok_or_else(|| missing(field))?;
    let items = match decode(raw, field)? {
        ExtendedValue::Array(items) => items,
        other => {
            return Err(ApiError::BadRequest(format!(
                "field '{}' must be an array, found {}",
                field,
                other.type_name()
            )))
        }
    };
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            let found = item.type_name();
            item.into_document().ok_or_else(|| {
                ApiError::BadRequest(format!(
                    "{}[{}] must be an object, found {}",
                    field, index, found
                ))
            })
        })
        .collect()
}

fn update_field(value: Option<&JsonValue>) -> ApiResult<Update> {
    match present(value) {
        Some(JsonValue::Array(_)) => document_list("update", value).map(Update::Pipeline),
        Some(_) => required_document("update", value).map(Update::Document),
        None => Err(missing("update")),
    }
}

fn optional_count(field: &str, value: Option<&JsonValue>) -> ApiResult<Option<u64>> {
    let Some(raw) = present(value) else {
        return Ok(None);
    };
    let count = match decode(raw, field)? {
        ExtendedValue::Int64(n) => u64::try_from(n).ok(),
        ExtendedValue::Float64(f) if f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 => {
            Some(f as u64)
        }
        _ => None,
    };
    count.map(Some).ok_or_else(|| {
        ApiError::BadRequest(format!("field '{}' must be a non-negative integer", field))
    })
}
