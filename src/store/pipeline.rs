//! # Projection, Sort and Aggregation
//!
//! Result shaping for the in-memory store: field projection, multi-key
//! sorting and the aggregation stages
//! `$match`, `$project`, `$sort`, `$skip`, `$limit`, `$count` and `$unset`.

use std::cmp::Ordering;

use crate::codec::{Document, ExtendedValue};

use super::compare::compare_values;
use super::errors::{StoreError, StoreResult};
use super::filter::matches;

const ID: &str = "_id";

/// Projection mode derived from a projection document
#[derive(Debug, Clone, PartialEq)]
enum Projection {
    Include { paths: Vec<String>, with_id: bool },
    Exclude { paths: Vec<String> },
}

impl Projection {
    fn parse(spec: &Document) -> StoreResult<Self> {
        let mut included = Vec::new();
        let mut excluded = Vec::new();
        let mut id_flag = None;

        for (path, flag) in spec.iter() {
            let on = projection_flag(path, flag)?;
            if path == ID {
                id_flag = Some(on);
            } else if on {
                included.push(path.to_string());
            } else {
                excluded.push(path.to_string());
            }
        }

        let with_id = id_flag.unwrap_or(true);
        match (included.is_empty(), excluded.is_empty()) {
            (false, false) => Err(StoreError::InvalidQuery(
                "cannot mix inclusion and exclusion in a projection".to_string(),
            )),
            (false, true) => Ok(Projection::Include {
                paths: included,
                with_id,
            }),
            // `{_id: 1}` alone keeps only the id
            (true, true) if id_flag == Some(true) => Ok(Projection::Include {
                paths: Vec::new(),
                with_id: true,
            }),
            _ => {
                if !with_id {
                    excluded.push(ID.to_string());
                }
                Ok(Projection::Exclude { paths: excluded })
            }
        }
    }

    fn apply(&self, doc: &Document) -> Document {
        match self {
            Projection::Include { paths, with_id } => {
                let split: Vec<Vec<&str>> = paths.iter().map(|p| p.split('.').collect()).collect();
                let mut out = include(doc, &split);
                if *with_id {
                    if let Some(id) = doc.get(ID) {
                        out.insert_first(ID, id.clone());
                    }
                }
                out
            }
            Projection::Exclude { paths } => {
                let mut out = doc.clone();
                for path in paths {
                    let segments: Vec<&str> = path.split('.').collect();
                    exclude(&mut out, &segments);
                }
                out
            }
        }
    }
}

fn projection_flag(path: &str, flag: &ExtendedValue) -> StoreResult<bool> {
    match flag {
        ExtendedValue::Bool(b) => Ok(*b),
        ExtendedValue::Int64(n) => Ok(*n != 0),
        ExtendedValue::Float64(f) => Ok(*f != 0.0),
        other => Err(StoreError::InvalidQuery(format!(
            "unsupported projection value for '{}': {}",
            path,
            other.type_name()
        ))),
    }
}

fn include(doc: &Document, paths: &[Vec<&str>]) -> Document {
    let mut out = Document::new();
    for (key, value) in doc.iter() {
        let nested: Vec<Vec<&str>> = paths
            .iter()
            .filter(|p| p.first() == Some(&key))
            .map(|p| p[1..].to_vec())
            .collect();
        if nested.is_empty() {
            continue;
        }
        if nested.iter().any(|rest| rest.is_empty()) {
            out.insert(key, value.clone());
        } else if let Some(projected) = include_value(value, &nested) {
            out.insert(key, projected);
        }
    }
    out
}

fn include_value(value: &ExtendedValue, paths: &[Vec<&str>]) -> Option<ExtendedValue> {
    match value {
        ExtendedValue::Object(doc) => Some(ExtendedValue::Object(include(doc, paths))),
        ExtendedValue::Array(items) => Some(ExtendedValue::Array(
            items
                .iter()
                .filter_map(|item| match item {
                    ExtendedValue::Object(_) | ExtendedValue::Array(_) => include_value(item, paths),
                    _ => None,
                })
                .collect(),
        )),
        _ => None,
    }
}

fn exclude(doc: &mut Document, segments: &[&str]) {
    match segments {
        [] => {}
        [last] => {
            doc.remove(last);
        }
        [head, rest @ ..] => {
            if let Some(child) = doc.get_mut(head) {
                exclude_value(child, rest);
            }
        }
    }
}

fn exclude_value(value: &mut ExtendedValue, segments: &[&str]) {
    match value {
        ExtendedValue::Object(doc) => exclude(doc, segments),
        ExtendedValue::Array(items) => {
            for item in items.iter_mut() {
                exclude_value(item, segments);
            }
        }
        _ => {}
    }
}

/// Project a batch of documents
pub fn project(docs: Vec<Document>, spec: &Document) -> StoreResult<Vec<Document>> {
    if spec.is_empty() {
        return Ok(docs);
    }
    let projection = Projection::parse(spec)?;
    Ok(docs.iter().map(|doc| projection.apply(doc)).collect())
}

/// Stable sort by an ordered key specification of `1` / `-1`
pub fn sort_documents(docs: &mut [Document], spec: &Document) -> StoreResult<()> {
    let keys = spec
        .iter()
        .map(|(path, direction)| match direction.as_f64() {
            Some(d) if d == 1.0 => Ok((path, Ordering::Less)),
            Some(d) if d == -1.0 => Ok((path, Ordering::Greater)),
            _ => Err(StoreError::InvalidQuery(format!(
                "sort direction for '{}' must be 1 or -1",
                path
            ))),
        })
        .collect::<StoreResult<Vec<_>>>()?;

    docs.sort_by(|a, b| {
        for (path, ascending) in &keys {
            let left = a.get_path(path).unwrap_or(&ExtendedValue::Null);
            let right = b.get_path(path).unwrap_or(&ExtendedValue::Null);
            let ord = compare_values(left, right);
            let ord = if *ascending == Ordering::Less { ord } else { ord.reverse() };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    });
    Ok(())
}

/// Read a non-negative integer such as `limit` or `skip`
pub fn non_negative(name: &str, value: &ExtendedValue) -> StoreResult<usize> {
    let n = match value {
        ExtendedValue::Int64(n) => *n as f64,
        ExtendedValue::Float64(f) if f.fract() == 0.0 => *f,
        _ => f64::NAN,
    };
    if n.is_nan() || n < 0.0 {
        return Err(StoreError::InvalidQuery(format!(
            "{} must be a non-negative integer",
            name
        )));
    }
    Ok(n.min(usize::MAX as f64) as usize)
}

/// Run an aggregation pipeline over a collection snapshot
pub fn run_pipeline(mut docs: Vec<Document>, pipeline: &[Document]) -> StoreResult<Vec<Document>> {
    for (index, stage) in pipeline.iter().enumerate() {
        let mut entries = stage.iter();
        let (name, arg) = match (entries.next(), entries.next()) {
            (Some(entry), None) => entry,
            _ => {
                return Err(StoreError::InvalidQuery(format!(
                    "pipeline stage {} must have exactly one field",
                    index
                )))
            }
        };

        docs = match name {
            "$match" => {
                let filter = stage_document(name, arg)?;
                let mut kept = Vec::with_capacity(docs.len());
                for doc in docs {
                    if matches(&doc, filter)? {
                        kept.push(doc);
                    }
                }
                kept
            }
            "$project" => {
                let spec = stage_document(name, arg)?;
                if spec.is_empty() {
                    return Err(StoreError::InvalidQuery(
                        "$project requires at least one field".to_string(),
                    ));
                }
                project(docs, spec)?
            }
            "$sort" => {
                let spec = stage_document(name, arg)?;
                if spec.is_empty() {
                    return Err(StoreError::InvalidQuery(
                        "$sort requires at least one key".to_string(),
                    ));
                }
                sort_documents(&mut docs, spec)?;
                docs
            }
            "$skip" => {
                let n = non_negative(name, arg)?;
                docs.into_iter().skip(n).collect()
            }
            "$limit" => {
                let n = non_negative(name, arg)?;
                if n == 0 {
                    return Err(StoreError::InvalidQuery(
                        "$limit must be positive".to_string(),
                    ));
                }
                docs.truncate(n);
                docs
            }
            "$count" => {
                let field = arg
                    .as_str()
                    .filter(|f| !f.is_empty() && !f.starts_with('$') && !f.contains('.'))
                    .ok_or_else(|| {
                        StoreError::InvalidQuery(
                            "$count needs a non-empty field name without '$' or '.'".to_string(),
                        )
                    })?;
                if docs.is_empty() {
                    Vec::new()
                } else {
                    let mut counted = Document::new();
                    counted.insert(field, ExtendedValue::Int64(docs.len() as i64));
                    vec![counted]
                }
            }
            "$unset" => {
                let fields: Vec<&str> = match arg {
                    ExtendedValue::String(field) => vec![field.as_str()],
                    ExtendedValue::Array(items) if !items.is_empty() => items
                        .iter()
                        .map(|item| {
                            item.as_str().ok_or_else(|| {
                                StoreError::InvalidQuery("$unset fields must be strings".to_string())
                            })
                        })
                        .collect::<StoreResult<_>>()?,
                    _ => {
                        return Err(StoreError::InvalidQuery(
                            "$unset needs a field name or an array of names".to_string(),
                        ))
                    }
                };
                let spec: Document = fields
                    .into_iter()
                    .map(|f| (f.to_string(), ExtendedValue::Int64(0)))
                    .collect();
                project(docs, &spec)?
            }
            other => {
                return Err(StoreError::InvalidQuery(format!(
                    "unsupported pipeline stage: {}",
                    other
                )))
            }
        };
    }
    Ok(docs)
}

fn stage_document<'a>(name: &str, arg: &'a ExtendedValue) -> StoreResult<&'a Document> {
    arg.as_document()
        .ok_or_else(|| StoreError::InvalidQuery(format!("{} needs an object", name)))
}
