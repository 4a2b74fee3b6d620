//! # Extended Values
//!
//! The typed value tree every document, filter, update and pipeline is
//! decoded into before it reaches a store.

use bson::oid::ObjectId;

/// A value that can appear in a stored document.
///
/// Equality is structural, except that `Float64(NaN)` equals itself so a
/// decoded value compares equal to the value it was encoded from.
#[derive(Debug, Clone)]
pub enum ExtendedValue {
    Null,
    Bool(bool),
    Int64(i64),
    Float64(f64),
    String(String),
    ObjectId(ObjectId),
    /// Milliseconds since the Unix epoch, UTC.
    DateTime(i64),
    Array(Vec<ExtendedValue>),
    Object(Document),
}

impl ExtendedValue {
    /// Name of the variant, for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            ExtendedValue::Null => "null",
            ExtendedValue::Bool(_) => "bool",
            ExtendedValue::Int64(_) => "int64",
            ExtendedValue::Float64(_) => "float64",
            ExtendedValue::String(_) => "string",
            ExtendedValue::ObjectId(_) => "objectId",
            ExtendedValue::DateTime(_) => "date",
            ExtendedValue::Array(_) => "array",
            ExtendedValue::Object(_) => "object",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ExtendedValue::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ExtendedValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ExtendedValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Numeric view of `Int64` and `Float64` values
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ExtendedValue::Int64(n) => Some(*n as f64),
            ExtendedValue::Float64(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_document(&self) -> Option<&Document> {
        match self {
            ExtendedValue::Object(doc) => Some(doc),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[ExtendedValue]> {
        match self {
            ExtendedValue::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn into_document(self) -> Option<Document> {
        match self {
            ExtendedValue::Object(doc) => Some(doc),
            _ => None,
        }
    }

    pub fn into_array(self) -> Option<Vec<ExtendedValue>> {
        match self {
            ExtendedValue::Array(items) => Some(items),
            _ => None,
        }
    }
}

impl PartialEq for ExtendedValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ExtendedValue::Null, ExtendedValue::Null) => true,
            (ExtendedValue::Bool(a), ExtendedValue::Bool(b)) => a == b,
            (ExtendedValue::Int64(a), ExtendedValue::Int64(b)) => a == b,
            (ExtendedValue::Float64(a), ExtendedValue::Float64(b)) => {
                a == b || (a.is_nan() && b.is_nan())
            }
            (ExtendedValue::String(a), ExtendedValue::String(b)) => a == b,
            (ExtendedValue::ObjectId(a), ExtendedValue::ObjectId(b)) => a == b,
            (ExtendedValue::DateTime(a), ExtendedValue::DateTime(b)) => a == b,
            (ExtendedValue::Array(a), ExtendedValue::Array(b)) => a == b,
            (ExtendedValue::Object(a), ExtendedValue::Object(b)) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for ExtendedValue {
    fn from(value: bool) -> Self {
        ExtendedValue::Bool(value)
    }
}

impl From<i32> for ExtendedValue {
    fn from(value: i32) -> Self {
        ExtendedValue::Int64(i64::from(value))
    }
}

impl From<i64> for ExtendedValue {
    fn from(value: i64) -> Self {
        ExtendedValue::Int64(value)
    }
}

impl From<f64> for ExtendedValue {
    fn from(value: f64) -> Self {
        ExtendedValue::Float64(value)
    }
}

impl From<&str> for ExtendedValue {
    fn from(value: &str) -> Self {
        ExtendedValue::String(value.to_string())
    }
}

impl From<String> for ExtendedValue {
    fn from(value: String) -> Self {
        ExtendedValue::String(value)
    }
}

impl From<ObjectId> for ExtendedValue {
    fn from(value: ObjectId) -> Self {
        ExtendedValue::ObjectId(value)
    }
}

impl From<Document> for ExtendedValue {
    fn from(value: Document) -> Self {
        ExtendedValue::Object(value)
    }
}

impl From<Vec<ExtendedValue>> for ExtendedValue {
    fn from(value: Vec<ExtendedValue>) -> Self {
        ExtendedValue::Array(value)
    }
}

/// An ordered mapping from key to value.
///
/// Keys keep their insertion order, which matters for pipeline stages,
/// projections and sort specifications. Equality ignores order: two
/// documents are equal when they hold the same keys with equal values.
#[derive(Debug, Clone, Default)]
pub struct Document {
    entries: Vec<(String, ExtendedValue)>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert a value, replacing an existing key in place.
    ///
    /// Returns the previous value when the key was already present.
    pub fn insert(&mut self, key: impl Into<String>, value: ExtendedValue) -> Option<ExtendedValue> {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    /// Insert a key at the front, removing any existing entry for it
    pub fn insert_first(&mut self, key: impl Into<String>, value: ExtendedValue) {
        let key = key.into();
        self.entries.retain(|(k, _)| *k != key);
        self.entries.insert(0, (key, value));
    }

    pub fn get(&self, key: &str) -> Option<&ExtendedValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut ExtendedValue> {
        self.entries
            .iter_mut()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn remove(&mut self, key: &str) -> Option<ExtendedValue> {
        let idx = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(idx).1)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ExtendedValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Resolve a dotted path such as `address.city` or `items.0.sku`
    pub fn get_path(&self, path: &str) -> Option<&ExtendedValue> {
        let mut segments = path.split('.');
        let mut current = self.get(segments.next()?)?;
        for segment in segments {
            current = match current {
                ExtendedValue::Object(doc) => doc.get(segment)?,
                ExtendedValue::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }
}

impl PartialEq for Document {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len()
            && self
                .iter()
                .all(|(key, value)| other.get(key).is_some_and(|v| v == value))
    }
}

impl FromIterator<(String, ExtendedValue)> for Document {
    fn from_iter<I: IntoIterator<Item = (String, ExtendedValue)>>(iter: I) -> Self {
        let mut doc = Document::new();
        for (key, value) in iter {
            doc.insert(key, value);
        }
        doc
    }
}

impl IntoIterator for Document {
    type Item = (String, ExtendedValue);
    type IntoIter = std::vec::IntoIter<(String, ExtendedValue)>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(pairs: &[(&str, ExtendedValue)]) -> Document {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_insert_preserves_order_and_replaces_in_place() {
        let mut d = Document::new();
        d.insert("b", 1.into());
        d.insert("a", 2.into());
        let previous = d.insert("b", 3.into());

        assert_eq!(previous, Some(ExtendedValue::Int64(1)));
        assert_eq!(d.keys().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(d.get("b"), Some(&ExtendedValue::Int64(3)));
    }

    #[test]
    fn test_equality_ignores_key_order() {
        let left = doc(&[("a", 1.into()), ("b", "x".into())]);
        let right = doc(&[("b", "x".into()), ("a", 1.into())]);
        assert_eq!(left, right);

        let different = doc(&[("a", 1.into()), ("b", "y".into())]);
        assert_ne!(left, different);
    }

    #[test]
    fn test_nan_equals_nan() {
        let nan = ExtendedValue::Float64(f64::NAN);
        assert_eq!(nan, ExtendedValue::Float64(f64::NAN));
        assert_eq!(
            ExtendedValue::Array(vec![nan.clone()]),
            ExtendedValue::Array(vec![nan.clone()])
        );
        assert_ne!(nan, ExtendedValue::Float64(0.0));
        assert_eq!(ExtendedValue::Float64(-0.0), ExtendedValue::Float64(0.0));
        assert_ne!(ExtendedValue::Int64(1), ExtendedValue::Float64(1.0));
    }

    #[test]
    fn test_insert_first() {
        let mut d = doc(&[("name", "widget".into()), ("_id", 7.into())]);
        d.insert_first("_id", 9.into());
        assert_eq!(d.keys().collect::<Vec<_>>(), vec!["_id", "name"]);
        assert_eq!(d.get("_id"), Some(&ExtendedValue::Int64(9)));
    }

    #[test]
    fn test_get_path() {
        let inner = doc(&[("city", "Oslo".into())]);
        let d = doc(&[
            ("address", inner.into()),
            ("tags", vec!["a".into(), "b".into()].into()),
        ]);

        assert_eq!(d.get_path("address.city"), Some(&ExtendedValue::from("Oslo")));
        assert_eq!(d.get_path("tags.1"), Some(&ExtendedValue::from("b")));
        assert_eq!(d.get_path("address.zip"), None);
        assert_eq!(d.get_path("tags.x"), None);
    }

    #[test]
    fn test_remove() {
        let mut d = doc(&[("a", 1.into()), ("b", 2.into())]);
        assert_eq!(d.remove("a"), Some(ExtendedValue::Int64(1)));
        assert_eq!(d.remove("a"), None);
        assert_eq!(d.len(), 1);
    }
}
