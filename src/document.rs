// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Document values as handed over by the database layer.
//!
//! A [`Document`] is a live instance of a collection: a stable identifier plus
//! an ordered map of [`DocValue`]s. Unlike plain JSON, values keep the
//! distinction between object identifiers, dates and strings, which is what the
//! serializer needs to normalize them.
//!
//! # Example
//!
//! ```
//! use search_sync::{Document, DocValue, ObjectId};
//!
//! let id = ObjectId::new();
//! let doc = Document::new(id)
//!     .with("title", "Hello")
//!     .with("views", 12);
//!
//! assert_eq!(doc.id_string(), id.to_hex());
//! assert_eq!(doc.get("title"), Some(&DocValue::from("Hello")));
//! ```

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};

use chrono::{DateTime, SecondsFormat, Utc};
use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;

static OBJECT_ID_COUNTER: AtomicU32 = AtomicU32::new(0);

/// 12-byte database object identifier.
///
/// Layout follows the usual convention: 4 bytes of seconds since epoch,
/// 5 random bytes, 3 bytes of a process-wide counter. The text form is
/// 24 lowercase hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 12]);

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid object id '{0}': expected 24 hex characters")]
pub struct ObjectIdParseError(pub String);

impl ObjectId {
    /// Generate a fresh identifier.
    #[must_use]
    pub fn new() -> Self {
        let mut bytes = [0u8; 12];
        let secs = Utc::now().timestamp() as u32;
        bytes[..4].copy_from_slice(&secs.to_be_bytes());
        rand::thread_rng().fill(&mut bytes[4..9]);
        let counter = OBJECT_ID_COUNTER.fetch_add(1, AtomicOrdering::Relaxed);
        bytes[9..].copy_from_slice(&counter.to_be_bytes()[1..]);
        Self(bytes)
    }

    #[must_use]
    pub const fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn bytes(&self) -> [u8; 12] {
        self.0
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self.to_hex())
    }
}

impl FromStr for ObjectId {
    type Err = ObjectIdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = hex::decode(s).map_err(|_| ObjectIdParseError(s.to_string()))?;
        let bytes: [u8; 12] = raw
            .try_into()
            .map_err(|_| ObjectIdParseError(s.to_string()))?;
        Ok(Self(bytes))
    }
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Date text form used in index bodies: ISO-8601, millisecond precision, `Z` suffix.
#[must_use]
pub fn format_date(date: &DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// A single field value of a live document.
#[derive(Debug, Clone, PartialEq)]
pub enum DocValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    ObjectId(ObjectId),
    Date(DateTime<Utc>),
    Array(Vec<DocValue>),
    Object(BTreeMap<String, DocValue>),
}

impl DocValue {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, DocValue::Null)
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            DocValue::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_object(&self) -> Option<&BTreeMap<String, DocValue>> {
        match self {
            DocValue::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Look up a dotted path (`"author.name"`) inside nested objects.
    #[must_use]
    pub fn get_path(&self, path: &str) -> Option<&DocValue> {
        let mut current = self;
        for segment in path.split('.') {
            current = current.as_object()?.get(segment)?;
        }
        Some(current)
    }

    /// Plain JSON projection. Identifiers render as hex, dates as ISO text.
    #[must_use]
    pub fn to_json(&self) -> Value {
        match self {
            DocValue::Null => Value::Null,
            DocValue::Bool(b) => Value::Bool(*b),
            DocValue::Int(n) => Value::from(*n),
            DocValue::Float(f) => serde_json::Number::from_f64(*f).map_or(Value::Null, Value::Number),
            DocValue::String(s) => Value::String(s.clone()),
            DocValue::ObjectId(id) => Value::String(id.to_hex()),
            DocValue::Date(d) => Value::String(format_date(d)),
            DocValue::Array(items) => Value::Array(items.iter().map(DocValue::to_json).collect()),
            DocValue::Object(map) => Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }

    /// Build from plain JSON. Strings stay strings; no identifier or date sniffing.
    #[must_use]
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => DocValue::Null,
            Value::Bool(b) => DocValue::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => DocValue::Int(i),
                None => DocValue::Float(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => DocValue::String(s.clone()),
            Value::Array(items) => DocValue::Array(items.iter().map(DocValue::from_json).collect()),
            Value::Object(map) => DocValue::Object(
                map.iter().map(|(k, v)| (k.clone(), DocValue::from_json(v))).collect(),
            ),
        }
    }

    /// Loose ordering used for database-side sorts. Values of different
    /// kinds order by kind rank, nulls first.
    #[must_use]
    pub fn compare(&self, other: &DocValue) -> Ordering {
        use DocValue::*;
        match (self, other) {
            (Int(a), Int(b)) => a.cmp(b),
            (Int(a), Float(b)) => (*a as f64).partial_cmp(b).unwrap_or(Ordering::Equal),
            (Float(a), Int(b)) => a.partial_cmp(&(*b as f64)).unwrap_or(Ordering::Equal),
            (Float(a), Float(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (String(a), String(b)) => a.cmp(b),
            (ObjectId(a), ObjectId(b)) => a.cmp(b),
            (Date(a), Date(b)) => a.cmp(b),
            (Bool(a), Bool(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            DocValue::Null => 0,
            DocValue::Int(_) | DocValue::Float(_) => 1,
            DocValue::String(_) => 2,
            DocValue::Object(_) => 3,
            DocValue::Array(_) => 4,
            DocValue::ObjectId(_) => 5,
            DocValue::Bool(_) => 6,
            DocValue::Date(_) => 7,
        }
    }
}

impl From<&str> for DocValue {
    fn from(s: &str) -> Self {
        DocValue::String(s.to_string())
    }
}

impl From<String> for DocValue {
    fn from(s: String) -> Self {
        DocValue::String(s)
    }
}

impl From<i64> for DocValue {
    fn from(n: i64) -> Self {
        DocValue::Int(n)
    }
}

impl From<i32> for DocValue {
    fn from(n: i32) -> Self {
        DocValue::Int(i64::from(n))
    }
}

impl From<f64> for DocValue {
    fn from(f: f64) -> Self {
        DocValue::Float(f)
    }
}

impl From<bool> for DocValue {
    fn from(b: bool) -> Self {
        DocValue::Bool(b)
    }
}

impl From<ObjectId> for DocValue {
    fn from(id: ObjectId) -> Self {
        DocValue::ObjectId(id)
    }
}

impl From<DateTime<Utc>> for DocValue {
    fn from(d: DateTime<Utc>) -> Self {
        DocValue::Date(d)
    }
}

impl<T: Into<DocValue>> From<Vec<T>> for DocValue {
    fn from(items: Vec<T>) -> Self {
        DocValue::Array(items.into_iter().map(Into::into).collect())
    }
}

impl From<BTreeMap<String, DocValue>> for DocValue {
    fn from(map: BTreeMap<String, DocValue>) -> Self {
        DocValue::Object(map)
    }
}

impl Serialize for DocValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// A live document: identifier plus fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    id: DocValue,
    fields: BTreeMap<String, DocValue>,
}

impl Document {
    pub fn new(id: impl Into<DocValue>) -> Self {
        Self {
            id: id.into(),
            fields: BTreeMap::new(),
        }
    }

    /// New document with a freshly generated [`ObjectId`].
    #[must_use]
    pub fn with_new_id() -> Self {
        Self::new(ObjectId::new())
    }

    /// Build from a JSON object; `_id` (if present) becomes the identifier.
    #[must_use]
    pub fn from_json(value: &Value) -> Self {
        let mut doc = Self::with_new_id();
        if let Value::Object(map) = value {
            for (k, v) in map {
                if k == "_id" {
                    doc.id = match v.as_str().map(ObjectId::from_str) {
                        Some(Ok(oid)) => DocValue::ObjectId(oid),
                        _ => DocValue::from_json(v),
                    };
                } else {
                    doc.fields.insert(k.clone(), DocValue::from_json(v));
                }
            }
        }
        doc
    }

    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl Into<DocValue>) -> Self {
        self.set(key, value);
        self
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<DocValue>) {
        self.fields.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<DocValue> {
        self.fields.remove(key)
    }

    #[must_use]
    pub fn id(&self) -> &DocValue {
        &self.id
    }

    /// String form of the identifier, as used for engine document ids.
    #[must_use]
    pub fn id_string(&self) -> String {
        match &self.id {
            DocValue::String(s) => s.clone(),
            DocValue::ObjectId(oid) => oid.to_hex(),
            DocValue::Int(n) => n.to_string(),
            other => other.to_json().to_string(),
        }
    }

    /// Field lookup. `_id` resolves to the identifier, dotted paths descend
    /// into nested objects.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&DocValue> {
        if key == "_id" {
            return Some(&self.id);
        }
        if let Some(value) = self.fields.get(key) {
            return Some(value);
        }
        let (head, rest) = key.split_once('.')?;
        self.fields.get(head)?.get_path(rest)
    }

    #[must_use]
    pub fn fields(&self) -> &BTreeMap<String, DocValue> {
        &self.fields
    }

    /// Plain-object form including `_id`.
    #[must_use]
    pub fn to_plain_json(&self) -> Value {
        let mut map = Map::new();
        map.insert("_id".to_string(), self.id.to_json());
        for (k, v) in &self.fields {
            map.insert(k.clone(), v.to_json());
        }
        Value::Object(map)
    }

    /// Keep only the named top-level fields (the identifier is always kept).
    #[must_use]
    pub fn project(&self, select: &[String]) -> Document {
        Document {
            id: self.id.clone(),
            fields: self
                .fields
                .iter()
                .filter(|(k, _)| select.iter().any(|s| s == *k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }
}

impl Serialize for Document {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_plain_json().serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_object_id_hex_round_trip() {
        let id = ObjectId::new();
        let hex = id.to_hex();
        assert_eq!(hex.len(), 24);
        assert_eq!(hex.parse::<ObjectId>().unwrap(), id);
    }

    #[test]
    fn test_object_id_rejects_bad_text() {
        assert!("xyz".parse::<ObjectId>().is_err());
        assert!("abcd".parse::<ObjectId>().is_err());
    }

    #[test]
    fn test_object_ids_are_unique() {
        let a = ObjectId::new();
        let b = ObjectId::new();
        assert_ne!(a, b);
    }

    #[test]
    fn test_date_format_is_iso_millis() {
        let date = Utc.with_ymd_and_hms(2021, 3, 4, 5, 6, 7).unwrap();
        assert_eq!(format_date(&date), "2021-03-04T05:06:07.000Z");
    }

    #[test]
    fn test_id_string_variants() {
        assert_eq!(Document::new("abc").id_string(), "abc");
        assert_eq!(Document::new(42).id_string(), "42");
        let oid = ObjectId::from_bytes([1; 12]);
        assert_eq!(Document::new(oid).id_string(), "010101010101010101010101");
    }

    #[test]
    fn test_get_dotted_path() {
        let mut author = BTreeMap::new();
        author.insert("name".to_string(), DocValue::from("Ada"));
        let doc = Document::new("1").with("author", author);

        assert_eq!(doc.get("author.name"), Some(&DocValue::from("Ada")));
        assert!(doc.get("author.missing").is_none());
        assert_eq!(doc.get("_id"), Some(&DocValue::from("1")));
    }

    #[test]
    fn test_plain_json_includes_id() {
        let doc = Document::new("1").with("n", 3);
        assert_eq!(doc.to_plain_json(), json!({"_id": "1", "n": 3}));
    }

    #[test]
    fn test_from_json_parses_object_id() {
        let doc = Document::from_json(&json!({"_id": "010101010101010101010101", "a": 1}));
        assert!(matches!(doc.id(), DocValue::ObjectId(_)));
        assert_eq!(doc.get("a"), Some(&DocValue::Int(1)));
    }

    #[test]
    fn test_compare_mixed_numbers() {
        assert_eq!(DocValue::Int(2).compare(&DocValue::Float(1.5)), Ordering::Greater);
        assert_eq!(DocValue::Null.compare(&DocValue::Int(0)), Ordering::Less);
    }

    #[test]
    fn test_project_keeps_selected() {
        let doc = Document::new("1").with("a", 1).with("b", 2);
        let projected = doc.project(&["a".to_string()]);
        assert_eq!(projected.fields().len(), 1);
        assert_eq!(projected.id_string(), "1");
    }
}
