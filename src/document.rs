// Document model - the decoded shape of command and aggregation results
//
// Every result coming back from the database is converted once into this
// tagged representation. The flattener, the coercer and the rewrite passes
// only ever match on these variants; nothing downstream inspects raw BSON.

use bson::Bson;
use chrono::{DateTime, TimeZone, Utc};

/// A single dynamically-typed value inside a decoded result.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int64(i64),
    Float64(f64),
    String(String),
    Timestamp(DateTime<Utc>),
    Document(Document),
    Array(Vec<Value>),
}

/// Ordered string-keyed map, preserving the key order of the decoded result.
///
/// Key order matters only for reproducibility: the flattener walks keys in
/// this order so identical inputs always produce identical output sequences.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    entries: Vec<(String, Value)>,
}

impl Document {
    pub fn new() -> Self {
        Document::default()
    }

    /// Inserts a value, replacing (in place) any existing entry with the same key.
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Returns the sub-document stored under `key`, if that entry is a document.
    pub fn get_document(&self, key: &str) -> Option<&Document> {
        match self.get(key) {
            Some(Value::Document(doc)) => Some(doc),
            _ => None,
        }
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        match self.get(key) {
            Some(Value::String(s)) => Some(s.as_str()),
            _ => None,
        }
    }

    /// Follows a chain of keys through nested documents.
    ///
    /// Returns `None` as soon as a segment is missing or an intermediate
    /// value is not a document.
    pub fn walk(&self, path: &[&str]) -> Option<&Value> {
        let (last, parents) = path.split_last()?;
        let mut current = self;
        for segment in parents {
            current = current.get_document(segment)?;
        }
        current.get(last)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl FromIterator<(String, Value)> for Document {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        let mut doc = Document::new();
        for (k, v) in iter {
            doc.insert(k, v);
        }
        doc
    }
}

impl From<&Bson> for Value {
    fn from(value: &Bson) -> Self {
        match value {
            Bson::Null | Bson::Undefined | Bson::MaxKey | Bson::MinKey => Value::Null,
            Bson::Boolean(b) => Value::Bool(*b),
            Bson::Int32(i) => Value::Int64(i64::from(*i)),
            Bson::Int64(i) => Value::Int64(*i),
            Bson::Double(f) => Value::Float64(*f),
            Bson::String(s) => Value::String(s.clone()),
            Bson::DateTime(dt) => Value::Timestamp(dt.to_chrono()),
            // Replication timestamps: only the seconds part is wall-clock time,
            // the increment is an ordinal within that second.
            Bson::Timestamp(ts) => match Utc.timestamp_opt(i64::from(ts.time), 0).single() {
                Some(dt) => Value::Timestamp(dt),
                None => Value::Null,
            },
            Bson::Document(doc) => Value::Document(Document::from(doc)),
            Bson::Array(items) => Value::Array(items.iter().map(Value::from).collect()),
            // ObjectId, Decimal128, binary, regex, code... carry no sample value
            other => Value::String(other.to_string()),
        }
    }
}

impl From<Bson> for Value {
    fn from(value: Bson) -> Self {
        Value::from(&value)
    }
}

impl From<&bson::Document> for Document {
    fn from(doc: &bson::Document) -> Self {
        doc.iter()
            .map(|(k, v)| (k.clone(), Value::from(v)))
            .collect()
    }
}

impl From<bson::Document> for Document {
    fn from(doc: bson::Document) -> Self {
        Document::from(&doc)
    }
}
