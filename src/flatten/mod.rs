// Flatten module - turns an arbitrarily nested document into flat samples
//
// The walk is depth-first in document key order:
// - documents recurse into every key, the key becoming a path segment
// - arrays recurse only into structured elements (documents / arrays), using
//   the element index as the path segment; scalar elements are skipped
// - leaves go through the coercer and, on success, become one named value
//
// Names are produced by `NameBuilder`, so the same walk serves both naming
// modes.

pub mod coerce;
pub mod naming;

use std::collections::HashMap;

use crate::document::{Document, Value};
use crate::sample::{Labels, MetricKind, MetricSample};

use self::coerce::coerce;
use self::naming::{NameBuilder, NamingMode, RenameTable};

/// One flattened leaf.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatMetric {
    pub name: String,
    /// Dotted source path, prefix included.
    pub path: String,
    pub value: f64,
}

impl FlatMetric {
    pub fn into_sample(self, labels: Labels) -> MetricSample {
        MetricSample::new(self.name, MetricKind::Untyped, labels, self.value).with_help(self.path)
    }
}

/// Document flattener bound to one naming mode.
#[derive(Debug, Clone)]
pub struct Flattener {
    names: NameBuilder,
}

impl Flattener {
    pub fn new(mode: NamingMode, renames: RenameTable) -> Self {
        Flattener {
            names: NameBuilder::new(mode, renames),
        }
    }

    pub fn mode(&self) -> NamingMode {
        self.names.mode()
    }

    /// Flattens `doc` under `prefix`.
    ///
    /// Two leaves whose names only collide after sanitization keep the first
    /// position and the last value.
    pub fn flatten(&self, doc: &Document, prefix: &str) -> Vec<FlatMetric> {
        let mut walk = Walk {
            names: &self.names,
            prefix,
            path: Vec::new(),
            out: Vec::new(),
            seen: HashMap::new(),
        };
        walk.document(doc);
        walk.out
    }

    /// Flattens and attaches `labels` to every resulting sample.
    pub fn samples(&self, doc: &Document, prefix: &str, labels: &Labels) -> Vec<MetricSample> {
        self.flatten(doc, prefix)
            .into_iter()
            .map(|m| m.into_sample(labels.clone()))
            .collect()
    }
}

struct Walk<'a> {
    names: &'a NameBuilder,
    prefix: &'a str,
    path: Vec<String>,
    out: Vec<FlatMetric>,
    seen: HashMap<String, usize>,
}

impl Walk<'_> {
    fn document(&mut self, doc: &Document) {
        for (key, value) in doc.iter() {
            self.path.push(key.to_string());
            self.value(value);
            self.path.pop();
        }
    }

    fn array(&mut self, items: &[Value]) {
        for (idx, item) in items.iter().enumerate() {
            if matches!(item, Value::Document(_) | Value::Array(_)) {
                self.path.push(idx.to_string());
                self.value(item);
                self.path.pop();
            }
        }
    }

    fn value(&mut self, value: &Value) {
        match value {
            Value::Document(doc) => self.document(doc),
            Value::Array(items) => self.array(items),
            leaf => {
                if let Some(v) = coerce(leaf) {
                    self.leaf(v);
                }
            }
        }
    }

    fn leaf(&mut self, value: f64) {
        let segments: Vec<&str> = self.path.iter().map(String::as_str).collect();
        let name = self.names.build(self.prefix, &segments);

        if let Some(&pos) = self.seen.get(&name) {
            self.out[pos].value = value;
            return;
        }

        let path = if self.prefix.is_empty() {
            segments.join(".")
        } else {
            format!("{}.{}", self.prefix, segments.join("."))
        };
        self.seen.insert(name.clone(), self.out.len());
        self.out.push(FlatMetric { name, path, value });
    }
}
