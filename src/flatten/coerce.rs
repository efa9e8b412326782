// Value coercion - turns a document leaf into a sample value, or rejects it

use crate::document::Value;

/// How timestamps are treated during coercion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Coercion {
    /// Timestamps are skipped like any other non-numeric leaf.
    #[default]
    Numeric,
    /// Timestamps become seconds since the Unix epoch.
    Temporal,
}

/// Default coercion used by the generic flattener.
pub fn coerce(value: &Value) -> Option<f64> {
    coerce_with(value, Coercion::Numeric)
}

/// Coerces a leaf value; `None` is the normal outcome for unsupported types.
pub fn coerce_with(value: &Value, coercion: Coercion) -> Option<f64> {
    match value {
        Value::Bool(true) => Some(1.0),
        Value::Bool(false) => Some(0.0),
        Value::Int64(i) => Some(*i as f64),
        Value::Float64(f) => Some(*f),
        Value::Timestamp(dt) => match coercion {
            Coercion::Temporal => Some(dt.timestamp_millis() as f64 / 1000.0),
            Coercion::Numeric => None,
        },
        Value::String(_) | Value::Null => None,
        // handled by recursion
        Value::Document(_) | Value::Array(_) => None,
    }
}
