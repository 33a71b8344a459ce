//! Purpose: Model one raw API record as a field map with typed access.
//! Exports: `Record`, `FieldValue`.
//! Role: Read-through projection of server JSON; the upstream schema is open,
//! Role: so unknown fields are reachable by name instead of being dropped.
//! Invariants: Missing keys yield `FieldValue::Absent`, never an error.
//! Invariants: `id` is the only field every record is required to carry.

use crate::core::error::{Error, ErrorKind};
use serde_json::{Map, Value};

/// Tagged projection of a single record field. The server schema is only
/// partially fixed, so accessors distinguish a field that is present but
/// `null` from one the server never sent.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    Absent,
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Array(Vec<Value>),
    Object(Map<String, Value>),
}

impl FieldValue {
    pub fn is_absent(&self) -> bool {
        matches!(self, FieldValue::Absent)
    }

    /// Text form of scalar fields; integers are rendered as decimal so status
    /// and category ids can be compared against label strings uniformly.
    pub fn as_text(&self) -> Option<String> {
        match self {
            FieldValue::Str(text) => Some(text.clone()),
            FieldValue::Int(value) => Some(value.to_string()),
            _ => None,
        }
    }

    fn from_value(value: &Value) -> Self {
        match value {
            Value::Null => FieldValue::Null,
            Value::Bool(flag) => FieldValue::Bool(*flag),
            Value::Number(number) => match number.as_i64() {
                Some(int) => FieldValue::Int(int),
                None => FieldValue::Float(number.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(text) => FieldValue::Str(text.clone()),
            Value::Array(items) => FieldValue::Array(items.clone()),
            Value::Object(map) => FieldValue::Object(map.clone()),
        }
    }
}

/// One record as returned by the API. Records are re-fetched, not cached:
/// a `Record` is a snapshot of the server state at fetch time.
#[derive(Clone, Debug, PartialEq)]
pub struct Record {
    fields: Map<String, Value>,
}

impl Record {
    pub fn from_value(value: Value) -> Result<Self, Error> {
        match value {
            Value::Object(fields) => Ok(Self { fields }),
            other => Err(Error::new(ErrorKind::Internal)
                .with_message(format!("expected a JSON object record, got {other}"))),
        }
    }

    pub fn field(&self, name: &str) -> FieldValue {
        match self.fields.get(name) {
            Some(value) => FieldValue::from_value(value),
            None => FieldValue::Absent,
        }
    }

    /// The record's integer identifier. Every upstream record carries one;
    /// a record without it cannot be addressed and is treated as malformed.
    pub fn id(&self) -> Result<i64, Error> {
        match self.fields.get("id") {
            Some(Value::Number(number)) => number.as_i64().filter(|id| *id >= 1).ok_or_else(|| {
                Error::new(ErrorKind::Internal).with_message("record id is not a positive integer")
            }),
            Some(_) | None => {
                Err(Error::new(ErrorKind::Internal).with_message("record has no integer id field"))
            }
        }
    }

    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    pub fn int_field(&self, name: &str) -> Option<i64> {
        self.fields.get(name).and_then(Value::as_i64)
    }

    pub fn array_field(&self, name: &str) -> Option<&Vec<Value>> {
        self.fields.get(name).and_then(Value::as_array)
    }

    /// First present text value among `names`, in order. Used for label
    /// lookups where the server exposes both `*_title` and a raw id field.
    pub fn text(&self, names: &[&str]) -> Option<String> {
        for name in names {
            let value = self.field(name);
            if value.is_absent() {
                continue;
            }
            if let Some(text) = value.as_text() {
                return Some(text);
            }
        }
        None
    }

    pub fn as_value(&self) -> Value {
        Value::Object(self.fields.clone())
    }

    pub fn raw(&self) -> &Map<String, Value> {
        &self.fields
    }
}
