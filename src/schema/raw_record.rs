//! Raw clickstream record
//!
//! A raw record is whatever JSON object a producer wrote on one input line. No
//! field is guaranteed to exist or to have the expected type; the cleaner is the
//! only consumer that interprets it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Input schema identifier reported by the CLI
pub const SCHEMA_VERSION: &str = "clickstream.raw_event.v1";

/// Fields every input line is expected to carry
pub const REQUIRED_FIELDS: [&str; 8] = [
    "event_id",
    "user_id",
    "event_time",
    "event_type",
    "page_url",
    "referrer",
    "device",
    "country",
];

/// One untyped input line
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawRecord {
    fields: Map<String, Value>,
}

impl RawRecord {
    pub fn new(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Build a record from a decoded JSON value; anything but an object is rejected
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self { fields }),
            _ => None,
        }
    }

    /// Set a field, replacing any previous value
    pub fn with_field(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(name.to_string(), value.into());
        self
    }

    /// Read a field as text.
    ///
    /// Strings are returned verbatim, numbers and booleans in their JSON text
    /// form. Missing fields, `null`, arrays and objects read as `None`.
    pub fn text(&self, name: &str) -> Option<String> {
        match self.fields.get(name)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }

    /// Required fields absent from this record
    pub fn missing_fields(&self) -> Vec<&'static str> {
        REQUIRED_FIELDS
            .iter()
            .copied()
            .filter(|name| !self.fields.contains_key(*name))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
