use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// A schemaless record as held by the document database.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub key: String,
    pub data: Map<String, Value>,
    pub created_at: DateTime<Utc>,
}

impl Document {
    pub fn new(key: impl Into<String>, data: Map<String, Value>, created_at: DateTime<Utc>) -> Self {
        Self { key: key.into(), data, created_at }
    }

    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.data.get(name).and_then(Value::as_str)
    }

    pub fn bool_field(&self, name: &str) -> Option<bool> {
        self.data.get(name).and_then(Value::as_bool)
    }
}
