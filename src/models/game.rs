use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A full game record as returned by the catalog
///
/// Only `id` is interpreted. Every other field (name, summary, media,
/// genres, booth number, ...) is carried through untouched so the UI gets
/// back exactly what the catalog sent. A missing `id` reads as empty.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameRecord {
    #[serde(default)]
    pub id: String,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl GameRecord {
    /// Creates a record with an empty payload
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            payload: Map::new(),
        }
    }

    /// Adds a payload field, builder style
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    /// Display name, if the catalog provided one
    pub fn name(&self) -> Option<&str> {
        self.payload.get("name").and_then(Value::as_str)
    }

    /// True when the record carries a usable identifier
    pub fn has_id(&self) -> bool {
        !self.id.trim().is_empty()
    }
}
