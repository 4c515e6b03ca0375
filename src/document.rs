//! Document data structure.
//!
//! The [`Document`] is the unit that flows through the store: an ordered,
//! schema-free mapping of field names to JSON values with exactly one
//! invariant, a string `id` field unique within its collection. Structure
//! beyond that is owned by callers.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A schema-free document addressed by `(collection, id)`.
///
/// # Example
///
/// ```
/// use docstore::Document;
/// use serde_json::json;
///
/// let mut doc = Document::new("42");
/// doc.set("name", json!("Alice"));
///
/// assert_eq!(doc.id(), Some("42"));
/// assert_eq!(doc.get("name"), Some(&json!("Alice")));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(transparent)]
pub struct Document {
    fields: Map<String, Value>,
}

impl Document {
    /// Create a document holding only its `id` field.
    pub fn new(id: impl Into<String>) -> Self {
        let mut fields = Map::new();
        fields.insert("id".to_string(), Value::String(id.into()));
        Self { fields }
    }

    /// Wrap an existing field map. The `id` invariant is the caller's
    /// responsibility; the store pins it on every write path.
    #[must_use]
    pub fn from_fields(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    /// Interpret a JSON value as a document. Non-objects are rejected.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self { fields }),
            _ => None,
        }
    }

    /// The document id, if present as a string field.
    #[must_use]
    pub fn id(&self) -> Option<&str> {
        self.fields.get("id").and_then(Value::as_str)
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        self.fields.insert(key.into(), value);
    }

    #[must_use]
    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    #[must_use]
    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Shallow merge: each override replaces the whole top-level field.
    /// Fields absent from `overrides` are untouched.
    pub fn apply(&mut self, overrides: Map<String, Value>) {
        for (key, value) in overrides {
            self.fields.insert(key, value);
        }
    }

    /// Force the `id` field to the resolved id, regardless of what a merge
    /// or template produced.
    pub fn pin_id(&mut self, id: &str) {
        self.fields
            .insert("id".to_string(), Value::String(id.to_string()));
    }

    /// Cache key for a document snapshot.
    #[must_use]
    pub fn cache_key(collection: &str, id: &str) -> String {
        format!("{}:{}", collection, id)
    }

    /// Serialize for a cache entry.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize a cache entry.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

impl From<Document> for Value {
    fn from(doc: Document) -> Self {
        Value::Object(doc.fields)
    }
}
