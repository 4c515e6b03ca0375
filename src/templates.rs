//! Per-collection default-document factories.
//!
//! A template materializes a default document the first time an id is
//! fetched from its collection. Not every collection has one; fetching a
//! missing id from a template-less collection is an error.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::document::Document;

/// A factory producing the default document for a fresh id.
pub type Template = Arc<dyn Fn(&str) -> Document + Send + Sync>;

/// Registry mapping collection names to their templates.
///
/// # Example
///
/// ```
/// use docstore::{Document, TemplateRegistry};
/// use serde_json::json;
///
/// let registry = TemplateRegistry::new().register("users", |id| {
///     let mut doc = Document::new(id);
///     doc.set("settings", json!({}));
///     doc
/// });
///
/// assert!(registry.contains("users"));
/// assert!(!registry.contains("guilds"));
/// ```
#[derive(Clone, Default)]
pub struct TemplateRegistry {
    templates: HashMap<String, Template>,
}

impl TemplateRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a template for a collection, replacing any existing one.
    #[must_use]
    pub fn register<F>(mut self, collection: impl Into<String>, template: F) -> Self
    where
        F: Fn(&str) -> Document + Send + Sync + 'static,
    {
        self.templates.insert(collection.into(), Arc::new(template));
        self
    }

    #[must_use]
    pub fn get(&self, collection: &str) -> Option<&Template> {
        self.templates.get(collection)
    }

    #[must_use]
    pub fn contains(&self, collection: &str) -> bool {
        self.templates.contains_key(collection)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.templates.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

impl fmt::Debug for TemplateRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut collections: Vec<&str> = self.templates.keys().map(String::as_str).collect();
        collections.sort_unstable();
        f.debug_struct("TemplateRegistry")
            .field("collections", &collections)
            .finish()
    }
}
