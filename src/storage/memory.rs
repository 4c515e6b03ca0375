//! In-memory backends.
//!
//! Drop-in implementations of both storage traits for local development and
//! tests: a TTL-aware [`MemoryCache`] and a [`MemoryDurable`] ground truth.
//! The store falls back to these when no backend URLs are configured.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::RwLock;

use crate::document::Document;
use crate::error::StoreError;

use super::traits::{CacheStore, DurableStore};

/// TTL-expiring in-process cache.
pub struct MemoryCache {
    data: DashMap<String, (Vec<u8>, Instant)>,
}

impl MemoryCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
        }
    }

    /// Entry count, including entries that have expired but not yet been
    /// reaped by a read.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let expired = match self.data.get(key) {
            Some(entry) if entry.1 <= Instant::now() => true,
            Some(entry) => return Ok(Some(entry.0.clone())),
            None => return Ok(None),
        };
        if expired {
            self.data.remove(key);
        }
        Ok(None)
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StoreError> {
        self.data
            .insert(key.to_string(), (value.to_vec(), Instant::now() + ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.data.remove(key);
        Ok(())
    }

    async fn flush_all(&self) -> Result<(), StoreError> {
        self.data.clear();
        Ok(())
    }
}

/// In-process ground truth: collection -> id -> document.
pub struct MemoryDurable {
    tables: RwLock<HashMap<String, HashMap<String, Document>>>,
}

impl MemoryDurable {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
        }
    }

    /// Total documents across all collections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.read().values().map(HashMap::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for MemoryDurable {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DurableStore for MemoryDurable {
    async fn select_by_id(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, StoreError> {
        Ok(self
            .tables
            .read()
            .get(collection)
            .and_then(|table| table.get(id))
            .cloned())
    }

    async fn select_ids(&self, collection: &str) -> Result<Vec<String>, StoreError> {
        let mut ids: Vec<String> = self
            .tables
            .read()
            .get(collection)
            .map(|table| table.keys().cloned().collect())
            .unwrap_or_default();
        ids.sort_unstable();
        Ok(ids)
    }

    async fn upsert(&self, collection: &str, doc: &Document) -> Result<(), StoreError> {
        let id = doc
            .id()
            .ok_or_else(|| StoreError::Durable("document is missing a string id".to_string()))?
            .to_string();
        self.tables
            .write()
            .entry(collection.to_string())
            .or_default()
            .insert(id, doc.clone());
        Ok(())
    }

    async fn delete_by_id(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        if let Some(table) = self.tables.write().get_mut(collection) {
            table.remove(id);
        }
        Ok(())
    }

    async fn count(&self, collection: &str) -> Result<u64, StoreError> {
        Ok(self
            .tables
            .read()
            .get(collection)
            .map_or(0, |table| table.len() as u64))
    }
}
