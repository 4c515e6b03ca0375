// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Document store core.
//!
//! The [`DocumentStore`] reconciles three layers behind one read/write
//! contract:
//! - the write queue (pending, authoritative for recent writes)
//! - the cache (ephemeral snapshots with a TTL)
//! - the durable store (ground truth)
//!
//! Reads resolve queue -> cache -> durable. Writes land in the queue and the
//! cache synchronously (read-your-own-writes) and reach the durable store
//! asynchronously via the flush path in [`flush`](self::flush).
//!
//! # Thread Safety
//!
//! The store is `Send + Sync` and designed for concurrent access. Mutations
//! to the same `(collection, id)` serialize on a keyed mutex; different ids
//! never contend.

mod flush;

pub use flush::{FlushError, FlushSummary};

use std::sync::Arc;
use std::time::Instant;

use dashmap::DashMap;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::StoreConfig;
use crate::document::Document;
use crate::error::StoreError;
use crate::queue::WriteQueue;
use crate::storage::memory::{MemoryCache, MemoryDurable};
use crate::storage::redis::RedisCache;
use crate::storage::sql::SqlStore;
use crate::storage::traits::{CacheStore, DurableStore};
use crate::templates::TemplateRegistry;

/// The document store: injected backends, pending-write queue, per-id locks.
pub struct DocumentStore {
    config: StoreConfig,
    cache: Arc<dyn CacheStore>,
    durable: Arc<dyn DurableStore>,
    templates: TemplateRegistry,
    queue: WriteQueue,
    key_locks: DashMap<(String, String), Arc<Mutex<()>>>,
}

impl DocumentStore {
    /// Assemble a store from explicit backends. Prefer [`open`](Self::open)
    /// unless you are injecting test doubles.
    pub fn new(
        config: StoreConfig,
        cache: Arc<dyn CacheStore>,
        durable: Arc<dyn DurableStore>,
        templates: TemplateRegistry,
    ) -> Self {
        Self {
            config,
            cache,
            durable,
            templates,
            queue: WriteQueue::new(),
            key_locks: DashMap::new(),
        }
    }

    /// Connect backends from config: Redis/SQL when URLs are present,
    /// in-memory fallbacks otherwise.
    pub async fn open(
        config: StoreConfig,
        templates: TemplateRegistry,
    ) -> Result<Self, StoreError> {
        let cache: Arc<dyn CacheStore> = match config.cache_url {
            Some(ref url) => {
                info!(url = %url, "connecting cache backend");
                Arc::new(RedisCache::with_prefix(url, Some(&config.cache_prefix)).await?)
            }
            None => {
                warn!("no cache_url configured, using in-memory cache");
                Arc::new(MemoryCache::new())
            }
        };

        let durable: Arc<dyn DurableStore> = match config.durable_url {
            Some(ref url) => {
                info!(url = %url, "connecting durable backend");
                Arc::new(SqlStore::new(url).await?)
            }
            None => {
                warn!("no durable_url configured, using in-memory ground truth");
                Arc::new(MemoryDurable::new())
            }
        };

        Ok(Self::new(config, cache, durable, templates))
    }

    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Total dirty entries awaiting flush.
    #[must_use]
    pub fn dirty_len(&self) -> usize {
        self.queue.len()
    }

    /// Dirty entries awaiting flush for one collection.
    #[must_use]
    pub fn dirty_in(&self, collection: &str) -> usize {
        self.queue.len_in(collection)
    }

    fn check_collection(&self, collection: &str) -> Result<(), StoreError> {
        if self.config.collections.iter().any(|c| c == collection) {
            Ok(())
        } else {
            Err(StoreError::UnknownCollection(collection.to_string()))
        }
    }

    /// One mutex per `(collection, id)`: serializes template synthesis and
    /// merge-and-write so concurrent updates of the same id can't lose
    /// fields. Different ids never contend.
    fn key_lock(&self, collection: &str, id: &str) -> Arc<Mutex<()>> {
        self.key_locks
            .entry((collection.to_string(), id.to_string()))
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Read a document from the cache, treating every failure as a miss.
    async fn cache_peek(&self, collection: &str, id: &str) -> Option<Document> {
        let key = Document::cache_key(collection, id);
        match self.cache.get(&key).await {
            Ok(Some(bytes)) => match Document::from_bytes(&bytes) {
                Ok(doc) => Some(doc),
                Err(e) => {
                    warn!(key = %key, error = %e, "undecodable cache entry, treating as miss");
                    crate::metrics::record_operation("cache", "get", "error");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(key = %key, error = %e, "cache read failed, degrading to durable store");
                crate::metrics::record_operation("cache", "get", "error");
                None
            }
        }
    }

    /// Write a snapshot to the cache. Failures are logged, never fatal.
    async fn cache_store(&self, collection: &str, id: &str, doc: &Document) {
        let key = Document::cache_key(collection, id);
        let bytes = match doc.to_bytes() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key = %key, error = %e, "failed to serialize document for cache");
                return;
            }
        };
        if let Err(e) = self.cache.set(&key, &bytes, self.config.cache_ttl()).await {
            warn!(key = %key, error = %e, "cache write failed");
            crate::metrics::record_operation("cache", "set", "error");
        }
    }

    // --- Core Operations ---

    /// Get a document by id, or `None` if it does not exist anywhere.
    ///
    /// Resolution order: write queue (authoritative for pending writes),
    /// then cache, then durable store (populating the cache on a hit).
    #[tracing::instrument(skip(self), fields(layer))]
    pub async fn get(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, StoreError> {
        self.check_collection(collection)?;
        let start = Instant::now();

        if let Some(doc) = self.queue.get(collection, id) {
            tracing::Span::current().record("layer", "queue");
            debug!("queue hit");
            crate::metrics::record_operation("queue", "get", "hit");
            crate::metrics::record_latency("queue", "get", start.elapsed());
            return Ok(Some(doc));
        }

        if let Some(doc) = self.cache_peek(collection, id).await {
            tracing::Span::current().record("layer", "cache");
            debug!("cache hit");
            crate::metrics::record_operation("cache", "get", "hit");
            crate::metrics::record_latency("cache", "get", start.elapsed());
            return Ok(Some(doc));
        }

        match self.durable.select_by_id(collection, id).await? {
            Some(doc) => {
                self.cache_store(collection, id, &doc).await;
                tracing::Span::current().record("layer", "durable");
                debug!("durable hit, cached");
                crate::metrics::record_operation("durable", "get", "hit");
                crate::metrics::record_latency("durable", "get", start.elapsed());
                Ok(Some(doc))
            }
            None => {
                tracing::Span::current().record("layer", "miss");
                debug!("miss");
                crate::metrics::record_operation("durable", "get", "miss");
                crate::metrics::record_latency("durable", "get", start.elapsed());
                Ok(None)
            }
        }
    }

    /// Get a document, materializing it from the collection's template on
    /// first access.
    ///
    /// Template synthesis is serialized per `(collection, id)`: concurrent
    /// fetches of the same missing id observe exactly one synthesis.
    #[tracing::instrument(skip(self))]
    pub async fn fetch(&self, collection: &str, id: &str) -> Result<Document, StoreError> {
        self.check_collection(collection)?;

        if let Some(doc) = self.get(collection, id).await? {
            return Ok(doc);
        }

        let lock = self.key_lock(collection, id);
        let _guard = lock.lock().await;

        // A concurrent fetch may have synthesized while we waited.
        if let Some(doc) = self.get(collection, id).await? {
            return Ok(doc);
        }

        let template = self
            .templates
            .get(collection)
            .ok_or_else(|| StoreError::NoTemplate {
                collection: collection.to_string(),
                id: id.to_string(),
            })?;

        let fresh = template(id);
        let doc = self
            .apply_update(collection, id, fresh.into_fields())
            .await?;
        info!(collection, id, "materialized document from template");
        crate::metrics::record_operation("queue", "fetch", "materialized");
        Ok(doc)
    }

    /// Merge `updates` into the current version of a document and queue the
    /// result for durable persistence.
    ///
    /// The merged document lands in the write queue and the cache before
    /// this returns, so every subsequent read observes it. The durable
    /// store is updated asynchronously by flush.
    #[tracing::instrument(skip(self, updates))]
    pub async fn update(
        &self,
        collection: &str,
        id: &str,
        updates: Map<String, Value>,
    ) -> Result<Document, StoreError> {
        self.check_collection(collection)?;

        let lock = self.key_lock(collection, id);
        let _guard = lock.lock().await;

        self.apply_update(collection, id, updates).await
    }

    /// Merge-and-write body shared by `update` and `fetch`. Callers must
    /// hold the key lock.
    async fn apply_update(
        &self,
        collection: &str,
        id: &str,
        updates: Map<String, Value>,
    ) -> Result<Document, StoreError> {
        let start = Instant::now();

        let mut doc = self
            .get(collection, id)
            .await?
            .unwrap_or_else(|| Document::new(id));
        doc.apply(updates);
        doc.pin_id(id);

        self.queue.insert(collection, id, doc.clone());
        self.cache_store(collection, id, &doc).await;

        crate::metrics::set_queue_entries(self.queue.len());
        crate::metrics::record_operation("queue", "update", "success");
        crate::metrics::record_latency("queue", "update", start.elapsed());
        debug!(collection, id, "write queued");
        Ok(doc)
    }

    /// Delete a document from every layer.
    ///
    /// Queue and cache invalidation always happen; a durable-store failure
    /// propagates afterwards so callers know the delete must be re-driven.
    #[tracing::instrument(skip(self))]
    pub async fn remove(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        self.check_collection(collection)?;

        let lock = self.key_lock(collection, id);
        let _guard = lock.lock().await;

        self.queue.remove(collection, id);

        let key = Document::cache_key(collection, id);
        if let Err(e) = self.cache.delete(&key).await {
            warn!(key = %key, error = %e, "cache invalidation failed during remove");
            crate::metrics::record_operation("cache", "remove", "error");
        }

        let durable_result = self.durable.delete_by_id(collection, id).await;
        crate::metrics::set_queue_entries(self.queue.len());

        match durable_result {
            Ok(()) => {
                debug!(collection, id, "document removed");
                crate::metrics::record_operation("durable", "remove", "success");
                Ok(())
            }
            Err(e) => {
                error!(collection, id, error = %e, "durable delete failed");
                crate::metrics::record_operation("durable", "remove", "error");
                Err(e)
            }
        }
    }

    /// Every document in a collection, template-materialized.
    ///
    /// Lists ids from the durable store and resolves each through
    /// [`fetch`](Self::fetch). O(n) resolution round-trips; intended for
    /// administrative use, not hot paths.
    #[tracing::instrument(skip(self))]
    pub async fn all(&self, collection: &str) -> Result<Vec<Document>, StoreError> {
        self.check_collection(collection)?;

        let ids = self.durable.select_ids(collection).await?;
        let mut docs = Vec::with_capacity(ids.len());
        for id in &ids {
            docs.push(self.fetch(collection, id).await?);
        }
        debug!(collection, count = docs.len(), "collection enumerated");
        Ok(docs)
    }

    /// Durable row count for a collection.
    ///
    /// Eventually consistent: documents that only exist in the write queue
    /// are not counted until the next flush lands them.
    #[tracing::instrument(skip(self))]
    pub async fn count(&self, collection: &str) -> Result<u64, StoreError> {
        self.check_collection(collection)?;
        self.durable.count(collection).await
    }

    /// Invalidate the entire cache.
    #[tracing::instrument(skip(self))]
    pub async fn clear_cache(&self) -> Result<(), StoreError> {
        self.cache.flush_all().await?;
        info!("cache cleared");
        Ok(())
    }
}
