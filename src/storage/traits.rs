use std::time::Duration;

use async_trait::async_trait;

use crate::document::Document;
use crate::error::StoreError;

/// Ephemeral cache: byte snapshots keyed by `"{collection}:{id}"`, expiring
/// after a TTL. A miss and an expired entry are indistinguishable.
#[async_trait]
pub trait CacheStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StoreError>;
    async fn delete(&self, key: &str) -> Result<(), StoreError>;

    /// Drop every entry this store is responsible for.
    async fn flush_all(&self) -> Result<(), StoreError>;
}

/// Durable backing store: the ground truth for documents, partitioned by
/// collection and keyed by id.
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn select_by_id(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, StoreError>;

    /// All ids known to the store for a collection.
    async fn select_ids(&self, collection: &str) -> Result<Vec<String>, StoreError>;

    /// Insert-or-replace keyed by `(collection, id)`.
    async fn upsert(&self, collection: &str, doc: &Document) -> Result<(), StoreError>;

    async fn delete_by_id(&self, collection: &str, id: &str) -> Result<(), StoreError>;

    /// Row count for a collection.
    async fn count(&self, collection: &str) -> Result<u64, StoreError>;
}
