//! Redis cache backend.
//!
//! Document snapshots are stored as plain strings under
//! `"{prefix}{collection}:{id}"` with a per-entry TTL (`SET ... EX`). The
//! cache is an optimization layer: entries are opaque serialized documents,
//! and an expired or missing key is simply a miss.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{cmd, AsyncCommands, Client};
use tracing::debug;

use crate::error::StoreError;
use crate::retry::{retry, RetryConfig};

use super::traits::CacheStore;

pub struct RedisCache {
    connection: ConnectionManager,
    /// Optional key prefix for namespacing (e.g., "bot:" -> "bot:users:42")
    prefix: String,
}

impl RedisCache {
    /// Create a new Redis cache without a key prefix.
    pub async fn new(connection_string: &str) -> Result<Self, StoreError> {
        Self::with_prefix(connection_string, None).await
    }

    /// Create a new Redis cache with an optional key prefix.
    ///
    /// The prefix is prepended to all keys, enabling namespacing when
    /// sharing a Redis instance with other applications. [`flush_all`]
    /// respects it: with a prefix set, only the namespace is cleared.
    ///
    /// [`flush_all`]: CacheStore::flush_all
    pub async fn with_prefix(
        connection_string: &str,
        prefix: Option<&str>,
    ) -> Result<Self, StoreError> {
        let client =
            Client::open(connection_string).map_err(|e| StoreError::Cache(e.to_string()))?;

        // Startup config: fast-fail after a few seconds, don't hang forever
        let connection = retry("redis_connect", &RetryConfig::startup(), || async {
            ConnectionManager::new(client.clone()).await
        })
        .await
        .map_err(|e: redis::RedisError| StoreError::Cache(e.to_string()))?;

        Ok(Self {
            connection,
            prefix: prefix.unwrap_or("").to_string(),
        })
    }

    #[inline]
    fn prefixed_key(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}{}", self.prefix, key)
        }
    }

    /// Get the configured prefix
    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

#[async_trait]
impl CacheStore for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let conn = self.connection.clone();
        let prefixed = self.prefixed_key(key);

        retry("redis_get", &RetryConfig::query(), || {
            let mut conn = conn.clone();
            let key = prefixed.clone();
            async move {
                let data: Option<Vec<u8>> = conn.get(&key).await?;
                Ok(data)
            }
        })
        .await
        .map_err(|e: redis::RedisError| StoreError::Cache(e.to_string()))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), StoreError> {
        let conn = self.connection.clone();
        let prefixed = self.prefixed_key(key);
        let data = value.to_vec();
        // SET with EX rejects 0, clamp to at least one second
        let ttl_secs = ttl.as_secs().max(1);

        retry("redis_set", &RetryConfig::query(), || {
            let mut conn = conn.clone();
            let key = prefixed.clone();
            let data = data.clone();
            async move {
                let _: () = conn.set_ex(&key, &data, ttl_secs).await?;
                Ok(())
            }
        })
        .await
        .map_err(|e: redis::RedisError| StoreError::Cache(e.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let conn = self.connection.clone();
        let prefixed = self.prefixed_key(key);

        retry("redis_delete", &RetryConfig::query(), || {
            let mut conn = conn.clone();
            let key = prefixed.clone();
            async move {
                let _: () = conn.del(&key).await?;
                Ok(())
            }
        })
        .await
        .map_err(|e: redis::RedisError| StoreError::Cache(e.to_string()))
    }

    async fn flush_all(&self) -> Result<(), StoreError> {
        let mut conn = self.connection.clone();

        if self.prefix.is_empty() {
            let _: () = cmd("FLUSHDB")
                .query_async(&mut conn)
                .await
                .map_err(|e| StoreError::Cache(e.to_string()))?;
            debug!("cache flushed (FLUSHDB)");
            return Ok(());
        }

        // Prefixed deployment shares the instance: SCAN the namespace and
        // delete in batches instead of flushing the whole database.
        let pattern = format!("{}*", self.prefix);
        let mut cursor: u64 = 0;
        let mut deleted = 0usize;

        loop {
            let (next, keys): (u64, Vec<String>) = cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(500)
                .query_async(&mut conn)
                .await
                .map_err(|e| StoreError::Cache(e.to_string()))?;

            if !keys.is_empty() {
                deleted += keys.len();
                let _: () = conn
                    .del(&keys)
                    .await
                    .map_err(|e| StoreError::Cache(e.to_string()))?;
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        debug!(deleted, pattern = %pattern, "cache namespace flushed");
        Ok(())
    }
}
