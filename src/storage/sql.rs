// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! SQL durable backend.
//!
//! Ground-truth storage in a single `documents` table keyed by
//! `(collection, id)`, with the document body serialized as JSON text:
//!
//! ```sql
//! CREATE TABLE documents (
//!   collection VARCHAR(64) NOT NULL,
//!   id VARCHAR(191) NOT NULL,
//!   body LONGTEXT NOT NULL,    -- JSON as text (sqlx Any driver limitation)
//!   updated_at BIGINT NOT NULL,
//!   PRIMARY KEY (collection, id)
//! )
//! ```
//!
//! ## sqlx Any Driver Quirks
//!
//! We use TEXT instead of a native JSON type because sqlx's `Any` driver:
//! 1. Doesn't support MySQL's JSON type mapping
//! 2. May surface LONGTEXT/TEXT as bytes (requires reading as `Vec<u8>`
//!    then converting)
//!
//! JSON functions still work on TEXT columns:
//!
//! ```sql
//! -- Find users with a language set
//! SELECT * FROM documents
//!  WHERE collection = 'users'
//!    AND JSON_EXTRACT(body, '$.settings.lang') IS NOT NULL;
//! ```

use std::sync::Once;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::any::AnyPoolOptions;
use sqlx::{AnyPool, Row};

use crate::document::Document;
use crate::error::StoreError;
use crate::retry::{retry, RetryConfig};

use super::traits::DurableStore;

// SQLx `Any` driver requires runtime installation
static INSTALL_DRIVERS: Once = Once::new();

fn install_drivers() {
    INSTALL_DRIVERS.call_once(|| {
        sqlx::any::install_default_drivers();
    });
}

pub struct SqlStore {
    pool: AnyPool,
    is_sqlite: bool,
}

impl SqlStore {
    /// Create a new SQL store with startup-mode retry (fails fast if config is wrong).
    pub async fn new(connection_string: &str) -> Result<Self, StoreError> {
        install_drivers();

        let is_sqlite = connection_string.starts_with("sqlite:");

        let pool = retry("sql_connect", &RetryConfig::startup(), || async {
            AnyPoolOptions::new()
                .max_connections(20)
                .acquire_timeout(Duration::from_secs(10))
                .idle_timeout(Duration::from_secs(300))
                .connect(connection_string)
                .await
                .map_err(|e| StoreError::Durable(e.to_string()))
        })
        .await?;

        let store = Self { pool, is_sqlite };

        if is_sqlite {
            store.enable_wal_mode().await?;
        }

        store.init_schema().await?;
        Ok(store)
    }

    /// Get a clone of the connection pool for health probes.
    pub fn pool(&self) -> AnyPool {
        self.pool.clone()
    }

    /// Enable WAL (Write-Ahead Logging) mode for SQLite: readers don't block
    /// writers, and single-fsync commits.
    async fn enable_wal_mode(&self) -> Result<(), StoreError> {
        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Durable(format!("Failed to enable WAL mode: {}", e)))?;

        // WAL mode is safe with synchronous = NORMAL
        sqlx::query("PRAGMA synchronous = NORMAL")
            .execute(&self.pool)
            .await
            .map_err(|e| StoreError::Durable(format!("Failed to set synchronous mode: {}", e)))?;

        Ok(())
    }

    async fn init_schema(&self) -> Result<(), StoreError> {
        let sql = if self.is_sqlite {
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                collection TEXT NOT NULL,
                id TEXT NOT NULL,
                body TEXT NOT NULL,
                updated_at INTEGER NOT NULL,
                PRIMARY KEY (collection, id)
            )
            "#
        } else {
            // MySQL - LONGTEXT for the body (sqlx Any driver doesn't support
            // native JSON); JSON_EXTRACT() still works on valid JSON text
            r#"
            CREATE TABLE IF NOT EXISTS documents (
                collection VARCHAR(64) NOT NULL,
                id VARCHAR(191) NOT NULL,
                body LONGTEXT NOT NULL,
                updated_at BIGINT NOT NULL,
                PRIMARY KEY (collection, id),
                INDEX idx_updated_at (updated_at)
            )
            "#
        };

        retry("sql_init_schema", &RetryConfig::startup(), || async {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Durable(e.to_string()))
        })
        .await?;

        Ok(())
    }

    /// Read a TEXT column as String (SQLite) or bytes (MySQL LONGTEXT).
    fn text_column(row: &sqlx::any::AnyRow, column: &str) -> Option<String> {
        row.try_get::<String, _>(column).ok().or_else(|| {
            row.try_get::<Vec<u8>, _>(column)
                .ok()
                .and_then(|bytes| String::from_utf8(bytes).ok())
        })
    }

    fn now_millis() -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as i64
    }
}

#[async_trait]
impl DurableStore for SqlStore {
    async fn select_by_id(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, StoreError> {
        let collection = collection.to_string();
        let id = id.to_string();

        retry("sql_select_by_id", &RetryConfig::query(), || async {
            let result =
                sqlx::query("SELECT body FROM documents WHERE collection = ? AND id = ?")
                    .bind(&collection)
                    .bind(&id)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(|e| StoreError::Durable(e.to_string()))?;

            match result {
                Some(row) => {
                    let body = Self::text_column(&row, "body")
                        .ok_or_else(|| StoreError::Durable("No body in row".to_string()))?;
                    let doc = Document::from_bytes(body.as_bytes()).map_err(|e| {
                        StoreError::Durable(format!("Invalid document body: {}", e))
                    })?;
                    Ok(Some(doc))
                }
                None => Ok(None),
            }
        })
        .await
    }

    async fn select_ids(&self, collection: &str) -> Result<Vec<String>, StoreError> {
        let collection = collection.to_string();

        retry("sql_select_ids", &RetryConfig::query(), || async {
            let rows = sqlx::query("SELECT id FROM documents WHERE collection = ? ORDER BY id")
                .bind(&collection)
                .fetch_all(&self.pool)
                .await
                .map_err(|e| StoreError::Durable(e.to_string()))?;

            let mut ids = Vec::with_capacity(rows.len());
            for row in rows {
                let id = Self::text_column(&row, "id")
                    .ok_or_else(|| StoreError::Durable("No id in row".to_string()))?;
                ids.push(id);
            }
            Ok(ids)
        })
        .await
    }

    async fn upsert(&self, collection: &str, doc: &Document) -> Result<(), StoreError> {
        let id = doc
            .id()
            .ok_or_else(|| StoreError::Durable("document is missing a string id".to_string()))?
            .to_string();
        let collection = collection.to_string();
        let body =
            serde_json::to_string(doc).map_err(|e| StoreError::Durable(e.to_string()))?;
        let updated_at = Self::now_millis();

        let sql = if self.is_sqlite {
            "INSERT INTO documents (collection, id, body, updated_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(collection, id) DO UPDATE SET
                body = excluded.body,
                updated_at = excluded.updated_at"
        } else {
            "INSERT INTO documents (collection, id, body, updated_at)
             VALUES (?, ?, ?, ?)
             ON DUPLICATE KEY UPDATE
                body = VALUES(body),
                updated_at = VALUES(updated_at)"
        };

        retry("sql_upsert", &RetryConfig::query(), || async {
            sqlx::query(sql)
                .bind(&collection)
                .bind(&id)
                .bind(&body)
                .bind(updated_at)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Durable(e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn delete_by_id(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let collection = collection.to_string();
        let id = id.to_string();

        retry("sql_delete_by_id", &RetryConfig::query(), || async {
            sqlx::query("DELETE FROM documents WHERE collection = ? AND id = ?")
                .bind(&collection)
                .bind(&id)
                .execute(&self.pool)
                .await
                .map_err(|e| StoreError::Durable(e.to_string()))?;
            Ok(())
        })
        .await
    }

    async fn count(&self, collection: &str) -> Result<u64, StoreError> {
        let collection = collection.to_string();

        retry("sql_count", &RetryConfig::query(), || async {
            let row = sqlx::query("SELECT COUNT(*) AS n FROM documents WHERE collection = ?")
                .bind(&collection)
                .fetch_one(&self.pool)
                .await
                .map_err(|e| StoreError::Durable(e.to_string()))?;

            let n: i64 = row
                .try_get("n")
                .map_err(|e| StoreError::Durable(e.to_string()))?;
            Ok(n.max(0) as u64)
        })
        .await
    }
}
