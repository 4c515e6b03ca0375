//! # Docstore
//!
//! A write-back document store with tiered reads and RPC access.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        RPC Gateway                          │
//! │  • Typed requests over a shared channel                     │
//! │  • Correlated oneshot replies, one task per request         │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Document Store Core                      │
//! │  • Reads resolve: Write Queue → Cache → Durable Store       │
//! │  • Writes land in queue + cache synchronously               │
//! │  • Per-(collection, id) keyed locks for merges/templates    │
//! └─────────────────────────────────────────────────────────────┘
//!          │                   │                     │
//!          ▼                   ▼                     ▼
//! ┌────────────────┐ ┌──────────────────┐ ┌─────────────────────┐
//! │  Write Queue   │ │   Redis Cache    │ │  SQL Ground Truth   │
//! │  • dirty map   │ │  • TTL snapshots │ │  • (collection, id) │
//! │  • seq numbers │ │  • prefix aware  │ │  • SQLite / MySQL   │
//! └────────────────┘ └──────────────────┘ └─────────────────────┘
//!          │                                         ▲
//!          └──────── (interval / on-demand flush) ───┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use docstore::{Document, DocumentStore, StoreConfig, TemplateRegistry};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = StoreConfig {
//!         cache_url: Some("redis://localhost:6379".into()),
//!         durable_url: Some("sqlite:docstore.db".into()),
//!         ..Default::default()
//!     };
//!
//!     let templates = TemplateRegistry::new().register("users", |id| {
//!         let mut doc = Document::new(id);
//!         doc.set("settings", json!({}));
//!         doc.set("infractions", json!([]));
//!         doc
//!     });
//!
//!     let store = Arc::new(
//!         DocumentStore::open(config, templates)
//!             .await
//!             .expect("Failed to open store"),
//!     );
//!
//!     // Background flush until shutdown, with a final drain
//!     let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//!     let flusher = store.clone().spawn_flush_loop(shutdown_rx);
//!
//!     // First access materializes the template; later reads see merges
//!     let user = store.fetch("users", "42").await.expect("fetch");
//!     println!("settings: {:?}", user.get("settings"));
//!
//!     let _ = shutdown_tx.send(true);
//!     let _ = flusher.await;
//! }
//! ```
//!
//! ## Consistency Contract
//!
//! - **Read-your-own-writes**: `update` returns only after the merged
//!   document is in the write queue and the cache.
//! - **Write-back durability**: the durable store is updated by the flush
//!   loop; a failed upsert stays queued and is retried next cycle.
//! - **Last-writer-wins per id**: no multi-key transactions, no
//!   cross-collection consistency.
//! - **`count` is eventually consistent**: it reads the durable store only.
//!
//! ## Modules
//!
//! - [`store`]: the [`DocumentStore`] core and flush scheduling
//! - [`storage`]: cache/durable backends (Redis, SQL, in-memory)
//! - [`queue`]: the pending-write buffer
//! - [`rpc`]: request/reply gateway and wire types
//! - [`templates`]: per-collection default-document factories
//! - [`retry`]: backoff helper for backend connections
//! - [`metrics`]: `metrics`-facade instrumentation

pub mod config;
pub mod document;
pub mod error;
pub mod metrics;
pub mod queue;
pub mod retry;
pub mod rpc;
pub mod storage;
pub mod store;
pub mod templates;

pub use config::StoreConfig;
pub use document::Document;
pub use error::StoreError;
pub use queue::WriteQueue;
pub use retry::RetryConfig;
pub use rpc::{Envelope, Request, Response, RpcClient, RpcGateway};
pub use storage::memory::{MemoryCache, MemoryDurable};
pub use storage::redis::RedisCache;
pub use storage::sql::SqlStore;
pub use storage::traits::{CacheStore, DurableStore};
pub use store::{DocumentStore, FlushError, FlushSummary};
pub use templates::{Template, TemplateRegistry};
