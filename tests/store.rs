//! Integration tests for the document store.
//!
//! Everything runs on the in-memory backends - no Redis or SQL required -
//! which also makes it easy to inject faults at the trait seams.
//!
//! # Test Organization
//! - `consistency_*` - read-your-write, merge, template, remove semantics
//! - `flush_*` - write-back draining, partial failure isolation
//! - `rpc_*` - the gateway loop, malformed requests, timeouts

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use docstore::{
    CacheStore, Document, DocumentStore, DurableStore, MemoryCache, MemoryDurable, Request,
    RpcClient, RpcGateway, StoreConfig, StoreError, TemplateRegistry,
};

// =============================================================================
// Helpers and fault-injecting doubles
// =============================================================================

fn overrides(pairs: &[(&str, Value)]) -> Map<String, Value> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), v.clone()))
        .collect()
}

fn memory_store(templates: TemplateRegistry) -> DocumentStore {
    DocumentStore::new(
        StoreConfig::default(),
        Arc::new(MemoryCache::new()),
        Arc::new(MemoryDurable::new()),
        templates,
    )
}

/// Durable store that fails upserts for a configurable set of ids.
struct FlakyDurable {
    inner: MemoryDurable,
    fail_ids: Mutex<HashSet<String>>,
}

impl FlakyDurable {
    fn new() -> Self {
        Self {
            inner: MemoryDurable::new(),
            fail_ids: Mutex::new(HashSet::new()),
        }
    }

    fn fail_on(&self, id: &str) {
        self.fail_ids.lock().unwrap().insert(id.to_string());
    }

    fn heal(&self, id: &str) {
        self.fail_ids.lock().unwrap().remove(id);
    }
}

#[async_trait]
impl DurableStore for FlakyDurable {
    async fn select_by_id(
        &self,
        collection: &str,
        id: &str,
    ) -> Result<Option<Document>, StoreError> {
        self.inner.select_by_id(collection, id).await
    }

    async fn select_ids(&self, collection: &str) -> Result<Vec<String>, StoreError> {
        self.inner.select_ids(collection).await
    }

    async fn upsert(&self, collection: &str, doc: &Document) -> Result<(), StoreError> {
        if let Some(id) = doc.id() {
            if self.fail_ids.lock().unwrap().contains(id) {
                return Err(StoreError::Durable(format!("injected failure for '{}'", id)));
            }
        }
        self.inner.upsert(collection, doc).await
    }

    async fn delete_by_id(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        self.inner.delete_by_id(collection, id).await
    }

    async fn count(&self, collection: &str) -> Result<u64, StoreError> {
        self.inner.count(collection).await
    }
}

/// Cache that errors on every operation.
struct BrokenCache;

#[async_trait]
impl CacheStore for BrokenCache {
    async fn get(&self, _key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Err(StoreError::Cache("cache is down".to_string()))
    }

    async fn set(&self, _key: &str, _value: &[u8], _ttl: Duration) -> Result<(), StoreError> {
        Err(StoreError::Cache("cache is down".to_string()))
    }

    async fn delete(&self, _key: &str) -> Result<(), StoreError> {
        Err(StoreError::Cache("cache is down".to_string()))
    }

    async fn flush_all(&self) -> Result<(), StoreError> {
        Err(StoreError::Cache("cache is down".to_string()))
    }
}

/// A `users` template matching the reference deployment's default user.
fn users_template(counter: Arc<AtomicUsize>) -> TemplateRegistry {
    TemplateRegistry::new().register("users", move |id| {
        counter.fetch_add(1, Ordering::SeqCst);
        let mut doc = Document::new(id);
        doc.set("created", json!(true));
        doc.set("settings", json!({}));
        doc.set("infractions", json!([]));
        doc
    })
}

// =============================================================================
// Consistency - read-your-write, merge, template, remove
// =============================================================================

#[tokio::test]
async fn consistency_read_your_write_before_flush() {
    let store = memory_store(TemplateRegistry::new());

    store
        .update("guilds", "g1", overrides(&[("prefix", json!("!"))]))
        .await
        .unwrap();

    // Nothing has been flushed, yet the write is visible.
    assert_eq!(store.count("guilds").await.unwrap(), 0);
    let doc = store.get("guilds", "g1").await.unwrap().expect("document");
    assert_eq!(doc.get("prefix"), Some(&json!("!")));
}

#[tokio::test]
async fn consistency_updates_merge_non_destructively() {
    let store = memory_store(TemplateRegistry::new());

    store
        .update("users", "1", overrides(&[("a", json!(1))]))
        .await
        .unwrap();
    store
        .update("users", "1", overrides(&[("b", json!(2))]))
        .await
        .unwrap();

    let doc = store.get("users", "1").await.unwrap().expect("document");
    assert_eq!(doc.get("a"), Some(&json!(1)));
    assert_eq!(doc.get("b"), Some(&json!(2)));
    assert_eq!(doc.id(), Some("1"));
}

#[tokio::test]
async fn consistency_merge_survives_a_flush_in_between() {
    let store = memory_store(TemplateRegistry::new());

    store
        .update("users", "1", overrides(&[("a", json!(1))]))
        .await
        .unwrap();
    store.flush().await;
    store
        .update("users", "1", overrides(&[("b", json!(2))]))
        .await
        .unwrap();

    // The base for the second merge came from cache/durable, not the queue.
    let doc = store.get("users", "1").await.unwrap().expect("document");
    assert_eq!(doc.get("a"), Some(&json!(1)));
    assert_eq!(doc.get("b"), Some(&json!(2)));
}

#[tokio::test]
async fn consistency_template_synthesis_is_single_flight() {
    let synth_count = Arc::new(AtomicUsize::new(0));
    let store = Arc::new(memory_store(users_template(synth_count.clone())));

    let mut handles = Vec::new();
    for _ in 0..16 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store.fetch("users", "42").await.unwrap()
        }));
    }

    let mut docs = Vec::new();
    for handle in handles {
        docs.push(handle.await.unwrap());
    }

    // All concurrent fetches observed the same document...
    for doc in &docs {
        assert_eq!(doc, &docs[0]);
    }
    // ...and the template ran exactly once.
    assert_eq!(synth_count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn consistency_concurrent_updates_do_not_lose_fields() {
    let store = Arc::new(memory_store(TemplateRegistry::new()));

    let a = {
        let store = store.clone();
        tokio::spawn(async move {
            for i in 0..25 {
                store
                    .update("users", "1", overrides(&[("a", json!(i))]))
                    .await
                    .unwrap();
            }
        })
    };
    let b = {
        let store = store.clone();
        tokio::spawn(async move {
            for i in 0..25 {
                store
                    .update("users", "1", overrides(&[("b", json!(i))]))
                    .await
                    .unwrap();
            }
        })
    };
    a.await.unwrap();
    b.await.unwrap();

    let doc = store.get("users", "1").await.unwrap().expect("document");
    assert_eq!(doc.get("a"), Some(&json!(24)));
    assert_eq!(doc.get("b"), Some(&json!(24)));
}

#[tokio::test]
async fn consistency_remove_is_final_everywhere() {
    let cache = Arc::new(MemoryCache::new());
    let store = DocumentStore::new(
        StoreConfig::default(),
        cache.clone(),
        Arc::new(MemoryDurable::new()),
        TemplateRegistry::new(),
    );

    store
        .update("users", "1", overrides(&[("name", json!("Alice"))]))
        .await
        .unwrap();
    store.flush().await;
    assert!(cache.get("users:1").await.unwrap().is_some());

    store.remove("users", "1").await.unwrap();

    assert!(store.get("users", "1").await.unwrap().is_none());
    // Only the single entry was invalidated, and it is really gone.
    assert!(cache.get("users:1").await.unwrap().is_none());
    assert_eq!(store.dirty_len(), 0);
    assert_eq!(store.count("users").await.unwrap(), 0);
}

#[tokio::test]
async fn consistency_cache_failure_degrades_to_durable() {
    let durable = Arc::new(MemoryDurable::new());
    durable
        .upsert("users", &{
            let mut doc = Document::new("1");
            doc.set("name", json!("Alice"));
            doc
        })
        .await
        .unwrap();

    let store = DocumentStore::new(
        StoreConfig::default(),
        Arc::new(BrokenCache),
        durable,
        TemplateRegistry::new(),
    );

    // Reads fall through the broken cache to the ground truth.
    let doc = store.get("users", "1").await.unwrap().expect("document");
    assert_eq!(doc.get("name"), Some(&json!("Alice")));

    // Writes still succeed; the cache set failure is non-fatal.
    let doc = store
        .update("users", "1", overrides(&[("age", json!(30))]))
        .await
        .unwrap();
    assert_eq!(doc.get("age"), Some(&json!(30)));

    // clear_cache is the one operation where the cache error is the point.
    assert!(matches!(
        store.clear_cache().await,
        Err(StoreError::Cache(_))
    ));
}

// =============================================================================
// Flush - write-back draining
// =============================================================================

#[tokio::test]
async fn flush_converges_to_last_written_value() {
    let store = memory_store(TemplateRegistry::new());

    store
        .update("users", "1", overrides(&[("v", json!(1))]))
        .await
        .unwrap();
    store
        .update("users", "1", overrides(&[("v", json!(2))]))
        .await
        .unwrap();

    let summary = store.flush().await;
    assert_eq!(summary.amount, 1);
    assert!(summary.errors.is_empty());
    assert_eq!(store.dirty_len(), 0);

    // After convergence the durable layer serves the last write.
    let doc = store.get("users", "1").await.unwrap().expect("document");
    assert_eq!(doc.get("v"), Some(&json!(2)));
}

#[tokio::test]
async fn flush_isolates_per_item_failures() {
    let durable = Arc::new(FlakyDurable::new());
    durable.fail_on("x");

    let store = DocumentStore::new(
        StoreConfig::default(),
        Arc::new(MemoryCache::new()),
        durable.clone(),
        TemplateRegistry::new(),
    );

    store
        .update("users", "x", overrides(&[("v", json!("bad"))]))
        .await
        .unwrap();
    store
        .update("users", "y", overrides(&[("v", json!("good"))]))
        .await
        .unwrap();

    let summary = store.flush().await;

    assert_eq!(summary.amount, 1);
    assert_eq!(summary.errors.len(), 1);
    assert_eq!(summary.errors[0].collection, "users");
    assert_eq!(summary.errors[0].id, "x");
    assert!(summary.errors[0].error.contains("injected failure"));

    // y drained, x stayed queued for the next cycle.
    assert_eq!(store.dirty_len(), 1);
    assert_eq!(store.count("users").await.unwrap(), 1);

    // Once the backend recovers, the retry drains the remainder.
    durable.heal("x");
    let summary = store.flush().await;
    assert_eq!(summary.amount, 1);
    assert!(summary.errors.is_empty());
    assert_eq!(store.dirty_len(), 0);
    assert_eq!(store.count("users").await.unwrap(), 2);
}

#[tokio::test]
async fn flush_end_to_end_user_lifecycle() {
    let synth_count = Arc::new(AtomicUsize::new(0));
    let store = memory_store(users_template(synth_count.clone()));

    // First access materializes the default user.
    let doc = store.fetch("users", "42").await.unwrap();
    assert_eq!(doc.id(), Some("42"));
    assert_eq!(doc.get("settings"), Some(&json!({})));
    assert_eq!(doc.get("infractions"), Some(&json!([])));

    // Merge a settings change on top.
    let doc = store
        .update("users", "42", overrides(&[("settings", json!({"lang": "en"}))]))
        .await
        .unwrap();
    assert_eq!(doc.get("settings"), Some(&json!({"lang": "en"})));
    assert_eq!(doc.get("infractions"), Some(&json!([])));

    // Drain; the durable layer now holds the merged document.
    let summary = store.flush().await;
    assert_eq!(summary.amount, 1);
    assert_eq!(store.dirty_len(), 0);
    assert_eq!(store.count("users").await.unwrap(), 1);

    let all = store.all("users").await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(
        all[0].get("settings"),
        Some(&json!({"lang": "en"}))
    );
    assert_eq!(synth_count.load(Ordering::SeqCst), 1);
}

// =============================================================================
// RPC - the gateway loop
// =============================================================================

fn spawn_gateway(store: DocumentStore) -> RpcClient {
    let store = Arc::new(store);
    let (client, rx) = RpcClient::channel(64, store.config().request_timeout());
    RpcGateway::new(store).spawn(rx);
    client
}

#[tokio::test]
async fn rpc_update_then_get_round_trip() {
    let client = spawn_gateway(memory_store(TemplateRegistry::new()));

    let response = client
        .call(&Request::Update {
            collection: "users".to_string(),
            id: "1".to_string(),
            updates: overrides(&[("name", json!("Alice"))]),
        })
        .await;
    assert!(response.success);
    assert_eq!(response.data.unwrap()["name"], json!("Alice"));

    let response = client
        .call(&Request::Get {
            collection: "users".to_string(),
            id: "1".to_string(),
        })
        .await;
    assert!(response.success);
    assert_eq!(response.data.unwrap()["id"], json!("1"));
}

#[tokio::test]
async fn rpc_get_missing_succeeds_with_null() {
    let client = spawn_gateway(memory_store(TemplateRegistry::new()));

    let response = client
        .call(&Request::Get {
            collection: "users".to_string(),
            id: "missing".to_string(),
        })
        .await;

    assert!(response.success);
    assert_eq!(response.data, Some(Value::Null));
    assert!(response.error.is_none());
}

#[tokio::test]
async fn rpc_core_errors_become_failure_responses() {
    let client = spawn_gateway(memory_store(TemplateRegistry::new()));

    // fetch on a template-less collection
    let response = client
        .call(&Request::Fetch {
            collection: "users".to_string(),
            id: "1".to_string(),
        })
        .await;
    assert!(!response.success);
    assert!(response.error.unwrap().contains("no template"));

    // unknown collection
    let response = client
        .call(&Request::Count {
            collection: "bogus".to_string(),
        })
        .await;
    assert!(!response.success);
    assert!(response.error.unwrap().contains("unknown collection"));
}

#[tokio::test]
async fn rpc_malformed_requests_are_answered_not_fatal() {
    let client = spawn_gateway(memory_store(TemplateRegistry::new()));

    let response = client.call_raw(json!({"type": "explode"})).await;
    assert!(!response.success);
    assert!(response.error.unwrap().contains("malformed request"));

    let response = client.call_raw(json!({"type": "get", "collection": "users"})).await;
    assert!(!response.success);

    // The consumer loop survived both bad requests.
    let response = client
        .call(&Request::Count {
            collection: "users".to_string(),
        })
        .await;
    assert!(response.success);
    assert_eq!(response.data, Some(json!(0)));
}

#[tokio::test]
async fn rpc_flush_reports_summary() {
    let client = spawn_gateway(memory_store(TemplateRegistry::new()));

    for i in 0..3 {
        let response = client
            .call(&Request::Update {
                collection: "campaigns".to_string(),
                id: format!("c{}", i),
                updates: overrides(&[("round", json!(i))]),
            })
            .await;
        assert!(response.success);
    }

    let response = client.call(&Request::Flush).await;
    assert!(response.success);
    let summary = response.data.unwrap();
    assert_eq!(summary["amount"], json!(3));
    assert_eq!(summary["errors"], json!([]));

    let response = client
        .call(&Request::Count {
            collection: "campaigns".to_string(),
        })
        .await;
    assert_eq!(response.data, Some(json!(3)));
}

#[tokio::test]
async fn rpc_clear_cache_then_reads_fall_back_to_durable() {
    let cache = Arc::new(MemoryCache::new());
    let store = DocumentStore::new(
        StoreConfig::default(),
        cache.clone(),
        Arc::new(MemoryDurable::new()),
        TemplateRegistry::new(),
    );
    let client = spawn_gateway(store);

    let response = client
        .call(&Request::Update {
            collection: "users".to_string(),
            id: "1".to_string(),
            updates: overrides(&[("name", json!("Alice"))]),
        })
        .await;
    assert!(response.success);
    let response = client.call(&Request::Flush).await;
    assert!(response.success);

    let response = client.call(&Request::ClearCache).await;
    assert!(response.success);
    assert!(cache.is_empty());

    // Still resolvable from the ground truth.
    let response = client
        .call(&Request::Get {
            collection: "users".to_string(),
            id: "1".to_string(),
        })
        .await;
    assert!(response.success);
    assert_eq!(response.data.unwrap()["name"], json!("Alice"));
}

#[tokio::test]
async fn rpc_all_enumerates_collection() {
    let client = spawn_gateway(memory_store(TemplateRegistry::new()));

    for id in ["a", "b"] {
        client
            .call(&Request::Update {
                collection: "datasets".to_string(),
                id: id.to_string(),
                updates: overrides(&[("rows", json!(10))]),
            })
            .await;
    }
    client.call(&Request::Flush).await;

    let response = client
        .call(&Request::All {
            collection: "datasets".to_string(),
        })
        .await;
    assert!(response.success);
    let docs = response.data.unwrap();
    assert_eq!(docs.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn rpc_remove_over_the_wire() {
    let client = spawn_gateway(memory_store(TemplateRegistry::new()));

    client
        .call(&Request::Update {
            collection: "marketplace".to_string(),
            id: "listing-1".to_string(),
            updates: overrides(&[("price", json!(100))]),
        })
        .await;
    client.call(&Request::Flush).await;

    let response = client
        .call(&Request::Remove {
            collection: "marketplace".to_string(),
            id: "listing-1".to_string(),
        })
        .await;
    assert!(response.success);

    let response = client
        .call(&Request::Get {
            collection: "marketplace".to_string(),
            id: "listing-1".to_string(),
        })
        .await;
    assert!(response.success);
    assert_eq!(response.data, Some(Value::Null));
}
