//! In-process write queue.
//!
//! The queue holds, per `(collection, id)`, the most recent version of a
//! document that has not yet been confirmed durably persisted. Presence in
//! the queue means "dirty". The queue is the first stop on every read path,
//! so pending writes are visible to all callers before they reach the
//! durable store.
//!
//! Every insert stamps the entry with a monotonically increasing sequence
//! number. The flush path takes a snapshot, persists each entry, and removes
//! it only if the sequence number is unchanged - a write that lands mid-flush
//! keeps its entry queued for the next cycle instead of being discarded.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;

use crate::document::Document;

#[derive(Debug, Clone)]
struct QueueEntry {
    doc: Document,
    seq: u64,
}

/// A dirty entry captured by [`WriteQueue::snapshot`].
#[derive(Debug, Clone)]
pub struct QueuedWrite {
    pub collection: String,
    pub id: String,
    pub doc: Document,
    pub seq: u64,
}

/// Concurrent map of pending writes, keyed by `(collection, id)`.
#[derive(Debug, Default)]
pub struct WriteQueue {
    entries: DashMap<(String, String), QueueEntry>,
    next_seq: AtomicU64,
}

impl WriteQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the pending version for an id (last-writer-wins).
    pub fn insert(&self, collection: &str, id: &str, doc: Document) {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        self.entries.insert(
            (collection.to_string(), id.to_string()),
            QueueEntry { doc, seq },
        );
    }

    #[must_use]
    pub fn get(&self, collection: &str, id: &str) -> Option<Document> {
        self.entries
            .get(&(collection.to_string(), id.to_string()))
            .map(|entry| entry.doc.clone())
    }

    #[must_use]
    pub fn contains(&self, collection: &str, id: &str) -> bool {
        self.entries
            .contains_key(&(collection.to_string(), id.to_string()))
    }

    /// Drop the pending entry for an id. Returns whether one existed.
    pub fn remove(&self, collection: &str, id: &str) -> bool {
        self.entries
            .remove(&(collection.to_string(), id.to_string()))
            .is_some()
    }

    /// Remove the entry only if its sequence number still matches `seq`.
    /// Returns `false` when a newer write replaced the entry mid-flush.
    pub fn remove_if_seq(&self, collection: &str, id: &str, seq: u64) -> bool {
        self.entries
            .remove_if(&(collection.to_string(), id.to_string()), |_, entry| {
                entry.seq == seq
            })
            .is_some()
    }

    /// Point-in-time copy of all dirty entries.
    #[must_use]
    pub fn snapshot(&self) -> Vec<QueuedWrite> {
        self.entries
            .iter()
            .map(|entry| {
                let (collection, id) = entry.key().clone();
                QueuedWrite {
                    collection,
                    id,
                    doc: entry.value().doc.clone(),
                    seq: entry.value().seq,
                }
            })
            .collect()
    }

    /// Total dirty entries across collections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Dirty entries for a single collection.
    #[must_use]
    pub fn len_in(&self, collection: &str) -> usize {
        self.entries
            .iter()
            .filter(|entry| entry.key().0 == collection)
            .count()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}
