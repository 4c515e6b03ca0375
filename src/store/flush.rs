//! Write-queue flushing.
//!
//! Drains the pending-write buffer into the durable store: on a fixed
//! interval, on demand through [`DocumentStore::flush`], and once more on
//! shutdown. Flush operates on a snapshot and removes an entry only if it is
//! unchanged since the snapshot, so it never blocks - and never discards -
//! concurrent writes.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::DocumentStore;

/// A single entry that failed to persist during a flush run.
#[derive(Debug, Clone, Serialize)]
pub struct FlushError {
    pub collection: String,
    pub id: String,
    pub error: String,
}

/// Outcome of one flush run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FlushSummary {
    /// Entries successfully persisted this run.
    pub amount: usize,
    /// Entries that failed and remain queued for the next run.
    pub errors: Vec<FlushError>,
}

impl DocumentStore {
    /// Drain the write queue into the durable store.
    ///
    /// Works from a snapshot: each entry is upserted, then removed from the
    /// queue only if no newer write replaced it mid-flush. Failures are
    /// collected per entry - one bad upsert never aborts the batch - and the
    /// failed entries stay queued for the next cycle.
    #[tracing::instrument(skip(self))]
    pub async fn flush(&self) -> FlushSummary {
        let start = Instant::now();
        let snapshot = self.queue.snapshot();

        if snapshot.is_empty() {
            debug!("nothing to flush");
            return FlushSummary::default();
        }

        let mut summary = FlushSummary::default();

        for entry in snapshot {
            match self.durable.upsert(&entry.collection, &entry.doc).await {
                Ok(()) => {
                    summary.amount += 1;
                    if !self
                        .queue
                        .remove_if_seq(&entry.collection, &entry.id, entry.seq)
                    {
                        // A newer write landed mid-flush; its entry stays
                        // queued and will be persisted next cycle.
                        debug!(
                            collection = %entry.collection,
                            id = %entry.id,
                            "entry changed during flush, kept queued"
                        );
                    }
                }
                Err(e) => {
                    warn!(
                        collection = %entry.collection,
                        id = %entry.id,
                        error = %e,
                        "flush upsert failed, will retry next cycle"
                    );
                    summary.errors.push(FlushError {
                        collection: entry.collection,
                        id: entry.id,
                        error: e.to_string(),
                    });
                }
            }
        }

        crate::metrics::record_flush(summary.amount, summary.errors.len());
        crate::metrics::set_queue_entries(self.dirty_len());
        info!(
            persisted = summary.amount,
            failed = summary.errors.len(),
            still_dirty = self.dirty_len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "flush complete"
        );
        summary
    }

    /// Run flushes on the configured interval until `shutdown` fires, then
    /// drain one final time so a clean shutdown loses no queued writes.
    pub fn spawn_flush_loop(
        self: Arc<Self>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let store = self;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(store.config().flush_interval());
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // interval fires immediately; the first real flush waits a full period
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        store.flush().await;
                    }
                    _ = shutdown.changed() => {
                        let summary = store.flush().await;
                        info!(
                            persisted = summary.amount,
                            failed = summary.errors.len(),
                            "flush loop stopped after final drain"
                        );
                        break;
                    }
                }
            }
        })
    }
}
