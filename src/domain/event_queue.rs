//! Durable event queue
//!
//! Append-ordered list of events not yet confirmed by the remote store,
//! persisted as one JSON blob under a single key. All operations go through
//! one lock per process so enqueue, drain and GC never interleave.
//!
//! Corruption is self-healing: an unparsable blob reads as an empty queue
//! (and is overwritten), and a failed write clears the key rather than leave
//! it half written.
//!
//! Stale-entry GC only removes a contiguous prefix at the head. An old entry
//! behind a fresh one is kept so delivery order is never changed; the flip
//! side is that a poisoned head entry stalls the queue until it ages out.

use crate::domain::call::CallEvent;
use crate::domain::shared::{Clock, DomainError, Result};
use crate::domain::storage::{keys, KeyValueStore};
use metrics::gauge;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

pub const DEFAULT_QUEUE_CAP: usize = 1000;

/// Queued event plus the time it entered the queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueEntry {
    #[serde(flatten)]
    pub event: CallEvent,
    pub received_at: i64,
}

impl QueueEntry {
    pub fn new(event: CallEvent, received_at: i64) -> Self {
        Self { event, received_at }
    }
}

pub struct DurableEventQueue {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    cap: usize,
    lock: Mutex<()>,
}

impl DurableEventQueue {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>, cap: usize) -> Self {
        Self {
            store,
            clock,
            cap: cap.max(1),
            lock: Mutex::new(()),
        }
    }

    pub fn cap(&self) -> usize {
        self.cap
    }

    /// Append; trims oldest entries once the cap is exceeded
    pub async fn enqueue(&self, entry: QueueEntry) -> Result<()> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load().await;
        entries.push(entry);
        if entries.len() > self.cap {
            let overflow = entries.len() - self.cap;
            warn!("Event queue over capacity, dropping {} oldest entries", overflow);
            entries.drain(..overflow);
        }
        self.save(&entries).await
    }

    pub async fn peek_all(&self) -> Vec<QueueEntry> {
        let _guard = self.lock.lock().await;
        self.load().await
    }

    /// Drop the first `n` entries after they were delivered
    pub async fn remove_first_n(&self, n: usize) -> Result<()> {
        if n == 0 {
            return Ok(());
        }
        let _guard = self.lock.lock().await;
        let mut entries = self.load().await;
        let n = n.min(entries.len());
        entries.drain(..n);
        self.save(&entries).await
    }

    /// Remove the contiguous head of entries received more than
    /// `max_age_ms` ago. Stops at the first entry that is not stale.
    pub async fn remove_old_entries_older_than(&self, max_age_ms: i64) -> Result<usize> {
        let _guard = self.lock.lock().await;
        let cutoff = self.clock.now_ms() - max_age_ms;
        let mut entries = self.load().await;
        let stale = entries
            .iter()
            .take_while(|entry| entry.received_at < cutoff)
            .count();
        if stale == 0 {
            return Ok(0);
        }
        entries.drain(..stale);
        warn!("Garbage-collected {} stale entries at the queue head", stale);
        self.save(&entries).await?;
        Ok(stale)
    }

    pub async fn size(&self) -> usize {
        self.peek_all().await.len()
    }

    /// Persisted blob exactly as stored
    pub async fn raw_dump(&self) -> Option<String> {
        let _guard = self.lock.lock().await;
        self.store.get(keys::EVENT_QUEUE).await.ok().flatten()
    }

    pub async fn clear(&self) -> Result<()> {
        let _guard = self.lock.lock().await;
        self.store.remove(keys::EVENT_QUEUE).await?;
        gauge!("calltrack_queue_depth").set(0.0);
        Ok(())
    }

    async fn load(&self) -> Vec<QueueEntry> {
        let raw = match self.store.get(keys::EVENT_QUEUE).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Vec::new(),
            Err(e) => {
                error!("Failed to read event queue, treating as empty: {}", e);
                return Vec::new();
            }
        };

        match decode_entries(&raw) {
            Ok(entries) => entries,
            Err(e) => {
                warn!("Resetting event queue: {}", e);
                if let Err(e) = self.store.remove(keys::EVENT_QUEUE).await {
                    error!("Failed to reset corrupt event queue: {}", e);
                }
                Vec::new()
            }
        }
    }

    async fn save(&self, entries: &[QueueEntry]) -> Result<()> {
        let raw = serde_json::to_string(entries)
            .map_err(|e| DomainError::Internal(format!("Failed to encode event queue: {}", e)))?;

        if let Err(e) = self.store.put(keys::EVENT_QUEUE, &raw).await {
            error!("Failed to write event queue, clearing it: {}", e);
            if let Err(e) = self.store.remove(keys::EVENT_QUEUE).await {
                error!("Failed to clear event queue after write failure: {}", e);
            }
            gauge!("calltrack_queue_depth").set(0.0);
            return Err(e);
        }

        gauge!("calltrack_queue_depth").set(entries.len() as f64);
        debug!("Event queue persisted with {} entries", entries.len());
        Ok(())
    }
}

/// Parse the persisted blob; a malformed one is `PersistenceCorruption`
fn decode_entries(raw: &str) -> Result<Vec<QueueEntry>> {
    Ok(serde_json::from_str(raw)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::call::{CallDirection, CallOutcome};
    use crate::domain::shared::{CorrelationId, ManualClock, PhoneKey};
    use crate::infrastructure::persistence::MemoryKvStore;

    const NOW: i64 = 1_700_000_000_000;

    fn queue(cap: usize) -> (DurableEventQueue, Arc<MemoryKvStore>, ManualClock) {
        let store = Arc::new(MemoryKvStore::new());
        let clock = ManualClock::new(NOW);
        let queue = DurableEventQueue::new(store.clone(), Arc::new(clock.clone()), cap);
        (queue, store, clock)
    }

    fn entry(id: &str, received_at: i64) -> QueueEntry {
        QueueEntry::new(
            CallEvent::new(
                PhoneKey::normalize("4155550199"),
                CallDirection::Inbound,
                CallOutcome::Ended,
                received_at,
                Some(10),
                CorrelationId::from_string(id),
                None,
            ),
            received_at,
        )
    }

    fn ids(entries: &[QueueEntry]) -> Vec<String> {
        entries
            .iter()
            .map(|e| e.event.correlation_id().to_string())
            .collect()
    }

    #[tokio::test]
    async fn test_enqueue_order_is_delivery_order() {
        let (queue, _, _) = queue(DEFAULT_QUEUE_CAP);
        for id in ["a", "b", "c", "d"] {
            queue.enqueue(entry(id, NOW)).await.unwrap();
        }

        queue.remove_first_n(2).await.unwrap();
        assert_eq!(ids(&queue.peek_all().await), vec!["c", "d"]);

        queue.remove_first_n(10).await.unwrap();
        assert_eq!(queue.size().await, 0);
    }

    #[tokio::test]
    async fn test_cap_keeps_most_recent() {
        let (queue, _, _) = queue(1000);
        for i in 0..1200 {
            queue.enqueue(entry(&i.to_string(), NOW + i)).await.unwrap();
        }

        let entries = queue.peek_all().await;
        assert_eq!(entries.len(), 1000);
        assert_eq!(entries.first().unwrap().event.correlation_id().as_str(), "200");
        assert_eq!(entries.last().unwrap().event.correlation_id().as_str(), "1199");
    }

    #[tokio::test]
    async fn test_corrupt_blob_reads_as_empty() {
        let (queue, store, _) = queue(DEFAULT_QUEUE_CAP);
        store.put(keys::EVENT_QUEUE, "{not json").await.unwrap();

        assert!(matches!(
            decode_entries("[oops"),
            Err(DomainError::PersistenceCorruption(_))
        ));
        assert!(queue.peek_all().await.is_empty());
        assert!(store.get(keys::EVENT_QUEUE).await.unwrap().is_none());

        queue.enqueue(entry("a", NOW)).await.unwrap();
        assert_eq!(queue.size().await, 1);
    }

    #[tokio::test]
    async fn test_gc_only_removes_contiguous_head() {
        let (queue, _, _) = queue(DEFAULT_QUEUE_CAP);
        let old = NOW - 10 * 60 * 1000;
        queue.enqueue(entry("a", old)).await.unwrap();
        queue.enqueue(entry("b", NOW)).await.unwrap();
        queue.enqueue(entry("c", old)).await.unwrap();

        let removed = queue.remove_old_entries_older_than(5 * 60 * 1000).await.unwrap();

        assert_eq!(removed, 1);
        assert_eq!(ids(&queue.peek_all().await), vec!["b", "c"]);
    }

    #[tokio::test]
    async fn test_gc_noop_when_head_fresh() {
        let (queue, _, clock) = queue(DEFAULT_QUEUE_CAP);
        queue.enqueue(entry("a", NOW)).await.unwrap();
        clock.advance(1_000);
        assert_eq!(queue.remove_old_entries_older_than(60_000).await.unwrap(), 0);
        assert_eq!(queue.size().await, 1);
    }

    #[tokio::test]
    async fn test_raw_dump_is_flattened_wire_shape() {
        let (queue, _, _) = queue(DEFAULT_QUEUE_CAP);
        queue.enqueue(entry("a", NOW)).await.unwrap();

        let raw = queue.raw_dump().await.unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(value[0]["callId"], "a");
        assert_eq!(value[0]["receivedAt"], NOW);
        assert_eq!(value[0]["phoneNumber"], "4155550199");
    }

    #[tokio::test]
    async fn test_failed_write_clears_store() {
        let (queue, store, _) = queue(DEFAULT_QUEUE_CAP);
        queue.enqueue(entry("a", NOW)).await.unwrap();

        store.fail_writes(true);
        assert!(queue.enqueue(entry("b", NOW)).await.is_err());
        store.fail_writes(false);

        assert!(store.get(keys::EVENT_QUEUE).await.unwrap().is_none());
        assert_eq!(queue.size().await, 0);
    }
}
