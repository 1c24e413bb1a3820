//! Remote store that keeps delivered entries in memory

use crate::domain::delivery::RemoteStore;
use crate::domain::event_queue::QueueEntry;
use crate::domain::shared::{DomainError, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;
use tracing::info;

#[derive(Default)]
pub struct InMemoryRemoteStore {
    entries: RwLock<Vec<QueueEntry>>,
    unavailable: AtomicBool,
}

impl InMemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every store call until switched back
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub async fn entries(&self) -> Vec<QueueEntry> {
        self.entries.read().await.clone()
    }
}

#[async_trait]
impl RemoteStore for InMemoryRemoteStore {
    async fn store(&self, entry: &QueueEntry) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(DomainError::DeliveryPathUnavailable("remote store offline".to_string()));
        }
        info!(
            "Stored {} event {} remotely",
            entry.event.outcome().as_str(),
            entry.event.dedup_key()
        );
        self.entries.write().await.push(entry.clone());
        Ok(())
    }
}
