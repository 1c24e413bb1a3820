//! In-memory key-value store

use crate::domain::shared::{DomainError, Result};
use crate::domain::storage::KeyValueStore;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Process-local store; state is lost on restart
#[derive(Default, Clone)]
pub struct MemoryKvStore {
    entries: Arc<RwLock<HashMap<String, String>>>,
    fail_writes: Arc<AtomicBool>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `put` fail until switched off. Removals still succeed.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[async_trait]
impl KeyValueStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DomainError::Persistence(format!("write to {} rejected", key)));
        }
        self.entries
            .write()
            .await
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn put_if_absent(&self, key: &str, value: &str) -> Result<bool> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(DomainError::Persistence(format!("write to {} rejected", key)));
        }
        let mut entries = self.entries.write().await;
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(key.to_string(), value.to_string());
        Ok(true)
    }
}
