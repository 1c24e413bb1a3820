//! Persistent key-value store port and the key layout shared by every
//! component

use crate::domain::shared::Result;
use async_trait::async_trait;

/// Durable string key-value store
///
/// Signal sources, the reconciler and the delivery job all read and write
/// through this port without cross-key transactions. Each single call is
/// assumed atomic.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn put(&self, key: &str, value: &str) -> Result<()>;

    async fn remove(&self, key: &str) -> Result<()>;

    /// Write only if the key is absent. Returns whether this call wrote.
    async fn put_if_absent(&self, key: &str, value: &str) -> Result<bool> {
        if self.get(key).await?.is_some() {
            return Ok(false);
        }
        self.put(key, value).await?;
        Ok(true)
    }

    async fn get_i64(&self, key: &str) -> Result<Option<i64>> {
        Ok(self
            .get(key)
            .await?
            .and_then(|value| value.trim().parse::<i64>().ok()))
    }

    async fn put_i64(&self, key: &str, value: i64) -> Result<()> {
        self.put(key, &value.to_string()).await
    }
}

/// Persistent key layout
pub mod keys {
    pub fn identity(phone_key: &str) -> String {
        format!("identity.{}", phone_key)
    }

    pub fn identity_created(phone_key: &str) -> String {
        format!("identity.ts.{}", phone_key)
    }

    pub fn identity_active_until(phone_key: &str) -> String {
        format!("identity.activeUntil.{}", phone_key)
    }

    pub fn identity_reverse(call_id: &str) -> String {
        format!("identity.reverse.{}", call_id)
    }

    pub const OUTGOING_MARKER_NUMBER: &str = "outgoingMarker.number";
    pub const OUTGOING_MARKER_TS: &str = "outgoingMarker.ts";

    pub fn final_lock(phone_key: &str) -> String {
        format!("finalLock.{}", phone_key)
    }

    pub fn last_final_ts(phone_key: &str) -> String {
        format!("lastFinal.ts.{}", phone_key)
    }

    pub fn last_final_duration(phone_key: &str) -> String {
        format!("lastFinal.dur.{}", phone_key)
    }

    /// Serialized durable event queue
    pub const EVENT_QUEUE: &str = "eventQueue.entries";

    /// Journal of background jobs not yet completed
    pub const PENDING_WORK: &str = "work.pending";
}
