//! Call Identity Registry
//!
//! Durable mapping from a phone key to the correlation id of the call in
//! flight for that number. An identity is *active* for an hour after it is
//! created and may still be reused during a short *recent* window after
//! that, so a call-log read that lands late still joins the right call.
//! Once a call finalizes the forward mapping is cleared and the next call to
//! the same number gets a fresh id. The reverse mapping (id -> phone key) is
//! kept so the delivery job can recover a number from an id alone.

use crate::domain::shared::{Clock, CorrelationId, DomainError, PhoneKey, Result};
use crate::domain::storage::{keys, KeyValueStore};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

/// Identity lifetimes
#[derive(Debug, Clone, Copy)]
pub struct IdentityWindows {
    /// How long an identity stays active after creation
    pub active_ms: i64,
    /// Grace period after `active_ms` lapses during which it is still reused
    pub recent_ms: i64,
}

impl Default for IdentityWindows {
    fn default() -> Self {
        Self {
            active_ms: 60 * 60 * 1000,
            recent_ms: 2 * 60 * 1000,
        }
    }
}

/// Which lifetime window keeps an identity live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveWindow {
    Active,
    Recent,
}

/// Persisted identity record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallIdentity {
    pub phone_key: PhoneKey,
    pub correlation_id: CorrelationId,
    pub created_at_ms: i64,
    pub active_until_ms: i64,
}

pub struct CallIdentityRegistry {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    windows: IdentityWindows,
    key_locks: Mutex<HashMap<PhoneKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl CallIdentityRegistry {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>, windows: IdentityWindows) -> Self {
        Self {
            store,
            clock,
            windows,
            key_locks: Mutex::new(HashMap::new()),
        }
    }

    fn lock_for(&self, phone_key: &PhoneKey) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.key_locks.lock().unwrap_or_else(|e| e.into_inner());
        locks
            .entry(phone_key.clone())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    /// Drop the per-key lock once nobody else holds or waits on it
    fn release_lock(&self, phone_key: &PhoneKey, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.key_locks.lock().unwrap_or_else(|e| e.into_inner());
        let idle = locks
            .get(phone_key)
            .map_or(false, |held| Arc::ptr_eq(held, &lock) && Arc::strong_count(&lock) == 2);
        if idle {
            locks.remove(phone_key);
        }
    }

    /// Return the live id for this number, allocating one if none is live.
    ///
    /// Allocation is first-writer-wins: a writer that loses the race to
    /// another process reads back and reuses the winner's id.
    pub async fn ensure(&self, phone_key: &PhoneKey) -> Result<CorrelationId> {
        let lock = self.lock_for(phone_key);
        let result = {
            let _guard = lock.lock().await;
            self.reuse_or_allocate(phone_key).await
        };
        self.release_lock(phone_key, lock);
        result
    }

    async fn reuse_or_allocate(&self, phone_key: &PhoneKey) -> Result<CorrelationId> {
        if let Some(existing) = self.read_active_or_recent(phone_key).await? {
            return Ok(existing);
        }

        // Whatever is stored has lapsed
        self.remove_forward(phone_key).await?;

        let now = self.clock.now_ms();
        let candidate = CorrelationId::new();
        let forward = keys::identity(phone_key.as_str());
        if !self.store.put_if_absent(&forward, candidate.as_str()).await? {
            if let Some(winner) = self.store.get(&forward).await? {
                debug!("Identity for {} allocated concurrently, reusing {}", phone_key, winner);
                return Ok(CorrelationId::from_string(winner));
            }
            self.store.put(&forward, candidate.as_str()).await?;
        }

        self.store
            .put_i64(&keys::identity_created(phone_key.as_str()), now)
            .await?;
        self.store
            .put_i64(
                &keys::identity_active_until(phone_key.as_str()),
                now + self.windows.active_ms,
            )
            .await?;
        self.store
            .put(&keys::identity_reverse(candidate.as_str()), phone_key.as_str())
            .await?;

        info!("Allocated correlation id {} for {}", candidate, phone_key);
        Ok(candidate)
    }

    /// Live id for this number: the active window first, then the recent
    /// reuse window. `None` once both have lapsed.
    pub async fn read_active_or_recent(&self, phone_key: &PhoneKey) -> Result<Option<CorrelationId>> {
        let Some(identity) = self.read(phone_key).await? else {
            return Ok(None);
        };
        match self.live_window(&identity) {
            Some(LiveWindow::Active) => Ok(Some(identity.correlation_id)),
            Some(LiveWindow::Recent) => {
                debug!("Reusing {} for {} inside the recent window", identity.correlation_id, phone_key);
                Ok(Some(identity.correlation_id))
            }
            None => Ok(None),
        }
    }

    /// Raw persisted record, live or not
    pub async fn read(&self, phone_key: &PhoneKey) -> Result<Option<CallIdentity>> {
        let Some(id) = self.store.get(&keys::identity(phone_key.as_str())).await? else {
            return Ok(None);
        };
        let created_at_ms = self
            .store
            .get_i64(&keys::identity_created(phone_key.as_str()))
            .await?
            .unwrap_or(0);
        let active_until_ms = self
            .store
            .get_i64(&keys::identity_active_until(phone_key.as_str()))
            .await?
            .unwrap_or(created_at_ms + self.windows.active_ms);

        Ok(Some(CallIdentity {
            phone_key: phone_key.clone(),
            correlation_id: CorrelationId::from_string(id),
            created_at_ms,
            active_until_ms,
        }))
    }

    /// The active window is checked first and wins over the recent one
    fn live_window(&self, identity: &CallIdentity) -> Option<LiveWindow> {
        let now = self.clock.now_ms();
        if now <= identity.active_until_ms {
            Some(LiveWindow::Active)
        } else if now <= identity.active_until_ms + self.windows.recent_ms {
            Some(LiveWindow::Recent)
        } else {
            None
        }
    }

    /// Forget the forward mapping so the next call to this number is new
    pub async fn clear(&self, phone_key: &PhoneKey) -> Result<()> {
        let lock = self.lock_for(phone_key);
        let result = {
            let _guard = lock.lock().await;
            self.remove_forward(phone_key).await
        };
        self.release_lock(phone_key, lock);
        result?;
        debug!("Cleared identity for {}", phone_key);
        Ok(())
    }

    async fn remove_forward(&self, phone_key: &PhoneKey) -> Result<()> {
        self.store.remove(&keys::identity(phone_key.as_str())).await?;
        self.store
            .remove(&keys::identity_created(phone_key.as_str()))
            .await?;
        self.store
            .remove(&keys::identity_active_until(phone_key.as_str()))
            .await
    }

    /// Recover the phone key a correlation id was allocated for
    pub async fn phone_key_for(&self, correlation_id: &CorrelationId) -> Result<PhoneKey> {
        self.store
            .get(&keys::identity_reverse(correlation_id.as_str()))
            .await?
            .and_then(|raw| PhoneKey::parse(&raw))
            .ok_or_else(|| DomainError::NotFound(format!("no phone number recorded for {}", correlation_id)))
    }

    #[cfg(test)]
    fn held_locks(&self) -> usize {
        self.key_locks.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}
