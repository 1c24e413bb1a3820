//! Duplicate-final suppression
//!
//! Two independent guards decide whether a final event may be emitted:
//!
//! * the finalization lock, set only by an authoritative (duration-bearing)
//!   final and held for a short TTL, blocks a second final for the same
//!   number coming from a different signal path;
//! * the near-duplicate check drops a final whose timestamp is within a
//!   couple of seconds of the last accepted one when it adds no new
//!   duration, which catches the same path firing twice.
//!
//! A provisional final (no duration) never sets the lock, so a later
//! authoritative final still goes through.

use crate::domain::call::CallEvent;
use crate::domain::shared::{Clock, DomainError, Result};
use crate::domain::storage::{keys, KeyValueStore};
use metrics::counter;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy)]
pub struct GuardWindows {
    /// How long an authoritative final blocks the next one
    pub lock_ttl_ms: i64,
    /// Timestamp distance under which a final counts as a repeat
    pub near_duplicate_ms: i64,
}

impl Default for GuardWindows {
    fn default() -> Self {
        Self {
            lock_ttl_ms: 2_500,
            near_duplicate_ms: 2_000,
        }
    }
}

/// Why a final was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardVerdict {
    Accepted,
    Locked,
    NearDuplicate,
}

impl GuardVerdict {
    pub fn as_str(&self) -> &'static str {
        match self {
            GuardVerdict::Accepted => "accepted",
            GuardVerdict::Locked => "lock",
            GuardVerdict::NearDuplicate => "near_duplicate",
        }
    }

    /// `Ok` when the final may be emitted, `DuplicateSignal` otherwise
    pub fn check(self, event: &CallEvent) -> Result<()> {
        match self {
            GuardVerdict::Accepted => Ok(()),
            rejected => Err(DomainError::DuplicateSignal(format!(
                "{} final for {} blocked by {} guard",
                event.outcome().as_str(),
                event.phone_key(),
                rejected.as_str()
            ))),
        }
    }
}

pub struct FinalizationGuard {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    windows: GuardWindows,
    // check-then-record must not interleave within this process
    gate: Mutex<()>,
}

impl FinalizationGuard {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>, windows: GuardWindows) -> Self {
        Self {
            store,
            clock,
            windows,
            gate: Mutex::new(()),
        }
    }

    /// Check both guards and, if the event passes, record it as the last
    /// accepted final for its number.
    pub async fn admit(&self, event: &CallEvent) -> Result<GuardVerdict> {
        let _gate = self.gate.lock().await;
        let phone = event.phone_key().as_str();
        let now = self.clock.now_ms();

        if let Some(locked_until) = self.store.get_i64(&keys::final_lock(phone)).await? {
            if now < locked_until {
                debug!(
                    "Dropping final {} for {}: finalization lock held for another {}ms",
                    event.outcome().as_str(),
                    event.phone_key(),
                    locked_until - now
                );
                counter!("calltrack_duplicates_dropped_total", "guard" => "lock").increment(1);
                return Ok(GuardVerdict::Locked);
            }
        }

        if let Some(last_ts) = self.store.get_i64(&keys::last_final_ts(phone)).await? {
            let last_duration = self.store.get_i64(&keys::last_final_duration(phone)).await?;
            let close = (event.timestamp_ms() - last_ts).abs() <= self.windows.near_duplicate_ms;
            let no_new_duration = event.duration_secs().is_none() || event.duration_secs() == last_duration;
            if close && no_new_duration {
                debug!(
                    "Dropping final {} for {}: repeat of final at {}",
                    event.outcome().as_str(),
                    event.phone_key(),
                    last_ts
                );
                counter!("calltrack_duplicates_dropped_total", "guard" => "near_duplicate").increment(1);
                return Ok(GuardVerdict::NearDuplicate);
            }
        }

        self.store
            .put_i64(&keys::last_final_ts(phone), event.timestamp_ms())
            .await?;
        match event.duration_secs() {
            Some(duration) => {
                self.store
                    .put_i64(&keys::last_final_duration(phone), duration)
                    .await?;
                self.store
                    .put_i64(&keys::final_lock(phone), now + self.windows.lock_ttl_ms)
                    .await?;
                info!("Finalization lock set for {} ({}s)", event.phone_key(), duration);
            }
            None => {
                self.store.remove(&keys::last_final_duration(phone)).await?;
            }
        }

        Ok(GuardVerdict::Accepted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::call::{CallDirection, CallOutcome};
    use crate::domain::shared::{CorrelationId, ManualClock, PhoneKey};
    use crate::infrastructure::persistence::MemoryKvStore;

    const T: i64 = 1_700_000_000_000;

    fn guard() -> (FinalizationGuard, ManualClock) {
        let clock = ManualClock::new(T);
        let guard = FinalizationGuard::new(Arc::new(MemoryKvStore::new()), Arc::new(clock.clone()), GuardWindows::default());
        (guard, clock)
    }

    fn final_event(ts: i64, duration: Option<i64>) -> CallEvent {
        CallEvent::new(
            PhoneKey::normalize("4155550199"),
            CallDirection::Outbound,
            CallOutcome::Ended,
            ts,
            duration,
            CorrelationId::new(),
            None,
        )
    }

    #[tokio::test]
    async fn test_authoritative_final_locks_out_second() {
        let (guard, clock) = guard();
        assert_eq!(guard.admit(&final_event(T, Some(30))).await.unwrap(), GuardVerdict::Accepted);
        clock.advance(500);
        assert_eq!(guard.admit(&final_event(T + 500, Some(30))).await.unwrap(), GuardVerdict::Locked);
    }

    #[tokio::test]
    async fn test_provisional_final_does_not_lock() {
        let (guard, clock) = guard();
        assert_eq!(guard.admit(&final_event(T, None)).await.unwrap(), GuardVerdict::Accepted);
        clock.advance(200);
        assert_eq!(guard.admit(&final_event(T + 200, Some(30))).await.unwrap(), GuardVerdict::Accepted);
    }

    #[tokio::test]
    async fn test_near_duplicate_after_lock_expiry() {
        let (guard, clock) = guard();
        guard.admit(&final_event(T, Some(30))).await.unwrap();
        clock.advance(3_000);
        // Lock lapsed, same timestamp and duration is still a repeat
        assert_eq!(
            guard.admit(&final_event(T + 1_000, Some(30))).await.unwrap(),
            GuardVerdict::NearDuplicate
        );
        // A changed duration is new information
        assert_eq!(guard.admit(&final_event(T + 1_000, Some(31))).await.unwrap(), GuardVerdict::Accepted);
    }

    #[tokio::test]
    async fn test_repeated_provisional_is_dropped() {
        let (guard, _) = guard();
        guard.admit(&final_event(T, None)).await.unwrap();
        assert_eq!(guard.admit(&final_event(T + 100, None)).await.unwrap(), GuardVerdict::NearDuplicate);
    }

    #[tokio::test]
    async fn test_rejected_verdict_is_duplicate_signal() {
        let (guard, _) = guard();
        let event = final_event(T, Some(30));
        guard.admit(&event).await.unwrap().check(&event).unwrap();

        let verdict = guard.admit(&final_event(T + 10, Some(30))).await.unwrap();
        assert!(matches!(verdict.check(&event), Err(DomainError::DuplicateSignal(_))));
    }

    #[tokio::test]
    async fn test_distinct_calls_pass() {
        let (guard, clock) = guard();
        guard.admit(&final_event(T, Some(30))).await.unwrap();
        clock.advance(60_000);
        assert_eq!(
            guard.admit(&final_event(T + 60_000, Some(30))).await.unwrap(),
            GuardVerdict::Accepted
        );
    }
}
