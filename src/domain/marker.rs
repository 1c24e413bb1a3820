//! Outgoing-call marker
//!
//! Breadcrumb written the instant an outgoing call is intercepted. It lets
//! later signals that arrive without a number, or with an ambiguous
//! direction, be attributed to the call that was just placed.

use crate::domain::shared::{Clock, PhoneKey, Result};
use crate::domain::storage::{keys, KeyValueStore};
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMarker {
    pub phone_key: PhoneKey,
    pub marked_at_ms: i64,
}

impl OutgoingMarker {
    pub fn is_fresh(&self, now_ms: i64, window_ms: i64) -> bool {
        now_ms >= self.marked_at_ms && now_ms - self.marked_at_ms <= window_ms
    }

    /// Number fuzzy-matches and the timestamp falls inside the window
    /// around the marker, in either direction.
    pub fn correlates(&self, phone_key: &PhoneKey, timestamp_ms: i64, window_ms: i64) -> bool {
        self.phone_key.matches(phone_key) && (timestamp_ms - self.marked_at_ms).abs() <= window_ms
    }
}

pub struct OutgoingMarkerStore {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    window_ms: i64,
}

impl OutgoingMarkerStore {
    pub fn new(store: Arc<dyn KeyValueStore>, clock: Arc<dyn Clock>, window_ms: i64) -> Self {
        Self {
            store,
            clock,
            window_ms,
        }
    }

    pub fn window_ms(&self) -> i64 {
        self.window_ms
    }

    pub async fn mark(&self, phone_key: &PhoneKey) -> Result<OutgoingMarker> {
        let marker = OutgoingMarker {
            phone_key: phone_key.clone(),
            marked_at_ms: self.clock.now_ms(),
        };
        self.store
            .put(keys::OUTGOING_MARKER_NUMBER, marker.phone_key.as_str())
            .await?;
        self.store
            .put_i64(keys::OUTGOING_MARKER_TS, marker.marked_at_ms)
            .await?;
        debug!("Outgoing marker set for {}", phone_key);
        Ok(marker)
    }

    /// Last marker regardless of age
    pub async fn last(&self) -> Result<Option<OutgoingMarker>> {
        let number = self.store.get(keys::OUTGOING_MARKER_NUMBER).await?;
        let marked_at = self.store.get_i64(keys::OUTGOING_MARKER_TS).await?;
        Ok(match (number.as_deref().and_then(PhoneKey::parse), marked_at) {
            (Some(phone_key), Some(marked_at_ms)) => Some(OutgoingMarker {
                phone_key,
                marked_at_ms,
            }),
            _ => None,
        })
    }

    /// Marker still inside its validity window
    pub async fn fresh(&self) -> Result<Option<OutgoingMarker>> {
        let now = self.clock.now_ms();
        Ok(self
            .last()
            .await?
            .filter(|marker| marker.is_fresh(now, self.window_ms)))
    }

    pub async fn clear(&self) -> Result<()> {
        self.store.remove(keys::OUTGOING_MARKER_NUMBER).await?;
        self.store.remove(keys::OUTGOING_MARKER_TS).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::shared::ManualClock;
    use crate::infrastructure::persistence::MemoryKvStore;

    fn markers() -> (OutgoingMarkerStore, ManualClock) {
        let clock = ManualClock::new(50_000);
        let store = OutgoingMarkerStore::new(Arc::new(MemoryKvStore::new()), Arc::new(clock.clone()), 12_000);
        (store, clock)
    }

    #[tokio::test]
    async fn test_marker_expires_after_window() {
        let (markers, clock) = markers();
        markers.mark(&PhoneKey::normalize("4155550199")).await.unwrap();

        clock.advance(11_000);
        assert!(markers.fresh().await.unwrap().is_some());

        clock.advance(2_000);
        assert!(markers.fresh().await.unwrap().is_none());
        assert!(markers.last().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_clear_consumes_marker() {
        let (markers, _) = markers();
        markers.mark(&PhoneKey::normalize("4155550199")).await.unwrap();
        markers.clear().await.unwrap();
        assert!(markers.last().await.unwrap().is_none());
    }

    #[test]
    fn test_correlates_uses_fuzzy_number_and_window() {
        let marker = OutgoingMarker {
            phone_key: PhoneKey::normalize("14155550199"),
            marked_at_ms: 10_000,
        };
        assert!(marker.correlates(&PhoneKey::normalize("4155550199"), 9_000, 12_000));
        assert!(marker.correlates(&PhoneKey::normalize("4155550199"), 21_000, 12_000));
        assert!(!marker.correlates(&PhoneKey::normalize("4155550199"), 23_000, 12_000));
        assert!(!marker.correlates(&PhoneKey::normalize("4155550111"), 10_000, 12_000));
    }
}
