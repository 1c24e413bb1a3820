//! Canonical call event

use crate::domain::call::value_object::{CallDirection, CallOutcome};
use crate::domain::shared::value_objects::{CorrelationId, PhoneKey};
use serde::{Deserialize, Serialize};

/// One reconciled call event
///
/// Immutable once built. Only the reconciler (and the delivery job, when it
/// rebuilds an event from its flattened input) construct these. The serde
/// representation is the wire shape handed to live consumers and to the
/// remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallEvent {
    #[serde(rename = "phoneNumber")]
    phone_key: PhoneKey,
    direction: CallDirection,
    outcome: CallOutcome,
    #[serde(rename = "timestamp")]
    timestamp_ms: i64,
    #[serde(rename = "durationInSeconds")]
    duration_secs: Option<i64>,
    #[serde(rename = "callId")]
    correlation_id: CorrelationId,
    tenant_tag: Option<String>,
}

impl CallEvent {
    pub(crate) fn new(
        phone_key: PhoneKey,
        direction: CallDirection,
        outcome: CallOutcome,
        timestamp_ms: i64,
        duration_secs: Option<i64>,
        correlation_id: CorrelationId,
        tenant_tag: Option<String>,
    ) -> Self {
        Self {
            phone_key,
            direction,
            outcome,
            timestamp_ms,
            duration_secs,
            correlation_id,
            tenant_tag,
        }
    }

    /// Same event with the phone number filled in
    pub(crate) fn with_phone_key(&self, phone_key: PhoneKey) -> Self {
        Self {
            phone_key,
            ..self.clone()
        }
    }

    pub fn phone_key(&self) -> &PhoneKey {
        &self.phone_key
    }

    pub fn direction(&self) -> CallDirection {
        self.direction
    }

    pub fn outcome(&self) -> CallOutcome {
        self.outcome
    }

    pub fn timestamp_ms(&self) -> i64 {
        self.timestamp_ms
    }

    pub fn duration_secs(&self) -> Option<i64> {
        self.duration_secs
    }

    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    pub fn tenant_tag(&self) -> Option<&str> {
        self.tenant_tag.as_deref()
    }

    /// Carries an authoritative duration from the call history
    pub fn is_authoritative(&self) -> bool {
        self.duration_secs.is_some()
    }

    /// Key expected downstream for de-duplicating at-least-once deliveries
    pub fn dedup_key(&self) -> String {
        format!("{}:{}", self.correlation_id, self.timestamp_ms)
    }
}
