//! Call history
//!
//! The call log is the only source of an authoritative duration, but it is
//! written asynchronously after a call ends. This module holds the row
//! model, the port used to query it, and the pure rules that pick one row
//! and translate its type code.

use crate::domain::call::{CallDirection, CallOutcome};
use crate::domain::marker::OutgoingMarker;
use crate::domain::shared::{PhoneKey, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One row of the device call history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallLogRow {
    pub number: String,
    /// Raw type code as written by the platform
    pub type_code: i32,
    pub duration_secs: i64,
    /// Call start, epoch milliseconds
    pub timestamp_ms: i64,
}

impl CallLogRow {
    pub fn phone_key(&self) -> PhoneKey {
        PhoneKey::normalize(&self.number)
    }

    pub fn log_type(&self) -> CallLogType {
        CallLogType::from_code(self.type_code)
    }
}

/// Known call-log type codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallLogType {
    Incoming,
    Outgoing,
    Missed,
    Voicemail,
    Rejected,
    Blocked,
    AnsweredExternally,
    Unknown(i32),
}

impl CallLogType {
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => CallLogType::Incoming,
            2 => CallLogType::Outgoing,
            3 => CallLogType::Missed,
            4 => CallLogType::Voicemail,
            5 => CallLogType::Rejected,
            6 => CallLogType::Blocked,
            7 => CallLogType::AnsweredExternally,
            other => CallLogType::Unknown(other),
        }
    }

    pub fn code(&self) -> i32 {
        match self {
            CallLogType::Incoming => 1,
            CallLogType::Outgoing => 2,
            CallLogType::Missed => 3,
            CallLogType::Voicemail => 4,
            CallLogType::Rejected => 5,
            CallLogType::Blocked => 6,
            CallLogType::AnsweredExternally => 7,
            CallLogType::Unknown(code) => *code,
        }
    }
}

/// Read access to the device call history
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CallLogProvider: Send + Sync {
    /// Whether the history may be read at all
    async fn has_permission(&self) -> bool;

    /// Most recent rows first, no older than `since_ms`
    async fn recent_rows(&self, since_ms: i64, limit: usize) -> Result<Vec<CallLogRow>>;
}

/// Pick the row describing the call that just ended.
///
/// Preference order:
/// 1. rows correlating with the outgoing marker (fuzzy number, inside the
///    window), longest duration first;
/// 2. any row with a positive duration, longest first;
/// 3. the most recent row.
pub fn select_row<'a>(
    rows: &'a [CallLogRow],
    marker: Option<&OutgoingMarker>,
    marker_window_ms: i64,
) -> Option<&'a CallLogRow> {
    if let Some(marker) = marker {
        let correlated = rows
            .iter()
            .filter(|row| marker.correlates(&row.phone_key(), row.timestamp_ms, marker_window_ms))
            .max_by_key(|row| (row.duration_secs, row.timestamp_ms));
        if correlated.is_some() {
            return correlated;
        }
    }

    let with_duration = rows
        .iter()
        .filter(|row| row.duration_secs > 0)
        .max_by_key(|row| (row.duration_secs, row.timestamp_ms));
    if with_duration.is_some() {
        return with_duration;
    }

    rows.iter().max_by_key(|row| row.timestamp_ms)
}

/// Map a row's type code to (outcome, direction).
///
/// Unrecognized codes fall back to the caller's direction override, or to
/// an inbound `ended` call.
pub fn classify(row: &CallLogRow, direction_override: Option<CallDirection>) -> (CallOutcome, CallDirection) {
    match row.log_type() {
        CallLogType::Incoming if row.duration_secs > 0 => (CallOutcome::Ended, CallDirection::Inbound),
        CallLogType::Incoming => (CallOutcome::Missed, CallDirection::Inbound),
        CallLogType::Outgoing => (CallOutcome::Ended, CallDirection::Outbound),
        CallLogType::Missed => (CallOutcome::Missed, CallDirection::Inbound),
        CallLogType::Voicemail => (CallOutcome::Voicemail, CallDirection::Inbound),
        CallLogType::Rejected => (CallOutcome::Rejected, CallDirection::Inbound),
        CallLogType::AnsweredExternally => (CallOutcome::AnsweredExternal, CallDirection::Inbound),
        CallLogType::Blocked | CallLogType::Unknown(_) => (
            CallOutcome::Ended,
            direction_override.unwrap_or(CallDirection::Inbound),
        ),
    }
}
