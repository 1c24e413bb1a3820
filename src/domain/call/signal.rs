//! Raw notifications emitted by the independent signal sources

use crate::domain::call::value_object::TelephonyState;
use crate::domain::call_log::CallLogRow;
use serde::{Deserialize, Serialize};

/// One notification from a signal source
///
/// Sources race each other and may each fire for the same physical call.
/// Numbers are raw strings here; the reconciler normalizes them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Signal {
    /// Telephony state transition
    StateChanged {
        state: TelephonyState,
        #[serde(default)]
        number: Option<String>,
    },
    /// An outgoing call was intercepted before dialing
    OutgoingIntercepted { number: String },
    /// The in-call session service picked up a call
    SessionAdded {
        #[serde(default)]
        number: Option<String>,
    },
    /// The in-call session service released a call
    SessionRemoved {
        #[serde(default)]
        number: Option<String>,
    },
    /// Fresh read of the historical call log
    CallLogSnapshot { rows: Vec<CallLogRow> },
}

impl Signal {
    /// Short label used in logs and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Signal::StateChanged { .. } => "state_changed",
            Signal::OutgoingIntercepted { .. } => "outgoing_intercepted",
            Signal::SessionAdded { .. } => "session_added",
            Signal::SessionRemoved { .. } => "session_removed",
            Signal::CallLogSnapshot { .. } => "call_log_snapshot",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_changed_without_number() {
        let signal: Signal = serde_json::from_str(r#"{"type":"state_changed","state":"offhook"}"#).unwrap();
        assert_eq!(
            signal,
            Signal::StateChanged {
                state: TelephonyState::Offhook,
                number: None
            }
        );
        assert_eq!(signal.kind(), "state_changed");
    }

    #[test]
    fn test_outgoing_intercepted() {
        let signal: Signal =
            serde_json::from_str(r#"{"type":"outgoing_intercepted","number":"+1 415 555 0199"}"#).unwrap();
        assert_eq!(signal.kind(), "outgoing_intercepted");
    }

    #[test]
    fn test_call_log_snapshot() {
        let json = r#"{"type":"call_log_snapshot","rows":[{"number":"4155550199","type_code":2,"duration_secs":42,"timestamp_ms":1000}]}"#;
        let signal: Signal = serde_json::from_str(json).unwrap();
        match signal {
            Signal::CallLogSnapshot { rows } => {
                assert_eq!(rows.len(), 1);
                assert_eq!(rows[0].duration_secs, 42);
            }
            other => panic!("unexpected signal: {:?}", other),
        }
    }
}
