//! Call status presentation port

use crate::domain::call::{CallDirection, CallOutcome};
use crate::domain::shared::PhoneKey;
use serde::{Deserialize, Serialize};

/// Status shown to the user for the call in flight
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CallStatus {
    Dialing { number: PhoneKey },
    Ringing { number: Option<PhoneKey> },
    InCall { number: Option<PhoneKey>, direction: CallDirection },
    Ended { number: PhoneKey, outcome: CallOutcome },
}

impl CallStatus {
    pub fn label(&self) -> &'static str {
        match self {
            CallStatus::Dialing { .. } => "dialing",
            CallStatus::Ringing { .. } => "ringing",
            CallStatus::InCall { .. } => "in_call",
            CallStatus::Ended { .. } => "ended",
        }
    }
}

/// Renders the current call status
pub trait NotificationPresenter: Send + Sync {
    fn present(&self, status: &CallStatus);
}
