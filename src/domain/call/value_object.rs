//! Call value objects

use serde::{Deserialize, Serialize};

/// Call direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallDirection {
    /// Call placed to this device
    Inbound,
    /// Call placed from this device
    Outbound,
}

impl CallDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallDirection::Inbound => "inbound",
            CallDirection::Outbound => "outbound",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "inbound" => Some(CallDirection::Inbound),
            "outbound" => Some(CallDirection::Outbound),
            _ => None,
        }
    }
}

/// Outcome carried by a call event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallOutcome {
    /// An outgoing call was just placed (provisional)
    OutgoingStart,
    /// The call was picked up (provisional)
    Answered,
    /// The call finished after being connected
    Ended,
    Missed,
    Rejected,
    Voicemail,
    /// Answered on another device sharing the line
    AnsweredExternal,
}

impl CallOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallOutcome::OutgoingStart => "outgoing_start",
            CallOutcome::Answered => "answered",
            CallOutcome::Ended => "ended",
            CallOutcome::Missed => "missed",
            CallOutcome::Rejected => "rejected",
            CallOutcome::Voicemail => "voicemail",
            CallOutcome::AnsweredExternal => "answered_external",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "outgoing_start" => Some(CallOutcome::OutgoingStart),
            "answered" => Some(CallOutcome::Answered),
            "ended" => Some(CallOutcome::Ended),
            "missed" => Some(CallOutcome::Missed),
            "rejected" => Some(CallOutcome::Rejected),
            "voicemail" => Some(CallOutcome::Voicemail),
            "answered_external" => Some(CallOutcome::AnsweredExternal),
            _ => None,
        }
    }

    /// Whether this outcome closes a call
    pub fn is_final(&self) -> bool {
        !matches!(self, CallOutcome::OutgoingStart | CallOutcome::Answered)
    }
}

/// Telephony state reported by the state-transition signal source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TelephonyState {
    /// No call in progress
    Idle,
    /// An incoming call is alerting
    Ringing,
    /// A call is dialing, active or on hold
    Offhook,
}

impl TelephonyState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TelephonyState::Idle => "idle",
            TelephonyState::Ringing => "ringing",
            TelephonyState::Offhook => "offhook",
        }
    }

    /// A call is being tracked in this state
    pub fn is_active(&self) -> bool {
        !matches!(self, TelephonyState::Idle)
    }
}
