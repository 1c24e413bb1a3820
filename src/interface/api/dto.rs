//! API request/response types

use crate::domain::event_queue::QueueEntry;
use serde::Serialize;

/// Envelope for every JSON response
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SignalAccepted {
    pub kind: &'static str,
}

#[derive(Debug, Serialize)]
pub struct FlushResponse {
    /// Buffered events handed to the live consumer
    pub drained: usize,
    pub pending: usize,
    pub consumer_attached: bool,
}

#[derive(Debug, Serialize)]
pub struct QueueResponse {
    pub size: usize,
    pub cap: usize,
    pub entries: Vec<QueueEntry>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub call_state: &'static str,
    pub consumer_attached: bool,
    pub pending: usize,
    pub network_available: bool,
}
