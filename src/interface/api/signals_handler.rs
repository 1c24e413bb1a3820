//! Signal ingestion, flush and queue inspection handlers

use super::dto::{ApiResponse, FlushResponse, HealthResponse, QueueResponse, SignalAccepted};
use crate::application::CallTracker;
use crate::domain::call::Signal;
use crate::domain::shared::DomainError;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Shared state of the HTTP handlers
#[derive(Clone)]
pub struct ApiState {
    pub tracker: Arc<CallTracker>,
}

fn status_for(error: &DomainError) -> StatusCode {
    match error {
        DomainError::InvalidSignal(_) => StatusCode::BAD_REQUEST,
        DomainError::NotFound(_) => StatusCode::NOT_FOUND,
        DomainError::DuplicateSignal(_) => StatusCode::CONFLICT,
        DomainError::PermissionUnavailable
        | DomainError::TransientQueryEmpty(_)
        | DomainError::DeliveryPathUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        DomainError::PersistenceCorruption(_)
        | DomainError::Persistence(_)
        | DomainError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Ingest one signal
pub async fn post_signal(
    State(state): State<ApiState>,
    Json(signal): Json<Signal>,
) -> (StatusCode, Json<ApiResponse<SignalAccepted>>) {
    let kind = signal.kind();
    debug!("API: {} signal", kind);

    match state.tracker.ingest(signal).await {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(ApiResponse::success(SignalAccepted { kind })),
        ),
        Err(e) => {
            warn!("Rejected {} signal: {}", kind, e);
            (status_for(&e), Json(ApiResponse::error(e.to_string())))
        }
    }
}

/// Manual flush of the pending buffer and the durable queue
pub async fn post_flush(State(state): State<ApiState>) -> Json<ApiResponse<FlushResponse>> {
    let drained = state.tracker.flush();
    let status = state.tracker.delivery_status();
    info!("API: flush drained {} buffered events", drained);

    Json(ApiResponse::success(FlushResponse {
        drained,
        pending: status.pending,
        consumer_attached: status.consumer_attached,
    }))
}

pub async fn get_queue(State(state): State<ApiState>) -> Json<ApiResponse<QueueResponse>> {
    let queue = state.tracker.queue();
    let entries = queue.peek_all().await;
    Json(ApiResponse::success(QueueResponse {
        size: entries.len(),
        cap: queue.cap(),
        entries,
    }))
}

/// Persisted queue blob as stored
pub async fn get_queue_raw(State(state): State<ApiState>) -> impl IntoResponse {
    let raw = state
        .tracker
        .queue()
        .raw_dump()
        .await
        .unwrap_or_else(|| "[]".to_string());
    (StatusCode::OK, [(header::CONTENT_TYPE, "application/json")], raw)
}

pub async fn health_check(State(state): State<ApiState>) -> Json<ApiResponse<HealthResponse>> {
    let status = state.tracker.delivery_status();
    Json(ApiResponse::success(HealthResponse {
        status: "ok",
        call_state: state.tracker.state().await.as_str(),
        consumer_attached: status.consumer_attached,
        pending: status.pending,
        network_available: state.tracker.network().is_available(),
    }))
}
