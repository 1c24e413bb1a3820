//! API Router configuration

use super::metrics_handler::metrics_handler;
use super::signals_handler::{get_queue, get_queue_raw, health_check, post_flush, post_signal, ApiState};
use super::ws_handler::{ws_handler, LiveConsumerHub};
use axum::{
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub fn build_router(
    state: ApiState,
    prometheus_handle: PrometheusHandle,
    hub: Arc<LiveConsumerHub>,
) -> Router {
    let health_routes = Router::new().route("/health", get(health_check));

    let signal_routes = Router::new()
        .route("/signals", post(post_signal))
        .route("/flush", post(post_flush));

    let queue_routes = Router::new()
        .route("/queue", get(get_queue))
        .route("/queue/raw", get(get_queue_raw));

    // Metrics route (separate state)
    let metrics_routes = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(prometheus_handle);

    // WebSocket route (separate state)
    let ws_routes = Router::new().route("/ws", get(ws_handler)).with_state(hub);

    Router::new()
        .merge(health_routes)
        .merge(signal_routes)
        .merge(queue_routes)
        .with_state(state)
        .merge(metrics_routes)
        .merge(ws_routes)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}
