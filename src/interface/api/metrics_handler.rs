//! Prometheus metrics

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use metrics::{describe_counter, describe_gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};

/// Install the global Prometheus recorder and describe every metric
pub fn init_metrics() -> Result<PrometheusHandle, BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    describe_metrics();
    Ok(handle)
}

fn describe_metrics() {
    describe_counter!("calltrack_signals_total", "Signals received, by kind");
    describe_counter!(
        "calltrack_events_emitted_total",
        "Call events emitted by the reconciler, by outcome"
    );
    describe_counter!(
        "calltrack_duplicates_dropped_total",
        "Final events dropped by a duplicate guard"
    );
    describe_counter!(
        "calltrack_finalization_fallback_total",
        "Finalizations that fell back to the outgoing marker, by reason"
    );
    describe_gauge!("calltrack_queue_depth", "Entries in the durable event queue");
    describe_counter!(
        "calltrack_remote_deliveries_total",
        "Remote store deliveries, by result"
    );
}

pub async fn metrics_handler(State(prometheus_handle): State<PrometheusHandle>) -> Response {
    (StatusCode::OK, prometheus_handle.render()).into_response()
}
