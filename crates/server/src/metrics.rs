//! Prometheus metrics

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

use crate::AppContext;

static PROMETHEUS_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the global Prometheus recorder; later calls return the same handle
pub fn init_metrics() -> Result<PrometheusHandle, String> {
    PROMETHEUS_HANDLE
        .get_or_try_init(|| {
            let handle = PrometheusBuilder::new()
                .install_recorder()
                .map_err(|e| format!("failed to install prometheus recorder: {}", e))?;

            describe_counter!("webhook_events_total", "Webhook events received, by kind");
            describe_counter!("webhook_rejections_total", "Webhook requests rejected, by reason");
            describe_counter!("webhook_duplicates_total", "Redelivered end-of-call reports");
            describe_counter!("tool_calls_total", "Function calls dispatched, by tool and outcome");
            describe_histogram!("tool_latency_ms", "Tool execution time in milliseconds");
            describe_counter!("analysis_extractions_total", "Transcript extractions, by outcome");
            describe_histogram!("analysis_latency_ms", "Successful extraction time in milliseconds");
            describe_counter!("platform_pushes_total", "Platform push attempts, by outcome");

            Ok(handle)
        })
        .cloned()
}

pub async fn metrics_handler(State(ctx): State<AppContext>) -> impl IntoResponse {
    match &ctx.metrics {
        Some(handle) => (StatusCode::OK, handle.render()),
        None => (StatusCode::NOT_FOUND, "metrics disabled".to_string()),
    }
}
