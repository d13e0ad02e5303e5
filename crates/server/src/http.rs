//! HTTP Endpoints
//!
//! The webhook endpoint plus health, readiness, tool listing and metrics.

use axum::{
    extract::State,
    http::{HeaderValue, Method, StatusCode},
    middleware,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use voice_webhook_tools::ToolExecutor;

use crate::auth::webhook_auth;
use crate::metrics::metrics_handler;
use crate::state::AppContext;
use crate::webhook::handle_webhook;

pub const SERVICE_NAME: &str = "voice-webhook";

/// Create the application router
pub fn create_router(ctx: AppContext) -> Router {
    let server = &ctx.settings.server;
    let cors_layer = build_cors_layer(&server.cors_origins, server.cors_enabled);
    let timeout = Duration::from_secs(server.timeout_seconds);
    // End-of-call reports are acknowledged after extraction; see ServerConfig
    let webhook_timeout = Duration::from_secs(server.webhook_timeout_seconds);

    let webhook = Router::new()
        .route(&server.webhook_path, post(handle_webhook))
        .route_layer(middleware::from_fn_with_state(ctx.clone(), webhook_auth))
        .layer(TimeoutLayer::new(webhook_timeout));

    let service = Router::new()
        .route("/", get(health_check))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/tools", get(list_tools))
        .route("/metrics", get(metrics_handler))
        .layer(TimeoutLayer::new(timeout));

    service
        .merge(webhook)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer)
        .with_state(ctx)
}

/// Build CORS layer from configured origins
///
/// - If cors_enabled is false, returns permissive layer (for dev)
/// - Otherwise only the configured, parseable origins are allowed
fn build_cors_layer(origins: &[String], enabled: bool) -> CorsLayer {
    if !enabled {
        tracing::warn!("CORS is disabled - allowing all origins");
        return CorsLayer::permissive();
    }

    let parsed_origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!("Invalid CORS origin: {}", origin);
                None
            })
        })
        .collect();

    if parsed_origins.is_empty() {
        tracing::info!("No valid CORS origins configured; cross-origin requests are refused");
    } else {
        tracing::info!("CORS configured with {} origins", parsed_origins.len());
    }

    CorsLayer::new()
        .allow_origin(parsed_origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any)
}

async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// Readiness: the store answers and tools are registered
async fn readiness_check(State(ctx): State<AppContext>) -> (StatusCode, Json<serde_json::Value>) {
    let mut checks = serde_json::Map::new();
    let mut ready = true;

    let store_status = match ctx.store().health_check().await {
        Ok(()) => "ok",
        Err(e) => {
            tracing::warn!(error = %e, "Store health check failed");
            ready = false;
            "unavailable"
        },
    };
    checks.insert(
        "store".to_string(),
        serde_json::json!({
            "status": store_status,
            "backend": ctx.settings.persistence.backend,
        }),
    );

    let tool_count = ctx.dispatcher.registry().len();
    if tool_count == 0 {
        ready = false;
    }
    checks.insert(
        "tools".to_string(),
        serde_json::json!({
            "status": if tool_count > 0 { "ok" } else { "empty" },
            "count": tool_count,
        }),
    );

    checks.insert(
        "analysis".to_string(),
        serde_json::json!({ "enabled": ctx.pipeline.analysis_enabled() }),
    );

    let status_code = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status_code,
        Json(serde_json::json!({
            "status": if ready { "ready" } else { "not_ready" },
            "checks": checks,
        })),
    )
}

/// Registered tool schemas, as configured on the platform assistant
async fn list_tools(State(ctx): State<AppContext>) -> Json<serde_json::Value> {
    let tools = ctx.dispatcher.registry().list_tools();
    Json(serde_json::json!({
        "count": tools.len(),
        "tools": tools,
    }))
}
