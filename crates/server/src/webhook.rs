//! Webhook event handling
//!
//! Response contract towards the platform:
//! - 2xx acknowledges (including ignored kinds and duplicates)
//! - 4xx rejects permanently (malformed payloads, unknown tools)
//! - 5xx asks for redelivery (the store could not take the record)

use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::sync::Arc;
use voice_webhook_core::{
    classify_bytes, EndOfCallReport, EventPayload, FunctionCallRequest, PipelineError, StatusUpdate,
    TranscriptUpdate,
};

use crate::{AppContext, ServerError};

pub async fn handle_webhook(State(ctx): State<AppContext>, body: Bytes) -> Result<Response, ServerError> {
    let envelope = match classify_bytes(&body) {
        Ok(envelope) => envelope,
        Err(PipelineError::UnrecognizedEventKind(kind)) => {
            tracing::warn!(kind = %kind, "Ignoring unrecognized event kind");
            metrics::counter!("webhook_events_total", "kind" => "unrecognized").increment(1);
            return Ok((StatusCode::OK, Json(json!({ "status": "ignored", "kind": kind }))).into_response());
        },
        Err(e) => {
            tracing::warn!(kind = e.kind(), error = %e, "Rejecting webhook payload");
            metrics::counter!("webhook_rejections_total", "reason" => e.kind()).increment(1);
            return Err(e.into());
        },
    };

    let kind = envelope.kind();
    metrics::counter!("webhook_events_total", "kind" => kind.as_str()).increment(1);
    tracing::debug!(call_id = %envelope.call_id, kind = %kind, "Webhook event received");

    match envelope.payload {
        EventPayload::FunctionCall(request) => Ok(function_call(&ctx, &request).await),
        EventPayload::EndOfCallReport(report) => {
            end_of_call(&ctx, &envelope.call_id, envelope.timestamp, &report).await
        },
        EventPayload::TranscriptUpdate(update) => Ok(transcript(&envelope.call_id, &update)),
        EventPayload::StatusUpdate(status) => Ok(status_update(&envelope.call_id, &status)),
        EventPayload::Hang => {
            tracing::warn!(call_id = %envelope.call_id, "Platform reported a hang");
            Ok(acknowledge())
        },
    }
}

async fn function_call(ctx: &AppContext, request: &FunctionCallRequest) -> Response {
    let (result, error) = ctx.dispatcher.respond(request).await;
    let status = match &error {
        Some(e) if e.is_client_error() => {
            metrics::counter!("webhook_rejections_total", "reason" => e.kind()).increment(1);
            ServerError::status_for(e)
        },
        Some(e) => ServerError::status_for(e),
        None => StatusCode::OK,
    };
    (status, Json(result)).into_response()
}

async fn end_of_call(
    ctx: &AppContext,
    call_id: &str,
    timestamp: Option<DateTime<Utc>>,
    report: &EndOfCallReport,
) -> Result<Response, ServerError> {
    // Run detached so a dropped request still finishes persisting the record
    let pipeline = Arc::clone(&ctx.pipeline);
    let owned_id = call_id.to_string();
    let report = report.clone();
    let outcome = tokio::spawn(async move {
        pipeline.handle_end_of_call(&owned_id, timestamp, &report).await
    })
    .await
    .map_err(|e| ServerError::Internal(format!("end-of-call task failed: {}", e)))??;

    let push_state = outcome.record().map(|r| r.push_state.as_str());
    Ok((
        StatusCode::OK,
        Json(json!({
            "status": outcome.status(),
            "call_id": call_id,
            "push_state": push_state,
        })),
    )
        .into_response())
}

fn transcript(call_id: &str, update: &TranscriptUpdate) -> Response {
    if update.is_final {
        tracing::info!(call_id = %call_id, speaker = %update.speaker, text = %update.text, "Transcript");
    } else {
        tracing::trace!(call_id = %call_id, speaker = %update.speaker, "Partial transcript");
    }
    acknowledge()
}

fn status_update(call_id: &str, update: &StatusUpdate) -> Response {
    tracing::info!(
        call_id = %call_id,
        status = %update.status,
        ended_reason = ?update.ended_reason,
        "Call status changed"
    );
    acknowledge()
}

fn acknowledge() -> Response {
    (StatusCode::OK, Json(json!({ "status": "ok" }))).into_response()
}
