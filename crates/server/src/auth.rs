//! Webhook authentication
//!
//! When a shared secret is configured, every webhook request must present it
//! in the configured header (`x-vapi-secret` by default) or as
//! `Authorization: Bearer <secret>`.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::{AppContext, ServerError};

/// Warn about a missing secret only once
static AUTH_DISABLED_WARNED: AtomicBool = AtomicBool::new(false);

pub async fn webhook_auth(State(ctx): State<AppContext>, request: Request, next: Next) -> Response {
    let auth = &ctx.settings.auth;
    let Some(expected) = auth.webhook_secret.as_deref().filter(|s| !s.is_empty()) else {
        if !AUTH_DISABLED_WARNED.swap(true, Ordering::Relaxed) {
            tracing::warn!("Webhook secret not set; accepting unauthenticated webhook requests");
        }
        return next.run(request).await;
    };

    match presented_secret(request.headers(), &auth.header_name) {
        Some(provided) if constant_time_compare(provided.as_bytes(), expected.as_bytes()) => {
            next.run(request).await
        },
        Some(_) => {
            tracing::warn!(
                forwarded_for = ?request.headers().get("x-forwarded-for"),
                "Invalid webhook secret"
            );
            metrics::counter!("webhook_rejections_total", "reason" => "unauthorized").increment(1);
            ServerError::Auth("invalid webhook secret".to_string()).into_response()
        },
        None => {
            metrics::counter!("webhook_rejections_total", "reason" => "unauthorized").increment(1);
            ServerError::Auth("missing webhook secret".to_string()).into_response()
        },
    }
}

fn presented_secret<'a>(headers: &'a HeaderMap, header_name: &str) -> Option<&'a str> {
    headers
        .get(header_name)
        .and_then(|v| v.to_str().ok())
        .or_else(|| {
            headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.strip_prefix("Bearer "))
        })
        .map(str::trim)
}

/// Constant-time comparison to prevent timing attacks
fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_constant_time_compare() {
        assert!(constant_time_compare(b"secret", b"secret"));
        assert!(!constant_time_compare(b"secret", b"secre"));
        assert!(!constant_time_compare(b"secret", b"secreT"));
    }

    #[test]
    fn test_presented_secret_sources() {
        let mut headers = HeaderMap::new();
        assert_eq!(presented_secret(&headers, "x-vapi-secret"), None);

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer s3cret"));
        assert_eq!(presented_secret(&headers, "x-vapi-secret"), Some("s3cret"));

        headers.insert("x-vapi-secret", HeaderValue::from_static("other"));
        assert_eq!(presented_secret(&headers, "x-vapi-secret"), Some("other"));

        let mut basic = HeaderMap::new();
        basic.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic abc"));
        assert_eq!(presented_secret(&basic, "x-vapi-secret"), None);
    }
}
