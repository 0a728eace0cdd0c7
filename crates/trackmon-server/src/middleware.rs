use std::net::IpAddr;

use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{header, Method, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use rsa::traits::PublicKeyParts;
use rsa::Oaep;
use sha2::Sha512;

use crate::AppState;

/// Admission by source address. Disabled when no CIDR is configured; the
/// source is taken from `X-Real-IP` only, so a proxy (or the agent
/// itself) must stamp it.
pub async fn trusted_subnet(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let Some(trusted) = state.trusted else {
        return next.run(req).await;
    };
    let real_ip = req
        .headers()
        .get("x-real-ip")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    if real_ip.is_empty() {
        return (StatusCode::FORBIDDEN, "access denied, no header").into_response();
    }
    let Ok(ip) = real_ip.parse::<IpAddr>() else {
        return (StatusCode::FORBIDDEN, "access denied, bad ip").into_response();
    };
    if !trusted.contains(ip) {
        return (StatusCode::FORBIDDEN, "access denied").into_response();
    }
    next.run(req).await
}

/// Decryption of the request-body envelope: the body is a concatenation
/// of RSA-OAEP-SHA512 blocks of exactly `key.size()` bytes each. Only
/// JSON POSTs pass through the envelope; everything else is forwarded
/// untouched.
pub async fn decrypt_body(
    State(state): State<AppState>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let Some(private_key) = state.private_key.clone() else {
        return next.run(req).await;
    };
    let json = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.starts_with("application/json"))
        .unwrap_or(false);
    if req.method() != Method::POST || !json {
        return next.run(req).await;
    }

    let (mut parts, body) = req.into_parts();
    let encrypted = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(err) => return (StatusCode::NOT_ACCEPTABLE, err.to_string()).into_response(),
    };
    let mut plain = Vec::with_capacity(encrypted.len());
    for block in encrypted.chunks(private_key.size()) {
        match private_key.decrypt(Oaep::new::<Sha512>(), block) {
            Ok(chunk) => plain.extend_from_slice(&chunk),
            Err(err) => {
                tracing::debug!(error = %err, "body decryption failed");
                return (StatusCode::NOT_ACCEPTABLE, err.to_string()).into_response();
            }
        }
    }
    parts.headers.remove(header::CONTENT_LENGTH);
    let req = Request::from_parts(parts, Body::from(plain));
    next.run(req).await
}
