use std::collections::HashMap;
use std::fmt::Write as _;
use std::net::SocketAddr;

use axum::async_trait;
use axum::body::Bytes;
use axum::extract::{ConnectInfo, FromRequestParts, Path, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Json, Response};
use trackmon_common::{Metric, MetricKind};
use trackmon_storage::StorageError;

use crate::AppState;

pub(crate) const SIGNATURE_MISMATCH: &str = "подпись не соответствует ожиданиям";
const JSON_ONLY: &str = "only application/json content are allowed!";

/// The reporting target: the `X-Real-IP` header when present, otherwise
/// the peer address of the connection.
pub struct ClientIp(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(ip) = parts
            .headers
            .get("x-real-ip")
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
        {
            return Ok(ClientIp(ip.to_string()));
        }
        Ok(ClientIp(
            parts
                .extensions
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ci| ci.0.ip().to_string())
                .unwrap_or_default(),
        ))
    }
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.starts_with("application/json"))
        .unwrap_or(false)
}

fn repo_error_response(err: StorageError) -> Response {
    let status = match err {
        StorageError::WrongMetricUrl => StatusCode::NOT_FOUND,
        StorageError::WrongMetricValue => StatusCode::BAD_REQUEST,
        StorageError::WrongValueInStorage => StatusCode::NOT_IMPLEMENTED,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, err.to_string()).into_response()
}

/// MAC check: active only when the server holds a key and the record
/// carries a hash.
fn signature_ok(state: &AppState, m: &Metric) -> bool {
    if state.key.is_empty() || m.hash.is_empty() {
        return true;
    }
    m.verify(&state.key).unwrap_or(false)
}

pub async fn update_metric_json(
    State(state): State<AppState>,
    ClientIp(target): ClientIp,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !is_json(&headers) {
        return (StatusCode::BAD_REQUEST, JSON_ONLY).into_response();
    }
    let metric: Metric = match serde_json::from_slice(&body) {
        Ok(m) => m,
        Err(err) => {
            tracing::error!(error = %err, "metric decode failed");
            return (StatusCode::BAD_REQUEST, err.to_string()).into_response();
        }
    };
    if !signature_ok(&state, &metric) {
        return (StatusCode::BAD_REQUEST, SIGNATURE_MISMATCH).into_response();
    }
    match state.repo.update_metric(&target, vec![metric]).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(err) => repo_error_response(err),
    }
}

pub async fn updates_metric_json(
    State(state): State<AppState>,
    ClientIp(target): ClientIp,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !is_json(&headers) {
        return (StatusCode::BAD_REQUEST, JSON_ONLY).into_response();
    }
    let metrics: Vec<Metric> = match serde_json::from_slice(&body) {
        Ok(mm) => mm,
        Err(err) => {
            tracing::error!(error = %err, "batch decode failed");
            return (StatusCode::BAD_REQUEST, err.to_string()).into_response();
        }
    };
    for m in &metrics {
        if !signature_ok(&state, m) {
            return (StatusCode::BAD_REQUEST, SIGNATURE_MISMATCH).into_response();
        }
    }
    match state.repo.update_metric(&target, metrics).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(err) => repo_error_response(err),
    }
}

pub async fn get_metric_json(
    State(state): State<AppState>,
    ClientIp(target): ClientIp,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if !is_json(&headers) {
        return (StatusCode::BAD_REQUEST, JSON_ONLY).into_response();
    }
    let metric: Metric = match serde_json::from_slice(&body) {
        Ok(m) => m,
        Err(err) => return (StatusCode::BAD_REQUEST, err.to_string()).into_response(),
    };
    match state.repo.get_metric(&target, metric.kind, &metric.id).await {
        Ok(Some(found)) => Json(found).into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

pub async fn update_metric_path(
    State(state): State<AppState>,
    ClientIp(target): ClientIp,
    Path((mtype, name, value)): Path<(String, String, String)>,
) -> Response {
    let kind = match mtype.parse::<MetricKind>() {
        Ok(kind) => kind,
        Err(err) => return (StatusCode::NOT_IMPLEMENTED, err.to_string()).into_response(),
    };
    let metric = match kind {
        MetricKind::Counter => match value.parse::<i64>() {
            Ok(delta) => Metric::counter(name, delta),
            Err(_) => {
                return (
                    StatusCode::BAD_REQUEST,
                    StorageError::WrongMetricValue.to_string(),
                )
                    .into_response()
            }
        },
        MetricKind::Gauge => match value.parse::<f64>() {
            Ok(v) => Metric::gauge(name, v),
            Err(_) => {
                return (
                    StatusCode::BAD_REQUEST,
                    StorageError::WrongMetricValue.to_string(),
                )
                    .into_response()
            }
        },
    };
    match state.repo.update_metric(&target, vec![metric]).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(err) => repo_error_response(err),
    }
}

pub async fn get_metric_path(
    State(state): State<AppState>,
    ClientIp(target): ClientIp,
    Path((mtype, name)): Path<(String, String)>,
) -> Response {
    let Ok(kind) = mtype.parse::<MetricKind>() else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match state.repo.get_metric(&target, kind, &name).await {
        Ok(Some(found)) => Html(found.to_string()).into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

pub async fn ping(State(state): State<AppState>) -> Response {
    match state.repo.ping().await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response(),
    }
}

pub async fn list_metrics(State(state): State<AppState>) -> Response {
    let list: HashMap<String, Vec<String>> = match state.repo.list().await {
        Ok(list) => list,
        Err(err) => {
            return (StatusCode::INTERNAL_SERVER_ERROR, err.to_string()).into_response()
        }
    };
    let mut buf = String::new();
    for (target, values) in &list {
        let _ = write!(buf, r#"<b>Target "{target}":</b></br>"#);
        for v in values {
            let _ = write!(buf, "  {v}<br>");
        }
    }
    Html(buf).into_response()
}
