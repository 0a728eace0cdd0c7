pub mod config;
pub mod crypt;
pub mod grpc;
pub mod handlers;
pub mod logging;
pub mod middleware;

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use ipnetwork::IpNetwork;
use rsa::RsaPrivateKey;
use tower_http::catch_panic::CatchPanicLayer;
use trackmon_storage::Repository;

/// Shared state of both ingestion surfaces.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repository>,
    /// Signing key for MAC verification; empty disables the check.
    pub key: Arc<Vec<u8>>,
    /// CIDR of admitted agents; `None` admits everyone.
    pub trusted: Option<IpNetwork>,
    /// Private key of the request-body encryption envelope.
    pub private_key: Option<Arc<RsaPrivateKey>>,
}

/// Assembles the HTTP surface. Layer order, outermost first: panic
/// recovery (skipped in debug mode), request logging, trusted-subnet
/// admission, body decryption.
pub fn build_router(state: AppState, debug: bool) -> Router {
    let mut router = Router::new()
        .route("/update/", post(handlers::update_metric_json))
        .route("/updates/", post(handlers::updates_metric_json))
        .route("/value/", post(handlers::get_metric_json))
        .route(
            "/update/:mtype/:name/:value",
            post(handlers::update_metric_path),
        )
        .route("/value/:mtype/:name", get(handlers::get_metric_path))
        .route("/ping", get(handlers::ping))
        .route("/", get(handlers::list_metrics))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::decrypt_body,
        ))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::trusted_subnet,
        ))
        .layer(axum::middleware::from_fn(logging::request_logging));
    if !debug {
        router = router.layer(CatchPanicLayer::new());
    }
    router.with_state(state)
}
