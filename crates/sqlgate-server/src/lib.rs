//! # sqlgate-server
//!
//! Thin HTTP surface over [`sqlgate_exec`].
//!
//! | Route | Purpose |
//! |-------|---------|
//! | `GET /healthz` | liveness |
//! | `POST /database/{db}/execute` | one statement, form-encoded |
//! | `POST /database/{db}/execute_batch` | a batch file of statements or parameter sets |
//!
//! The caller is identified by the `x-sqlgate-user` header; issuing and
//! checking credentials happens in front of the gateway.

pub mod handlers;

use axum::routing::{get, post};
use axum::Router;
use sqlgate_exec::Gateway;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Header carrying the caller's username.
pub const USER_HEADER: &str = "x-sqlgate-user";

/// Shared state of all handlers.
#[derive(Debug, Clone)]
pub struct AppState {
    pub gateway: Arc<Gateway>,
}

impl AppState {
    pub fn new(gateway: Gateway) -> Self {
        Self {
            gateway: Arc::new(gateway),
        }
    }
}

/// Build the router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/database/{db}/execute", post(handlers::execute))
        .route("/database/{db}/execute_batch", post(handlers::execute_batch))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
