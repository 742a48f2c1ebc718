//! Health check endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use indexswap_auth::TokenValidator;
use indexswap_engine::SessionManager;

use crate::state::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status.
    pub status: &'static str,
    /// Service version.
    pub version: &'static str,
    /// Number of sessions with a running worker.
    pub active_workers: usize,
}

/// Report liveness and how many workers are running. Public.
pub async fn health<M, V>(State(state): State<Arc<AppState<M, V>>>) -> Json<HealthResponse>
where
    M: SessionManager + 'static,
    V: TokenValidator + 'static,
{
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        active_workers: state.manager.active_workers(),
    })
}
