//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use indexswap_auth::TokenValidator;
use indexswap_engine::SessionManager;

use crate::handlers::{health, login, swaps};
use crate::state::AppState;

/// Create the API router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
/// - `POST /api/login` - Issue an owner token
///
/// ## Swaps (bearer token)
/// - `POST /api/submit-swap` - Start a session
/// - `GET /api/swaps` - List the caller's sessions
/// - `GET /api/swap-status/:session_id` - Poll progress
/// - `POST /api/stop-swap/:session_id` - Stop a session
/// - `POST /api/logout/:session_id` - Stop and discard a session
pub fn create_router<M, V>(state: AppState<M, V>) -> Router
where
    M: SessionManager + 'static,
    V: TokenValidator + 'static,
{
    let cors = build_cors_layer(&state.config.cors_origins);
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout = state.config.request_timeout();

    let state = Arc::new(state);

    Router::new()
        .route("/health", get(health::health::<M, V>))
        .route("/api/login", post(login::login::<M, V>))
        .route("/api/submit-swap", post(swaps::submit_swap::<M, V>))
        .route("/api/swaps", get(swaps::list_swaps::<M, V>))
        .route(
            "/api/swap-status/:session_id",
            get(swaps::swap_status::<M, V>),
        )
        .route("/api/stop-swap/:session_id", post(swaps::stop_swap::<M, V>))
        .route("/api/logout/:session_id", post(swaps::logout::<M, V>))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(RequestBodyLimitLayer::new(max_body_bytes))
                .layer(TimeoutLayer::new(request_timeout)),
        )
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
