//! HTTP API for the indexswap swap-automation service.
//!
//! This crate provides the public-facing API for owners to log in, submit
//! swap requests, poll progress and stop or discard their sessions.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Clients (HTTP/JSON)                     │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        indexswap-api                        │
//! │  ┌─────────────┐ ┌─────────────┐ ┌─────────────────────┐    │
//! │  │   Owner     │ │   Router    │ │    Error            │    │
//! │  │  Extractor  │ │  + Handlers │ │    Mapping          │    │
//! │  └─────────────┘ └─────────────┘ └─────────────────────┘    │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                 ┌────────────┴────────────┐
//!                 ▼                         ▼
//!        ┌────────────────┐        ┌────────────────┐
//!        │ SessionManager │        │  TokenService  │
//!        │   (engine)     │        │     (JWT)      │
//!        └────────────────┘        └────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use indexswap_api::{create_router, ApiConfig, AppState};
//! use indexswap_auth::{AuthConfig, TokenService};
//! use indexswap_engine::{NoopRegistrationGateway, SwapSessionManager};
//! use indexswap_store::MemoryStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(MemoryStore::new());
//! let gateway = Arc::new(NoopRegistrationGateway::new());
//! let manager = Arc::new(SwapSessionManager::with_defaults(store, gateway));
//! let tokens = Arc::new(TokenService::new(AuthConfig {
//!     secret: "change-me".to_string(),
//!     ..AuthConfig::default()
//! }));
//!
//! let state = AppState::new(manager, Arc::clone(&tokens), tokens, ApiConfig::default());
//! let app = create_router(state);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use auth::OwnerContext;
pub use config::ApiConfig;
pub use error::ApiError;
pub use routes::create_router;
pub use state::AppState;
