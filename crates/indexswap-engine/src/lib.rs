//! Swap session engine for indexswap.
//!
//! This crate owns the lifecycle of swap sessions: it persists them, runs one
//! background worker per `Processing` session, and talks to the external
//! registration system through the [`RegistrationGateway`] seam.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         API (HTTP)                          │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     SwapSessionManager                      │
//! │  ┌─────────────┐ ┌─────────────┐ ┌─────────────────────┐    │
//! │  │  Session    │ │  Worker     │ │    Lifecycle        │    │
//! │  │  Ops        │ │  Registry   │ │    State Machine    │    │
//! │  └─────────────┘ └──────┬──────┘ └─────────────────────┘    │
//! └─────────────────────────┼───────────────────────────────────┘
//!                           │ one SwapWorker per session
//!               ┌───────────┴──────────────┐
//!               ▼                          ▼
//!        ┌──────────────┐        ┌──────────────────────┐
//!        │    Store     │        │ RegistrationGateway  │
//!        │  (RocksDB)   │        │       (HTTP)         │
//!        └──────────────┘        └──────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use indexswap_core::OwnerId;
//! use indexswap_engine::{
//!     HttpRegistrationGateway, SessionManager, SubmitSwapRequest, SwapSessionManager,
//! };
//! use indexswap_store::RocksStore;
//!
//! # async fn example(request: SubmitSwapRequest) -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(RocksStore::open("/tmp/indexswap")?);
//! let gateway = Arc::new(HttpRegistrationGateway::new("http://registrar.internal"));
//! let manager = SwapSessionManager::with_defaults(store, gateway);
//!
//! let owner = OwnerId::from_username("alice");
//! let session_id = manager.create_session(&owner, request.into_targets()?).await?;
//! println!("Started session: {session_id}");
//! # Ok(())
//! # }
//! ```
//!
//! See the [`lifecycle`] module for the status machine.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod lifecycle;
pub mod manager;
pub mod registrar;
pub mod registry;
pub mod types;
pub mod worker;

pub use error::{EngineError, Result};
pub use manager::{RecoveryReport, SessionManager, SwapSessionManager};
pub use registrar::{
    GatewayError, HttpRegistrationGateway, NoopRegistrationGateway, RegistrationGateway,
};
pub use registry::{CancelReason, WorkerRegistry};
pub use types::{EngineConfig, ModuleRequest, SubmitSwapRequest};
pub use worker::{SwapWorker, WorkerExit, WorkerSettings};

#[cfg(any(test, feature = "test-utils"))]
pub use registrar::mock::{GatewayCall, ScriptedGateway};
