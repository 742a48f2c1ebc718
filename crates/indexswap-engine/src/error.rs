//! Error types for the swap engine.
//!
//! This module defines all errors that can occur while creating, inspecting
//! and tearing down swap sessions.

use indexswap_core::{OwnerId, SessionId};
use indexswap_store::SessionStatus;
use thiserror::Error;

use crate::registrar::GatewayError;

/// A result type using `EngineError`.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur in engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The submitted swap request is malformed.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The requested session was not found.
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    /// The caller does not own the requested session.
    #[error("owner {owner} does not own session {session_id}")]
    NotOwner {
        /// The owner making the request.
        owner: OwnerId,
        /// The session being accessed.
        session_id: SessionId,
    },

    /// The requested status change is not valid.
    #[error(
        "invalid status transition for session {session_id}: cannot transition from {from} to {to}"
    )]
    InvalidTransition {
        /// The session being transitioned.
        session_id: SessionId,
        /// The current status.
        from: SessionStatus,
        /// The requested status.
        to: SessionStatus,
    },

    /// The owner already has as many running sessions as allowed.
    #[error("session quota exceeded for owner {owner}: limit is {limit}")]
    QuotaExceeded {
        /// The owner who exceeded the quota.
        owner: OwnerId,
        /// The maximum number of running sessions allowed.
        limit: usize,
    },

    /// The service is running as many workers as it allows.
    #[error("session capacity exceeded: limit is {limit}")]
    CapacityExceeded {
        /// The global worker limit.
        limit: usize,
    },

    /// A worker is already attached to the session.
    #[error("session {0} already has an active worker")]
    WorkerAlreadyActive(SessionId),

    /// Registration gateway error.
    #[error("registration gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Storage layer error.
    #[error("storage error: {0}")]
    Store(#[from] indexswap_store::StoreError),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Returns the appropriate HTTP status code for this error.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::InvalidRequest(_) => 400,
            Self::NotOwner { .. } => 403,
            Self::SessionNotFound(_) => 404,
            Self::InvalidTransition { .. } | Self::WorkerAlreadyActive(_) => 409,
            Self::QuotaExceeded { .. } => 429,
            Self::Gateway(_) => 502,
            Self::CapacityExceeded { .. } => 503,
            Self::Store(_) | Self::Internal(_) => 500,
        }
    }
}
