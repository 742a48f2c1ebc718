//! Common error types for indexswap.

use crate::ids::SessionId;
use thiserror::Error;

/// A result type using `CoreError`.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Core errors that can occur throughout indexswap.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A swap session with the specified ID was not found.
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    /// An invalid identifier was provided.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] crate::ids::IdError),

    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}
