//! Session storage for indexswap.
//!
//! This crate provides persistent storage for swap sessions, using `RocksDB`
//! with column families for indexing, plus an in-memory implementation for
//! tests and single-process deployments.
//!
//! # Architecture
//!
//! The `RocksDB` storage uses the following column families:
//!
//! - `sessions`: Primary session records, keyed by `session_id`
//! - `sessions_by_owner`: Index for listing sessions by owner
//! - `sessions_by_status`: Index for listing sessions by status
//!
//! Status changes go through two conditional writes:
//!
//! ```text
//!   worker cycle ──► update_if_processing ──► applied only while stored status is Processing
//!   stop / expiry ─► transition_status ─────► Processing -> terminal, at most once
//! ```
//!
//! # Example
//!
//! ```no_run
//! use indexswap_store::{RocksStore, Store};
//! use indexswap_core::OwnerId;
//!
//! let store = RocksStore::open("/tmp/indexswap-db").unwrap();
//!
//! let owner = OwnerId::from_username("alice");
//! let sessions = store.list_sessions_by_owner(&owner).unwrap();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod memory;
pub mod rocks;
pub mod schema;
pub mod types;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use rocks::RocksStore;
pub use types::{
    parse_candidates, ModuleSwapTarget, SessionStatus, SwapSession, SESSION_PROCESSING_MESSAGE,
    TARGET_PENDING_MESSAGE,
};

use chrono::{DateTime, Utc};
use indexswap_core::{OwnerId, SessionId};

/// The storage trait defining all session operations.
///
/// Implementations must make `update_if_processing` and `transition_status`
/// atomic with respect to each other, since a worker and a stop request can
/// race on the same session.
pub trait Store: Send + Sync {
    // =========================================================================
    // Plain Record Operations
    // =========================================================================

    /// Insert or overwrite a session record.
    ///
    /// This also maintains the owner and status indexes.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_session(&self, session: &SwapSession) -> Result<()>;

    /// Get a session by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_session(&self, session_id: &SessionId) -> Result<Option<SwapSession>>;

    /// Delete a session by ID.
    ///
    /// This also removes the session from all indexes.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the session doesn't exist.
    fn delete_session(&self, session_id: &SessionId) -> Result<()>;

    /// List all sessions belonging to an owner.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_sessions_by_owner(&self, owner: &OwnerId) -> Result<Vec<SwapSession>>;

    /// List all sessions with a given status.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_sessions_by_status(&self, status: SessionStatus) -> Result<Vec<SwapSession>>;

    /// List every session in the database.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_all_sessions(&self) -> Result<Vec<SwapSession>>;

    // =========================================================================
    // Conditional Writes
    // =========================================================================

    /// Overwrite a session only if the stored copy is still `Processing`.
    ///
    /// Returns `false` and writes nothing when the stored session is terminal
    /// or has been deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn update_if_processing(&self, session: &SwapSession) -> Result<bool>;

    /// Move a `Processing` session to a terminal status.
    ///
    /// Sets the session message and `finished_at`. Returns the updated
    /// session, or `None` if the session was already terminal.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the session doesn't exist.
    fn transition_status(
        &self,
        session_id: &SessionId,
        status: SessionStatus,
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<SwapSession>>;
}

/// Apply a terminal transition to an in-memory copy, if it is still `Processing`.
///
/// Shared by the store implementations so both honour the same rules.
pub(crate) fn apply_transition(
    session: &mut SwapSession,
    status: SessionStatus,
    message: &str,
    now: DateTime<Utc>,
) -> bool {
    if session.status.is_terminal() {
        return false;
    }
    session.status = status;
    session.message = message.to_string();
    session.finished_at = Some(now);
    true
}
