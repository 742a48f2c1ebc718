//! In-memory storage implementation.
//!
//! Used by tests and by deployments that run without a data directory.
//! Sessions do not survive a restart.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use indexswap_core::{OwnerId, SessionId};
use parking_lot::RwLock;

use crate::error::{Result, StoreError};
use crate::types::{SessionStatus, SwapSession};
use crate::{apply_transition, Store};

/// A `Store` backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    sessions: RwLock<HashMap<SessionId, SwapSession>>,
}

impl MemoryStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Check if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    fn filtered(&self, keep: impl Fn(&SwapSession) -> bool) -> Vec<SwapSession> {
        self.sessions
            .read()
            .values()
            .filter(|s| keep(s))
            .cloned()
            .collect()
    }
}

impl Store for MemoryStore {
    fn put_session(&self, session: &SwapSession) -> Result<()> {
        self.sessions
            .write()
            .insert(session.session_id, session.clone());
        Ok(())
    }

    fn get_session(&self, session_id: &SessionId) -> Result<Option<SwapSession>> {
        Ok(self.sessions.read().get(session_id).cloned())
    }

    fn delete_session(&self, session_id: &SessionId) -> Result<()> {
        self.sessions
            .write()
            .remove(session_id)
            .map(|_| ())
            .ok_or(StoreError::NotFound)
    }

    fn list_sessions_by_owner(&self, owner: &OwnerId) -> Result<Vec<SwapSession>> {
        Ok(self.filtered(|s| s.owner == *owner))
    }

    fn list_sessions_by_status(&self, status: SessionStatus) -> Result<Vec<SwapSession>> {
        Ok(self.filtered(|s| s.status == status))
    }

    fn list_all_sessions(&self) -> Result<Vec<SwapSession>> {
        Ok(self.filtered(|_| true))
    }

    fn update_if_processing(&self, session: &SwapSession) -> Result<bool> {
        let mut sessions = self.sessions.write();
        match sessions.get_mut(&session.session_id) {
            Some(stored) if stored.status == SessionStatus::Processing => {
                *stored = session.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    fn transition_status(
        &self,
        session_id: &SessionId,
        status: SessionStatus,
        message: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<SwapSession>> {
        let mut sessions = self.sessions.write();
        let stored = sessions.get_mut(session_id).ok_or(StoreError::NotFound)?;
        if apply_transition(stored, status, message, now) {
            Ok(Some(stored.clone()))
        } else {
            Ok(None)
        }
    }
}
