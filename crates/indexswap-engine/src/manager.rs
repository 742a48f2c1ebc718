//! Session manager implementation.
//!
//! This module provides the `SessionManager` trait and `SwapSessionManager`
//! implementation that owns the session lifecycle: it persists new sessions,
//! starts their workers, and serves status, stop and logout requests.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexswap_core::{OwnerId, SessionId};
use indexswap_store::{ModuleSwapTarget, SessionStatus, Store, StoreError, SwapSession};
use tokio::sync::Semaphore;
use tokio::time::Instant;

use crate::error::{EngineError, Result};
use crate::lifecycle::{STOPPED_MESSAGE, TIMED_OUT_MESSAGE};
use crate::registrar::RegistrationGateway;
use crate::registry::{self, Limits, WorkerLease, WorkerRegistry};
use crate::types::EngineConfig;
use crate::worker::{SwapWorker, WorkerSettings};

/// Trait defining the session operations exposed to callers.
#[async_trait]
pub trait SessionManager: Send + Sync {
    /// Persist a new `Processing` session and start its worker.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InvalidRequest` if `targets` is empty or a target
    /// has a blank old index, no candidates or a blank candidate.
    /// Returns `EngineError::QuotaExceeded` or `EngineError::CapacityExceeded`
    /// if the owner or the service has no worker slot left.
    async fn create_session(
        &self,
        owner: &OwnerId,
        targets: Vec<ModuleSwapTarget>,
    ) -> Result<SessionId>;

    /// Get the current snapshot of a session.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::SessionNotFound` if the session doesn't exist.
    /// Returns `EngineError::NotOwner` if the caller doesn't own the session.
    async fn get_status(&self, owner: &OwnerId, session_id: &SessionId) -> Result<SwapSession>;

    /// Stop a session. Stopping a terminal session is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::SessionNotFound` if the session doesn't exist.
    /// Returns `EngineError::NotOwner` if the caller doesn't own the session.
    async fn stop(&self, owner: &OwnerId, session_id: &SessionId) -> Result<()>;

    /// Stop a session if it is running, then delete it.
    ///
    /// A missing session is not an error.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::NotOwner` if the caller doesn't own the session.
    async fn logout(&self, owner: &OwnerId, session_id: &SessionId) -> Result<()>;

    /// List an owner's sessions, newest first.
    async fn list_sessions(&self, owner: &OwnerId) -> Result<Vec<SwapSession>>;

    /// Number of running workers.
    fn active_workers(&self) -> usize;
}

/// Outcome of [`SwapSessionManager::recover`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Sessions whose worker was restarted.
    pub resumed: Vec<SessionId>,
    /// Sessions whose deadline passed while no worker was running.
    pub timed_out: Vec<SessionId>,
}

/// The main session manager implementation.
pub struct SwapSessionManager<S: Store, G: RegistrationGateway> {
    store: Arc<S>,
    gateway: Arc<G>,
    config: EngineConfig,
    registry: Arc<WorkerRegistry>,
    limiter: Option<Arc<Semaphore>>,
}

impl<S, G> SwapSessionManager<S, G>
where
    S: Store + 'static,
    G: RegistrationGateway + 'static,
{
    /// Create a new session manager.
    #[must_use]
    pub fn new(store: Arc<S>, gateway: Arc<G>, config: EngineConfig) -> Self {
        let limiter = config
            .gateway_concurrency
            .map(|permits| Arc::new(Semaphore::new(permits)));
        Self {
            store,
            gateway,
            config,
            registry: Arc::new(WorkerRegistry::new()),
            limiter,
        }
    }

    /// Create with default configuration.
    #[must_use]
    pub fn with_defaults(store: Arc<S>, gateway: Arc<G>) -> Self {
        Self::new(store, gateway, EngineConfig::default())
    }

    /// Get a reference to the store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Get the configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Wait until the session's worker, if any, has exited.
    pub async fn join_worker(&self, session_id: &SessionId) {
        if let Some(done) = self.registry.done_signal(session_id) {
            registry::wait_exited(done).await;
        }
    }

    fn limits(&self) -> Limits {
        Limits {
            global: self.config.max_active_sessions,
            per_owner: self.config.max_active_sessions_per_owner,
        }
    }

    fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            poll_interval: self.config.poll_interval,
            max_consecutive_transient_cycles: self.config.max_consecutive_transient_cycles,
            limiter: self.limiter.clone(),
        }
    }

    fn spawn_worker(&self, lease: WorkerLease, deadline: Instant) {
        let worker = SwapWorker::new(
            lease,
            Arc::clone(&self.store),
            Arc::clone(&self.gateway),
            self.worker_settings(),
            deadline,
        );
        tokio::spawn(worker.run());
    }

    /// Verify that the owner owns the given session.
    fn verify_ownership(owner: &OwnerId, session: &SwapSession) -> Result<()> {
        if session.owner != *owner {
            return Err(EngineError::NotOwner {
                owner: *owner,
                session_id: session.session_id,
            });
        }
        Ok(())
    }

    /// Get a session and verify ownership.
    fn get_and_verify(&self, owner: &OwnerId, session_id: &SessionId) -> Result<SwapSession> {
        let session = self
            .store
            .get_session(session_id)?
            .ok_or(EngineError::SessionNotFound(*session_id))?;

        Self::verify_ownership(owner, &session)?;
        Ok(session)
    }

    /// Cancel the worker and record `Stopped` if it did not get there first.
    ///
    /// The worker finishes any in-flight gateway call and commits its outcome
    /// before releasing the lease, so this waits for the release rather than
    /// writing over the worker. The gateway's request timeout bounds the wait.
    async fn stop_session(&self, session_id: &SessionId) -> Result<()> {
        if let Some(done) = self.registry.cancel(session_id) {
            registry::wait_exited(done).await;
        }

        match self
            .store
            .transition_status(session_id, SessionStatus::Stopped, STOPPED_MESSAGE, Utc::now())
        {
            Ok(_) | Err(StoreError::NotFound) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    // =========================================================================
    // Operational
    // =========================================================================

    /// Restart workers for sessions left `Processing` by a previous process.
    ///
    /// Sessions past their deadline are timed out instead. Recovered workers
    /// keep the original deadline and bypass the admission limits.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn recover(&self) -> Result<RecoveryReport> {
        let now = Utc::now();
        let mut report = RecoveryReport::default();

        for session in self.store.list_sessions_by_status(SessionStatus::Processing)? {
            let session_id = session.session_id;
            if self.registry.contains(&session_id) {
                continue;
            }

            let remaining = session.remaining(now);
            if remaining <= chrono::Duration::zero() {
                if self
                    .store
                    .transition_status(&session_id, SessionStatus::TimedOut, TIMED_OUT_MESSAGE, now)?
                    .is_some()
                {
                    report.timed_out.push(session_id);
                }
                continue;
            }

            let lease = self.registry.acquire(session_id, session.owner, None)?;
            let remaining = remaining.to_std().unwrap_or_default();
            self.spawn_worker(lease, Instant::now() + remaining);
            report.resumed.push(session_id);
        }

        tracing::info!(
            resumed = report.resumed.len(),
            timed_out = report.timed_out.len(),
            "Session recovery complete"
        );
        Ok(report)
    }

    /// Delete terminal sessions whose retention window has passed.
    ///
    /// Returns the number of sessions deleted.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let retention = self.config.retention_chrono();
        let mut purged = 0;

        for session in self.store.list_all_sessions()? {
            if !session.is_terminal() {
                continue;
            }
            let finished = session.finished_at.unwrap_or(session.deadline_at);
            let expired = finished
                .checked_add_signed(retention)
                .is_some_and(|expiry| expiry <= now);
            if !expired {
                continue;
            }
            match self.store.delete_session(&session.session_id) {
                Ok(()) => purged += 1,
                Err(StoreError::NotFound) => {}
                Err(e) => {
                    tracing::warn!(
                        session_id = %session.session_id,
                        error = %e,
                        "Failed to purge session"
                    );
                }
            }
        }

        if purged > 0 {
            tracing::info!(purged, "Purged expired sessions");
        }
        Ok(purged)
    }

    /// Cancel every worker and wait for them to exit.
    ///
    /// Sessions are left `Processing` so that [`Self::recover`] resumes them
    /// on the next start.
    pub async fn shutdown(&self) {
        let pending = self.registry.shutdown_all();
        let count = pending.len();
        for done in pending {
            registry::wait_exited(done).await;
        }
        tracing::info!(workers = count, "Session manager shut down");
    }
}

#[async_trait]
impl<S, G> SessionManager for SwapSessionManager<S, G>
where
    S: Store + 'static,
    G: RegistrationGateway + 'static,
{
    async fn create_session(
        &self,
        owner: &OwnerId,
        targets: Vec<ModuleSwapTarget>,
    ) -> Result<SessionId> {
        if targets.is_empty() {
            return Err(EngineError::InvalidRequest(
                "at least one module is required".to_string(),
            ));
        }
        if let Some(i) = targets.iter().position(|t| {
            t.old_index.trim().is_empty()
                || t.candidate_indexes.is_empty()
                || t.candidate_indexes.iter().any(|c| c.trim().is_empty())
        }) {
            return Err(EngineError::InvalidRequest(format!(
                "Missing or invalid data for module {}",
                i + 1
            )));
        }

        let session = SwapSession::new(
            *owner,
            targets,
            Utc::now(),
            self.config.session_ttl_chrono(),
        );
        let session_id = session.session_id;

        // Reserve the slot first so a rejected request leaves nothing behind.
        let lease = self
            .registry
            .acquire(session_id, *owner, Some(self.limits()))?;
        self.store.put_session(&session)?;
        self.spawn_worker(lease, Instant::now() + self.config.session_ttl);

        tracing::info!(
            session_id = %session_id,
            owner = %owner,
            targets = session.targets.len(),
            "Swap session created"
        );
        Ok(session_id)
    }

    async fn get_status(&self, owner: &OwnerId, session_id: &SessionId) -> Result<SwapSession> {
        self.get_and_verify(owner, session_id)
    }

    async fn stop(&self, owner: &OwnerId, session_id: &SessionId) -> Result<()> {
        let session = self.get_and_verify(owner, session_id)?;
        if session.is_terminal() {
            return Ok(());
        }

        self.stop_session(session_id).await?;
        tracing::info!(session_id = %session_id, "Swap session stopped");
        Ok(())
    }

    async fn logout(&self, owner: &OwnerId, session_id: &SessionId) -> Result<()> {
        let session = match self.store.get_session(session_id) {
            Ok(Some(session)) => session,
            Ok(None) => return Ok(()),
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "Logout lookup failed");
                return Ok(());
            }
        };
        Self::verify_ownership(owner, &session)?;

        if !session.is_terminal() {
            if let Err(e) = self.stop_session(session_id).await {
                tracing::warn!(session_id = %session_id, error = %e, "Stop during logout failed");
            }
        }

        match self.store.delete_session(session_id) {
            Ok(()) | Err(StoreError::NotFound) => {}
            Err(e) => {
                tracing::warn!(session_id = %session_id, error = %e, "Delete during logout failed");
            }
        }

        tracing::info!(session_id = %session_id, owner = %owner, "Owner logged out");
        Ok(())
    }

    async fn list_sessions(&self, owner: &OwnerId) -> Result<Vec<SwapSession>> {
        let mut sessions = self.store.list_sessions_by_owner(owner)?;
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(sessions)
    }

    fn active_workers(&self) -> usize {
        self.registry.len()
    }
}
