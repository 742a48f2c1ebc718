//! Registry of running swap workers.
//!
//! A worker may only mutate its session while it holds a [`WorkerLease`].
//! Leases are handed out at most once per session and give up their registry
//! entry when dropped, so a finished or panicked worker always releases its
//! slot.

use std::collections::HashMap;
use std::sync::Arc;

use indexswap_core::{OwnerId, SessionId};
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::error::{EngineError, Result};

/// Why a worker is asked to stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// The owner stopped the session.
    Stop,
    /// The process is shutting down; the session stays `Processing`.
    Shutdown,
}

/// Caps applied when handing out a new lease.
#[derive(Debug, Clone, Copy)]
pub struct Limits {
    /// Maximum number of leases overall.
    pub global: usize,
    /// Maximum number of leases per owner.
    pub per_owner: usize,
}

struct WorkerEntry {
    owner: OwnerId,
    cancel: watch::Sender<Option<CancelReason>>,
    done: watch::Receiver<bool>,
}

/// The set of sessions that currently have a worker.
#[derive(Default)]
pub struct WorkerRegistry {
    entries: Mutex<HashMap<SessionId, WorkerEntry>>,
}

impl WorkerRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reserve the worker slot for a session.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::WorkerAlreadyActive` if the session already has a
    /// worker, and `CapacityExceeded`/`QuotaExceeded` if `limits` are hit.
    pub fn acquire(
        self: &Arc<Self>,
        session_id: SessionId,
        owner: OwnerId,
        limits: Option<Limits>,
    ) -> Result<WorkerLease> {
        let mut entries = self.entries.lock();

        if entries.contains_key(&session_id) {
            return Err(EngineError::WorkerAlreadyActive(session_id));
        }

        if let Some(limits) = limits {
            if entries.len() >= limits.global {
                return Err(EngineError::CapacityExceeded {
                    limit: limits.global,
                });
            }
            let owned = entries.values().filter(|e| e.owner == owner).count();
            if owned >= limits.per_owner {
                return Err(EngineError::QuotaExceeded {
                    owner,
                    limit: limits.per_owner,
                });
            }
        }

        let (cancel_tx, cancel_rx) = watch::channel(None);
        let (done_tx, done_rx) = watch::channel(false);
        entries.insert(
            session_id,
            WorkerEntry {
                owner,
                cancel: cancel_tx,
                done: done_rx,
            },
        );

        Ok(WorkerLease {
            registry: Arc::clone(self),
            session_id,
            cancel: cancel_rx,
            done: done_tx,
        })
    }

    /// Signal a session's worker to stop.
    ///
    /// Returns a receiver that flips to `true` once the worker has exited,
    /// or `None` if the session has no worker.
    pub fn cancel(&self, session_id: &SessionId) -> Option<watch::Receiver<bool>> {
        let entries = self.entries.lock();
        let entry = entries.get(session_id)?;
        entry.cancel.send_replace(Some(CancelReason::Stop));
        Some(entry.done.clone())
    }

    /// Ask every worker to exit for shutdown, returning their exit receivers.
    pub fn shutdown_all(&self) -> Vec<watch::Receiver<bool>> {
        self.entries
            .lock()
            .values()
            .map(|entry| {
                entry.cancel.send_replace(Some(CancelReason::Shutdown));
                entry.done.clone()
            })
            .collect()
    }

    /// Exit receiver for a session's worker, if it has one.
    #[must_use]
    pub fn done_signal(&self, session_id: &SessionId) -> Option<watch::Receiver<bool>> {
        self.entries.lock().get(session_id).map(|e| e.done.clone())
    }

    /// Whether the session currently has a worker.
    #[must_use]
    pub fn contains(&self, session_id: &SessionId) -> bool {
        self.entries.lock().contains_key(session_id)
    }

    /// Number of running workers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether no worker is running.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// Wait until an exit receiver reports the worker gone.
pub async fn wait_exited(mut done: watch::Receiver<bool>) {
    // A dropped sender also means the lease is gone.
    let _ = done.wait_for(|exited| *exited).await;
}

/// Exclusive right to mutate one session.
pub struct WorkerLease {
    registry: Arc<WorkerRegistry>,
    session_id: SessionId,
    cancel: watch::Receiver<Option<CancelReason>>,
    done: watch::Sender<bool>,
}

impl WorkerLease {
    /// The leased session.
    #[must_use]
    pub const fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Receiver that carries a reason once the worker should stop.
    #[must_use]
    pub fn cancel_signal(&self) -> watch::Receiver<Option<CancelReason>> {
        self.cancel.clone()
    }
}

impl Drop for WorkerLease {
    fn drop(&mut self) {
        self.registry.entries.lock().remove(&self.session_id);
        self.done.send_replace(true);
        tracing::debug!(session_id = %self.session_id, "Released worker lease");
    }
}
