//! The per-session swap loop.
//!
//! A `SwapWorker` owns the lease for one session and runs poll cycles until
//! the session reaches a terminal status:
//!
//! ```text
//!   tick ──► load session ──► for each unswapped target:
//!                               for each candidate (in order):
//!                                 check_vacancy ─► perform_swap
//!            commit (only while the stored copy is still Processing)
//!
//!   wait for next tick, deadline or cancellation, whichever comes first
//! ```
//!
//! Transient gateway failures leave the target untouched until the next
//! cycle. Fatal failures end the session in `Error`.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use indexswap_core::{OwnerId, SessionId};
use indexswap_store::{ModuleSwapTarget, SessionStatus, Store, StoreError, SwapSession};
use tokio::sync::{watch, OwnedSemaphorePermit, Semaphore};
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};

use crate::error::EngineError;
use crate::lifecycle::{self, COMPLETED_MESSAGE, STOPPED_MESSAGE, TIMED_OUT_MESSAGE};
use crate::registrar::{GatewayError, RegistrationGateway};
use crate::registry::{CancelReason, WorkerLease};

/// Knobs shared by every worker a manager starts.
#[derive(Clone)]
pub struct WorkerSettings {
    /// Time between cycles.
    pub poll_interval: Duration,
    /// Consecutive degraded cycles before escalating to `Error`. `0` disables.
    pub max_consecutive_transient_cycles: u32,
    /// Shared bound on concurrent gateway calls.
    pub limiter: Option<Arc<Semaphore>>,
}

/// Why a worker stopped running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// The worker moved the session to this terminal status.
    Finished(SessionStatus),
    /// The session was finished or deleted by someone else.
    Superseded,
    /// The process is shutting down; the session was left `Processing`.
    Shutdown,
}

enum TargetOutcome {
    Settled,
    Transient(GatewayError),
    Fatal(GatewayError),
    Cancelled(CancelReason),
}

enum CycleOutcome {
    Continue,
    Exit(WorkerExit),
}

/// Drives one swap session to completion.
pub struct SwapWorker<S: Store, G: RegistrationGateway> {
    lease: WorkerLease,
    store: Arc<S>,
    gateway: Arc<G>,
    settings: WorkerSettings,
    deadline: Instant,
    cancel: watch::Receiver<Option<CancelReason>>,
}

impl<S: Store, G: RegistrationGateway> SwapWorker<S, G> {
    /// Create a worker for the leased session, ending at `deadline`.
    #[must_use]
    pub fn new(
        lease: WorkerLease,
        store: Arc<S>,
        gateway: Arc<G>,
        settings: WorkerSettings,
        deadline: Instant,
    ) -> Self {
        let cancel = lease.cancel_signal();
        Self {
            lease,
            store,
            gateway,
            settings,
            deadline,
            cancel,
        }
    }

    fn session_id(&self) -> &SessionId {
        self.lease.session_id()
    }

    /// Run cycles until the session is terminal. The lease is released on return.
    pub async fn run(self) -> WorkerExit {
        let session_id = *self.session_id();
        tracing::info!(session_id = %session_id, "Swap worker started");

        let mut ticker = interval(self.settings.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let deadline = sleep_until(self.deadline);
        tokio::pin!(deadline);

        let mut degraded = 0u32;
        let exit = loop {
            tokio::select! {
                biased;
                reason = cancelled(self.cancel.clone()) => {
                    break match reason {
                        Some(CancelReason::Shutdown) => WorkerExit::Shutdown,
                        _ => self.finish(SessionStatus::Stopped, STOPPED_MESSAGE),
                    };
                }
                () = &mut deadline => {
                    break self.finish(SessionStatus::TimedOut, TIMED_OUT_MESSAGE);
                }
                _ = ticker.tick() => {}
            }

            match self.cycle(&mut degraded).await {
                Ok(CycleOutcome::Continue) => {}
                Ok(CycleOutcome::Exit(exit)) => break exit,
                Err(e) => {
                    tracing::error!(
                        session_id = %session_id,
                        error = %e,
                        "Swap cycle failed, retrying next cycle"
                    );
                }
            }
        };

        tracing::info!(session_id = %session_id, exit = ?exit, "Swap worker exited");
        exit
    }

    fn cancel_reason(&self) -> Option<CancelReason> {
        *self.cancel.borrow()
    }

    /// Move the stored session to a terminal status without touching targets.
    fn finish(&self, status: SessionStatus, message: &str) -> WorkerExit {
        match self
            .store
            .transition_status(self.session_id(), status, message, Utc::now())
        {
            Ok(Some(_)) => WorkerExit::Finished(status),
            Ok(None) | Err(StoreError::NotFound) => WorkerExit::Superseded,
            Err(e) => {
                tracing::error!(
                    session_id = %self.session_id(),
                    status = %status,
                    error = %e,
                    "Failed to persist terminal status"
                );
                WorkerExit::Superseded
            }
        }
    }

    async fn cycle(&self, degraded: &mut u32) -> Result<CycleOutcome, EngineError> {
        let Some(mut session) = self.store.get_session(self.session_id())? else {
            return Ok(CycleOutcome::Exit(WorkerExit::Superseded));
        };
        if session.is_terminal() {
            return Ok(CycleOutcome::Exit(WorkerExit::Superseded));
        }

        let owner = session.owner;
        let mut last_transient = None;
        let mut ended = None;
        let mut interrupted = None;

        for target in session.targets.iter_mut().filter(|t| !t.swapped) {
            match self.attempt_target(&owner, target).await {
                TargetOutcome::Settled => {}
                TargetOutcome::Transient(e) => {
                    tracing::warn!(
                        session_id = %self.session_id(),
                        old_index = %target.old_index,
                        error = %e,
                        "Transient gateway failure, retrying next cycle"
                    );
                    last_transient = Some(e);
                }
                TargetOutcome::Fatal(e) => {
                    ended = Some((SessionStatus::Error, lifecycle::error_message(e.reason())));
                    break;
                }
                TargetOutcome::Cancelled(reason) => {
                    interrupted = Some(reason);
                    break;
                }
            }
        }

        match interrupted {
            Some(CancelReason::Stop) => {
                ended = Some((SessionStatus::Stopped, STOPPED_MESSAGE.to_string()));
            }
            Some(CancelReason::Shutdown) => {
                // Keep whatever this cycle swapped; the next process resumes the rest.
                self.store.update_if_processing(&session)?;
                return Ok(CycleOutcome::Exit(WorkerExit::Shutdown));
            }
            None => {}
        }

        if let Some((status, message)) = ended {
            return self.commit_terminal(session, status, message);
        }

        session.last_polled_at = Some(Utc::now());

        if session.all_swapped() {
            return self.commit_terminal(
                session,
                SessionStatus::Completed,
                COMPLETED_MESSAGE.to_string(),
            );
        }

        match last_transient {
            Some(e) => {
                *degraded += 1;
                let limit = self.settings.max_consecutive_transient_cycles;
                if limit > 0 && *degraded >= limit {
                    let message = lifecycle::unavailable_message(e.reason());
                    return self.commit_terminal(session, SessionStatus::Error, message);
                }
            }
            None => *degraded = 0,
        }

        if self.store.update_if_processing(&session)? {
            tracing::debug!(session_id = %session.session_id, "Cycle committed");
            Ok(CycleOutcome::Continue)
        } else {
            Ok(CycleOutcome::Exit(WorkerExit::Superseded))
        }
    }

    /// Commit the cycle's target outcomes together with a terminal status.
    fn commit_terminal(
        &self,
        mut session: SwapSession,
        status: SessionStatus,
        message: String,
    ) -> Result<CycleOutcome, EngineError> {
        let status = lifecycle::validate_transition(&session.session_id, session.status, status)?;
        let now = Utc::now();
        session.status = status;
        session.message = message;
        session.last_polled_at = Some(now);
        session.finished_at = Some(now);

        if self.store.update_if_processing(&session)? {
            tracing::info!(
                session_id = %session.session_id,
                status = %status,
                message = %session.message,
                "Session finished"
            );
            Ok(CycleOutcome::Exit(WorkerExit::Finished(status)))
        } else {
            Ok(CycleOutcome::Exit(WorkerExit::Superseded))
        }
    }

    async fn permit(&self) -> Option<OwnedSemaphorePermit> {
        match &self.settings.limiter {
            Some(limiter) => Arc::clone(limiter).acquire_owned().await.ok(),
            None => None,
        }
    }

    async fn attempt_target(
        &self,
        owner: &OwnerId,
        target: &mut ModuleSwapTarget,
    ) -> TargetOutcome {
        let mut no_vacancy = Vec::new();
        let mut rejected = Vec::new();

        for candidate in target.candidate_indexes.clone() {
            let vacancy = {
                let _permit = self.permit().await;
                if let Some(reason) = self.cancel_reason() {
                    return TargetOutcome::Cancelled(reason);
                }
                self.gateway.check_vacancy(owner, &candidate).await
            };
            match vacancy {
                Ok(true) => {}
                Ok(false) => {
                    no_vacancy.push(candidate);
                    continue;
                }
                Err(e) => return classify(e),
            }

            let swapped = {
                let _permit = self.permit().await;
                if let Some(reason) = self.cancel_reason() {
                    return TargetOutcome::Cancelled(reason);
                }
                self.gateway
                    .perform_swap(owner, &target.old_index, &candidate)
                    .await
            };
            match swapped {
                Ok(true) => {
                    tracing::info!(
                        session_id = %self.session_id(),
                        old_index = %target.old_index,
                        new_index = %candidate,
                        "Swap succeeded"
                    );
                    target.message =
                        format!("Successfully swapped {} -> {candidate}", target.old_index);
                    target.swapped = true;
                    return TargetOutcome::Settled;
                }
                Ok(false) => rejected.push(candidate),
                Err(e) => return classify(e),
            }
        }

        target.message = no_progress_message(&target.old_index, &no_vacancy, &rejected);
        TargetOutcome::Settled
    }
}

async fn cancelled(mut cancel: watch::Receiver<Option<CancelReason>>) -> Option<CancelReason> {
    // A closed channel means the lease is gone, which only happens on stop.
    cancel.wait_for(Option::is_some).await.ok().and_then(|reason| *reason)
}

fn classify(e: GatewayError) -> TargetOutcome {
    if e.is_retriable() {
        TargetOutcome::Transient(e)
    } else {
        TargetOutcome::Fatal(e)
    }
}

fn no_progress_message(old_index: &str, no_vacancy: &[String], rejected: &[String]) -> String {
    let vacancies = format!("Index {} have no vacancies.", no_vacancy.join(", "));
    let rejections = format!("Swap {old_index} -> {} was not accepted.", rejected.join(", "));
    match (no_vacancy.is_empty(), rejected.is_empty()) {
        (false, true) => vacancies,
        (true, false) => rejections,
        (false, false) => format!("{vacancies} {rejections}"),
        (true, true) => "No candidate indexes to try.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registrar::mock::{GatewayCall, ScriptedGateway};
    use crate::registry::WorkerRegistry;
    use indexswap_store::MemoryStore;

    const FIVE_MIN: Duration = Duration::from_secs(300);
    const TWO_HOURS: Duration = Duration::from_secs(7200);

    struct Harness {
        store: Arc<MemoryStore>,
        gateway: Arc<ScriptedGateway>,
        registry: Arc<WorkerRegistry>,
        session_id: SessionId,
    }

    impl Harness {
        fn new(targets: Vec<ModuleSwapTarget>) -> Self {
            let store = Arc::new(MemoryStore::new());
            let session = SwapSession::new(
                OwnerId::from_bytes([9u8; 32]),
                targets,
                Utc::now(),
                chrono::Duration::hours(2),
            );
            store.put_session(&session).unwrap();
            Self {
                store,
                gateway: Arc::new(ScriptedGateway::new()),
                registry: Arc::new(WorkerRegistry::new()),
                session_id: session.session_id,
            }
        }

        fn worker(&self, max_transient: u32) -> SwapWorker<MemoryStore, ScriptedGateway> {
            let lease = self
                .registry
                .acquire(self.session_id, OwnerId::from_bytes([9u8; 32]), None)
                .unwrap();
            SwapWorker::new(
                lease,
                Arc::clone(&self.store),
                Arc::clone(&self.gateway),
                WorkerSettings {
                    poll_interval: FIVE_MIN,
                    max_consecutive_transient_cycles: max_transient,
                    limiter: None,
                },
                Instant::now() + TWO_HOURS,
            )
        }

        fn session(&self) -> SwapSession {
            self.store.get_session(&self.session_id).unwrap().unwrap()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn two_targets_complete_on_third_cycle() {
        let h = Harness::new(vec![
            ModuleSwapTarget::from_input("80271", "80275, 80276"),
            ModuleSwapTarget::from_input("80300", "80301"),
        ]);
        h.gateway.script_vacancy("80275", [Ok(true)]);
        h.gateway.script_vacancy("80301", [Ok(false), Ok(false), Ok(true)]);

        let start = Instant::now();
        let exit = h.worker(12).run().await;

        assert_eq!(exit, WorkerExit::Finished(SessionStatus::Completed));
        assert_eq!(start.elapsed(), 2 * FIVE_MIN);

        let session = h.session();
        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.message, COMPLETED_MESSAGE);
        assert!(session.targets.iter().all(|t| t.swapped));
        assert_eq!(session.targets[0].message, "Successfully swapped 80271 -> 80275");
        assert_eq!(session.targets[1].message, "Successfully swapped 80300 -> 80301");

        // Target 1 was only polled on the first cycle, 80276 never.
        assert_eq!(h.gateway.vacancy_checks("80275"), 1);
        assert_eq!(h.gateway.vacancy_checks("80276"), 0);
        assert_eq!(h.gateway.vacancy_checks("80301"), 3);
        assert!(h.registry.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn never_vacant_times_out_at_deadline() {
        let h = Harness::new(vec![ModuleSwapTarget::from_input("80271", "80275")]);

        let start = Instant::now();
        let exit = h.worker(12).run().await;

        assert_eq!(exit, WorkerExit::Finished(SessionStatus::TimedOut));
        assert_eq!(start.elapsed(), TWO_HOURS);

        let session = h.session();
        assert_eq!(session.status, SessionStatus::TimedOut);
        assert_eq!(session.message, TIMED_OUT_MESSAGE);
        assert!(!session.targets[0].swapped);
        assert_eq!(session.targets[0].message, "Index 80275 have no vacancies.");
        // Cycles at 0, 5, ..., 115 minutes.
        assert_eq!(h.gateway.vacancy_checks("80275"), 24);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_keeps_cadence_and_message() {
        let h = Harness::new(vec![ModuleSwapTarget::from_input("80271", "80275, 80276")]);
        h.gateway
            .script_vacancy("80275", [Err(GatewayError::Transient("502".into())), Ok(true)]);

        let worker = h.worker(12);
        let start = Instant::now();
        let handle = tokio::spawn(worker.run());

        tokio::time::sleep(Duration::from_secs(10)).await;
        let session = h.session();
        assert_eq!(session.status, SessionStatus::Processing);
        assert_eq!(session.targets[0].message, indexswap_store::TARGET_PENDING_MESSAGE);
        assert!(session.last_polled_at.is_some());
        // The rest of the target's candidates are skipped for the cycle.
        assert_eq!(h.gateway.vacancy_checks("80276"), 0);

        // No early retry: the second check waits for the regular tick.
        tokio::time::sleep(FIVE_MIN - Duration::from_secs(11)).await;
        assert_eq!(h.gateway.vacancy_checks("80275"), 1);

        let exit = handle.await.unwrap();
        assert_eq!(exit, WorkerExit::Finished(SessionStatus::Completed));
        assert_eq!(start.elapsed(), FIVE_MIN);
        assert_eq!(
            h.gateway.calls(),
            vec![
                GatewayCall::CheckVacancy("80275".into()),
                GatewayCall::CheckVacancy("80275".into()),
                GatewayCall::PerformSwap("80271".into(), "80275".into()),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_failure_ends_in_error() {
        let h = Harness::new(vec![ModuleSwapTarget::from_input("80271", "80275")]);
        h.gateway.script_vacancy(
            "80275",
            [Err(GatewayError::Fatal("portal session expired".into()))],
        );

        let start = Instant::now();
        let exit = h.worker(12).run().await;

        assert_eq!(exit, WorkerExit::Finished(SessionStatus::Error));
        assert_eq!(start.elapsed(), Duration::ZERO);
        assert_eq!(
            h.session().message,
            "An error occurred: portal session expired"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_transient_failures_escalate() {
        let h = Harness::new(vec![ModuleSwapTarget::from_input("80271", "80275")]);
        h.gateway
            .set_default_vacancy(Err(GatewayError::Transient("registrar down".into())));

        let start = Instant::now();
        let exit = h.worker(3).run().await;

        assert_eq!(exit, WorkerExit::Finished(SessionStatus::Error));
        assert_eq!(start.elapsed(), 2 * FIVE_MIN);
        assert_eq!(
            h.session().message,
            "Registration system unavailable: registrar down"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_swap_moves_to_next_candidate() {
        let h = Harness::new(vec![ModuleSwapTarget::from_input("80271", "80275, 80276")]);
        h.gateway.script_vacancy("80275", [Ok(true)]);
        h.gateway.script_swap("80271", "80275", [Ok(false)]);
        h.gateway.script_vacancy("80276", [Ok(true)]);

        let exit = h.worker(12).run().await;

        assert_eq!(exit, WorkerExit::Finished(SessionStatus::Completed));
        assert_eq!(
            h.session().targets[0].message,
            "Successfully swapped 80271 -> 80276"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_wait() {
        let h = Harness::new(vec![ModuleSwapTarget::from_input("80271", "80275")]);
        let worker = h.worker(12);
        let start = Instant::now();
        let handle = tokio::spawn(worker.run());

        tokio::time::sleep(Duration::from_secs(60)).await;
        let done = h.registry.cancel(&h.session_id).unwrap();
        crate::registry::wait_exited(done).await;

        assert!(start.elapsed() < FIVE_MIN);
        assert_eq!(
            handle.await.unwrap(),
            WorkerExit::Finished(SessionStatus::Stopped)
        );
        assert_eq!(h.session().status, SessionStatus::Stopped);
        assert_eq!(h.gateway.vacancy_checks("80275"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_during_swap_records_the_swap() {
        let h = Harness::new(vec![
            ModuleSwapTarget::from_input("80271", "80275"),
            ModuleSwapTarget::from_input("80300", "80301"),
        ]);
        h.gateway.script_vacancy("80275", [Ok(true)]);
        h.gateway.set_swap_delay(Duration::from_secs(10));
        let start = Instant::now();
        let handle = tokio::spawn(h.worker(12).run());

        tokio::time::sleep(Duration::from_secs(1)).await;
        let done = h.registry.cancel(&h.session_id).unwrap();
        crate::registry::wait_exited(done).await;

        assert_eq!(start.elapsed(), Duration::from_secs(10));
        assert_eq!(
            handle.await.unwrap(),
            WorkerExit::Finished(SessionStatus::Stopped)
        );
        let session = h.session();
        assert_eq!(session.status, SessionStatus::Stopped);
        assert!(session.targets[0].swapped);
        assert!(!session.targets[1].swapped);
        assert_eq!(h.gateway.vacancy_checks("80301"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn externally_finished_session_supersedes_worker() {
        let h = Harness::new(vec![ModuleSwapTarget::from_input("80271", "80275")]);
        let handle = tokio::spawn(h.worker(12).run());

        tokio::time::sleep(Duration::from_secs(1)).await;
        h.store.delete_session(&h.session_id).unwrap();

        assert_eq!(handle.await.unwrap(), WorkerExit::Superseded);
        assert!(h.registry.is_empty());
    }

    #[test]
    fn progress_messages() {
        let v = |s: &[&str]| s.iter().map(ToString::to_string).collect::<Vec<_>>();
        assert_eq!(
            no_progress_message("1", &v(&["2", "3"]), &[]),
            "Index 2, 3 have no vacancies."
        );
        assert_eq!(
            no_progress_message("1", &[], &v(&["2"])),
            "Swap 1 -> 2 was not accepted."
        );
    }
}
