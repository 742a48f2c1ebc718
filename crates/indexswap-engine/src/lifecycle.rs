//! Swap session status machine.
//!
//! A session is created `Processing` and leaves it exactly once. The four
//! terminal statuses never change again.
//!
//! # State Machine
//!
//! ```text
//!                      ┌──────────────┐
//!                      │  Processing  │
//!                      └──────┬───────┘
//!        ┌──────────────┬─────┴────────┬───────────────┐
//!        │ (all swapped)│ (fatal)      │ (deadline)    │ (stop)
//!        ▼              ▼              ▼               ▼
//!  ┌───────────┐  ┌──────────┐  ┌────────────┐  ┌───────────┐
//!  │ Completed │  │  Error   │  │ Timed Out  │  │  Stopped  │
//!  └───────────┘  └──────────┘  └────────────┘  └───────────┘
//! ```

use indexswap_core::SessionId;
use indexswap_store::SessionStatus;

use crate::error::{EngineError, Result};

/// Session message once every target has been swapped.
pub const COMPLETED_MESSAGE: &str = "All modules have been successfully swapped.";

/// Session message when the deadline passes first.
pub const TIMED_OUT_MESSAGE: &str = "Time limit reached before completing the swap.";

/// Session message after a user stop.
pub const STOPPED_MESSAGE: &str = "Swap successfully stopped.";

/// Session message after a fatal gateway failure.
#[must_use]
pub fn error_message(reason: &str) -> String {
    format!("An error occurred: {reason}")
}

/// Session message after too many consecutive degraded cycles.
#[must_use]
pub fn unavailable_message(reason: &str) -> String {
    format!("Registration system unavailable: {reason}")
}

/// Validates a status transition and returns the target status if valid.
///
/// # Errors
///
/// Returns `EngineError::InvalidTransition` if the transition is not allowed.
pub fn validate_transition(
    session_id: &SessionId,
    from: SessionStatus,
    to: SessionStatus,
) -> Result<SessionStatus> {
    if is_valid_transition(from, to) {
        Ok(to)
    } else {
        Err(EngineError::InvalidTransition {
            session_id: *session_id,
            from,
            to,
        })
    }
}

/// Check if a status transition is valid.
#[must_use]
pub const fn is_valid_transition(from: SessionStatus, to: SessionStatus) -> bool {
    use SessionStatus::{Completed, Error, Processing, Stopped, TimedOut};

    matches!((from, to), (Processing, Completed | Error | TimedOut | Stopped))
}

#[cfg(test)]
mod tests {
    use super::*;
    use SessionStatus::*;

    const ALL: [SessionStatus; 5] = [Processing, Completed, Error, TimedOut, Stopped];

    #[test]
    fn processing_reaches_every_terminal() {
        for to in [Completed, Error, TimedOut, Stopped] {
            assert!(is_valid_transition(Processing, to));
        }
        assert!(!is_valid_transition(Processing, Processing));
    }

    #[test]
    fn terminal_statuses_are_frozen() {
        for from in ALL.into_iter().filter(|s| s.is_terminal()) {
            for to in ALL {
                assert!(!is_valid_transition(from, to), "{from} -> {to}");
            }
        }
    }

    #[test]
    fn validate_transition_err() {
        let session_id = SessionId::generate();
        match validate_transition(&session_id, Completed, Stopped) {
            Err(EngineError::InvalidTransition { from, to, .. }) => {
                assert_eq!(from, Completed);
                assert_eq!(to, Stopped);
            }
            other => panic!("expected InvalidTransition, got {other:?}"),
        }
        assert_eq!(
            validate_transition(&session_id, Processing, TimedOut).unwrap(),
            TimedOut
        );
    }

    #[test]
    fn messages() {
        assert_eq!(error_message("boom"), "An error occurred: boom");
        assert!(unavailable_message("503").ends_with("503"));
    }
}
