//! Domain types stored in the database.
//!
//! These types represent the persisted state of swap sessions and the
//! module targets inside them.

use chrono::{DateTime, Duration, Utc};
use indexswap_core::{OwnerId, SessionId};
use serde::{Deserialize, Serialize};

/// Message every target starts with before its first cycle.
pub const TARGET_PENDING_MESSAGE: &str = "Pending...";

/// Message every session starts with.
pub const SESSION_PROCESSING_MESSAGE: &str = "Your swap request is being processed.";

/// One requested swap: an index the user holds and the indexes they would take instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleSwapTarget {
    /// The index currently held.
    pub old_index: String,
    /// Candidate indexes, tried in order.
    pub candidate_indexes: Vec<String>,
    /// Whether the swap has gone through. Never reset once true.
    pub swapped: bool,
    /// Outcome of the most recent attempt.
    pub message: String,
}

impl ModuleSwapTarget {
    /// Create an unswapped target.
    #[must_use]
    pub fn new(old_index: impl Into<String>, candidate_indexes: Vec<String>) -> Self {
        Self {
            old_index: old_index.into().trim().to_string(),
            candidate_indexes,
            swapped: false,
            message: TARGET_PENDING_MESSAGE.to_string(),
        }
    }

    /// Build a target from the comma-separated candidate list users type in.
    #[must_use]
    pub fn from_input(old_index: &str, new_indexes: &str) -> Self {
        Self::new(old_index, parse_candidates(new_indexes))
    }

    /// Candidates joined the way they are displayed back to the user.
    #[must_use]
    pub fn candidates_display(&self) -> String {
        self.candidate_indexes.join(", ")
    }
}

/// Split a comma-separated index list, trimming entries and dropping empties.
#[must_use]
pub fn parse_candidates(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

/// Status of a swap session.
///
/// The serialized names are the strings shown to users.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SessionStatus {
    /// A worker is polling the registration system.
    Processing = 1,
    /// Every target was swapped.
    Completed = 2,
    /// The registration system reported an unrecoverable failure.
    Error = 3,
    /// The deadline passed first.
    #[serde(rename = "Timed Out")]
    TimedOut = 4,
    /// The user stopped the session.
    Stopped = 5,
}

impl SessionStatus {
    /// Convert the status to its numeric representation.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    /// Try to convert a numeric value to a `SessionStatus`.
    #[must_use]
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Processing),
            2 => Some(Self::Completed),
            3 => Some(Self::Error),
            4 => Some(Self::TimedOut),
            5 => Some(Self::Stopped),
            _ => None,
        }
    }

    /// Whether the session has left `Processing` for good.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Processing)
    }

    /// Display name, identical to the serialized form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Processing => "Processing",
            Self::Completed => "Completed",
            Self::Error => "Error",
            Self::TimedOut => "Timed Out",
            Self::Stopped => "Stopped",
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A swap session record stored in the database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwapSession {
    /// Unique identifier for the session.
    pub session_id: SessionId,
    /// User context that submitted the session.
    pub owner: OwnerId,
    /// Targets in submission order.
    pub targets: Vec<ModuleSwapTarget>,
    /// Current status.
    pub status: SessionStatus,
    /// Session-level message.
    pub message: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Hard deadline, fixed at creation.
    pub deadline_at: DateTime<Utc>,
    /// When the most recent cycle finished.
    #[serde(default)]
    pub last_polled_at: Option<DateTime<Utc>>,
    /// When the session left `Processing`.
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

impl SwapSession {
    /// Create a new `Processing` session with a deadline `ttl` after `now`.
    ///
    /// A deadline past the representable range saturates.
    #[must_use]
    pub fn new(
        owner: OwnerId,
        targets: Vec<ModuleSwapTarget>,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> Self {
        Self {
            session_id: SessionId::generate(),
            owner,
            targets,
            status: SessionStatus::Processing,
            message: SESSION_PROCESSING_MESSAGE.to_string(),
            created_at: now,
            deadline_at: now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
            last_polled_at: None,
            finished_at: None,
        }
    }

    /// Whether every target has been swapped.
    #[must_use]
    pub fn all_swapped(&self) -> bool {
        self.targets.iter().all(|t| t.swapped)
    }

    /// Whether the session is terminal.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Time left before the deadline, zero if it has passed.
    #[must_use]
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.deadline_at - now).max(Duration::zero())
    }
}
