//! Database schema definitions and column families.
//!
//! This module defines the column families used in `RocksDB` storage.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Primary swap session records, keyed by `session_id`.
    pub const SESSIONS: &str = "sessions";

    /// Index: sessions by owner, keyed by `owner_id || session_id`.
    pub const SESSIONS_BY_OWNER: &str = "sessions_by_owner";

    /// Index: sessions by status, keyed by `status || session_id`.
    pub const SESSIONS_BY_STATUS: &str = "sessions_by_status";
}

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![cf::SESSIONS, cf::SESSIONS_BY_OWNER, cf::SESSIONS_BY_STATUS]
}
