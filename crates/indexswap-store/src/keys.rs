//! Key encoding utilities for `RocksDB`.
//!
//! Index keys are fixed-width concatenations so that prefix scans return
//! every session for one owner or one status.

use indexswap_core::{OwnerId, SessionId};

use crate::error::{Result, StoreError};

const OWNER_LEN: usize = 32;
const SESSION_LEN: usize = 16;

/// Encode a session key (just the session ID bytes).
#[must_use]
pub fn session_key(session_id: &SessionId) -> Vec<u8> {
    session_id.as_bytes().to_vec()
}

/// Encode an owner-session index key: `owner_id || session_id`.
#[must_use]
pub fn owner_session_key(owner: &OwnerId, session_id: &SessionId) -> Vec<u8> {
    let mut key = Vec::with_capacity(OWNER_LEN + SESSION_LEN);
    key.extend_from_slice(owner.as_bytes());
    key.extend_from_slice(session_id.as_bytes());
    key
}

/// Encode an owner prefix for scanning all sessions by owner.
#[must_use]
pub fn owner_prefix(owner: &OwnerId) -> Vec<u8> {
    owner.as_bytes().to_vec()
}

/// Encode a status-session index key: `status || session_id`.
#[must_use]
pub fn status_session_key(status: u8, session_id: &SessionId) -> Vec<u8> {
    let mut key = Vec::with_capacity(1 + SESSION_LEN);
    key.push(status);
    key.extend_from_slice(session_id.as_bytes());
    key
}

/// Encode a status prefix for scanning all sessions by status.
#[must_use]
pub fn status_prefix(status: u8) -> Vec<u8> {
    vec![status]
}

/// Extract the session ID trailing an index key that starts with `prefix_len` bytes.
///
/// # Errors
///
/// Returns `StoreError::CorruptKey` if the key has the wrong length.
pub fn trailing_session_id(key: &[u8], prefix_len: usize) -> Result<SessionId> {
    let bytes: [u8; SESSION_LEN] = key
        .get(prefix_len..)
        .and_then(|tail| tail.try_into().ok())
        .ok_or(StoreError::CorruptKey { len: key.len() })?;
    Ok(SessionId::from_bytes(bytes))
}

/// Extract the session ID from an owner-session key.
///
/// # Errors
///
/// Returns `StoreError::CorruptKey` if the key is not 48 bytes.
pub fn session_id_from_owner_key(key: &[u8]) -> Result<SessionId> {
    trailing_session_id(key, OWNER_LEN)
}

/// Extract the session ID from a status-session key.
///
/// # Errors
///
/// Returns `StoreError::CorruptKey` if the key is not 17 bytes.
pub fn session_id_from_status_key(key: &[u8]) -> Result<SessionId> {
    trailing_session_id(key, 1)
}
