//! Identifier types for indexswap.
//!
//! `SessionId` names one swap run; `OwnerId` names the user context that
//! created it. Both serialize as strings so they travel unchanged through
//! JSON bodies, URL paths and token claims.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A 32-byte owner identifier, hex-encoded for display.
///
/// Owners are derived from the login username with blake3, so the same user
/// always maps to the same id without the username itself being stored.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OwnerId([u8; 32]);

impl OwnerId {
    /// Create a new `OwnerId` from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Derive the `OwnerId` for a login username.
    ///
    /// Usernames are compared case-insensitively after trimming.
    #[must_use]
    pub fn from_username(username: &str) -> Self {
        let normalized = username.trim().to_lowercase();
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"indexswap-owner:");
        hasher.update(normalized.as_bytes());
        Self(*hasher.finalize().as_bytes())
    }

    /// Parse an `OwnerId` from a hex-encoded string.
    ///
    /// # Errors
    ///
    /// Returns an error if the string is not valid hex or not exactly 64 characters.
    pub fn from_hex(s: &str) -> Result<Self, IdError> {
        let bytes = hex::decode(s).map_err(|_| IdError::InvalidHex)?;
        let arr: [u8; 32] = bytes.try_into().map_err(|_| IdError::InvalidLength {
            expected: 32,
            got: s.len() / 2,
        })?;
        Ok(Self(arr))
    }

    /// Return the underlying bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Return the hex-encoded string representation.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "OwnerId({})", self.to_hex())
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for OwnerId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl TryFrom<String> for OwnerId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<OwnerId> for String {
    fn from(id: OwnerId) -> Self {
        id.to_hex()
    }
}

impl AsRef<[u8]> for OwnerId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// A 16-byte swap session identifier based on UUID v4.
///
/// Session IDs are randomly generated for each submission and never reused.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(uuid::Uuid);

impl SessionId {
    /// Create a `SessionId` from its 16 raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 16]) -> Self {
        Self(uuid::Uuid::from_bytes(bytes))
    }

    /// Generate a new random `SessionId`.
    #[must_use]
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// Return the bytes of the UUID.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl FromStr for SessionId {
    type Err = IdError;

    /// Parse a `SessionId` from a UUID string.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid = uuid::Uuid::parse_str(s).map_err(|_| IdError::InvalidUuid)?;
        Ok(Self(uuid))
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.0)
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for SessionId {
    type Error = IdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0.to_string()
    }
}

impl AsRef<[u8]> for SessionId {
    fn as_ref(&self) -> &[u8] {
        self.0.as_bytes()
    }
}

/// Errors that can occur when parsing identifiers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// The input string contains invalid hexadecimal characters.
    #[error("invalid hex encoding")]
    InvalidHex,

    /// The input has an incorrect length.
    #[error("invalid length: expected {expected} bytes, got {got}")]
    InvalidLength {
        /// The expected number of bytes.
        expected: usize,
        /// The actual number of bytes.
        got: usize,
    },

    /// The input is not a valid UUID.
    #[error("invalid UUID format")]
    InvalidUuid,
}
