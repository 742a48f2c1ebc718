//! Core types for indexswap.
//!
//! This crate provides the identifiers shared by every other indexswap crate:
//!
//! - **Identifiers**: `SessionId` for swap sessions, `OwnerId` for the logged-in user
//! - **Error types**: Common error definitions shared across crates
//!
//! # Example
//!
//! ```
//! use indexswap_core::{OwnerId, SessionId};
//!
//! // Owners are derived from the login name
//! let owner = OwnerId::from_username("alice");
//! assert_eq!(owner, OwnerId::from_hex(&owner.to_hex()).unwrap());
//!
//! // Sessions get a fresh random id
//! let session_id = SessionId::generate();
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod ids;

pub use error::{CoreError, Result};
pub use ids::{IdError, OwnerId, SessionId};
