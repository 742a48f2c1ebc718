//! Owner authentication for indexswap.
//!
//! Logging in yields a signed owner token; every other API call presents it
//! and is scoped to the owner it names.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐  login   ┌──────────────────┐
//! │   API layer      │─────────▶│   TokenService   │
//! │   (HTTP)         │          │   (HS256 JWT)    │
//! └────────┬─────────┘          └────────▲─────────┘
//!          │ bearer token                │ impl
//!          │                    ┌────────┴─────────┐
//!          └───────────────────▶│  TokenValidator  │
//!                               │  (trait)         │
//!                               └──────────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use indexswap_auth::{AuthConfig, TokenService, TokenValidator};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let service = TokenService::new(AuthConfig {
//!     secret: "change-me".to_string(),
//!     ..AuthConfig::default()
//! });
//!
//! let issued = service.login("alice", "password", 2)?;
//! let claims = service.validate(&issued.token).await?;
//! assert_eq!(claims.owner, issued.owner);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod jwt;

pub use error::{AuthError, Result};
pub use jwt::{IssuedToken, OwnerClaims, TokenService, TokenValidator};

#[cfg(any(test, feature = "test-utils"))]
pub use jwt::MockTokenValidator;

/// Configuration for owner tokens.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// HMAC secret used to sign tokens.
    pub secret: String,
    /// Expected `iss` claim.
    pub issuer: String,
    /// Token lifetime in seconds.
    pub token_ttl_seconds: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            issuer: "indexswap".to_string(),
            // Must exceed the session deadline.
            token_ttl_seconds: 3 * 60 * 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = AuthConfig::default();
        assert_eq!(config.issuer, "indexswap");
        assert_eq!(config.token_ttl_seconds, 10_800);
    }

    #[test]
    fn auth_error_status_codes() {
        assert_eq!(AuthError::TokenExpired.http_status_code(), 401);
        assert_eq!(AuthError::InvalidSignature.http_status_code(), 401);
        assert_eq!(AuthError::LoginFailed("x".into()).http_status_code(), 400);
        assert_eq!(AuthError::Internal("x".into()).http_status_code(), 500);
    }
}
