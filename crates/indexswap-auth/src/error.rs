//! Authentication error types.

use thiserror::Error;

/// A result type using `AuthError`.
pub type Result<T> = std::result::Result<T, AuthError>;

/// Errors that can occur during authentication.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The token has expired.
    #[error("token expired")]
    TokenExpired,

    /// The token signature is invalid.
    #[error("invalid signature")]
    InvalidSignature,

    /// The token issuer does not match the expected value.
    #[error("invalid issuer")]
    InvalidIssuer,

    /// The owner ID in the token is malformed.
    #[error("invalid owner ID format")]
    InvalidOwnerId,

    /// Login was rejected.
    #[error("login failed: {0}")]
    LoginFailed(String),

    /// A required claim is missing from the token.
    #[error("missing required claim: {0}")]
    MissingClaim(String),

    /// The token format is invalid.
    #[error("invalid token format: {0}")]
    InvalidToken(String),

    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Returns the appropriate HTTP status code for this error.
    #[must_use]
    pub const fn http_status_code(&self) -> u16 {
        match self {
            Self::LoginFailed(_) => 400,
            Self::TokenExpired
            | Self::InvalidSignature
            | Self::InvalidIssuer
            | Self::InvalidOwnerId
            | Self::MissingClaim(_)
            | Self::InvalidToken(_) => 401,
            Self::Internal(_) => 500,
        }
    }
}
