//! Owner token issuance and validation.
//!
//! Login mints an HS256 JWT whose `sub` is the owner id; every later request
//! presents it as a bearer token.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use indexswap_core::OwnerId;

use crate::error::{AuthError, Result};
use crate::AuthConfig;

/// Validated claims extracted from an owner token.
#[derive(Debug, Clone)]
pub struct OwnerClaims {
    /// The owner extracted from the `sub` claim.
    pub owner: OwnerId,
    /// Number of modules declared at login.
    pub num_modules: u32,
    /// When the token expires.
    pub expires_at: DateTime<Utc>,
}

/// A freshly minted token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    /// The owner the token was issued for.
    pub owner: OwnerId,
    /// The encoded JWT.
    pub token: String,
    /// When the token expires.
    pub expires_at: DateTime<Utc>,
}

/// Trait for validating owner tokens.
#[async_trait]
pub trait TokenValidator: Send + Sync {
    /// Validate a token and extract claims.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is invalid, expired, or cannot be validated.
    async fn validate(&self, token: &str) -> Result<OwnerClaims>;
}

#[derive(Debug, Serialize, Deserialize)]
struct RawClaims {
    iss: String,
    sub: String,
    #[serde(default)]
    num_modules: u32,
    iat: i64,
    exp: i64,
}

/// HMAC-signed token service.
pub struct TokenService {
    config: AuthConfig,
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl TokenService {
    /// Create a token service from its configuration.
    #[must_use]
    pub fn new(config: AuthConfig) -> Self {
        let encoding = EncodingKey::from_secret(config.secret.as_bytes());
        let decoding = DecodingKey::from_secret(config.secret.as_bytes());
        Self {
            config,
            encoding,
            decoding,
        }
    }

    /// Accept a login and mint a token for the derived owner.
    ///
    /// Only presence of the credentials is checked here; the password is
    /// never stored.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::LoginFailed` if a field is missing.
    pub fn login(&self, username: &str, password: &str, num_modules: u32) -> Result<IssuedToken> {
        if username.trim().is_empty() || password.is_empty() {
            return Err(AuthError::LoginFailed(
                "Username and password are required.".to_string(),
            ));
        }
        if num_modules == 0 {
            return Err(AuthError::LoginFailed(
                "Number of modules must be at least 1.".to_string(),
            ));
        }

        let owner = OwnerId::from_username(username);
        let issued = self.issue(owner, num_modules)?;
        tracing::info!(owner = %owner, num_modules, "Owner logged in");
        Ok(issued)
    }

    /// Mint a token for an owner.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Internal` if encoding fails.
    pub fn issue(&self, owner: OwnerId, num_modules: u32) -> Result<IssuedToken> {
        let now = Utc::now();
        let ttl = i64::try_from(self.config.token_ttl_seconds).unwrap_or(i64::MAX);
        let expires_at = now + Duration::seconds(ttl);

        let claims = RawClaims {
            iss: self.config.issuer.clone(),
            sub: owner.to_hex(),
            num_modules,
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AuthError::Internal(e.to_string()))?;

        Ok(IssuedToken {
            owner,
            token,
            expires_at,
        })
    }
}

#[async_trait]
impl TokenValidator for TokenService {
    async fn validate(&self, token: &str) -> Result<OwnerClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.config.issuer.as_str()]);
        validation.validate_exp = true;

        let token_data =
            decode::<RawClaims>(token, &self.decoding, &validation).map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
                jsonwebtoken::errors::ErrorKind::InvalidIssuer => AuthError::InvalidIssuer,
                jsonwebtoken::errors::ErrorKind::InvalidSignature => AuthError::InvalidSignature,
                jsonwebtoken::errors::ErrorKind::MissingRequiredClaim(claim) => {
                    AuthError::MissingClaim(claim.clone())
                }
                _ => AuthError::InvalidToken(e.to_string()),
            })?;

        let claims = token_data.claims;
        let owner = OwnerId::from_hex(&claims.sub).map_err(|_| AuthError::InvalidOwnerId)?;
        let expires_at = DateTime::from_timestamp(claims.exp, 0)
            .ok_or_else(|| AuthError::InvalidToken("invalid exp timestamp".to_string()))?;

        Ok(OwnerClaims {
            owner,
            num_modules: claims.num_modules,
            expires_at,
        })
    }
}

/// A mock token validator for testing.
///
/// Accepts any token in the format `test-token:<owner_hex>`.
#[cfg(any(test, feature = "test-utils"))]
#[derive(Debug, Default)]
pub struct MockTokenValidator;

#[cfg(any(test, feature = "test-utils"))]
impl MockTokenValidator {
    /// The token this validator accepts for `owner`.
    #[must_use]
    pub fn token_for(owner: &OwnerId) -> String {
        format!("test-token:{}", owner.to_hex())
    }
}

#[cfg(any(test, feature = "test-utils"))]
#[async_trait]
impl TokenValidator for MockTokenValidator {
    async fn validate(&self, token: &str) -> Result<OwnerClaims> {
        let hex = token
            .strip_prefix("test-token:")
            .ok_or_else(|| AuthError::InvalidToken("expected test-token:<owner>".to_string()))?;
        let owner = OwnerId::from_hex(hex).map_err(|_| AuthError::InvalidOwnerId)?;

        Ok(OwnerClaims {
            owner,
            num_modules: 1,
            expires_at: Utc::now() + Duration::hours(1),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> TokenService {
        TokenService::new(AuthConfig {
            secret: "unit-test-secret".to_string(),
            ..AuthConfig::default()
        })
    }

    #[tokio::test]
    async fn login_then_validate() {
        let service = service();
        let issued = service.login("alice", "hunter2", 2).unwrap();
        assert_eq!(issued.owner, OwnerId::from_username("alice"));

        let claims = service.validate(&issued.token).await.unwrap();
        assert_eq!(claims.owner, issued.owner);
        assert_eq!(claims.num_modules, 2);
    }

    #[test]
    fn login_requires_credentials() {
        let service = service();
        assert!(matches!(
            service.login("  ", "pw", 1),
            Err(AuthError::LoginFailed(_))
        ));
        assert!(matches!(
            service.login("alice", "", 1),
            Err(AuthError::LoginFailed(_))
        ));
        assert!(matches!(
            service.login("alice", "pw", 0),
            Err(AuthError::LoginFailed(_))
        ));
    }

    #[tokio::test]
    async fn rejects_foreign_signature() {
        let issued = service().login("alice", "pw", 1).unwrap();
        let other = TokenService::new(AuthConfig {
            secret: "another-secret".to_string(),
            ..AuthConfig::default()
        });
        assert!(matches!(
            other.validate(&issued.token).await,
            Err(AuthError::InvalidSignature)
        ));
    }

    #[tokio::test]
    async fn rejects_expired_token() {
        let service = service();
        let past = Utc::now() - Duration::hours(3);
        let claims = RawClaims {
            iss: AuthConfig::default().issuer,
            sub: OwnerId::from_username("alice").to_hex(),
            num_modules: 1,
            iat: past.timestamp(),
            exp: (past + Duration::hours(1)).timestamp(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(b"unit-test-secret"),
        )
        .unwrap();

        assert!(matches!(
            service.validate(&token).await,
            Err(AuthError::TokenExpired)
        ));
    }

    #[tokio::test]
    async fn rejects_garbage() {
        assert!(service().validate("not.a.jwt").await.is_err());
    }

    #[tokio::test]
    async fn mock_validator_round_trips_owner() {
        let owner = OwnerId::from_username("bob");
        let claims = MockTokenValidator
            .validate(&MockTokenValidator::token_for(&owner))
            .await
            .unwrap();
        assert_eq!(claims.owner, owner);
        assert!(MockTokenValidator.validate("Bearer nope").await.is_err());
    }
}
