//! Owner authentication extractor.
//!
//! This module provides the `OwnerContext` extractor that validates bearer
//! tokens and resolves the owner a request acts for.

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;

use indexswap_auth::{OwnerClaims, TokenValidator};
use indexswap_core::OwnerId;
use indexswap_engine::SessionManager;

use crate::error::ApiError;
use crate::state::AppState;

/// The owner a request acts for, taken from its bearer token.
#[derive(Debug, Clone)]
pub struct OwnerContext {
    /// The owner from the token's `sub` claim.
    pub owner: OwnerId,
}

impl From<OwnerClaims> for OwnerContext {
    fn from(claims: OwnerClaims) -> Self {
        Self {
            owner: claims.owner,
        }
    }
}

#[async_trait]
impl<M, V> FromRequestParts<Arc<AppState<M, V>>> for OwnerContext
where
    M: SessionManager + 'static,
    V: TokenValidator + 'static,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState<M, V>>,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or(ApiError::Unauthorized)?;

        let claims = state.validator.validate(token).await?;
        Ok(claims.into())
    }
}
