//! API application state.
//!
//! This module defines the shared state that is available to all request handlers.

use std::sync::Arc;

use indexswap_auth::{TokenService, TokenValidator};
use indexswap_engine::SessionManager;

use crate::config::ApiConfig;

/// Shared application state for the API.
///
/// This struct holds references to all services needed by the HTTP handlers.
pub struct AppState<M, V>
where
    M: SessionManager,
    V: TokenValidator,
{
    /// The session manager.
    pub manager: Arc<M>,
    /// Issues owner tokens at login.
    pub tokens: Arc<TokenService>,
    /// Validates bearer tokens on every other route.
    pub validator: Arc<V>,
    /// API configuration.
    pub config: ApiConfig,
}

impl<M, V> AppState<M, V>
where
    M: SessionManager,
    V: TokenValidator,
{
    /// Create a new application state.
    #[must_use]
    pub fn new(
        manager: Arc<M>,
        tokens: Arc<TokenService>,
        validator: Arc<V>,
        config: ApiConfig,
    ) -> Self {
        Self {
            manager,
            tokens,
            validator,
            config,
        }
    }
}

impl<M, V> Clone for AppState<M, V>
where
    M: SessionManager,
    V: TokenValidator,
{
    fn clone(&self) -> Self {
        Self {
            manager: Arc::clone(&self.manager),
            tokens: Arc::clone(&self.tokens),
            validator: Arc::clone(&self.validator),
            config: self.config.clone(),
        }
    }
}
