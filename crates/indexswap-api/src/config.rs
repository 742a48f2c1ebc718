//! API configuration types.
//!
//! This module defines configuration structures for the HTTP service and the
//! environment variables that override them.

use std::time::Duration;

use indexswap_auth::AuthConfig;
use indexswap_engine::EngineConfig;
use serde::Deserialize;

/// Configuration for the API service.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Listen address (e.g., "0.0.0.0:8080").
    #[serde(default = "ApiConfig::default_listen_addr")]
    pub listen_addr: String,

    /// `RocksDB` directory. Sessions are kept in memory when unset.
    #[serde(default)]
    pub data_dir: Option<String>,

    /// Base URL of the registration system. Swaps never succeed when unset.
    #[serde(default)]
    pub registrar_url: Option<String>,

    /// HMAC secret for owner tokens.
    #[serde(default)]
    pub token_secret: Option<String>,

    /// Owner token lifetime in seconds.
    #[serde(default = "ApiConfig::default_token_ttl")]
    pub token_ttl_seconds: u64,

    /// Allowed CORS origins.
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    #[serde(default = "ApiConfig::default_max_body")]
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    #[serde(default = "ApiConfig::default_request_timeout")]
    pub request_timeout_seconds: u64,

    /// Seconds between purges of expired sessions.
    #[serde(default = "ApiConfig::default_purge_interval")]
    pub purge_interval_seconds: u64,

    /// Engine settings, read from their own environment variables.
    #[serde(skip)]
    pub engine: EngineConfig,
}

impl ApiConfig {
    fn default_listen_addr() -> String {
        "0.0.0.0:8080".to_string()
    }

    const fn default_token_ttl() -> u64 {
        3 * 60 * 60
    }

    const fn default_max_body() -> usize {
        64 * 1024
    }

    const fn default_request_timeout() -> u64 {
        30
    }

    const fn default_purge_interval() -> u64 {
        600 // 10 minutes
    }

    /// Load configuration from defaults overridden by environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = std::env::var("LISTEN_ADDR") {
            config.listen_addr = val;
        }
        if let Ok(val) = std::env::var("DATA_DIR") {
            config.data_dir = Some(val).filter(|v| !v.is_empty());
        }
        if let Ok(val) = std::env::var("REGISTRAR_URL") {
            config.registrar_url = Some(val).filter(|v| !v.is_empty());
        }
        if let Ok(val) = std::env::var("TOKEN_SECRET") {
            config.token_secret = Some(val).filter(|v| !v.is_empty());
        }
        if let Ok(val) = std::env::var("TOKEN_TTL_SECONDS") {
            match val.parse() {
                Ok(secs) => config.token_ttl_seconds = secs,
                Err(_) => tracing::warn!(value = %val, "Ignoring invalid TOKEN_TTL_SECONDS"),
            }
        }
        if let Ok(val) = std::env::var("CORS_ORIGINS") {
            config.cors_origins = parse_origins(&val);
        }
        if let Ok(val) = std::env::var("PURGE_INTERVAL_SECONDS") {
            match val.parse::<u64>() {
                Ok(secs) => config.purge_interval_seconds = secs.max(1),
                Err(_) => tracing::warn!(value = %val, "Ignoring invalid PURGE_INTERVAL_SECONDS"),
            }
        }

        config.engine = EngineConfig::from_env();
        config
    }

    /// Token settings derived from this configuration.
    ///
    /// Without a configured secret a random one is generated, so tokens do
    /// not survive a restart.
    #[must_use]
    pub fn auth_config(&self) -> AuthConfig {
        let secret = self.token_secret.clone().unwrap_or_else(|| {
            tracing::warn!("TOKEN_SECRET not set, using a per-process random secret");
            uuid::Uuid::new_v4().simple().to_string()
        });
        AuthConfig {
            secret,
            token_ttl_seconds: self.token_ttl_seconds,
            ..AuthConfig::default()
        }
    }

    /// Get the request timeout as a `Duration`.
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    /// Get the purge interval as a `Duration`.
    #[must_use]
    pub fn purge_interval(&self) -> Duration {
        Duration::from_secs(self.purge_interval_seconds)
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen_addr: Self::default_listen_addr(),
            data_dir: None,
            registrar_url: None,
            token_secret: None,
            token_ttl_seconds: Self::default_token_ttl(),
            cors_origins: vec!["*".to_string()],
            max_body_bytes: Self::default_max_body(),
            request_timeout_seconds: Self::default_request_timeout(),
            purge_interval_seconds: Self::default_purge_interval(),
            engine: EngineConfig::default(),
        }
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|o| !o.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ApiConfig::default();
        assert_eq!(config.listen_addr, "0.0.0.0:8080");
        assert_eq!(config.token_ttl_seconds, 10_800);
        assert!(config.data_dir.is_none());
        assert_eq!(config.cors_origins, vec!["*"]);
    }

    #[test]
    fn durations() {
        let config = ApiConfig::default();
        assert_eq!(config.request_timeout(), Duration::from_secs(30));
        assert_eq!(config.purge_interval(), Duration::from_secs(600));
    }

    #[test]
    fn deserialize_with_defaults() {
        let config: ApiConfig =
            serde_json::from_str(r#"{"listen_addr": "127.0.0.1:9000", "data_dir": "/tmp/x"}"#)
                .unwrap();
        assert_eq!(config.listen_addr, "127.0.0.1:9000");
        assert_eq!(config.data_dir.as_deref(), Some("/tmp/x"));
        assert_eq!(config.request_timeout_seconds, 30);
        assert_eq!(config.engine.poll_interval, Duration::from_secs(300));
    }

    #[test]
    fn origins_are_split() {
        assert_eq!(
            parse_origins("http://a.example, https://b.example,,"),
            vec!["http://a.example", "https://b.example"]
        );
    }

    #[test]
    fn configured_secret_is_used() {
        let config = ApiConfig {
            token_secret: Some("s3cret".to_string()),
            ..ApiConfig::default()
        };
        let auth = config.auth_config();
        assert_eq!(auth.secret, "s3cret");
        assert_eq!(auth.issuer, "indexswap");
    }
}
