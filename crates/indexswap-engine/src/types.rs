//! Request types and configuration for the swap engine.

use std::time::Duration;

use indexswap_store::ModuleSwapTarget;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Upper bound for the session TTL and the retention window.
pub const MAX_WINDOW: Duration = Duration::from_secs(366 * 24 * 60 * 60);

/// One module in a swap submission, as typed by the user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleRequest {
    /// The index currently held.
    pub old_index: String,
    /// Comma-separated candidate indexes.
    pub new_indexes: String,
}

/// A swap submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitSwapRequest {
    /// Number of modules the user declared.
    pub num_modules: usize,
    /// The modules to swap, in order.
    pub modules: Vec<ModuleRequest>,
}

impl SubmitSwapRequest {
    /// Parse the submission into swap targets.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InvalidRequest` if the module count does not
    /// match or any module lacks an old index or candidates.
    pub fn into_targets(self) -> Result<Vec<ModuleSwapTarget>> {
        if self.num_modules == 0 || self.modules.len() != self.num_modules {
            return Err(EngineError::InvalidRequest("Invalid module data".to_string()));
        }

        self.modules
            .iter()
            .enumerate()
            .map(|(i, module)| {
                let target = ModuleSwapTarget::from_input(&module.old_index, &module.new_indexes);
                if target.old_index.is_empty() || target.candidate_indexes.is_empty() {
                    return Err(EngineError::InvalidRequest(format!(
                        "Missing or invalid data for module {}",
                        i + 1
                    )));
                }
                Ok(target)
            })
            .collect()
    }
}

/// Configuration for the swap engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Time between poll cycles.
    pub poll_interval: Duration,
    /// How long a session may run before it times out.
    pub session_ttl: Duration,
    /// Consecutive degraded cycles tolerated before a session errors. `0` disables.
    pub max_consecutive_transient_cycles: u32,
    /// Maximum number of running workers across all owners.
    pub max_active_sessions: usize,
    /// Maximum number of running workers per owner.
    pub max_active_sessions_per_owner: usize,
    /// Maximum concurrent gateway calls across all workers. `None` is unlimited.
    pub gateway_concurrency: Option<usize>,
    /// How long terminal sessions are kept before purging.
    pub retention: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(300), // 5 minutes
            session_ttl: Duration::from_secs(2 * 60 * 60),
            max_consecutive_transient_cycles: 12,
            max_active_sessions: 200,
            max_active_sessions_per_owner: 1,
            gateway_concurrency: None,
            retention: Duration::from_secs(2 * 60 * 60),
        }
    }
}

impl EngineConfig {
    /// Build a configuration from defaults overridden by environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(secs) = env_parse::<u64>("POLL_INTERVAL_SECONDS") {
            config.poll_interval = Duration::from_secs(secs.max(1));
        }
        if let Some(secs) = env_parse::<u64>("SESSION_TTL_SECONDS") {
            config.session_ttl = clamp_window("SESSION_TTL_SECONDS", secs);
        }
        if let Some(n) = env_parse("MAX_TRANSIENT_CYCLES") {
            config.max_consecutive_transient_cycles = n;
        }
        if let Some(n) = env_parse("MAX_ACTIVE_SESSIONS") {
            config.max_active_sessions = n;
        }
        if let Some(n) = env_parse("MAX_SESSIONS_PER_OWNER") {
            config.max_active_sessions_per_owner = n;
        }
        if let Some(n) = env_parse::<usize>("GATEWAY_CONCURRENCY") {
            config.gateway_concurrency = (n > 0).then_some(n);
        }
        if let Some(secs) = env_parse::<u64>("RETENTION_SECONDS") {
            config.retention = clamp_window("RETENTION_SECONDS", secs);
        }

        config
    }

    /// Session TTL as a chrono duration, at most [`MAX_WINDOW`].
    #[must_use]
    pub fn session_ttl_chrono(&self) -> chrono::Duration {
        window_chrono(self.session_ttl)
    }

    /// Retention window as a chrono duration, at most [`MAX_WINDOW`].
    #[must_use]
    pub fn retention_chrono(&self) -> chrono::Duration {
        window_chrono(self.retention)
    }
}

fn window_chrono(window: Duration) -> chrono::Duration {
    chrono::Duration::from_std(window.min(MAX_WINDOW))
        .unwrap_or_else(|_| chrono::Duration::zero())
}

fn clamp_window(name: &str, secs: u64) -> Duration {
    let window = Duration::from_secs(secs);
    if window > MAX_WINDOW {
        tracing::warn!(
            var = name,
            value = secs,
            max = MAX_WINDOW.as_secs(),
            "Clamping oversized window"
        );
        return MAX_WINDOW;
    }
    window
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(var = name, value = %raw, "Ignoring unparseable environment variable");
            None
        }
    }
}
