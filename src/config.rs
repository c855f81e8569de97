//! Configuration types for the bot risk agent.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};

/// Main configuration for the bot risk agent.
///
/// Loaded once at startup and shared read-only for the lifetime of the
/// process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BotRiskConfig {
    /// Application id issued by the risk service. Not read by the agent;
    /// kept so deployments can carry the full risk service configuration.
    pub app_id: String,

    /// Shared secret used to decrypt and authenticate risk cookies
    pub secret_key: String,

    /// Name of the risk cookie set on visitors
    pub cookie_name: String,

    /// Bearer token for the risk API
    pub api_token: String,

    /// Bot score at or above which a visitor is mitigated (0-100)
    pub score_threshold: u8,

    /// Master switch for evaluation
    pub enabled: bool,

    /// Upper bound on the PBKDF2 iteration count accepted from a cookie
    pub max_cookie_iterations: u32,

    /// Risk API endpoint settings
    pub api: ApiConfig,
}

impl Default for BotRiskConfig {
    fn default() -> Self {
        Self {
            app_id: String::new(),
            secret_key: String::new(),
            cookie_name: "_px".to_string(),
            api_token: String::new(),
            score_threshold: 70,
            enabled: true,
            max_cookie_iterations: 100_000,
            api: ApiConfig::default(),
        }
    }
}

impl BotRiskConfig {
    /// Check the settings that would otherwise fail on every request.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.secret_key.is_empty() {
            return Err(ConfigError::MissingSecret);
        }
        if self.score_threshold > 100 {
            return Err(ConfigError::ThresholdOutOfRange(self.score_threshold));
        }
        if self.api.timeout_ms == 0 {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }
}

/// Risk API endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL the routes are appended to
    pub base_url: String,

    /// Per-call timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://sapi.perimeterx.net/api/v1".to_string(),
            timeout_ms: 1000,
        }
    }
}

/// Runtime knobs consulted on every evaluation.
///
/// Implementations must be safe for unsynchronized concurrent reads.
pub trait RiskPolicy: Send + Sync {
    /// Current bot score threshold (0-100).
    fn score_threshold(&self) -> u8;

    /// Whether evaluation is switched on.
    fn enabled(&self) -> bool;
}

impl RiskPolicy for BotRiskConfig {
    fn score_threshold(&self) -> u8 {
        self.score_threshold
    }

    fn enabled(&self) -> bool {
        self.enabled
    }
}
