use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, GatewayResult};

/// Top-level gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub environment: Environment,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub realtime: RealtimeConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            cors_origins: vec![],
        }
    }
}

/// Deployment environment. Development widens every rate-limit budget
/// uniformly to ease local testing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    #[default]
    Production,
}

impl Environment {
    pub fn is_development(self) -> bool {
        self == Environment::Development
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret used to verify bearer tokens minted by the auth service.
    #[serde(default = "default_auth_secret")]
    pub secret: String,
    /// Maximum accepted token age in seconds.
    #[serde(default = "default_token_max_age")]
    pub token_max_age_secs: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret: default_auth_secret(),
            token_max_age_secs: default_token_max_age(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Salt mixed into anonymous client fingerprints. A fresh per-process
    /// salt is generated when left empty.
    #[serde(default)]
    pub anon_salt: String,
    /// Budget multiplier applied to authenticated callers on scalable
    /// endpoints (session creation, default fallback).
    #[serde(default = "default_auth_multiplier")]
    pub auth_multiplier: u64,
    /// Budget multiplier applied to every endpoint in development.
    #[serde(default = "default_dev_multiplier")]
    pub dev_multiplier: u64,
    /// Idle window entries older than this are evicted by the cleanup task.
    #[serde(default = "default_max_idle")]
    pub max_idle_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            anon_salt: String::new(),
            auth_multiplier: default_auth_multiplier(),
            dev_multiplier: default_dev_multiplier(),
            max_idle_secs: default_max_idle(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeConfig {
    /// Connections silent for longer than this are reaped.
    #[serde(default = "default_heartbeat_timeout")]
    pub heartbeat_timeout_mins: u64,
    /// Interval between reaper sweeps.
    #[serde(default = "default_reap_interval")]
    pub reap_interval_secs: u64,
    /// Upper bound on a single notification write; a slower write counts
    /// as a send failure.
    #[serde(default = "default_send_timeout")]
    pub send_timeout_ms: u64,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            heartbeat_timeout_mins: default_heartbeat_timeout(),
            reap_interval_secs: default_reap_interval(),
            send_timeout_ms: default_send_timeout(),
        }
    }
}

// Default value helpers
fn default_listen() -> String {
    "127.0.0.1:8001".to_string()
}
fn default_true() -> bool {
    true
}
fn default_auth_secret() -> String {
    String::new()
}
fn default_token_max_age() -> u64 {
    86_400
}
fn default_auth_multiplier() -> u64 {
    2
}
fn default_dev_multiplier() -> u64 {
    3
}
fn default_max_idle() -> u64 {
    3600
}
fn default_heartbeat_timeout() -> u64 {
    5
}
fn default_reap_interval() -> u64 {
    60
}
fn default_send_timeout() -> u64 {
    5000
}

impl AppConfig {
    /// Load configuration from a YAML file.
    pub fn load(path: &str) -> GatewayResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)
            .map_err(|e| GatewayError::Config(format!("failed to parse {path}: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration for consistency.
    pub fn validate(&self) -> GatewayResult<()> {
        if self.server.listen.is_empty() {
            return Err(GatewayError::Config(
                "server.listen must not be empty".to_string(),
            ));
        }

        if self.environment == Environment::Production && self.auth.secret.is_empty() {
            return Err(GatewayError::Config(
                "auth.secret must be set in production".to_string(),
            ));
        }

        if self.rate_limit.auth_multiplier == 0 {
            return Err(GatewayError::Config(
                "rate_limit.auth_multiplier must be at least 1".to_string(),
            ));
        }
        if self.rate_limit.dev_multiplier == 0 {
            return Err(GatewayError::Config(
                "rate_limit.dev_multiplier must be at least 1".to_string(),
            ));
        }

        if self.realtime.heartbeat_timeout_mins == 0 {
            return Err(GatewayError::Config(
                "realtime.heartbeat_timeout_mins must be at least 1".to_string(),
            ));
        }
        if self.realtime.reap_interval_secs == 0 {
            return Err(GatewayError::Config(
                "realtime.reap_interval_secs must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}
