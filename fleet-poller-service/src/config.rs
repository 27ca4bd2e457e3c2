//! Service configuration loading and validation
//!
//! Values come from an optional TOML file, then environment variables
//! override individual fields. Validation runs before anything starts
//! polling: a missing API key or an out-of-range interval aborts startup.

use anyhow::{bail, Context, Result};
use fleet_poller::config::MAX_MINUTES_WINDOW;
use fleet_poller::PollerConfig;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

/// Main service configuration (loaded from config.toml)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ServiceConfig {
    pub api: ApiConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub server: ServerConfig,
    /// Verbose logging regardless of CLI flags
    #[serde(default)]
    pub debug: bool,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ApiConfig {
    /// Vendor API endpoint, e.g. "https://api.example-telemetry.com/api.php"
    #[serde(default)]
    pub base_url: String,
    /// API key passed through on every request (required)
    #[serde(default)]
    pub api_key: String,
    /// Secondary user key, when the vendor account uses one
    #[serde(default)]
    pub user_key: Option<String>,
    /// Account identifier mixed into hashed fallback identities
    #[serde(default)]
    pub account_id: Option<String>,
    /// Custom field name tried first during identity resolution
    #[serde(default)]
    pub identity_field: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PollConfig {
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_minutes_window")]
    pub minutes_window: u32,
    #[serde(default = "default_history_retention_minutes")]
    pub history_retention_minutes: u32,
    #[serde(default = "default_backoff_max_secs")]
    pub backoff_max_secs: u64,
    #[serde(default = "default_backoff_reset_successes")]
    pub backoff_reset_successes: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            minutes_window: default_minutes_window(),
            history_retention_minutes: default_history_retention_minutes(),
            backoff_max_secs: default_backoff_max_secs(),
            backoff_reset_successes: default_backoff_reset_successes(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Address the read API binds to
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_interval_secs() -> u64 {
    30
}

fn default_fetch_timeout_secs() -> u64 {
    15
}

fn default_minutes_window() -> u32 {
    60
}

fn default_history_retention_minutes() -> u32 {
    120
}

fn default_backoff_max_secs() -> u64 {
    300
}

fn default_backoff_reset_successes() -> u32 {
    1
}

fn default_bind() -> String {
    "0.0.0.0:8080".to_string()
}

/// Load configuration from an optional TOML file plus environment overrides
pub fn load_config(path: Option<&Path>) -> Result<ServiceConfig> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {path:?}"))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {path:?}"))?
        }
        None => ServiceConfig::default(),
    };

    apply_env_overrides(&mut config)?;
    validate(&config)?;
    Ok(config)
}

/// Environment variables that override file values
fn apply_env_overrides(config: &mut ServiceConfig) -> Result<()> {
    if let Ok(value) = env::var("FLEET_API_BASE_URL") {
        config.api.base_url = value;
    }
    if let Ok(value) = env::var("FLEET_API_KEY") {
        config.api.api_key = value;
    }
    if let Ok(value) = env::var("FLEET_USER_KEY") {
        config.api.user_key = Some(value);
    }
    if let Ok(value) = env::var("FLEET_ACCOUNT_ID") {
        config.api.account_id = Some(value);
    }
    if let Ok(value) = env::var("FLEET_IDENTITY_FIELD") {
        config.api.identity_field = Some(value);
    }
    if let Ok(value) = env::var("FLEET_POLL_INTERVAL") {
        config.poll.interval_secs = parse_env("FLEET_POLL_INTERVAL", &value)?;
    }
    if let Ok(value) = env::var("FLEET_FETCH_TIMEOUT") {
        config.poll.fetch_timeout_secs = parse_env("FLEET_FETCH_TIMEOUT", &value)?;
    }
    if let Ok(value) = env::var("FLEET_MINUTES_WINDOW") {
        config.poll.minutes_window = parse_env("FLEET_MINUTES_WINDOW", &value)?;
    }
    if let Ok(value) = env::var("FLEET_HISTORY_RETENTION_MINUTES") {
        config.poll.history_retention_minutes =
            parse_env("FLEET_HISTORY_RETENTION_MINUTES", &value)?;
    }
    if let Ok(value) = env::var("FLEET_BIND") {
        config.server.bind = value;
    }
    if let Ok(value) = env::var("FLEET_DEBUG") {
        config.debug = matches!(value.to_lowercase().as_str(), "1" | "true" | "yes");
    }
    Ok(())
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse::<T>()
        .map_err(|_| anyhow::anyhow!("Invalid value for {name}: {value:?}"))
}

/// Reject configurations that cannot safely start polling
fn validate(config: &ServiceConfig) -> Result<()> {
    if config.api.api_key.trim().is_empty() {
        bail!("api.api_key is required (or set FLEET_API_KEY)");
    }
    if config.api.base_url.trim().is_empty() {
        bail!("api.base_url is required (or set FLEET_API_BASE_URL)");
    }
    if !config.api.base_url.starts_with("http://") && !config.api.base_url.starts_with("https://")
    {
        bail!("api.base_url must be an http(s) URL: {}", config.api.base_url);
    }
    if config.poll.minutes_window > MAX_MINUTES_WINDOW {
        bail!(
            "poll.minutes_window {} exceeds the maximum of {}",
            config.poll.minutes_window,
            MAX_MINUTES_WINDOW
        );
    }
    // Interval/timeout relationships are the library's call.
    config.poller_config().validate()?;
    Ok(())
}

impl ServiceConfig {
    /// Project the service configuration onto the library's poller config
    pub fn poller_config(&self) -> PollerConfig {
        let mut poller = PollerConfig::new()
            .with_poll_interval_secs(self.poll.interval_secs)
            .with_fetch_timeout_secs(self.poll.fetch_timeout_secs)
            .with_minutes_window(self.poll.minutes_window)
            .with_history_retention_minutes(self.poll.history_retention_minutes)
            .with_backoff_max_secs(self.poll.backoff_max_secs)
            .with_backoff_reset_successes(self.poll.backoff_reset_successes);
        poller.account_id = self.api.account_id.clone();
        poller.identity_field = self.api.identity_field.clone();
        poller
    }
}
