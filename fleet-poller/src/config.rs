//! Poller configuration types
//!
//! This module defines the configuration needed by the polling coordinator.
//! Loading the values from a file or the environment is the application
//! layer's job - the library only validates and consumes them.

use crate::types::{Result, TrackerError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Upper bound for the upstream minutes-window parameter
pub const MAX_MINUTES_WINDOW: u32 = 4320;

/// Configuration for the polling coordinator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollerConfig {
    /// Base poll interval in seconds
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Outbound fetch timeout in seconds (must stay below the poll interval)
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    /// Minutes-window query parameter sent upstream (0..=4320)
    #[serde(default = "default_minutes_window")]
    pub minutes_window: u32,

    /// How many minutes of position history to retain per vehicle
    #[serde(default = "default_history_retention_minutes")]
    pub history_retention_minutes: u32,

    /// Backoff ceiling in seconds
    #[serde(default = "default_backoff_max_secs")]
    pub backoff_max_secs: u64,

    /// Successful cycles required before backoff resets to the base interval
    #[serde(default = "default_backoff_reset_successes")]
    pub backoff_reset_successes: u32,

    /// How long the zone id-to-name directory stays fresh, in seconds
    #[serde(default = "default_zone_cache_secs")]
    pub zone_cache_secs: u64,

    /// Optional account identifier mixed into hashed fallback identities
    #[serde(default)]
    pub account_id: Option<String>,

    /// Optional custom field name tried first during identity resolution
    #[serde(default)]
    pub identity_field: Option<String>,
}

fn default_poll_interval_secs() -> u64 {
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

fn default_zone_cache_secs() -> u64 {
    900
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            minutes_window: default_minutes_window(),
            history_retention_minutes: default_history_retention_minutes(),
            backoff_max_secs: default_backoff_max_secs(),
            backoff_reset_successes: default_backoff_reset_successes(),
            zone_cache_secs: default_zone_cache_secs(),
            account_id: None,
            identity_field: None,
        }
    }
}

impl PollerConfig {
    /// Create a new configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set the base poll interval in seconds
    pub fn with_poll_interval_secs(mut self, secs: u64) -> Self {
        self.poll_interval_secs = secs;
        self
    }

    /// Builder method: set the outbound fetch timeout in seconds
    pub fn with_fetch_timeout_secs(mut self, secs: u64) -> Self {
        self.fetch_timeout_secs = secs;
        self
    }

    /// Builder method: set the upstream minutes window
    pub fn with_minutes_window(mut self, minutes: u32) -> Self {
        self.minutes_window = minutes;
        self
    }

    /// Builder method: set history retention in minutes
    pub fn with_history_retention_minutes(mut self, minutes: u32) -> Self {
        self.history_retention_minutes = minutes;
        self
    }

    /// Builder method: set the backoff ceiling in seconds
    pub fn with_backoff_max_secs(mut self, secs: u64) -> Self {
        self.backoff_max_secs = secs;
        self
    }

    /// Builder method: set the success streak that resets backoff
    pub fn with_backoff_reset_successes(mut self, successes: u32) -> Self {
        self.backoff_reset_successes = successes;
        self
    }

    /// Builder method: set the account identifier for hashed identities
    pub fn with_account_id(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    /// Builder method: set the custom identity field name
    pub fn with_identity_field(mut self, field: impl Into<String>) -> Self {
        self.identity_field = Some(field.into());
        self
    }

    /// Base poll interval as a `Duration`
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Outbound fetch timeout as a `Duration`
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Backoff ceiling as a `Duration`
    pub fn backoff_max(&self) -> Duration {
        Duration::from_secs(self.backoff_max_secs)
    }

    /// History retention window
    pub fn history_retention(&self) -> chrono::Duration {
        chrono::Duration::minutes(i64::from(self.history_retention_minutes))
    }

    /// Zone directory freshness window
    pub fn zone_cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.zone_cache_secs as i64)
    }

    /// Check the configuration for values that would break the poll loop.
    ///
    /// Called by the coordinator before polling starts; errors here must
    /// abort startup.
    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_secs == 0 {
            return Err(TrackerError::Config(
                "poll interval must be greater than zero".into(),
            ));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(TrackerError::Config(
                "fetch timeout must be greater than zero".into(),
            ));
        }
        if self.fetch_timeout_secs >= self.poll_interval_secs {
            return Err(TrackerError::Config(format!(
                "fetch timeout ({}s) must be shorter than the poll interval ({}s)",
                self.fetch_timeout_secs, self.poll_interval_secs
            )));
        }
        if self.minutes_window > MAX_MINUTES_WINDOW {
            return Err(TrackerError::Config(format!(
                "minutes window {} exceeds the maximum of {}",
                self.minutes_window, MAX_MINUTES_WINDOW
            )));
        }
        Ok(())
    }
}
