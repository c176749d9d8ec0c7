//! Database configuration.

use serde::{Deserialize, Serialize};

/// SQLite database configuration.
///
/// Every pool worker opens its own connection from these settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DatabaseConfig {
    /// SQLite connection URL, e.g. `sqlite://astrocoffee.sqlite`.
    pub url: String,
    /// Connection timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
    /// How long a statement waits on a locked database before failing.
    #[serde(default = "default_busy_timeout")]
    pub busy_timeout_seconds: u64,
}

impl DatabaseConfig {
    /// Build a configuration for the given URL with default timeouts.
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            connect_timeout_seconds: default_connect_timeout(),
            busy_timeout_seconds: default_busy_timeout(),
        }
    }
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_busy_timeout() -> u64 {
    5
}
