//! HTTP server configuration.

use serde::{Deserialize, Serialize};

/// HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Bind address.
    #[serde(default = "default_address")]
    pub address: String,
    /// Preferred bind port. The next free port is used if this one is busy.
    #[serde(default = "default_port")]
    pub port: u16,
    /// How many consecutive ports to try before giving up.
    #[serde(default = "default_port_attempts")]
    pub port_attempts: u16,
    /// URL prefix all routes are mounted under. Empty mounts at the root.
    #[serde(default = "default_base_path")]
    pub base_path: String,
    /// Pause in seconds after the worker pool is closed, before the process exits.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            port: default_port(),
            port_attempts: default_port_attempts(),
            base_path: default_base_path(),
            shutdown_grace_seconds: default_shutdown_grace(),
        }
    }
}

fn default_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5005
}

fn default_port_attempts() -> u16 {
    10
}

fn default_base_path() -> String {
    "/astro-coffee".to_string()
}

fn default_shutdown_grace() -> u64 {
    2
}
