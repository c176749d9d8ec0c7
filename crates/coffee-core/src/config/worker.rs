//! Worker pool configuration.

use serde::{Deserialize, Serialize};

/// Background worker pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WorkerConfig {
    /// Number of worker threads, each holding one database connection.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,
    /// Seconds to wait for in-flight tasks during shutdown before aborting them.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_seconds: u64,
    /// How many times a poisoned worker tries to re-open its context.
    #[serde(default = "default_respawn_attempts")]
    pub respawn_attempts: u32,
    /// Delay in milliseconds between respawn attempts.
    #[serde(default = "default_respawn_backoff")]
    pub respawn_backoff_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            shutdown_grace_seconds: default_shutdown_grace(),
            respawn_attempts: default_respawn_attempts(),
            respawn_backoff_ms: default_respawn_backoff(),
        }
    }
}

fn default_max_workers() -> usize {
    4
}

fn default_shutdown_grace() -> u64 {
    10
}

fn default_respawn_attempts() -> u32 {
    3
}

fn default_respawn_backoff() -> u64 {
    1000
}
