//! Application state shared across all handlers and middleware.

use std::sync::Arc;
use std::time::Instant;

use coffee_core::config::AppConfig;
use coffee_worker::WorkerPool;

/// Application state passed to every Axum handler via `State<AppState>`.
///
/// All fields are cheap to clone.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Application configuration
    pub config: Arc<AppConfig>,
    /// Worker pool that runs every database read
    pub pool: WorkerPool,
    /// When the server started, for the uptime report
    pub started_at: Instant,
}

impl AppState {
    /// Create state with the start time set to now.
    pub fn new(config: Arc<AppConfig>, pool: WorkerPool) -> Self {
        Self {
            config,
            pool,
            started_at: Instant::now(),
        }
    }
}
