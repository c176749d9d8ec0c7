//! Application configuration schemas.
//!
//! All configuration structs are deserialized from a TOML file via the
//! `config` crate, overlaid with `COFFEE__`-prefixed environment variables.
//! Each sub-module represents a logical configuration section. Unknown keys
//! are rejected, and [`AppConfig::validate`] checks cross-field invariants
//! before the server starts.

pub mod app;
pub mod arxiv;
pub mod database;
pub mod logging;
pub mod worker;

use std::path::Path;

use serde::{Deserialize, Serialize};

pub use self::app::ServerConfig;
pub use self::arxiv::ArxivConfig;
pub use self::database::DatabaseConfig;
pub use self::logging::LoggingConfig;
pub use self::worker::WorkerConfig;

use crate::error::AppError;

/// Root application configuration.
///
/// Loaded once at startup and shared read-only afterwards; changing any
/// value requires a restart.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Database connection settings.
    pub database: DatabaseConfig,
    /// Worker pool settings.
    #[serde(default)]
    pub worker: WorkerConfig,
    /// Upstream listing source and update schedule.
    #[serde(default)]
    pub arxiv: ArxivConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Load configuration from a TOML file plus `COFFEE__` environment
    /// overrides (e.g. `COFFEE__SERVER__PORT=8080`).
    pub fn load(path: &Path) -> Result<Self, AppError> {
        if !path.exists() {
            return Err(AppError::configuration(format!(
                "Config file '{}' does not exist",
                path.display()
            )));
        }

        let config = config::Config::builder()
            .add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(true),
            )
            .add_source(
                config::Environment::with_prefix("COFFEE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?;

        let config: Self = config
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from an in-memory TOML document, without
    /// environment overrides.
    pub fn from_toml_str(contents: &str) -> Result<Self, AppError> {
        let config: Self = config::Config::builder()
            .add_source(config::File::from_str(contents, config::FileFormat::Toml))
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to build config: {e}")))?
            .try_deserialize()
            .map_err(|e| AppError::configuration(format!("Failed to deserialize config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Check invariants that serde defaults cannot express.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.worker.max_workers == 0 {
            return Err(AppError::configuration(
                "worker.max_workers must be at least 1",
            ));
        }

        if self.server.port_attempts == 0 {
            return Err(AppError::configuration(
                "server.port_attempts must be at least 1",
            ));
        }

        let base = &self.server.base_path;
        if !base.is_empty() && (!base.starts_with('/') || base.ends_with('/')) {
            return Err(AppError::configuration(format!(
                "server.base_path '{base}' must start with '/' and must not end with '/'"
            )));
        }

        if !self.database.url.starts_with("sqlite:") {
            return Err(AppError::configuration(format!(
                "database.url '{}' is not a sqlite: URL",
                self.database.url
            )));
        }

        if self.arxiv.period_seconds == 0 {
            return Err(AppError::configuration(
                "arxiv.period_seconds must be greater than zero",
            ));
        }

        if !self.arxiv.jitter.is_finite() || !(0.0..1.0).contains(&self.arxiv.jitter) {
            return Err(AppError::configuration(format!(
                "arxiv.jitter must be in [0, 1), got {}",
                self.arxiv.jitter
            )));
        }

        if self.arxiv.enabled && self.arxiv.categories.is_empty() {
            return Err(AppError::configuration(
                "arxiv.categories must not be empty when arxiv.enabled = true",
            ));
        }

        Ok(())
    }
}
