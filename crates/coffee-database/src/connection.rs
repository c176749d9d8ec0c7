//! SQLite connection factory.

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteJournalMode};
use sqlx::{ConnectOptions, Connection};
use tracing::{info, warn};

use coffee_core::config::DatabaseConfig;
use coffee_core::error::{AppError, ErrorKind};

use crate::metadata::SchemaMetadata;

/// Connection factory for one database.
///
/// Holds the parsed connect options so a worker can open (or re-open) its
/// connection without re-reading configuration.
#[derive(Debug, Clone)]
pub struct DatabaseEngine {
    options: SqliteConnectOptions,
    url: String,
    connect_timeout: Duration,
}

impl DatabaseEngine {
    /// Parse the connection URL and apply pragmas shared by all connections.
    pub fn new(config: &DatabaseConfig) -> Result<Self, AppError> {
        // SqliteConnectOptions would read any other scheme as a file name.
        if !config.url.starts_with("sqlite:") {
            return Err(AppError::configuration(format!(
                "Invalid database URL '{}': expected a sqlite: URL",
                config.url
            )));
        }

        let options = SqliteConnectOptions::from_str(&config.url)
            .map_err(|e| {
                AppError::with_source(
                    ErrorKind::Configuration,
                    format!("Invalid database URL '{}': {e}", config.url),
                    e,
                )
            })?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(config.busy_timeout_seconds));

        Ok(Self {
            options,
            url: config.url.clone(),
            connect_timeout: Duration::from_secs(config.connect_timeout_seconds),
        })
    }

    /// The URL this engine connects to.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Open a new connection.
    pub async fn connect(&self) -> Result<SqliteConnection, AppError> {
        match tokio::time::timeout(self.connect_timeout, self.options.connect()).await {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(e)) => Err(AppError::with_source(
                ErrorKind::Database,
                format!("Failed to connect to database '{}': {e}", self.url),
                e,
            )),
            Err(_) => Err(AppError::database(format!(
                "Timed out after {:?} connecting to database '{}'",
                self.connect_timeout, self.url
            ))),
        }
    }

    /// Release the engine. Connections must already be closed.
    pub fn dispose(self) {
        info!(url = %self.url, "Database engine disposed");
    }
}

/// Open a connection and load the schema metadata cache.
///
/// Returns the engine, the live connection, and the metadata, which together
/// make up a worker's database state.
pub async fn get_connection(
    config: &DatabaseConfig,
) -> Result<(DatabaseEngine, SqliteConnection, SchemaMetadata), AppError> {
    let engine = DatabaseEngine::new(config)?;
    let mut connection = engine.connect().await?;

    let metadata = match SchemaMetadata::load(&mut connection).await {
        Ok(metadata) => metadata,
        Err(e) => {
            if let Err(close_err) = connection.close().await {
                warn!(error = %close_err, "Failed to close connection after metadata load failure");
            }
            return Err(e);
        }
    };

    info!(
        url = %engine.url(),
        tables = metadata.table_count(),
        "Opened database connection"
    );

    Ok((engine, connection, metadata))
}

/// Drop the metadata cache, close the connection, and dispose the engine.
///
/// The engine is disposed even if closing the connection fails; the close
/// error is still returned so the caller can log it.
pub async fn dispose_connection(
    engine: DatabaseEngine,
    connection: SqliteConnection,
    metadata: SchemaMetadata,
) -> Result<(), AppError> {
    drop(metadata);

    let closed = connection.close().await.map_err(|e| {
        AppError::with_source(
            ErrorKind::Database,
            format!("Failed to close connection to '{}': {e}", engine.url()),
            e,
        )
    });

    engine.dispose();
    closed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_url_is_configuration_error() {
        let err = DatabaseEngine::new(&DatabaseConfig::from_url("mysql://nope")).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Configuration);

        let err = DatabaseEngine::new(&DatabaseConfig::from_url("coffee.sqlite")).unwrap_err();
        assert_eq!(err.kind, ErrorKind::Configuration);
    }

    #[test]
    fn test_sqlite_urls_are_accepted() {
        assert!(DatabaseEngine::new(&DatabaseConfig::from_url("sqlite::memory:")).is_ok());
        assert!(DatabaseEngine::new(&DatabaseConfig::from_url("sqlite://coffee.sqlite")).is_ok());
    }

    #[tokio::test]
    async fn test_get_and_dispose_connection() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("coffee.sqlite").display());

        let (engine, connection, metadata) =
            get_connection(&DatabaseConfig::from_url(url)).await.unwrap();
        assert_eq!(metadata.table_count(), 0);

        dispose_connection(engine, connection, metadata)
            .await
            .unwrap();
        assert!(dir.path().join("coffee.sqlite").exists());
    }
}
