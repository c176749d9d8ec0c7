//! Database migration runner.

use sqlx::SqliteConnection;
use tracing::info;

use coffee_core::error::{AppError, ErrorKind};

/// Run all pending database migrations on the given connection.
pub async fn run_migrations(conn: &mut SqliteConnection) -> Result<(), AppError> {
    info!("Running database migrations...");

    sqlx::migrate!("../../migrations")
        .run(conn)
        .await
        .map_err(|e| {
            AppError::with_source(
                ErrorKind::Database,
                format!("Failed to run migrations: {e}"),
                e,
            )
        })?;

    info!("Database migrations completed successfully");
    Ok(())
}
