//! Per-worker execution context and the hooks that build and tear it down.

use std::fmt;

use async_trait::async_trait;
use sqlx::SqliteConnection;
use tracing::{info, warn};

use coffee_core::config::DatabaseConfig;
use coffee_core::result::AppResult;
use coffee_database::repositories::{AuthorRepository, ListingRepository};
use coffee_database::{DatabaseEngine, SchemaMetadata, dispose_connection, get_connection};

/// State owned by exactly one worker for its whole life.
///
/// Tasks receive it as `&mut WorkerContext`; it is never shared between
/// workers.
pub struct WorkerContext {
    worker_id: usize,
    engine: DatabaseEngine,
    connection: SqliteConnection,
    metadata: SchemaMetadata,
}

impl WorkerContext {
    /// Assemble a context from an opened connection.
    pub fn new(
        worker_id: usize,
        engine: DatabaseEngine,
        connection: SqliteConnection,
        metadata: SchemaMetadata,
    ) -> Self {
        Self {
            worker_id,
            engine,
            connection,
            metadata,
        }
    }

    /// 1-based worker slot number.
    pub fn worker_id(&self) -> usize {
        self.worker_id
    }

    /// Listing repository over this worker's connection.
    pub fn listings(&mut self) -> AppResult<ListingRepository<'_>> {
        ListingRepository::new(&mut self.connection, &self.metadata)
    }

    /// Local author repository over this worker's connection.
    pub fn authors(&mut self) -> AppResult<AuthorRepository<'_>> {
        AuthorRepository::new(&mut self.connection, &self.metadata)
    }

    /// Split the context back into its database parts.
    pub fn into_parts(self) -> (DatabaseEngine, SqliteConnection, SchemaMetadata) {
        (self.engine, self.connection, self.metadata)
    }
}

impl fmt::Debug for WorkerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerContext")
            .field("worker_id", &self.worker_id)
            .field("database", &self.engine.url())
            .field("tables", &self.metadata.table_count())
            .finish()
    }
}

/// Initializer and finalizer run inside each worker.
#[async_trait]
pub trait WorkerLifecycle: Send + Sync + fmt::Debug {
    /// Build the worker's context before it accepts any task.
    async fn initialize(&self, worker_id: usize) -> AppResult<WorkerContext>;

    /// Tear the context down after the worker's last task. Never fails;
    /// errors are logged.
    async fn finalize(&self, ctx: WorkerContext);
}

/// Lifecycle that gives every worker its own database connection.
#[derive(Debug, Clone)]
pub struct DatabaseLifecycle {
    database: DatabaseConfig,
}

impl DatabaseLifecycle {
    /// Create a lifecycle whose workers connect with `database`.
    pub fn new(database: DatabaseConfig) -> Self {
        Self { database }
    }
}

#[async_trait]
impl WorkerLifecycle for DatabaseLifecycle {
    async fn initialize(&self, worker_id: usize) -> AppResult<WorkerContext> {
        let (engine, connection, metadata) = get_connection(&self.database).await?;
        info!(worker = worker_id, "Worker initialized");
        Ok(WorkerContext::new(worker_id, engine, connection, metadata))
    }

    async fn finalize(&self, ctx: WorkerContext) {
        let worker_id = ctx.worker_id();
        let (engine, connection, metadata) = ctx.into_parts();
        if let Err(e) = dispose_connection(engine, connection, metadata).await {
            warn!(worker = worker_id, error = %e, "Error while closing worker connection");
        }
        info!(worker = worker_id, "Worker finalized");
    }
}
