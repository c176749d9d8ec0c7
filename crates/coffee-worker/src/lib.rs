//! Background work for the Astro-Coffee server.
//!
//! This crate provides:
//! - A pool of isolated workers, each owning its own database connection
//! - Lifecycle hooks that open and close a worker's context
//! - A jittered periodic scheduler that never overlaps with itself
//! - The listing ingest job and the arXiv listing source it fetches from
//! - Read tasks used by the HTTP layer

pub mod context;
pub mod jobs;
pub mod pool;
pub mod scheduler;
pub mod source;
pub mod task;

pub use context::{DatabaseLifecycle, WorkerContext, WorkerLifecycle};
pub use pool::{PoolOptions, PoolStats, WorkerPool};
pub use scheduler::{PeriodicScheduler, ScheduledJob, SchedulerHandle, SchedulerState};
pub use task::{TaskHandle, WorkerTask};
