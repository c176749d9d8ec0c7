//! Process supervisor.
//!
//! Startup runs migrations, starts the worker pool and binds the listener;
//! any failure there aborts startup. [`Supervisor::run`] then fires the
//! startup ingest, arms the periodic timer and serves HTTP until the
//! shutdown future resolves. Teardown stops the timer, then shuts the pool
//! down while the listener drains, so in-flight requests waiting on the pool
//! get the pool's abort or unavailable error instead of holding the process
//! open.

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use coffee_api::{AppState, bind_with_retry, build_router};
use coffee_core::config::AppConfig;
use coffee_core::result::AppResult;
use coffee_database::migration::run_migrations;
use coffee_database::{dispose_connection, get_connection};
use coffee_worker::jobs::IngestJob;
use coffee_worker::source::ListingSource;
use coffee_worker::{DatabaseLifecycle, PeriodicScheduler, PoolOptions, SchedulerHandle, WorkerPool};

/// How long shutdown waits for the scheduler task after stopping it.
const SCHEDULER_JOIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Time the HTTP drain may run past the pool's shutdown grace.
const HTTP_DRAIN_MARGIN: Duration = Duration::from_secs(1);

/// A started server: pool running, listener bound, nothing served yet.
pub struct Supervisor {
    config: AppConfig,
    pool: WorkerPool,
    listener: TcpListener,
    local_addr: SocketAddr,
    source: Option<Arc<dyn ListingSource>>,
}

impl Supervisor {
    /// Run migrations, start the worker pool and bind the listener.
    ///
    /// Listing updates run only when `source` is given.
    pub async fn start(
        config: AppConfig,
        source: Option<Arc<dyn ListingSource>>,
    ) -> AppResult<Self> {
        info!("Running database migrations...");
        let (engine, mut conn, metadata) = get_connection(&config.database).await?;
        let migrated = run_migrations(&mut conn).await;
        dispose_connection(engine, conn, metadata).await?;
        migrated?;
        info!("Database migrations complete");

        let pool = WorkerPool::start(
            PoolOptions::from(&config.worker),
            Arc::new(DatabaseLifecycle::new(config.database.clone())),
        )
        .await?;

        let (listener, local_addr) = match bind_with_retry(
            &config.server.address,
            config.server.port,
            config.server.port_attempts,
        )
        .await
        {
            Ok(bound) => bound,
            Err(e) => {
                pool.shutdown().await;
                return Err(e);
            }
        };

        Ok(Self {
            config,
            pool,
            listener,
            local_addr,
            source,
        })
    }

    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The worker pool shared with the HTTP handlers.
    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Serve until `shutdown` resolves, then tear everything down.
    pub async fn run<F>(self, shutdown: F) -> AppResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Self {
            config,
            pool,
            listener,
            local_addr,
            source,
        } = self;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            shutdown.await;
            info!("Shutdown requested, starting graceful shutdown...");
            let _ = shutdown_tx.send(true);
        });

        let scheduler = match source {
            Some(source) => match start_updates(&config, &pool, source, shutdown_rx.clone()).await {
                Ok(scheduler) => scheduler,
                Err(e) => {
                    pool.shutdown().await;
                    return Err(e);
                }
            },
            None => {
                info!("Listing updates disabled");
                None
            }
        };

        let mut server = if *shutdown_rx.borrow() {
            None
        } else {
            let app = build_router(AppState::new(Arc::new(config.clone()), pool.clone()));
            info!(
                address = %local_addr,
                base_path = %config.server.base_path,
                "Astro-Coffee server listening"
            );
            let mut serve_rx = shutdown_rx.clone();
            Some(tokio::spawn(async move {
                axum::serve(listener, app)
                    .with_graceful_shutdown(async move { wait_for_shutdown(&mut serve_rx).await })
                    .await
            }))
        };

        if let Some(task) = server.as_mut() {
            let mut rx = shutdown_rx.clone();
            let mut server_exited = false;
            tokio::select! {
                _ = wait_for_shutdown(&mut rx) => {}
                result = task => {
                    report_server_exit(result);
                    server_exited = true;
                }
            }
            if server_exited {
                server = None;
            }
        }

        // Teardown: stop the timer, then shut the pool down while the
        // listener drains.
        if let Some(handle) = &scheduler {
            handle.stop();
        }
        info!("Shutting down worker pool...");
        let drain_limit = PoolOptions::from(&config.worker).shutdown_grace + HTTP_DRAIN_MARGIN;
        tokio::join!(drain_http(server, drain_limit), pool.shutdown());

        if let Some(handle) = scheduler {
            if tokio::time::timeout(SCHEDULER_JOIN_TIMEOUT, handle.join())
                .await
                .is_err()
            {
                warn!("Scheduler did not stop in time");
            }
        }

        tokio::time::sleep(Duration::from_secs(config.server.shutdown_grace_seconds)).await;
        info!("Astro-Coffee server shut down gracefully");
        Ok(())
    }
}

/// Fire the startup ingest, then arm the timer unless shutdown was
/// requested in the meantime.
async fn start_updates(
    config: &AppConfig,
    pool: &WorkerPool,
    source: Arc<dyn ListingSource>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> AppResult<Option<SchedulerHandle>> {
    let job = Arc::new(IngestJob::new(pool.clone(), source));
    let scheduler = PeriodicScheduler::from_config(job, &config.arxiv)?;

    tokio::select! {
        result = scheduler.run_once() => {
            if let Err(e) = result {
                error!(error = %e, "Startup ingest failed");
            }
        }
        _ = wait_for_shutdown(&mut shutdown_rx) => {
            info!("Interrupted during startup ingest");
        }
    }

    if *shutdown_rx.borrow() {
        Ok(None)
    } else {
        Ok(Some(scheduler.arm()))
    }
}

/// Wait for the listener to finish its in-flight requests, up to `limit`.
async fn drain_http(server: Option<JoinHandle<io::Result<()>>>, limit: Duration) {
    let Some(mut task) = server else {
        return;
    };
    match tokio::time::timeout(limit, &mut task).await {
        Ok(result) => report_server_exit(result),
        Err(_) => {
            warn!(
                limit_secs = limit.as_secs_f64(),
                "HTTP requests still running after the drain limit; dropping them"
            );
            task.abort();
        }
    }
}

fn report_server_exit(result: Result<io::Result<()>, tokio::task::JoinError>) {
    match result {
        Ok(Ok(())) => info!("HTTP listener closed"),
        Ok(Err(e)) => error!(error = %e, "HTTP server stopped unexpectedly"),
        Err(e) => error!(error = %e, "HTTP server task failed"),
    }
}

/// Resolve once the shutdown flag is set.
async fn wait_for_shutdown(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|stop| *stop).await.is_err() {
        std::future::pending::<()>().await;
    }
}
