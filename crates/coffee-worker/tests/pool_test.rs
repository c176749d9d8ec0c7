//! Worker pool behaviour: concurrency bound, failure isolation, shutdown.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use coffee_core::config::DatabaseConfig;
use coffee_core::error::{AppError, ErrorKind};
use coffee_core::result::AppResult;
use coffee_worker::{
    DatabaseLifecycle, PoolOptions, WorkerContext, WorkerLifecycle, WorkerPool, WorkerTask,
};

#[derive(Debug)]
struct CountingLifecycle {
    inner: DatabaseLifecycle,
    initialized: AtomicUsize,
    finalized: AtomicUsize,
    /// Initializer calls numbered above this fail.
    fail_after: usize,
    /// This worker id always fails to initialize.
    fail_worker: Option<usize>,
}

impl CountingLifecycle {
    fn new() -> Self {
        Self {
            inner: DatabaseLifecycle::new(DatabaseConfig::from_url("sqlite::memory:")),
            initialized: AtomicUsize::new(0),
            finalized: AtomicUsize::new(0),
            fail_after: usize::MAX,
            fail_worker: None,
        }
    }
}

#[async_trait]
impl WorkerLifecycle for CountingLifecycle {
    async fn initialize(&self, worker_id: usize) -> AppResult<WorkerContext> {
        let call = self.initialized.fetch_add(1, Ordering::SeqCst) + 1;
        if call > self.fail_after || self.fail_worker == Some(worker_id) {
            return Err(AppError::database(format!(
                "worker {worker_id} cannot connect"
            )));
        }
        self.inner.initialize(worker_id).await
    }

    async fn finalize(&self, ctx: WorkerContext) {
        self.finalized.fetch_add(1, Ordering::SeqCst);
        self.inner.finalize(ctx).await;
    }
}

fn options(max_workers: usize) -> PoolOptions {
    PoolOptions {
        max_workers,
        shutdown_grace: Duration::from_secs(5),
        respawn_attempts: 2,
        respawn_backoff: Duration::from_millis(10),
    }
}

#[derive(Debug)]
struct SleepTask {
    duration: Duration,
    running: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

#[async_trait]
impl WorkerTask for SleepTask {
    type Output = usize;

    fn name(&self) -> &'static str {
        "sleep"
    }

    async fn run(self, ctx: &mut WorkerContext) -> AppResult<usize> {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.duration).await;
        self.running.fetch_sub(1, Ordering::SeqCst);
        Ok(ctx.worker_id())
    }
}

fn sleep_task(duration: Duration, running: &Arc<AtomicUsize>, peak: &Arc<AtomicUsize>) -> SleepTask {
    SleepTask {
        duration,
        running: Arc::clone(running),
        peak: Arc::clone(peak),
    }
}

async fn wait_until(mut check: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !check() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

#[tokio::test]
async fn test_two_workers_five_tasks_timing() {
    let lifecycle = Arc::new(CountingLifecycle::new());
    let pool = WorkerPool::start(options(2), lifecycle.clone()).await.unwrap();
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let started = Instant::now();
    let handles: Vec<_> = (0..5)
        .map(|_| {
            pool.submit(sleep_task(Duration::from_millis(100), &running, &peak))
                .unwrap()
        })
        .collect();
    for result in futures::future::join_all(handles).await {
        let worker = result.unwrap();
        assert!((1..=2).contains(&worker));
    }
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_millis(300), "too fast: {elapsed:?}");
    assert!(elapsed < Duration::from_millis(600), "too slow: {elapsed:?}");
    assert_eq!(peak.load(Ordering::SeqCst), 2);

    pool.shutdown().await;
}

#[tokio::test]
async fn test_concurrency_never_exceeds_worker_count() {
    let lifecycle = Arc::new(CountingLifecycle::new());
    let pool = WorkerPool::start(options(3), lifecycle.clone()).await.unwrap();
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..12)
        .map(|_| {
            pool.submit(sleep_task(Duration::from_millis(20), &running, &peak))
                .unwrap()
        })
        .collect();
    for result in futures::future::join_all(handles).await {
        result.unwrap();
    }

    assert!(peak.load(Ordering::SeqCst) <= 3);
    let stats = pool.stats();
    assert_eq!(stats.completed, 12);
    assert_eq!(stats.busy, 0);
    assert_eq!(stats.queued, 0);

    pool.shutdown().await;
}

#[tokio::test]
async fn test_task_errors_and_panics_are_isolated() {
    let lifecycle = Arc::new(CountingLifecycle::new());
    let pool = WorkerPool::start(options(1), lifecycle.clone()).await.unwrap();

    let err = pool
        .submit_fn("fails", |_ctx| {
            Box::pin(async move { Err::<(), _>(AppError::validation("bad input")) })
        })
        .unwrap()
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Validation);

    let err = pool
        .submit_fn("panics", |_ctx| {
            Box::pin(async move {
                if true {
                    panic!("boom");
                }
                Ok(())
            })
        })
        .unwrap()
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Worker);
    assert!(err.message.contains("boom"), "{}", err.message);

    // The single worker respawned with a fresh context.
    let worker = pool
        .submit_fn("after", |ctx| Box::pin(async move { Ok(ctx.worker_id()) }))
        .unwrap()
        .await
        .unwrap();
    assert_eq!(worker, 1);

    let stats = pool.stats();
    assert_eq!(stats.respawns, 1);
    assert_eq!(stats.failed, 2);
    assert_eq!(stats.completed, 1);
    assert_eq!(stats.alive, 1);
    assert!(!stats.degraded);
    assert_eq!(lifecycle.initialized.load(Ordering::SeqCst), 2);
    assert_eq!(lifecycle.finalized.load(Ordering::SeqCst), 1);

    pool.shutdown().await;
    assert_eq!(lifecycle.finalized.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_shutdown_finalizes_once_and_rejects_submissions() {
    let lifecycle = Arc::new(CountingLifecycle::new());
    let pool = WorkerPool::start(options(3), lifecycle.clone()).await.unwrap();
    assert_eq!(pool.stats().alive, 3);

    let clone = pool.clone();
    tokio::join!(pool.shutdown(), clone.shutdown());
    pool.shutdown().await;

    assert_eq!(lifecycle.initialized.load(Ordering::SeqCst), 3);
    assert_eq!(lifecycle.finalized.load(Ordering::SeqCst), 3);

    let err = pool
        .submit_fn("late", |_ctx| Box::pin(async move { Ok(()) }))
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::ServiceUnavailable);

    let stats = pool.stats();
    assert!(stats.closed);
    assert_eq!(stats.alive, 0);
}

#[tokio::test]
async fn test_shutdown_finishes_in_flight_and_rejects_queued() {
    let lifecycle = Arc::new(CountingLifecycle::new());
    let pool = WorkerPool::start(options(1), lifecycle.clone()).await.unwrap();
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let in_flight = pool
        .submit(sleep_task(Duration::from_millis(200), &running, &peak))
        .unwrap();
    wait_until(|| running.load(Ordering::SeqCst) == 1).await;
    let queued = pool
        .submit(sleep_task(Duration::from_millis(200), &running, &peak))
        .unwrap();

    pool.shutdown().await;

    assert_eq!(in_flight.await.unwrap(), 1);
    let err = queued.await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::ServiceUnavailable);
    assert_eq!(lifecycle.finalized.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_shutdown_aborts_after_grace() {
    let lifecycle = Arc::new(CountingLifecycle::new());
    let pool = WorkerPool::start(
        PoolOptions {
            shutdown_grace: Duration::from_millis(100),
            ..options(1)
        },
        lifecycle.clone(),
    )
    .await
    .unwrap();
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let stuck = pool
        .submit(sleep_task(Duration::from_secs(30), &running, &peak))
        .unwrap();
    wait_until(|| pool.stats().busy == 1).await;

    let started = Instant::now();
    pool.shutdown().await;
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_millis(100), "{elapsed:?}");
    assert!(elapsed < Duration::from_secs(2), "{elapsed:?}");
    let err = stuck.await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Worker);
    assert!(err.message.contains("aborted"), "{}", err.message);
    assert_eq!(lifecycle.finalized.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_initializer_failure_fails_startup() {
    let lifecycle = Arc::new(CountingLifecycle {
        fail_worker: Some(2),
        ..CountingLifecycle::new()
    });

    let err = WorkerPool::start(options(3), lifecycle.clone())
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Database);

    // Workers that did start were torn down again.
    assert_eq!(lifecycle.initialized.load(Ordering::SeqCst), 3);
    assert_eq!(lifecycle.finalized.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_pool_degrades_when_all_workers_are_lost() {
    let lifecycle = Arc::new(CountingLifecycle {
        fail_after: 1,
        ..CountingLifecycle::new()
    });
    let pool = WorkerPool::start(options(1), lifecycle.clone()).await.unwrap();

    let err = pool
        .submit_fn("panics", |_ctx| {
            Box::pin(async move {
                if true {
                    panic!("poisoned");
                }
                Ok(())
            })
        })
        .unwrap()
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Worker);

    wait_until(|| pool.stats().degraded).await;
    let stats = pool.stats();
    assert_eq!(stats.alive, 0);
    // One startup call plus two failed respawn attempts.
    assert_eq!(lifecycle.initialized.load(Ordering::SeqCst), 3);

    let err = pool
        .submit_fn("late", |_ctx| Box::pin(async move { Ok(()) }))
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::ServiceUnavailable);
    assert!(err.message.contains("degraded"));

    pool.shutdown().await;
}
