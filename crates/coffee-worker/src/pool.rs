//! Fixed-size pool of isolated workers.
//!
//! Each worker is a dedicated OS thread driving its own single-threaded
//! tokio runtime and owning one [`WorkerContext`]. Idle workers pull from a
//! single shared queue, so work goes to whichever worker is free first and
//! no worker ever runs two tasks at once.
//!
//! A task that panics poisons its worker's context: the worker finalizes
//! it, re-runs the initializer (up to `respawn_attempts` times) and carries
//! on. When every worker has been lost the pool turns degraded and rejects
//! all further work instead of letting callers wait forever.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::pin::pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use serde::Serialize;
use tokio::sync::{Mutex, mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use coffee_core::config::WorkerConfig;
use coffee_core::error::{AppError, ErrorKind};
use coffee_core::result::AppResult;

use crate::context::{WorkerContext, WorkerLifecycle};
use crate::task::{Envelope, FnTask, Job, Outcome, TaskHandle, WorkerTask, panic_message};

/// Extra time given to workers to run their finalizers once in-flight tasks
/// have been aborted.
const FINALIZE_TIMEOUT: Duration = Duration::from_secs(5);

/// Pool sizing and shutdown behaviour.
#[derive(Debug, Clone)]
pub struct PoolOptions {
    /// Number of workers.
    pub max_workers: usize,
    /// How long in-flight tasks may keep running after shutdown starts.
    pub shutdown_grace: Duration,
    /// Re-initialisation attempts for a poisoned worker.
    pub respawn_attempts: u32,
    /// Delay between re-initialisation attempts.
    pub respawn_backoff: Duration,
}

impl From<&WorkerConfig> for PoolOptions {
    fn from(config: &WorkerConfig) -> Self {
        Self {
            max_workers: config.max_workers,
            shutdown_grace: Duration::from_secs(config.shutdown_grace_seconds),
            respawn_attempts: config.respawn_attempts,
            respawn_backoff: Duration::from_millis(config.respawn_backoff_ms),
        }
    }
}

/// Point-in-time view of the pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Configured worker count.
    pub max_workers: usize,
    /// Workers with a live context.
    pub alive: usize,
    /// Workers currently running a task.
    pub busy: usize,
    /// Tasks waiting for a worker.
    pub queued: usize,
    /// Tasks that returned `Ok`.
    pub completed: u64,
    /// Tasks that returned `Err`, panicked, or were aborted.
    pub failed: u64,
    /// Successful worker re-initialisations.
    pub respawns: u64,
    /// Every worker has been lost.
    pub degraded: bool,
    /// Shutdown has started.
    pub closed: bool,
}

struct Shared {
    options: PoolOptions,
    lifecycle: Arc<dyn WorkerLifecycle>,
    sender: mpsc::UnboundedSender<Job>,
    queue: Mutex<mpsc::UnboundedReceiver<Job>>,
    stop: CancellationToken,
    kill: CancellationToken,
    closed: AtomicBool,
    degraded: AtomicBool,
    alive: AtomicUsize,
    busy: AtomicUsize,
    queued: AtomicUsize,
    completed: AtomicU64,
    failed: AtomicU64,
    respawns: AtomicU64,
    /// Exit notifications of every worker; `None` once shutdown has run.
    exits: Mutex<Option<Vec<oneshot::Receiver<()>>>>,
}

impl Shared {
    /// Close the queue and fail everything still in it.
    async fn drain(&self, err: AppError) {
        let mut queue = self.queue.lock().await;
        queue.close();
        let mut rejected = 0usize;
        while let Ok(job) = queue.try_recv() {
            self.queued.fetch_sub(1, Ordering::SeqCst);
            debug!(task = job.name(), "Rejecting queued task");
            job.reject(err.clone());
            rejected += 1;
        }
        if rejected > 0 {
            warn!(rejected, "Rejected queued tasks");
        }
    }

    async fn worker_lost(&self, worker_id: usize) {
        let remaining = self.alive.fetch_sub(1, Ordering::SeqCst) - 1;
        if remaining == 0 && !self.closed.load(Ordering::SeqCst) {
            self.degraded.store(true, Ordering::SeqCst);
            error!(
                worker = worker_id,
                "All workers lost; worker pool is degraded and will reject new work"
            );
            self.drain(AppError::service_unavailable("Worker pool is degraded"))
                .await;
        }
    }
}

enum Exit {
    Stopped,
    Poisoned,
}

/// Handle to the worker pool. Cheap to clone.
#[derive(Clone)]
pub struct WorkerPool {
    shared: Arc<Shared>,
}

impl WorkerPool {
    /// Spawn every worker and wait until each has run its initializer.
    ///
    /// If any initializer fails the workers already started are shut down
    /// and the first error is returned.
    pub async fn start(
        options: PoolOptions,
        lifecycle: Arc<dyn WorkerLifecycle>,
    ) -> AppResult<Self> {
        if options.max_workers == 0 {
            return Err(AppError::configuration(
                "Worker pool needs at least one worker",
            ));
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        let max_workers = options.max_workers;
        let pool = Self {
            shared: Arc::new(Shared {
                options,
                lifecycle,
                sender,
                queue: Mutex::new(receiver),
                stop: CancellationToken::new(),
                kill: CancellationToken::new(),
                closed: AtomicBool::new(false),
                degraded: AtomicBool::new(false),
                alive: AtomicUsize::new(0),
                busy: AtomicUsize::new(0),
                queued: AtomicUsize::new(0),
                completed: AtomicU64::new(0),
                failed: AtomicU64::new(0),
                respawns: AtomicU64::new(0),
                exits: Mutex::new(None),
            }),
        };

        let mut ready = Vec::with_capacity(max_workers);
        let mut exits = Vec::with_capacity(max_workers);
        let mut failure = None;

        for worker_id in 1..=max_workers {
            let (ready_tx, ready_rx) = oneshot::channel();
            let (exit_tx, exit_rx) = oneshot::channel();
            match spawn_worker(Arc::clone(&pool.shared), worker_id, ready_tx, exit_tx) {
                Ok(()) => {
                    ready.push(ready_rx);
                    exits.push(exit_rx);
                }
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        *pool.shared.exits.lock().await = Some(exits);

        for outcome in join_all(ready).await {
            let err = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e,
                Err(_) => AppError::worker("Worker exited before finishing initialization"),
            };
            failure.get_or_insert(err);
        }

        if let Some(err) = failure {
            error!(error = %err, "Worker pool failed to start");
            pool.shutdown().await;
            return Err(err);
        }

        info!(workers = max_workers, "Worker pool started");
        Ok(pool)
    }

    /// Queue a task. The returned handle resolves to the task's result.
    pub fn submit<T: WorkerTask>(&self, task: T) -> AppResult<TaskHandle<T::Output>> {
        self.ensure_accepting()?;

        let (reply, rx) = oneshot::channel();
        let job: Job = Box::new(Envelope::new(task, reply));

        self.shared.queued.fetch_add(1, Ordering::SeqCst);
        if self.shared.sender.send(job).is_err() {
            self.shared.queued.fetch_sub(1, Ordering::SeqCst);
            return Err(self.unavailable());
        }
        Ok(TaskHandle::new(rx))
    }

    /// Queue a closure as a task.
    pub fn submit_fn<F, T>(&self, name: &'static str, f: F) -> AppResult<TaskHandle<T>>
    where
        F: for<'a> FnOnce(&'a mut WorkerContext) -> BoxFuture<'a, AppResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        self.submit(FnTask::new(name, f))
    }

    /// Submit a task and wait for its result.
    pub async fn run<T: WorkerTask>(&self, task: T) -> AppResult<T::Output> {
        self.submit(task)?.await
    }

    /// Current counters.
    pub fn stats(&self) -> PoolStats {
        let s = &self.shared;
        PoolStats {
            max_workers: s.options.max_workers,
            alive: s.alive.load(Ordering::SeqCst),
            busy: s.busy.load(Ordering::SeqCst),
            queued: s.queued.load(Ordering::SeqCst),
            completed: s.completed.load(Ordering::SeqCst),
            failed: s.failed.load(Ordering::SeqCst),
            respawns: s.respawns.load(Ordering::SeqCst),
            degraded: s.degraded.load(Ordering::SeqCst),
            closed: s.closed.load(Ordering::SeqCst),
        }
    }

    /// Stop the pool and run every worker's finalizer.
    ///
    /// New submissions fail immediately. In-flight tasks get
    /// `shutdown_grace` to finish before they are aborted at their next
    /// await point; queued tasks that never started are rejected. Repeated
    /// or concurrent calls wait for the first one and then return.
    pub async fn shutdown(&self) {
        let mut exits_slot = self.shared.exits.lock().await;
        let Some(exits) = exits_slot.take() else {
            return;
        };

        self.shared.closed.store(true, Ordering::SeqCst);
        info!(
            workers = exits.len(),
            busy = self.shared.busy.load(Ordering::SeqCst),
            "Shutting down worker pool"
        );
        self.shared.stop.cancel();

        let grace = self.shared.options.shutdown_grace;
        let mut exited = pin!(join_all(exits));
        if tokio::time::timeout(grace, exited.as_mut()).await.is_err() {
            warn!(
                grace_secs = grace.as_secs_f64(),
                "In-flight tasks outlived the shutdown grace period; aborting them"
            );
            self.shared.kill.cancel();
            if tokio::time::timeout(FINALIZE_TIMEOUT, exited.as_mut())
                .await
                .is_err()
            {
                error!("Workers did not exit after abort; leaving them behind");
            }
        }

        self.shared
            .drain(AppError::service_unavailable("Worker pool is shut down"))
            .await;
        info!("Worker pool shut down");
    }

    fn ensure_accepting(&self) -> AppResult<()> {
        if self.shared.closed.load(Ordering::SeqCst) || self.shared.degraded.load(Ordering::SeqCst)
        {
            return Err(self.unavailable());
        }
        Ok(())
    }

    fn unavailable(&self) -> AppError {
        if self.shared.degraded.load(Ordering::SeqCst) {
            AppError::service_unavailable("Worker pool is degraded")
        } else {
            AppError::service_unavailable("Worker pool is shut down")
        }
    }
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerPool")
            .field("stats", &self.stats())
            .finish()
    }
}

fn spawn_worker(
    shared: Arc<Shared>,
    worker_id: usize,
    ready: oneshot::Sender<AppResult<()>>,
    exited: oneshot::Sender<()>,
) -> AppResult<()> {
    std::thread::Builder::new()
        .name(format!("coffee-worker-{worker_id}"))
        .spawn(move || {
            match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(runtime) => {
                    runtime.block_on(worker_main(shared, worker_id, ready));
                    // Tear the runtime down before reporting the exit.
                    drop(runtime);
                }
                Err(e) => {
                    let _ = ready.send(Err(AppError::with_source(
                        ErrorKind::Worker,
                        format!("Failed to build runtime for worker {worker_id}"),
                        e,
                    )));
                }
            }
            let _ = exited.send(());
        })
        .map(|_| ())
        .map_err(|e| {
            AppError::with_source(
                ErrorKind::Worker,
                format!("Failed to spawn worker {worker_id}"),
                e,
            )
        })
}

async fn worker_main(shared: Arc<Shared>, worker_id: usize, ready: oneshot::Sender<AppResult<()>>) {
    let mut ctx = match initialize(&shared, worker_id).await {
        Ok(ctx) => ctx,
        Err(e) => {
            error!(worker = worker_id, error = %e, "Worker initializer failed");
            let _ = ready.send(Err(e));
            return;
        }
    };
    shared.alive.fetch_add(1, Ordering::SeqCst);
    let _ = ready.send(Ok(()));

    loop {
        let exit = run_tasks(&shared, worker_id, &mut ctx).await;
        finalize(&shared, worker_id, ctx).await;

        match exit {
            Exit::Stopped => {
                shared.alive.fetch_sub(1, Ordering::SeqCst);
                return;
            }
            Exit::Poisoned => match respawn(&shared, worker_id).await {
                Some(fresh) => {
                    shared.respawns.fetch_add(1, Ordering::SeqCst);
                    ctx = fresh;
                }
                None => {
                    shared.worker_lost(worker_id).await;
                    return;
                }
            },
        }
    }
}

async fn run_tasks(shared: &Shared, worker_id: usize, ctx: &mut WorkerContext) -> Exit {
    loop {
        let job = tokio::select! {
            biased;
            _ = shared.stop.cancelled() => return Exit::Stopped,
            job = async { shared.queue.lock().await.recv().await } => match job {
                Some(job) => job,
                None => return Exit::Stopped,
            },
        };

        shared.queued.fetch_sub(1, Ordering::SeqCst);
        shared.busy.fetch_add(1, Ordering::SeqCst);
        let name = job.name();
        debug!(worker = worker_id, task = name, "Task started");

        let finished = job.dispatch(ctx, &shared.kill).await;
        let outcome = finished.outcome;
        shared.busy.fetch_sub(1, Ordering::SeqCst);
        match outcome {
            Outcome::Completed => shared.completed.fetch_add(1, Ordering::SeqCst),
            _ => shared.failed.fetch_add(1, Ordering::SeqCst),
        };
        finished.deliver();

        match outcome {
            Outcome::Completed => {
                debug!(worker = worker_id, task = name, "Task completed");
            }
            Outcome::Failed => {
                debug!(worker = worker_id, task = name, "Task returned an error");
            }
            Outcome::Panicked => {
                error!(
                    worker = worker_id,
                    task = name,
                    "Task panicked; discarding worker context"
                );
                return Exit::Poisoned;
            }
            Outcome::Aborted => {
                warn!(worker = worker_id, task = name, "Task aborted at shutdown");
                return Exit::Stopped;
            }
        }
    }
}

async fn initialize(shared: &Shared, worker_id: usize) -> AppResult<WorkerContext> {
    match AssertUnwindSafe(shared.lifecycle.initialize(worker_id))
        .catch_unwind()
        .await
    {
        Ok(result) => result,
        Err(panic) => Err(AppError::worker(format!(
            "Initializer of worker {worker_id} panicked: {}",
            panic_message(panic.as_ref())
        ))),
    }
}

async fn finalize(shared: &Shared, worker_id: usize, ctx: WorkerContext) {
    if let Err(panic) = AssertUnwindSafe(shared.lifecycle.finalize(ctx))
        .catch_unwind()
        .await
    {
        error!(
            worker = worker_id,
            panic = %panic_message(panic.as_ref()),
            "Finalizer panicked"
        );
    }
}

async fn respawn(shared: &Shared, worker_id: usize) -> Option<WorkerContext> {
    for attempt in 1..=shared.options.respawn_attempts {
        tokio::select! {
            _ = shared.stop.cancelled() => return None,
            _ = tokio::time::sleep(shared.options.respawn_backoff) => {}
        }

        match initialize(shared, worker_id).await {
            Ok(ctx) => {
                info!(worker = worker_id, attempt, "Worker respawned");
                return Some(ctx);
            }
            Err(e) => warn!(
                worker = worker_id,
                attempt,
                error = %e,
                "Worker respawn attempt failed"
            ),
        }
    }
    error!(
        worker = worker_id,
        attempts = shared.options.respawn_attempts,
        "Worker could not be respawned; slot lost"
    );
    None
}
