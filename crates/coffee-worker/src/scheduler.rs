//! Jittered periodic scheduler.
//!
//! Fires a [`ScheduledJob`] every `period * (1 ± jitter)`. The next delay is
//! drawn only after the previous firing has finished, so firings never
//! overlap.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use coffee_core::config::ArxivConfig;
use coffee_core::error::AppError;
use coffee_core::result::AppResult;

/// Work fired by the scheduler.
#[async_trait]
pub trait ScheduledJob: Send + Sync + fmt::Debug {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Run one firing.
    async fn fire(&self) -> AppResult<()>;
}

/// Lifecycle of a scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Created but the recurring timer is not running.
    Unarmed,
    /// The recurring timer is running.
    Armed,
    /// Stopped; no further firings will start.
    Stopped,
}

/// Draw one delay uniformly from `[base * (1 - jitter), base * (1 + jitter)]`.
pub fn jittered_period<R: Rng + ?Sized>(base: Duration, jitter: f64, rng: &mut R) -> Duration {
    if jitter <= 0.0 {
        return base;
    }
    let offset: f64 = rng.random_range(-jitter..=jitter);
    base.mul_f64(1.0 + offset)
}

/// An unarmed periodic scheduler.
#[derive(Debug)]
pub struct PeriodicScheduler {
    job: Arc<dyn ScheduledJob>,
    period: Duration,
    jitter: f64,
}

impl PeriodicScheduler {
    /// Create a scheduler. `period` must be non-zero and `jitter` in `[0, 1)`.
    pub fn new(job: Arc<dyn ScheduledJob>, period: Duration, jitter: f64) -> AppResult<Self> {
        if period.is_zero() {
            return Err(AppError::configuration("Scheduler period must be non-zero"));
        }
        if !jitter.is_finite() || !(0.0..1.0).contains(&jitter) {
            return Err(AppError::configuration(format!(
                "Scheduler jitter must be in [0, 1), got {jitter}"
            )));
        }
        Ok(Self {
            job,
            period,
            jitter,
        })
    }

    /// Create a scheduler using the update period and jitter from config.
    pub fn from_config(job: Arc<dyn ScheduledJob>, config: &ArxivConfig) -> AppResult<Self> {
        Self::new(job, Duration::from_secs(config.period_seconds), config.jitter)
    }

    /// Always [`SchedulerState::Unarmed`]; arming consumes the scheduler.
    pub fn state(&self) -> SchedulerState {
        SchedulerState::Unarmed
    }

    /// Fire the job once, now, and return its result.
    pub async fn run_once(&self) -> AppResult<()> {
        info!(job = self.job.name(), "Running startup firing");
        self.job.fire().await
    }

    /// Start the recurring timer. Must be called from within a tokio runtime.
    pub fn arm(self) -> SchedulerHandle {
        let stop = CancellationToken::new();
        info!(
            job = self.job.name(),
            period_secs = self.period.as_secs_f64(),
            jitter = self.jitter,
            "Scheduler armed"
        );
        let task = tokio::spawn(timer_loop(self.job, self.period, self.jitter, stop.clone()));
        SchedulerHandle {
            stop,
            stopped: AtomicBool::new(false),
            task,
        }
    }
}

async fn timer_loop(
    job: Arc<dyn ScheduledJob>,
    period: Duration,
    jitter: f64,
    stop: CancellationToken,
) {
    loop {
        let delay = {
            let mut rng = rand::rng();
            jittered_period(period, jitter, &mut rng)
        };
        debug!(
            job = job.name(),
            delay_secs = delay.as_secs_f64(),
            "Next firing scheduled"
        );

        tokio::select! {
            _ = stop.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
        if stop.is_cancelled() {
            break;
        }

        // A firing that has started always runs to completion.
        match job.fire().await {
            Ok(()) => debug!(job = job.name(), "Scheduled firing finished"),
            Err(e) if e.is_retriable() => warn!(
                job = job.name(),
                error = %e,
                "Scheduled firing failed; retrying at the next firing"
            ),
            Err(e) => error!(
                job = job.name(),
                kind = ?e.kind,
                error = %e,
                "Scheduled firing failed and will likely fail again"
            ),
        }
    }
    info!(job = job.name(), "Scheduler stopped");
}

/// Handle to an armed scheduler.
#[derive(Debug)]
pub struct SchedulerHandle {
    stop: CancellationToken,
    stopped: AtomicBool,
    task: JoinHandle<()>,
}

impl SchedulerHandle {
    /// Current state.
    pub fn state(&self) -> SchedulerState {
        if self.stopped.load(Ordering::SeqCst) {
            SchedulerState::Stopped
        } else {
            SchedulerState::Armed
        }
    }

    /// Stop the timer. Returns `true` only for the call that stopped it.
    ///
    /// A firing already in progress is not interrupted.
    pub fn stop(&self) -> bool {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.stop.cancel();
        true
    }

    /// Wait until the timer task has ended.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            error!(error = %e, "Scheduler task ended abnormally");
        }
    }
}
