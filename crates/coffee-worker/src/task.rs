//! Units of work executed on pool workers.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use coffee_core::error::AppError;
use coffee_core::result::AppResult;

use crate::context::WorkerContext;

/// A unit of work that runs on exactly one worker.
#[async_trait]
pub trait WorkerTask: Send + 'static {
    /// Value handed back to the submitter.
    type Output: Send + 'static;

    /// Short name used in logs.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Execute the task with the worker's context.
    async fn run(self, ctx: &mut WorkerContext) -> AppResult<Self::Output>;
}

/// A closure run as a task.
pub struct FnTask<F, T> {
    name: &'static str,
    f: F,
    _output: PhantomData<fn() -> T>,
}

impl<F, T> FnTask<F, T> {
    /// Wrap a closure under the given log name.
    pub fn new(name: &'static str, f: F) -> Self {
        Self {
            name,
            f,
            _output: PhantomData,
        }
    }
}

#[async_trait]
impl<F, T> WorkerTask for FnTask<F, T>
where
    F: for<'a> FnOnce(&'a mut WorkerContext) -> BoxFuture<'a, AppResult<T>> + Send + 'static,
    T: Send + 'static,
{
    type Output = T;

    fn name(&self) -> &'static str {
        self.name
    }

    async fn run(self, ctx: &mut WorkerContext) -> AppResult<T> {
        (self.f)(ctx).await
    }
}

/// How a dispatched task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Completed,
    Failed,
    Panicked,
    Aborted,
}

/// A finished task whose result has not been handed back yet.
///
/// The worker records the outcome before calling [`Finished::deliver`], so a
/// submitter that sees its result also sees up-to-date pool counters.
pub(crate) struct Finished {
    pub(crate) outcome: Outcome,
    reply: Box<dyn FnOnce() + Send>,
}

impl Finished {
    fn new<T: Send + 'static>(
        outcome: Outcome,
        tx: oneshot::Sender<AppResult<T>>,
        result: AppResult<T>,
    ) -> Self {
        Self {
            outcome,
            // The submitter may have dropped its handle; that is not an error.
            reply: Box::new(move || {
                let _ = tx.send(result);
            }),
        }
    }

    pub(crate) fn deliver(self) {
        (self.reply)();
    }
}

/// Type-erased task as it travels through the shared queue.
pub(crate) trait Dispatch: Send {
    fn name(&self) -> &'static str;

    /// Run the task and report how it ended.
    fn dispatch<'a>(
        self: Box<Self>,
        ctx: &'a mut WorkerContext,
        kill: &'a CancellationToken,
    ) -> BoxFuture<'a, Finished>;

    /// Fail the task without running it.
    fn reject(self: Box<Self>, err: AppError);
}

pub(crate) type Job = Box<dyn Dispatch>;

/// A task paired with the channel its result goes back on.
pub(crate) struct Envelope<T: WorkerTask> {
    task: T,
    reply: oneshot::Sender<AppResult<T::Output>>,
}

impl<T: WorkerTask> Envelope<T> {
    pub(crate) fn new(task: T, reply: oneshot::Sender<AppResult<T::Output>>) -> Self {
        Self { task, reply }
    }
}

impl<T: WorkerTask> Dispatch for Envelope<T> {
    fn name(&self) -> &'static str {
        self.task.name()
    }

    fn dispatch<'a>(
        self: Box<Self>,
        ctx: &'a mut WorkerContext,
        kill: &'a CancellationToken,
    ) -> BoxFuture<'a, Finished> {
        let Envelope { task, reply } = *self;
        Box::pin(async move {
            let name = task.name();
            let finished = tokio::select! {
                biased;
                _ = kill.cancelled() => None,
                result = AssertUnwindSafe(task.run(ctx)).catch_unwind() => Some(result),
            };

            match finished {
                Some(Ok(Ok(value))) => Finished::new(Outcome::Completed, reply, Ok(value)),
                Some(Ok(Err(e))) => Finished::new(Outcome::Failed, reply, Err(e)),
                Some(Err(panic)) => Finished::new(
                    Outcome::Panicked,
                    reply,
                    Err(AppError::worker(format!(
                        "Task '{name}' panicked: {}",
                        panic_message(panic.as_ref())
                    ))),
                ),
                None => Finished::new(
                    Outcome::Aborted,
                    reply,
                    Err(AppError::worker(format!(
                        "Task '{name}' was aborted at shutdown"
                    ))),
                ),
            }
        })
    }

    fn reject(self: Box<Self>, err: AppError) {
        let _ = self.reply.send(Err(err));
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Resolves to the result of a submitted task.
///
/// Awaiting the handle never blocks the caller's runtime. Dropping it does
/// not cancel the task.
pub struct TaskHandle<T> {
    rx: oneshot::Receiver<AppResult<T>>,
}

impl<T> TaskHandle<T> {
    pub(crate) fn new(rx: oneshot::Receiver<AppResult<T>>) -> Self {
        Self { rx }
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = AppResult<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx).poll(cx).map(|received| {
            received.unwrap_or_else(|_| {
                Err(AppError::worker("Worker exited without returning a result"))
            })
        })
    }
}

impl<T> fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle").finish_non_exhaustive()
    }
}
