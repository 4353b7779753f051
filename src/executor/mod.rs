//! Bounded worker pool
//!
//! Every unit of pipeline work (a fetch, an upload fan-out, a single
//! destination upload) runs as an [`Executor`] task. The pool is a fixed number
//! of worker slots (semaphore permits); submitted tasks are spawned right away
//! and wait inside the runtime for a free slot, so submission never blocks.
//!
//! A task's terminal state is recorded on its [`TaskHandle`] and never
//! interpreted here. Completion callbacks run on a runtime worker after the
//! task releases its slot. A callback that fails or panics does not take the
//! worker down; the error is logged and published as an [`ExecutorFault`].

use futures::FutureExt;
use futures::future::BoxFuture;
use std::any::Any;
use std::cell::RefCell;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore, broadcast};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::config::ExecutorConfig;
use crate::error::{Error, Result};

mod handle;

pub use handle::{TaskHandle, TaskOutcome};
use handle::CallbackRunner;

/// Capacity of the fault broadcast channel
const FAULT_BUFFER: usize = 256;

tokio::task_local! {
    /// Worker slot held by the task currently being polled
    static WORKER_SLOT: RefCell<Option<OwnedSemaphorePermit>>;
}

/// A completion callback failed and nothing downstream absorbed the error
#[derive(Clone, Debug)]
pub struct ExecutorFault {
    /// Name of the task whose callback failed
    pub task: String,
    /// The error the callback returned (or its panic, as an execution error)
    pub error: Arc<Error>,
}

struct Inner {
    slots: Arc<Semaphore>,
    workers: usize,
    task_timeout: Option<Duration>,
    tracker: TaskTracker,
    shutdown: CancellationToken,
    accepting: AtomicBool,
    next_id: AtomicU64,
    runner: CallbackRunner,
}

/// Bounded worker pool shared by every stage of the pipeline
///
/// Cheap to clone; clones share the same pool.
#[derive(Clone)]
pub struct Executor {
    inner: Arc<Inner>,
}

impl Executor {
    /// Create a pool with `config.workers` worker slots
    pub fn new(config: &ExecutorConfig) -> Self {
        let workers = config.workers.max(1);
        let tracker = TaskTracker::new();
        let (faults, _) = broadcast::channel(FAULT_BUFFER);

        Self {
            inner: Arc::new(Inner {
                slots: Arc::new(Semaphore::new(workers)),
                workers,
                task_timeout: config.task_timeout,
                tracker: tracker.clone(),
                shutdown: CancellationToken::new(),
                accepting: AtomicBool::new(true),
                next_id: AtomicU64::new(1),
                runner: CallbackRunner { tracker, faults },
            }),
        }
    }

    /// Number of worker slots
    pub fn workers(&self) -> usize {
        self.inner.workers
    }

    /// Number of tasks (and detached callbacks) not yet finished
    pub fn active_tasks(&self) -> usize {
        self.inner.tracker.len()
    }

    /// Whether the pool still accepts submissions
    pub fn is_accepting(&self) -> bool {
        self.inner.accepting.load(Ordering::SeqCst)
    }

    /// Subscribe to callback faults
    pub fn subscribe_faults(&self) -> broadcast::Receiver<ExecutorFault> {
        self.inner.runner.faults.subscribe()
    }

    /// Submit a task
    ///
    /// Returns immediately. The task waits inside the runtime for a worker
    /// slot, then runs to completion, failure, timeout or cancellation. After
    /// shutdown began, the returned handle is already done with
    /// [`Error::ShuttingDown`].
    pub fn submit<T, F>(&self, name: impl Into<String>, task: F) -> TaskHandle<T>
    where
        T: Clone + Send + Sync + 'static,
        F: Future<Output = Result<T>> + Send + 'static,
    {
        let name = name.into();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = TaskHandle::new(
            id,
            name,
            self.inner.shutdown.child_token(),
            self.inner.runner.clone(),
        );

        if !self.is_accepting() {
            tracing::debug!(task = %handle.name(), "rejecting task submitted during shutdown");
            // Nothing can have registered a callback yet
            let _ = handle.complete(TaskOutcome::failure(Error::ShuttingDown));
            return handle;
        }

        tracing::trace!(task_id = id, task = %handle.name(), "task submitted");

        let inner = Arc::clone(&self.inner);
        let task_handle = handle.clone();
        self.inner
            .tracker
            .spawn(run_task(inner, task_handle, task.boxed()));

        handle
    }

    /// Fan-in barrier: wait until every handle reaches a terminal state
    ///
    /// No short-circuit on failure and no timeout of its own. When called from
    /// inside an executor task, the caller's worker slot is handed back for the
    /// duration of the wait and re-acquired afterwards, so tasks parked here
    /// can never starve their own children of slots.
    pub async fn join_all<T>(&self, handles: &[TaskHandle<T>]) -> Vec<TaskOutcome<T>>
    where
        T: Clone + Send + Sync + 'static,
    {
        let released = WORKER_SLOT
            .try_with(|slot| slot.borrow_mut().take())
            .ok()
            .flatten()
            .is_some();

        let outcomes = futures::future::join_all(handles.iter().map(TaskHandle::wait)).await;

        if released {
            // The semaphore is never closed, so this only waits for capacity
            if let Ok(permit) = Arc::clone(&self.inner.slots).acquire_owned().await {
                let _ = WORKER_SLOT.try_with(|slot| *slot.borrow_mut() = Some(permit));
            }
        }

        outcomes
    }

    /// Stop accepting work and drain the pool
    ///
    /// Waits up to `grace` for outstanding tasks and callbacks to finish, then
    /// cancels whatever is still queued or running and waits for those
    /// cancellations (and their callbacks) to settle. Returns `true` if
    /// everything finished within the grace period.
    pub async fn shutdown(&self, grace: Duration) -> bool {
        self.inner.accepting.store(false, Ordering::SeqCst);
        self.inner.tracker.close();

        tracing::info!(
            active = self.active_tasks(),
            grace_secs = grace.as_secs(),
            "draining executor"
        );

        if tokio::time::timeout(grace, self.inner.tracker.wait())
            .await
            .is_ok()
        {
            return true;
        }

        tracing::warn!(
            active = self.active_tasks(),
            "grace period elapsed, cancelling outstanding tasks"
        );
        self.inner.shutdown.cancel();
        self.inner.tracker.wait().await;
        false
    }
}

async fn run_task<T>(inner: Arc<Inner>, handle: TaskHandle<T>, task: BoxFuture<'static, Result<T>>)
where
    T: Clone + Send + Sync + 'static,
{
    let token = handle.token().clone();

    let permit = tokio::select! {
        biased;
        _ = token.cancelled() => None,
        permit = Arc::clone(&inner.slots).acquire_owned() => permit.ok(),
    };

    let outcome = match permit {
        Some(permit) => {
            WORKER_SLOT
                .scope(
                    RefCell::new(Some(permit)),
                    execute(handle.name(), task, &token, inner.task_timeout),
                )
                .await
        }
        None => TaskOutcome::cancelled(handle.name()),
    };

    if let Some(error) = &outcome.error {
        tracing::debug!(
            task_id = handle.id(),
            task = %handle.name(),
            cancelled = outcome.cancelled,
            error = %error,
            "task ended with an error"
        );
    }

    let callbacks = handle.complete(outcome);
    let runner = handle.runner().clone();
    for callback in callbacks {
        runner.run(handle.clone(), callback).await;
    }
}

async fn execute<T>(
    name: &str,
    task: BoxFuture<'static, Result<T>>,
    token: &CancellationToken,
    task_timeout: Option<Duration>,
) -> TaskOutcome<T> {
    let guarded = AssertUnwindSafe(task).catch_unwind();
    let run = async {
        match task_timeout {
            Some(limit) => match tokio::time::timeout(limit, guarded).await {
                Ok(result) => result,
                Err(_) => Ok(Err(Error::TimedOut {
                    task: name.to_string(),
                    after: limit,
                })),
            },
            None => guarded.await,
        }
    };

    tokio::select! {
        biased;
        _ = token.cancelled() => TaskOutcome::cancelled(name),
        result = run => match result {
            Ok(Ok(value)) => TaskOutcome::success(value),
            Ok(Err(error)) => TaskOutcome::failure(error),
            Err(panic) => TaskOutcome::failure(Error::Execution(format!(
                "task {} panicked: {}",
                name,
                panic_message(panic.as_ref())
            ))),
        },
    }
}

/// Best-effort text of a panic payload
fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
