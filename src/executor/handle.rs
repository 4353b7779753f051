//! Task handles and outcomes.

use futures::FutureExt;
use futures::future::BoxFuture;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::error::{Error, Result};

use super::ExecutorFault;

/// Terminal state of a task
///
/// The three fields are independent facts about how the task ended. The
/// executor itself only ever produces one of success, failure or cancellation,
/// but consumers must not assume the fields are mutually exclusive.
#[derive(Clone, Debug)]
pub struct TaskOutcome<T> {
    /// Value the task produced
    pub value: Option<T>,
    /// Error the task raised
    pub error: Option<Arc<Error>>,
    /// Whether the task was cancelled before it could finish
    pub cancelled: bool,
}

impl<T> TaskOutcome<T> {
    /// A task that returned a value
    pub fn success(value: T) -> Self {
        Self {
            value: Some(value),
            error: None,
            cancelled: false,
        }
    }

    /// A task that raised an error
    pub fn failure(error: Error) -> Self {
        Self {
            value: None,
            error: Some(Arc::new(error)),
            cancelled: false,
        }
    }

    /// A task that was cancelled
    pub fn cancelled(task: &str) -> Self {
        Self {
            value: None,
            error: Some(Arc::new(Error::Cancelled(task.to_string()))),
            cancelled: true,
        }
    }

    /// Error raised by the task, ignoring cancellation
    pub fn raised(&self) -> Option<&Arc<Error>> {
        if self.cancelled {
            None
        } else {
            self.error.as_ref()
        }
    }

    /// Whether the task produced a value and raised nothing
    pub fn is_success(&self) -> bool {
        self.value.is_some() && self.error.is_none() && !self.cancelled
    }
}

pub(super) type Callback<T> =
    Box<dyn FnOnce(TaskHandle<T>) -> BoxFuture<'static, Result<()>> + Send + 'static>;

/// Where completion callbacks run and where their failures go
#[derive(Clone)]
pub(super) struct CallbackRunner {
    pub(super) tracker: TaskTracker,
    pub(super) faults: broadcast::Sender<ExecutorFault>,
}

impl CallbackRunner {
    /// Run one callback, routing an error or panic to the fault channel
    pub(super) async fn run<T>(&self, handle: TaskHandle<T>, callback: Callback<T>)
    where
        T: Clone + Send + Sync + 'static,
    {
        let task = handle.name().to_string();
        let result = AssertUnwindSafe(async move { callback(handle).await })
            .catch_unwind()
            .await;

        let error = match result {
            Ok(Ok(())) => return,
            Ok(Err(e)) => e,
            Err(panic) => Error::Execution(format!(
                "completion callback panicked: {}",
                super::panic_message(panic.as_ref())
            )),
        };

        tracing::error!(task = %task, error = %error, "task completion callback failed");
        self.faults
            .send(ExecutorFault {
                task,
                error: Arc::new(error),
            })
            .ok();
    }

    /// Run a callback as a task of its own
    fn spawn<T>(&self, handle: TaskHandle<T>, callback: Callback<T>)
    where
        T: Clone + Send + Sync + 'static,
    {
        let runner = self.clone();
        self.tracker
            .spawn(async move { runner.run(handle, callback).await });
    }
}

struct State<T> {
    outcome: Option<TaskOutcome<T>>,
    callbacks: Vec<Callback<T>>,
}

struct Shared<T> {
    id: u64,
    name: String,
    token: CancellationToken,
    state: Mutex<State<T>>,
    finished: watch::Sender<bool>,
    runner: CallbackRunner,
}

/// Handle to a task submitted to the [`Executor`](super::Executor)
///
/// Cheap to clone; every clone observes the same task.
pub struct TaskHandle<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for TaskHandle<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.shared.id)
            .field("name", &self.shared.name)
            .finish_non_exhaustive()
    }
}

impl<T> TaskHandle<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub(super) fn new(
        id: u64,
        name: String,
        token: CancellationToken,
        runner: CallbackRunner,
    ) -> Self {
        let (finished, _) = watch::channel(false);
        Self {
            shared: Arc::new(Shared {
                id,
                name,
                token,
                state: Mutex::new(State {
                    outcome: None,
                    callbacks: Vec::new(),
                }),
                finished,
                runner,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State<T>> {
        // Callbacks never run under this lock, so a poisoned guard still holds consistent data
        self.shared
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Executor-assigned task ID
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// Task name given at submission
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Whether the task reached a terminal state
    pub fn done(&self) -> bool {
        self.state().outcome.is_some()
    }

    /// Whether the task ended by cancellation
    pub fn cancelled(&self) -> bool {
        self.state()
            .outcome
            .as_ref()
            .is_some_and(|outcome| outcome.cancelled)
    }

    /// Error the task ended with, if any
    pub fn exception(&self) -> Option<Arc<Error>> {
        self.state()
            .outcome
            .as_ref()
            .and_then(|outcome| outcome.error.clone())
    }

    /// Value the task produced, if it finished with one
    pub fn result(&self) -> Option<T> {
        self.state()
            .outcome
            .as_ref()
            .and_then(|outcome| outcome.value.clone())
    }

    /// Full terminal outcome, once done
    pub fn outcome(&self) -> Option<TaskOutcome<T>> {
        self.state().outcome.clone()
    }

    /// Request cancellation
    ///
    /// A task still waiting for a worker slot never starts; a running task is
    /// dropped at its next suspension point. No-op once the task is done.
    pub fn cancel(&self) {
        self.shared.token.cancel();
    }

    /// Wait until the task reaches a terminal state
    pub async fn wait(&self) -> TaskOutcome<T> {
        let mut finished = self.shared.finished.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait
        let _ = finished.wait_for(|done| *done).await;
        self.outcome()
            .unwrap_or_else(|| TaskOutcome::failure(Error::Execution(format!(
                "task {} signalled completion without an outcome",
                self.name()
            ))))
    }

    /// Register a callback to run exactly once after the task ends
    ///
    /// The callback always runs on a runtime worker. If the task is already
    /// done it is spawned as a task of its own rather than invoked inline.
    /// An `Err` or panic from the callback is published on the executor's
    /// fault channel.
    pub fn on_complete<F, Fut>(&self, callback: F)
    where
        F: FnOnce(TaskHandle<T>) -> Fut + Send + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        let callback: Callback<T> = Box::new(move |handle| callback(handle).boxed());

        {
            let mut state = self.state();
            if state.outcome.is_none() {
                state.callbacks.push(callback);
                return;
            }
        }

        self.shared.runner.spawn(self.clone(), callback);
    }

    pub(super) fn token(&self) -> &CancellationToken {
        &self.shared.token
    }

    pub(super) fn runner(&self) -> &CallbackRunner {
        &self.shared.runner
    }

    /// Record the outcome, wake waiters and hand back the pending callbacks
    pub(super) fn complete(&self, outcome: TaskOutcome<T>) -> Vec<Callback<T>> {
        let callbacks = {
            let mut state = self.state();
            if state.outcome.is_some() {
                return Vec::new();
            }
            state.outcome = Some(outcome);
            std::mem::take(&mut state.callbacks)
        };
        self.shared.finished.send_replace(true);
        callbacks
    }
}
