//! Single-flight FIFO task scheduler.
//!
//! [`TaskQueue`] owns the pending tasks and runs at most one of them at a time
//! through the registered [`TaskHandler`]. Each run races the handler against
//! a deadline and a [`CancellationToken`]; the first to settle decides the
//! outcome and the others are dropped. When a run finishes, the queue drains
//! the next pending task itself, so there is no poller.
//!
//! A handler that loses the race is dropped at its next suspension point.
//! Work it already handed to the OS (a running `git` child, an in-flight HTTP
//! request) may still finish in the background. Before the next task starts,
//! the queue gives the handler [`TaskHandler::on_abandoned`] to undo whatever
//! the dropped run left behind.

use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::storage::{Storage, TaskPatch};
use crate::task::{Task, TaskId, TaskResult, TaskStatus};

pub const TIMED_OUT: &str = "Task timed out";
pub const CANCELLED: &str = "Task cancelled";
const PANICKED: &str = "Task handler panicked";

/// Upper bound on [`TaskHandler::on_abandoned`] before the queue moves on.
pub const ABANDON_GRACE: Duration = Duration::from_secs(30);

/// What the handler gets for one run.
#[derive(Debug, Clone)]
pub struct TaskContext {
    /// The task, already in `running`.
    pub task: Task,
    /// Raised by `cancel()` / `stop()`.
    pub cancel: CancellationToken,
    pub deadline: Instant,
}

/// The single execution handler registered with [`TaskQueue::on_task`].
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(&self, ctx: TaskContext) -> anyhow::Result<TaskResult>;

    /// Called after a run was dropped on timeout, cancellation or panic with
    /// the failure message the queue records. The next task waits for it.
    async fn on_abandoned(&self, _task: &Task, _reason: &str) {}
}

/// Adapter turning an async closure into a [`TaskHandler`].
pub struct HandlerFn<F>(F);

pub fn handler_fn<F, Fut>(f: F) -> HandlerFn<F>
where
    F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<TaskResult>> + Send + 'static,
{
    HandlerFn(f)
}

#[async_trait]
impl<F, Fut> TaskHandler for HandlerFn<F>
where
    F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<TaskResult>> + Send + 'static,
{
    async fn handle(&self, ctx: TaskContext) -> anyhow::Result<TaskResult> {
        (self.0)(ctx).await
    }
}

struct InFlight {
    task_id: TaskId,
    cancel: CancellationToken,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<Task>,
    tasks: HashMap<TaskId, Task>,
    results: HashMap<TaskId, TaskResult>,
    handler: Option<Arc<dyn TaskHandler>>,
    running: bool,
    in_flight: Option<InFlight>,
}

struct Inner {
    state: Mutex<QueueState>,
    task_timeout: Duration,
    storage: Option<Arc<dyn Storage>>,
    span: tracing::Span,
}

enum Outcome {
    Returned(TaskResult),
    Failed(String),
    /// The handler future was dropped before it settled.
    Abandoned(String),
}

/// Cheaply cloneable handle to the scheduler.
///
/// Methods that may start a run (`enqueue`, `start`) must be called from
/// within a Tokio runtime.
#[derive(Clone)]
pub struct TaskQueue {
    inner: Arc<Inner>,
}

impl TaskQueue {
    pub fn new(task_timeout: Duration) -> Self {
        Self::build(task_timeout, None)
    }

    /// Also write every recorded status and result to `storage`.
    pub fn with_storage(task_timeout: Duration, storage: Arc<dyn Storage>) -> Self {
        Self::build(task_timeout, Some(storage))
    }

    fn build(task_timeout: Duration, storage: Option<Arc<dyn Storage>>) -> Self {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(QueueState::default()),
                task_timeout,
                storage,
                span: tracing::info_span!("task_queue", timeout_ms = task_timeout.as_millis() as u64),
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, QueueState> {
        // A poisoned lock only means a panic elsewhere while holding it; the
        // maps themselves are still consistent.
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Append `task` to the pending sequence and try to run it.
    pub fn enqueue(&self, task: Task) {
        {
            let mut state = self.state();
            state.tasks.insert(task.id.clone(), task.clone());
            tracing::info!(
                parent: &self.inner.span,
                task_id = %task.id,
                pending = state.pending.len() + 1,
                "Task enqueued"
            );
            state.pending.push_back(task);
        }
        self.try_drain();
    }

    /// Cancel a pending or in-flight task. Returns `false` for unknown or
    /// already finished tasks.
    pub fn cancel(&self, id: &TaskId) -> bool {
        let _enter = self.inner.span.enter();
        let mut state = self.state();
        if let Some(pos) = state.pending.iter().position(|t| &t.id == id) {
            let Some(task) = state.pending.remove(pos) else {
                return false;
            };
            let failed = match task.transition(TaskStatus::Failed) {
                Ok(failed) => failed,
                Err(e) => {
                    tracing::error!("{}", e);
                    return false;
                }
            };
            let result = TaskResult::failed(id.clone(), CANCELLED);
            state.tasks.insert(id.clone(), failed.clone());
            state.results.insert(id.clone(), result.clone());
            drop(state);

            self.persist(&failed, Some(&result));
            tracing::info!(task_id = %id, "Pending task cancelled");
            return true;
        }

        match &state.in_flight {
            Some(in_flight) if &in_flight.task_id == id => {
                in_flight.cancel.cancel();
                tracing::info!(task_id = %id, "Cancellation raised for running task");
                true
            }
            _ => false,
        }
    }

    pub fn on_task(&self, handler: Arc<dyn TaskHandler>) {
        self.state().handler = Some(handler);
    }

    /// Begin draining pending tasks.
    pub fn start(&self) {
        self.state().running = true;
        tracing::info!(parent: &self.inner.span, "Queue started");
        self.try_drain();
    }

    /// Stop draining and cancel the in-flight task. Pending tasks stay queued.
    pub fn stop(&self) {
        let mut state = self.state();
        state.running = false;
        if let Some(in_flight) = &state.in_flight {
            in_flight.cancel.cancel();
        }
        tracing::info!(parent: &self.inner.span, pending = state.pending.len(), "Queue stopped");
    }

    pub fn get_status(&self, id: &TaskId) -> Option<Task> {
        self.state().tasks.get(id).cloned()
    }

    pub fn get_result(&self, id: &TaskId) -> Option<TaskResult> {
        self.state().results.get(id).cloned()
    }

    /// Number of pending (not yet started) tasks.
    pub fn size(&self) -> usize {
        self.state().pending.len()
    }

    pub fn is_busy(&self) -> bool {
        self.state().in_flight.is_some()
    }

    fn try_drain(&self) {
        let (task, handler, cancel) = {
            let mut state = self.state();
            if !state.running || state.in_flight.is_some() {
                return;
            }
            let Some(handler) = state.handler.clone() else {
                return;
            };

            let task = loop {
                let Some(next) = state.pending.pop_front() else {
                    return;
                };
                match next.transition(TaskStatus::Running) {
                    Ok(running) => break running,
                    Err(e) => tracing::error!(parent: &self.inner.span, "Skipping task: {}", e),
                }
            };

            let cancel = CancellationToken::new();
            state.tasks.insert(task.id.clone(), task.clone());
            state.in_flight = Some(InFlight {
                task_id: task.id.clone(),
                cancel: cancel.clone(),
            });
            (task, handler, cancel)
        };

        self.persist(&task, None);

        let span = tracing::info_span!(parent: &self.inner.span, "task", task_id = %task.id);
        let queue = self.clone();
        tokio::spawn(
            async move {
                tracing::info!("Processing task");
                let outcome = queue.race(handler.clone(), task.clone(), cancel).await;
                if let Outcome::Abandoned(reason) = &outcome {
                    queue.abandon(handler.as_ref(), &task, reason).await;
                }
                queue.finish(task, outcome);
                queue.try_drain();
            }
            .instrument(span),
        );
    }

    async fn race(
        &self,
        handler: Arc<dyn TaskHandler>,
        task: Task,
        cancel: CancellationToken,
    ) -> Outcome {
        let deadline = Instant::now() + self.inner.task_timeout;
        let ctx = TaskContext {
            task,
            cancel: cancel.clone(),
            deadline,
        };
        let run = AssertUnwindSafe(handler.handle(ctx)).catch_unwind();

        tokio::select! {
            res = run => match res {
                Ok(Ok(result)) => Outcome::Returned(result),
                Ok(Err(e)) => Outcome::Failed(e.to_string()),
                Err(_) => Outcome::Abandoned(PANICKED.to_string()),
            },
            _ = tokio::time::sleep_until(deadline) => Outcome::Abandoned(TIMED_OUT.to_string()),
            _ = cancel.cancelled() => Outcome::Abandoned(CANCELLED.to_string()),
        }
    }

    async fn abandon(&self, handler: &dyn TaskHandler, task: &Task, reason: &str) {
        let hook = AssertUnwindSafe(handler.on_abandoned(task, reason)).catch_unwind();
        match tokio::time::timeout(ABANDON_GRACE, hook).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => tracing::error!("Abandon hook panicked"),
            Err(_) => tracing::warn!(
                grace_secs = ABANDON_GRACE.as_secs(),
                "Abandon hook did not finish in time"
            ),
        }
    }

    /// Record the terminal state. A returned result with `success: false`
    /// lands in `failed`, matching what the handler itself stored.
    fn finish(&self, task: Task, outcome: Outcome) {
        let (status, result) = match outcome {
            Outcome::Returned(result) => {
                let status = if result.success {
                    TaskStatus::Completed
                } else {
                    TaskStatus::Failed
                };
                let result = TaskResult {
                    task_id: task.id.clone(),
                    ..result
                };
                (status, result)
            }
            Outcome::Failed(message) | Outcome::Abandoned(message) => {
                (TaskStatus::Failed, TaskResult::failed(task.id.clone(), message))
            }
        };

        let finished = match task.transition(status) {
            Ok(finished) => finished,
            Err(e) => {
                tracing::error!("{}", e);
                task
            }
        };

        if result.success {
            tracing::info!(status = %finished.status, "Task finished");
        } else {
            tracing::warn!(
                status = %finished.status,
                error = result.error.as_deref().unwrap_or(""),
                "Task finished"
            );
        }

        self.persist(&finished, Some(&result));

        let mut state = self.state();
        state.tasks.insert(finished.id.clone(), finished);
        state.results.insert(result.task_id.clone(), result);
        state.in_flight = None;
    }

    fn persist(&self, task: &Task, result: Option<&TaskResult>) {
        let Some(storage) = &self.inner.storage else {
            return;
        };
        if let Err(e) = storage.update_task(&task.id, TaskPatch::status(task.status)) {
            tracing::warn!(task_id = %task.id, "Failed to persist task status: {}", e);
        }
        if let Some(result) = result {
            if let Err(e) = storage.save_task_result(result) {
                tracing::warn!(task_id = %task.id, "Failed to persist task result: {}", e);
            }
        }
    }
}
