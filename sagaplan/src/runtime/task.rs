use std::{cell::RefCell, fmt, rc::Rc};

use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::SagaError;

/// How a task finished.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskOutcome {
    Done(Value),
    Failed(SagaError),
    Cancelled,
}

impl TaskOutcome {
    pub fn into_result(self) -> Result<Value, SagaError> {
        match self {
            TaskOutcome::Done(value) => Ok(value),
            TaskOutcome::Failed(error) => Err(error),
            TaskOutcome::Cancelled => Err(SagaError::Cancelled),
        }
    }
}

struct TaskInner {
    id: u64,
    name: String,
    token: CancellationToken,
    outcome: watch::Receiver<Option<TaskOutcome>>,
    attached: RefCell<Vec<Task>>,
    failures: mpsc::UnboundedSender<SagaError>,
}

/// Handle to a running saga.
///
/// Returned by [`run_saga`](crate::runtime::run_saga) and by `fork`/`spawn`
/// effects. Cheap to clone; clones refer to the same task.
#[derive(Clone)]
pub struct Task {
    inner: Rc<TaskInner>,
}

/// The driver side of a task: where the outcome and child failures go.
pub(crate) struct TaskSlot {
    pub(crate) outcome: watch::Sender<Option<TaskOutcome>>,
    pub(crate) failures: mpsc::UnboundedReceiver<SagaError>,
}

impl Task {
    pub(crate) fn new(id: u64, name: &str, token: CancellationToken) -> (Task, TaskSlot) {
        let (outcome_tx, outcome_rx) = watch::channel(None);
        let (failures_tx, failures_rx) = mpsc::unbounded_channel();
        let task = Task {
            inner: Rc::new(TaskInner {
                id,
                name: name.to_string(),
                token,
                outcome: outcome_rx,
                attached: RefCell::new(Vec::new()),
                failures: failures_tx,
            }),
        };
        let slot = TaskSlot {
            outcome: outcome_tx,
            failures: failures_rx,
        };
        (task, slot)
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Request cancellation. Attached forks are cancelled with it.
    pub fn cancel(&self) {
        self.inner.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    pub fn is_running(&self) -> bool {
        self.inner.outcome.borrow().is_none()
    }

    /// Returns the outcome if the task has finished.
    pub fn outcome(&self) -> Option<TaskOutcome> {
        self.inner.outcome.borrow().clone()
    }

    /// Wait for the task to finish.
    pub async fn done(&self) -> TaskOutcome {
        let mut rx = self.inner.outcome.clone();
        match rx.wait_for(Option::is_some).await {
            Ok(outcome) => (*outcome).clone().unwrap_or(TaskOutcome::Cancelled),
            // driver dropped without reporting, e.g. its LocalSet is gone
            Err(_) => TaskOutcome::Cancelled,
        }
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.inner.token
    }

    pub(crate) fn attach(&self, child: Task) {
        self.inner.attached.borrow_mut().push(child);
    }

    pub(crate) fn attached(&self) -> Vec<Task> {
        self.inner.attached.borrow().clone()
    }

    /// Report an attached child's failure to this task.
    pub(crate) fn child_failed(&self, error: SagaError) {
        let _ = self.inner.failures.send(error);
    }
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("running", &self.is_running())
            .finish()
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task#{}", self.inner.id)
    }
}
