//! Cancellable background work with an observable lifecycle.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;

use parking_lot::{Condvar, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{BoxError, Error, Result};

/// Lifecycle of a task. `Completed`, `Failed` and `Cancelled` are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Created,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed | TaskState::Cancelled
        )
    }
}

type Process<T> = Box<dyn FnOnce(CancellationToken) -> std::result::Result<T, BoxError> + Send>;

enum Status<T> {
    Created(Process<T>),
    Running,
    Completed(T),
    Failed(Arc<dyn std::error::Error + Send + Sync>),
    Cancelled,
}

impl<T> Status<T> {
    fn state(&self) -> TaskState {
        match self {
            Status::Created(_) => TaskState::Created,
            Status::Running => TaskState::Running,
            Status::Completed(_) => TaskState::Completed,
            Status::Failed(_) => TaskState::Failed,
            Status::Cancelled => TaskState::Cancelled,
        }
    }
}

struct Shared<T> {
    status: Mutex<Status<T>>,
    done: Condvar,
    /// Set by `run`; cancelling it is how `close` reaches the process.
    token: Mutex<Option<CancellationToken>>,
}

/// Runs one process function on its own thread, at most once.
///
/// Cancellation is cooperative: `close` cancels the token handed to the
/// process and marks the task `Cancelled` right away, but a process that
/// never looks at its token keeps running until it returns. Whatever it
/// returns after that is discarded. A process that panics ends `Failed`.
pub struct Task<T> {
    shared: Arc<Shared<T>>,
}

impl<T: Send + 'static> Task<T> {
    pub fn new<F>(process: F) -> Self
    where
        F: FnOnce(CancellationToken) -> std::result::Result<T, BoxError> + Send + 'static,
    {
        Task {
            shared: Arc::new(Shared {
                status: Mutex::new(Status::Created(Box::new(process))),
                done: Condvar::new(),
                token: Mutex::new(None),
            }),
        }
    }

    /// Start the process on a new thread, under a child token of `parent`.
    ///
    /// Only a `Created` task can run; any later call fails with
    /// `Error::TaskAlreadyStarted` and leaves the task untouched.
    pub fn run(&self, parent: &CancellationToken) -> Result<()> {
        let token = parent.child_token();
        let process = {
            let mut status = self.shared.status.lock();
            if !matches!(*status, Status::Created(_)) {
                return Err(Error::TaskAlreadyStarted);
            }
            // Published under the status lock so a concurrent close sees it
            *self.shared.token.lock() = Some(token.clone());
            match std::mem::replace(&mut *status, Status::Running) {
                Status::Created(process) => process,
                _ => unreachable!("checked above"),
            }
        };

        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name("stagebuf-task".into())
            .spawn(move || {
                let result = panic::catch_unwind(AssertUnwindSafe(|| process(token.clone())))
                    .unwrap_or_else(|payload| Err(panic_message(payload).into()));
                let mut status = shared.status.lock();
                if matches!(*status, Status::Running) {
                    *status = match result {
                        _ if token.is_cancelled() => Status::Cancelled,
                        Ok(value) => Status::Completed(value),
                        Err(err) => Status::Failed(Arc::from(err)),
                    };
                    debug!(state = ?status.state(), "task finished");
                }
                shared.done.notify_all();
            });

        if let Err(err) = spawned {
            let mut status = self.shared.status.lock();
            *status = Status::Failed(Arc::new(std::io::Error::new(err.kind(), err.to_string())));
            self.shared.done.notify_all();
            return Err(Error::Io(err));
        }
        Ok(())
    }

    /// Request cancellation and return without waiting for the process.
    pub fn close(&self) {
        let mut status = self.shared.status.lock();
        if let Some(token) = self.shared.token.lock().as_ref() {
            token.cancel();
        }
        if !status.state().is_terminal() {
            *status = Status::Cancelled;
            self.shared.done.notify_all();
        }
    }

    pub fn state(&self) -> TaskState {
        self.shared.status.lock().state()
    }
}

impl<T: Clone + Send + 'static> Task<T> {
    /// Block until the task is final, then report how it ended.
    ///
    /// `Error::Cancelled` for a cancelled task, `Error::TaskFailed` with the
    /// process error for a failed one.
    pub fn outcome(&self) -> Result<T> {
        let mut status = self.shared.status.lock();
        while !status.state().is_terminal() {
            self.shared.done.wait(&mut status);
        }
        match &*status {
            Status::Completed(value) => Ok(value.clone()),
            Status::Failed(err) => Err(Error::TaskFailed(Arc::clone(err))),
            _ => Err(Error::Cancelled),
        }
    }
}

/// Text of a caught panic, so it can be reported as a task failure.
fn panic_message(payload: Box<dyn Any + Send>) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    format!("task process panicked: {detail}")
}

impl<T> Drop for Task<T> {
    fn drop(&mut self) {
        if let Some(token) = self.shared.token.lock().as_ref() {
            token.cancel();
        }
    }
}
