//! Handles for waiting on the result of a task spawned on a [`TaskPool`].
//!
//! Dropping a [`JoinHandle`] detaches the task: it keeps running and its result
//! is discarded. A task that panics never delivers its result, which the handle
//! reports as `RecvError` rather than propagating the panic.
//!
//! [`TaskPool`]: crate::task_pool::TaskPool

use std::{sync::mpsc::RecvError, time::Duration};

use crate::completion::Completion;

/// A handle for waiting on the result of a `'static` task.
pub struct JoinHandle<R>(Completion<R>);

impl<R> JoinHandle<R> {
    pub(crate) fn new(completion: Completion<R>) -> JoinHandle<R> {
        JoinHandle(completion)
    }

    /// Blocks until the task completes and returns its result.
    ///
    /// Returns `Err(RecvError)` if the task panicked before producing a value.
    pub fn join(self) -> Result<R, RecvError> {
        self.0.wait().completed().ok_or(RecvError)
    }

    /// Waits at most `timeout` for the task's result.
    ///
    /// If the task is still running the handle is returned in `Err`, so it can
    /// be joined again or dropped to abandon the result.
    pub fn join_timeout(self, timeout: Duration) -> Result<Result<R, RecvError>, JoinHandle<R>> {
        self.0
            .wait_timeout(timeout)
            .map(|outcome| outcome.completed().ok_or(RecvError))
            .map_err(JoinHandle)
    }

    /// Takes the result if the task has already finished.
    pub fn try_join(self) -> Result<Result<R, RecvError>, JoinHandle<R>> {
        self.0
            .poll()
            .map(|outcome| outcome.completed().ok_or(RecvError))
            .map_err(JoinHandle)
    }
}

impl<R> std::fmt::Debug for JoinHandle<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JoinHandle")
            .field("finished", &!self.0.is_open())
            .finish()
    }
}
