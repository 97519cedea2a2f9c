//! Engine error types.

use filetask_store::{StoreError, TaskId};
use thiserror::Error;

/// Errors surfaced by the scheduling and execution engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Malformed or missing cron expression.
    #[error("Invalid cron expression '{expression}': {message}")]
    InvalidSchedule { expression: String, message: String },

    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    /// An execution for the task is already pending or running.
    #[error("Task {0} is already running")]
    TaskAlreadyRunning(TaskId),

    /// Stop requested for a task with no active execution.
    #[error("Task {0} is not running")]
    TaskNotRunning(TaskId),

    /// Operation requires the task to be idle.
    #[error("Task {0} has an active execution")]
    TaskRunning(TaskId),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The queue no longer accepts work.
    #[error("Engine is shutting down")]
    ShuttingDown,
}

impl EngineError {
    pub(crate) fn invalid_schedule(expression: &str, message: impl Into<String>) -> Self {
        EngineError::InvalidSchedule {
            expression: expression.to_string(),
            message: message.into(),
        }
    }

    /// Errors caused by the caller's input rather than the engine or store.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, EngineError::Store(_) | EngineError::ShuttingDown)
    }
}
