//! The seam between the engine and the code that does a task's file work.

use std::error::Error as StdError;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use filetask_store::{Task, TaskId};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::event_bus::EventBus;
use crate::job::ExecutionJob;

/// Runs one execution of a task.
///
/// Cancellation is cooperative: implementations should check
/// [`WorkContext::is_cancelled`] between discrete units of work and return
/// promptly once it is set. A unit that never checks runs to completion.
#[async_trait]
pub trait WorkUnit: Send + Sync {
    async fn run(&self, task: &Task, ctx: WorkContext) -> Result<WorkOutcome, WorkUnitFailure>;
}

/// Successful result of a work unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkOutcome {
    /// Summary stored as the log row's output payload.
    pub message: Option<String>,
}

impl WorkOutcome {
    pub fn with_message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
        }
    }
}

/// Opaque failure raised by a work unit.
#[derive(Debug, Error)]
#[error("{message}{}", source_suffix(.source))]
pub struct WorkUnitFailure {
    message: String,
    #[source]
    source: Option<Box<dyn StdError + Send + Sync>>,
}

fn source_suffix(source: &Option<Box<dyn StdError + Send + Sync>>) -> String {
    source
        .as_ref()
        .map(|s| format!(": {}", s))
        .unwrap_or_default()
}

impl WorkUnitFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        message: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Handle given to a running work unit.
#[derive(Clone)]
pub struct WorkContext {
    job: Arc<ExecutionJob>,
    bus: Arc<EventBus>,
}

impl WorkContext {
    pub(crate) fn new(job: Arc<ExecutionJob>, bus: Arc<EventBus>) -> Self {
        Self { job, bus }
    }

    /// A context not tracked by any queue, for driving a work unit directly.
    /// Progress goes to a private bus with no subscribers.
    pub fn detached(task_id: TaskId) -> Self {
        let job = ExecutionJob::new(task_id, Utc::now(), CancellationToken::new());
        job.begin();
        Self::new(Arc::new(job), Arc::new(EventBus::new()))
    }

    pub fn task_id(&self) -> TaskId {
        self.job.task_id
    }

    pub fn job_id(&self) -> Uuid {
        self.job.job_id
    }

    /// Report progress in percent. Values above 100 are clamped and values
    /// below the current progress are raised to it. Returns the value
    /// actually recorded.
    pub fn report_progress(&self, progress: u8) -> u8 {
        self.job.report_progress(progress, &self.bus)
    }

    pub fn progress(&self) -> u8 {
        self.job.progress()
    }

    pub fn is_cancelled(&self) -> bool {
        self.job.token().is_cancelled()
    }

    /// Token cancelled on stop or shutdown, for use in `select!`.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.job.token().clone()
    }

    /// Request cancellation of this job. Used by detached contexts.
    pub fn cancel(&self) {
        self.job.request_cancel();
    }
}
