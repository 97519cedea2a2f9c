//! In-memory execution job state.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use filetask_store::{JobStatus, TaskId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::event::TaskEvent;
use crate::event_bus::EventBus;

/// Point-in-time view of an active job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub task_id: TaskId,
    pub job_id: Uuid,
    pub status: JobStatus,
    pub progress: u8,
    pub cancel_requested: bool,
    pub accepted_at: DateTime<Utc>,
}

struct JobState {
    status: JobStatus,
    cancel_requested: bool,
}

struct ProgressState {
    value: u8,
    finished: bool,
}

/// One accepted execution of a task.
///
/// `state` guards the status machine and the cancel flag. `progress` is a
/// separate lock held only while a value is updated and queued on the bus,
/// which keeps per-job event order equal to lock order.
pub(crate) struct ExecutionJob {
    pub(crate) task_id: TaskId,
    pub(crate) job_id: Uuid,
    pub(crate) accepted_at: DateTime<Utc>,
    state: Mutex<JobState>,
    progress: Mutex<ProgressState>,
    token: CancellationToken,
    done: watch::Sender<Option<JobStatus>>,
}

impl ExecutionJob {
    pub(crate) fn new(task_id: TaskId, accepted_at: DateTime<Utc>, token: CancellationToken) -> Self {
        let (done, _) = watch::channel(None);
        Self {
            task_id,
            job_id: Uuid::new_v4(),
            accepted_at,
            state: Mutex::new(JobState {
                status: JobStatus::Pending,
                cancel_requested: false,
            }),
            progress: Mutex::new(ProgressState {
                value: 0,
                finished: false,
            }),
            token,
            done,
        }
    }

    pub(crate) fn snapshot(&self) -> JobSnapshot {
        let (status, cancel_requested) = {
            let state = self.state.lock();
            (state.status, state.cancel_requested)
        };
        JobSnapshot {
            task_id: self.task_id,
            job_id: self.job_id,
            status,
            progress: self.progress(),
            cancel_requested,
            accepted_at: self.accepted_at,
        }
    }

    pub(crate) fn status(&self) -> JobStatus {
        self.state.lock().status
    }

    pub(crate) fn cancel_requested(&self) -> bool {
        self.state.lock().cancel_requested
    }

    /// Stop flagged on this job, or its token cancelled through the queue's
    /// shutdown token.
    pub(crate) fn stop_requested(&self) -> bool {
        self.cancel_requested() || self.token.is_cancelled()
    }

    pub(crate) fn progress(&self) -> u8 {
        self.progress.lock().value
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Move `pending -> running`. Returns false when a stop arrived first.
    pub(crate) fn begin(&self) -> bool {
        let mut state = self.state.lock();
        if state.cancel_requested || state.status != JobStatus::Pending {
            return false;
        }
        state.status = JobStatus::Running;
        true
    }

    /// Flag the job for cancellation and return the status seen at that moment.
    pub(crate) fn request_cancel(&self) -> JobStatus {
        let status = {
            let mut state = self.state.lock();
            state.cancel_requested = true;
            state.status
        };
        self.token.cancel();
        status
    }

    pub(crate) fn set_status(&self, status: JobStatus) {
        self.state.lock().status = status;
    }

    pub(crate) fn publish_started(&self, bus: &EventBus) {
        let progress = self.progress.lock();
        if progress.finished {
            return;
        }
        bus.publish(TaskEvent::Started {
            task_id: self.task_id,
            job_id: self.job_id,
        });
    }

    /// Record a progress report, clamped to 0..=100 and never below the
    /// current value, and publish it. Returns the effective value.
    pub(crate) fn report_progress(&self, value: u8, bus: &EventBus) -> u8 {
        let mut progress = self.progress.lock();
        if progress.finished {
            return progress.value;
        }
        progress.value = progress.value.max(value.min(100));
        bus.publish(TaskEvent::Progress {
            task_id: self.task_id,
            job_id: self.job_id,
            progress: progress.value,
        });
        progress.value
    }

    /// Publish the terminal event. Later progress reports are dropped.
    pub(crate) fn publish_finished(&self, bus: &EventBus, status: JobStatus, error: Option<String>) {
        let mut progress = self.progress.lock();
        if progress.finished {
            return;
        }
        progress.finished = true;
        bus.publish(TaskEvent::Finished {
            task_id: self.task_id,
            job_id: self.job_id,
            status,
            error,
        });
    }

    pub(crate) fn signal_done(&self, status: JobStatus) {
        self.done.send_replace(Some(status));
    }

    pub(crate) fn handle(self: &Arc<Self>) -> JobHandle {
        JobHandle {
            task_id: self.task_id,
            job_id: self.job_id,
            done: self.done.subscribe(),
        }
    }
}

/// Acknowledgement of an accepted execution.
#[derive(Debug, Clone)]
pub struct JobHandle {
    pub task_id: TaskId,
    pub job_id: Uuid,
    done: watch::Receiver<Option<JobStatus>>,
}

impl JobHandle {
    /// Wait for the terminal status.
    pub async fn wait(&self) -> JobStatus {
        let mut done = self.done.clone();
        match done.wait_for(Option::is_some).await {
            Ok(status) => (*status).unwrap_or(JobStatus::Failed),
            // Runner dropped without finalizing, e.g. runtime shutdown.
            Err(_) => JobStatus::Failed,
        }
    }

    /// Terminal status if the job already finished.
    pub fn try_status(&self) -> Option<JobStatus> {
        *self.done.borrow()
    }
}
