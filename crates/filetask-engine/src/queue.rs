//! Execution queue: at most one active job per task id.
//!
//! `add_task` claims the task's slot in the active-job map atomically, then
//! claims the task's persisted `running` flag with a compare-and-set so that
//! another process sharing the database cannot start the same task. It
//! records the acceptance durably and returns; the work unit runs on a
//! spawned task.
//! Every accepted job reaches exactly one terminal status through
//! [`finalize`], which closes the log row, clears the task's `running` flag,
//! publishes the terminal event and frees the slot, in that order.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use filetask_store::{
    JobStatus, NewTaskLog, Task, TaskId, TaskLogPatch, TaskLogStore, TaskPatch, TaskStore, now,
};
use futures::FutureExt;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::error::EngineError;
use crate::event_bus::EventBus;
use crate::job::{ExecutionJob, JobHandle, JobSnapshot};
use crate::scheduler::TaskTrigger;
use crate::work_unit::{WorkContext, WorkUnit};

struct QueueInner {
    tasks: Arc<dyn TaskStore>,
    logs: Arc<dyn TaskLogStore>,
    work_unit: Arc<dyn WorkUnit>,
    bus: Arc<EventBus>,
    jobs: DashMap<TaskId, Arc<ExecutionJob>>,
    shutdown: CancellationToken,
}

/// Per-task serialized executor. Cloning shares the same queue.
#[derive(Clone)]
pub struct ExecutionQueue {
    inner: Arc<QueueInner>,
}

impl ExecutionQueue {
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        logs: Arc<dyn TaskLogStore>,
        work_unit: Arc<dyn WorkUnit>,
        bus: Arc<EventBus>,
    ) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                tasks,
                logs,
                work_unit,
                bus,
                jobs: DashMap::new(),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.inner.bus
    }

    /// Accept an execution of `task_id`.
    ///
    /// Fails with `TaskAlreadyRunning` if the task already has a pending or
    /// running job here, or if its persisted `running` flag is set by anyone.
    /// On success the job is `pending` and its log row exists; the work unit
    /// starts asynchronously.
    pub async fn add_task(&self, task_id: TaskId) -> Result<JobHandle, EngineError> {
        if self.inner.shutdown.is_cancelled() {
            return Err(EngineError::ShuttingDown);
        }
        let previous = self
            .inner
            .tasks
            .find(task_id)
            .await?
            .ok_or(EngineError::TaskNotFound(task_id))?;

        let accepted_at = now();
        let job = match self.inner.jobs.entry(task_id) {
            Entry::Occupied(_) => return Err(EngineError::TaskAlreadyRunning(task_id)),
            Entry::Vacant(slot) => {
                let job = Arc::new(ExecutionJob::new(
                    task_id,
                    accepted_at,
                    self.inner.shutdown.child_token(),
                ));
                slot.insert(job.clone());
                job
            }
        };

        let (task, log_id) = match self.accept(&job, &previous).await {
            Ok(accepted) => accepted,
            Err(e) => {
                job.set_status(JobStatus::Failed);
                self.inner.release(&job);
                job.signal_done(JobStatus::Failed);
                return Err(e);
            }
        };

        let handle = job.handle();
        let span = info_span!("task_job", task_id, job_id = %job.job_id);
        tokio::spawn(run_job(self.inner.clone(), job, task, log_id).instrument(span));

        info!(task_id, job_id = %handle.job_id, "Task execution accepted");
        Ok(handle)
    }

    /// Durable side of acceptance: claim the persisted `running` flag, then
    /// write the pending log row. A failed log write gives the claim back.
    async fn accept(&self, job: &ExecutionJob, previous: &Task) -> Result<(Task, i64), EngineError> {
        let task_id = job.task_id;
        let Some(task) = self
            .inner
            .tasks
            .claim_running(task_id, job.accepted_at)
            .await?
        else {
            return match self.inner.tasks.find(task_id).await? {
                Some(_) => {
                    debug!(task_id, "Persisted running flag already claimed");
                    Err(EngineError::TaskAlreadyRunning(task_id))
                }
                None => Err(EngineError::TaskNotFound(task_id)),
            };
        };

        match self
            .inner
            .logs
            .create(NewTaskLog::pending(task_id, job.accepted_at))
            .await
        {
            Ok(log) => Ok((task, log.id)),
            Err(e) => {
                let restore = TaskPatch::default()
                    .running(false)
                    .last_run_at(previous.last_run_at);
                if let Err(undo) = self.inner.tasks.update(task_id, restore).await {
                    error!(task_id, error = %undo, "Failed to release running flag");
                }
                Err(e.into())
            }
        }
    }

    /// Request cancellation of the task's active job.
    ///
    /// A job that has not begun is stopped without ever running and this
    /// call returns once it is finalized. A running job is only flagged; its
    /// work unit observes the flag at its next checkpoint.
    pub async fn stop_task(&self, task_id: TaskId) -> Result<(), EngineError> {
        let job = self
            .inner
            .jobs
            .get(&task_id)
            .map(|entry| entry.value().clone())
            .ok_or(EngineError::TaskNotRunning(task_id))?;

        let status = job.request_cancel();
        info!(task_id, job_id = %job.job_id, %status, "Stop requested");
        if status == JobStatus::Pending {
            job.handle().wait().await;
        }
        Ok(())
    }

    /// Snapshot of the task's active job, if any.
    pub fn get_task_status(&self, task_id: TaskId) -> Option<JobSnapshot> {
        self.inner.jobs.get(&task_id).map(|entry| entry.snapshot())
    }

    pub fn is_active(&self, task_id: TaskId) -> bool {
        self.inner
            .jobs
            .get(&task_id)
            .is_some_and(|entry| entry.status().is_active())
    }

    pub fn active_jobs(&self) -> Vec<JobSnapshot> {
        let mut jobs: Vec<_> = self
            .inner
            .jobs
            .iter()
            .map(|entry| entry.snapshot())
            .collect();
        jobs.sort_by_key(|j| j.task_id);
        jobs
    }

    pub fn active_count(&self) -> usize {
        self.inner.jobs.len()
    }

    /// Stop accepting work, cancel every active job and wait up to `timeout`
    /// for all of them to finalize. Returns false on timeout.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        let jobs: Vec<Arc<ExecutionJob>> = self
            .inner
            .jobs
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        // Flag every job before the parent token fires, so a unit that
        // returns as soon as its token trips is still recorded as stopped.
        for job in &jobs {
            job.request_cancel();
        }
        self.inner.shutdown.cancel();
        if jobs.is_empty() {
            return true;
        }

        info!(count = jobs.len(), "Cancelling active jobs");
        let waits: Vec<_> = jobs
            .iter()
            .map(|job| {
                let handle = job.handle();
                async move { handle.wait().await }
            })
            .collect();

        match tokio::time::timeout(timeout, futures::future::join_all(waits)).await {
            Ok(_) => true,
            Err(_) => {
                warn!(
                    remaining = self.inner.jobs.len(),
                    "Timed out waiting for jobs to finish"
                );
                false
            }
        }
    }
}

impl QueueInner {
    /// Free the task's slot if it still belongs to `job`.
    fn release(&self, job: &Arc<ExecutionJob>) {
        self.jobs
            .remove_if(&job.task_id, |_, current| Arc::ptr_eq(current, job));
    }
}

#[async_trait]
impl TaskTrigger for ExecutionQueue {
    async fn fire(&self, task_id: TaskId) -> Result<(), EngineError> {
        self.add_task(task_id).await.map(|_| ())
    }
}

struct Outcome {
    status: JobStatus,
    message: Option<String>,
    error: Option<String>,
}

async fn run_job(inner: Arc<QueueInner>, job: Arc<ExecutionJob>, task: Task, log_id: i64) {
    if inner.shutdown.is_cancelled() {
        job.request_cancel();
    }
    let outcome = if job.begin() {
        if let Err(e) = inner
            .logs
            .update(log_id, TaskLogPatch::status(JobStatus::Running))
            .await
        {
            warn!(error = %e, "Failed to mark log row running");
        }
        job.publish_started(&inner.bus);
        debug!("Work unit started");

        let ctx = WorkContext::new(job.clone(), inner.bus.clone());
        let result = AssertUnwindSafe(inner.work_unit.run(&task, ctx))
            .catch_unwind()
            .await;

        if job.stop_requested() {
            let message = match result {
                Ok(Ok(out)) => out.message,
                _ => None,
            };
            Outcome {
                status: JobStatus::Stopped,
                message: message.or_else(|| Some("stopped on request".to_string())),
                error: None,
            }
        } else {
            match result {
                Ok(Ok(out)) => Outcome {
                    status: JobStatus::Success,
                    message: out.message,
                    error: None,
                },
                Ok(Err(failure)) => Outcome {
                    status: JobStatus::Failed,
                    message: None,
                    error: Some(failure.to_string()),
                },
                Err(panic) => Outcome {
                    status: JobStatus::Failed,
                    message: None,
                    error: Some(format!("work unit panicked: {}", panic_message(&*panic))),
                },
            }
        }
    } else {
        Outcome {
            status: JobStatus::Stopped,
            message: Some("stopped before start".to_string()),
            error: None,
        }
    };

    finalize(&inner, &job, log_id, outcome).await;
}

async fn finalize(inner: &QueueInner, job: &Arc<ExecutionJob>, log_id: i64, outcome: Outcome) {
    let task_id = job.task_id;
    let patch = TaskLogPatch::finish(outcome.status, now())
        .with_message(outcome.message)
        .with_error(outcome.error.clone());
    if let Err(e) = inner.logs.update(log_id, patch).await {
        error!(error = %e, "Failed to record job outcome");
    }
    if let Err(e) = inner
        .tasks
        .update(task_id, TaskPatch::default().running(false))
        .await
    {
        error!(error = %e, "Failed to clear running flag");
    }

    job.set_status(outcome.status);
    job.publish_finished(&inner.bus, outcome.status, outcome.error.clone());
    inner.release(job);
    job.signal_done(outcome.status);

    match outcome.status {
        JobStatus::Failed => warn!(
            status = %outcome.status,
            error = outcome.error.as_deref().unwrap_or_default(),
            "Task execution finished"
        ),
        status => info!(%status, "Task execution finished"),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
