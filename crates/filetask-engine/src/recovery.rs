//! Startup reconciliation of execution state left by a previous process.
//!
//! In-memory jobs do not survive a restart. Log rows that never reached a
//! terminal status are closed as failed, and tasks still flagged `running`
//! are cleared, with a corrective log row when no open row existed.

use std::collections::HashSet;

use filetask_store::{
    JobStatus, NewTaskLog, TaskLogPatch, TaskLogStore, TaskPatch, TaskStore, now,
};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::EngineError;
use crate::queue::ExecutionQueue;

/// Error payload written to interrupted log rows.
pub const INTERRUPTED: &str = "interrupted: process restarted before the job finished";

/// What [`recover`] changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    /// Tasks whose stale `running` flag was cleared.
    pub tasks_reset: usize,
    /// Unfinished log rows closed as failed.
    pub logs_closed: usize,
    /// Corrective log rows written for running tasks without an open row.
    pub logs_created: usize,
}

impl RecoveryReport {
    pub fn is_clean(&self) -> bool {
        *self == Self::default()
    }
}

/// Reconcile persisted execution state with the jobs `queue` actually holds.
/// Run once at startup, before schedules are armed.
pub async fn recover(
    tasks: &dyn TaskStore,
    logs: &dyn TaskLogStore,
    queue: &ExecutionQueue,
) -> Result<RecoveryReport, EngineError> {
    let mut report = RecoveryReport::default();
    let ended = now();
    let mut had_open_log = HashSet::new();

    for log in logs.list_unfinished().await? {
        if queue.is_active(log.task_id) {
            continue;
        }
        had_open_log.insert(log.task_id);
        let patch = TaskLogPatch::finish(JobStatus::Failed, ended)
            .with_error(Some(INTERRUPTED.to_string()));
        if logs.update(log.id, patch).await?.is_some() {
            report.logs_closed += 1;
            warn!(task_id = log.task_id, log_id = log.id, "Closed interrupted execution log");
        }
    }

    for task in tasks.list_all().await? {
        if !task.running || queue.is_active(task.id) {
            continue;
        }
        tasks
            .update(task.id, TaskPatch::default().running(false))
            .await?;
        report.tasks_reset += 1;

        if !had_open_log.contains(&task.id) {
            logs.create(NewTaskLog {
                task_id: task.id,
                status: JobStatus::Failed,
                start_time: task.last_run_at.unwrap_or(ended),
                end_time: Some(ended),
                message: None,
                error: Some(INTERRUPTED.to_string()),
            })
            .await?;
            report.logs_created += 1;
        }
        warn!(task_id = task.id, "Reset stale running flag");
    }

    if report.is_clean() {
        info!("Recovery found nothing to reconcile");
    } else {
        info!(
            tasks_reset = report.tasks_reset,
            logs_closed = report.logs_closed,
            logs_created = report.logs_created,
            "Recovered execution state"
        );
    }
    Ok(report)
}

#[cfg(test)]
#[path = "recovery_tests.rs"]
mod tests;
