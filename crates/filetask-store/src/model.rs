//! Task, execution log and file history records.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Stable task identifier.
pub type TaskId = i64;

/// Current time at the microsecond precision every backend keeps.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// A task definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Unique task ID.
    pub id: TaskId,
    /// Human-readable name.
    pub name: String,
    /// Directory the job reads from.
    pub source_path: String,
    /// Directory the job writes into.
    pub target_path: String,
    /// Cron expression; `None` means manual only.
    pub cron: Option<String>,
    /// Whether the cron trigger is armed.
    pub enabled: bool,
    /// Replace files that already exist in the target tree.
    pub overwrite: bool,
    /// Display snapshot of "currently executing".
    pub running: bool,
    /// Start of the most recent execution.
    pub last_run_at: Option<DateTime<Utc>>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last update time.
    pub updated_at: DateTime<Utc>,
}

impl Task {
    /// Enabled and carrying a non-blank cron expression.
    pub fn is_schedulable(&self) -> bool {
        self.enabled && has_cron(self.cron.as_deref())
    }
}

fn has_cron(cron: Option<&str>) -> bool {
    cron.is_some_and(|c| !c.trim().is_empty())
}

/// Fields for creating a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTask {
    pub name: String,
    pub source_path: String,
    pub target_path: String,
    #[serde(default)]
    pub cron: Option<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub overwrite: bool,
}

fn default_enabled() -> bool {
    true
}

impl NewTask {
    /// Create an enabled, manual-only task definition.
    pub fn new(
        name: impl Into<String>,
        source_path: impl Into<String>,
        target_path: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            source_path: source_path.into(),
            target_path: target_path.into(),
            cron: None,
            enabled: true,
            overwrite: false,
        }
    }

    /// Set the cron expression.
    pub fn with_cron(mut self, cron: impl Into<String>) -> Self {
        self.cron = Some(cron.into());
        self
    }

    /// Set enabled state.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Set overwrite behaviour.
    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Enabled and carrying a non-blank cron expression.
    pub fn is_schedulable(&self) -> bool {
        self.enabled && has_cron(self.cron.as_deref())
    }
}

/// Partial update of a task. `None` leaves a field untouched; nullable
/// fields use a nested `Option` so they can be cleared.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    pub name: Option<String>,
    pub source_path: Option<String>,
    pub target_path: Option<String>,
    pub cron: Option<Option<String>>,
    pub enabled: Option<bool>,
    pub overwrite: Option<bool>,
    pub running: Option<bool>,
    pub last_run_at: Option<Option<DateTime<Utc>>>,
}

impl TaskPatch {
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn source_path(mut self, path: impl Into<String>) -> Self {
        self.source_path = Some(path.into());
        self
    }

    pub fn target_path(mut self, path: impl Into<String>) -> Self {
        self.target_path = Some(path.into());
        self
    }

    pub fn cron(mut self, cron: Option<String>) -> Self {
        self.cron = Some(cron);
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = Some(overwrite);
        self
    }

    pub fn running(mut self, running: bool) -> Self {
        self.running = Some(running);
        self
    }

    pub fn last_run_at(mut self, at: Option<DateTime<Utc>>) -> Self {
        self.last_run_at = Some(at);
        self
    }

    /// True when the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Whether the patch touches fields that decide schedulability.
    pub fn affects_schedule(&self) -> bool {
        self.cron.is_some() || self.enabled.is_some()
    }

    /// Apply the patch in place. Does not touch `updated_at`.
    pub fn apply(&self, task: &mut Task) {
        if let Some(name) = &self.name {
            task.name = name.clone();
        }
        if let Some(path) = &self.source_path {
            task.source_path = path.clone();
        }
        if let Some(path) = &self.target_path {
            task.target_path = path.clone();
        }
        if let Some(cron) = &self.cron {
            task.cron = cron.clone();
        }
        if let Some(enabled) = self.enabled {
            task.enabled = enabled;
        }
        if let Some(overwrite) = self.overwrite {
            task.overwrite = overwrite;
        }
        if let Some(running) = self.running {
            task.running = running;
        }
        if let Some(at) = self.last_run_at {
            task.last_run_at = at;
        }
    }
}

/// Execution status shared by in-memory jobs and their log rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Accepted, not yet begun.
    Pending,
    /// Work unit is executing.
    Running,
    /// Finished without error.
    Success,
    /// Work unit failed.
    Failed,
    /// Stopped on request.
    Stopped,
}

impl JobStatus {
    /// Pending or running.
    pub fn is_active(self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Running)
    }

    /// Success, failed or stopped.
    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Success => "success",
            JobStatus::Failed => "failed",
            JobStatus::Stopped => "stopped",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "running" => Ok(JobStatus::Running),
            "success" => Ok(JobStatus::Success),
            "failed" => Ok(JobStatus::Failed),
            "stopped" => Ok(JobStatus::Stopped),
            other => Err(StoreError::InvalidData(format!(
                "unknown job status '{}'",
                other
            ))),
        }
    }
}

/// One execution attempt of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskLog {
    pub id: i64,
    pub task_id: TaskId,
    pub status: JobStatus,
    pub start_time: DateTime<Utc>,
    /// `None` while the attempt is unfinished.
    pub end_time: Option<DateTime<Utc>>,
    /// Output summary.
    pub message: Option<String>,
    /// Error payload for failed attempts.
    pub error: Option<String>,
}

/// Fields for creating a task log row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTaskLog {
    pub task_id: TaskId,
    pub status: JobStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub message: Option<String>,
    pub error: Option<String>,
}

impl NewTaskLog {
    /// A pending row starting now.
    pub fn pending(task_id: TaskId, start_time: DateTime<Utc>) -> Self {
        Self {
            task_id,
            status: JobStatus::Pending,
            start_time,
            end_time: None,
            message: None,
            error: None,
        }
    }
}

/// Partial update of a task log row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskLogPatch {
    pub status: Option<JobStatus>,
    pub end_time: Option<DateTime<Utc>>,
    pub message: Option<String>,
    pub error: Option<String>,
}

impl TaskLogPatch {
    /// Move to a non-terminal status.
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Close the row with a terminal status.
    pub fn finish(status: JobStatus, end_time: DateTime<Utc>) -> Self {
        Self {
            status: Some(status),
            end_time: Some(end_time),
            ..Default::default()
        }
    }

    pub fn with_message(mut self, message: Option<String>) -> Self {
        self.message = message;
        self
    }

    pub fn with_error(mut self, error: Option<String>) -> Self {
        self.error = error;
        self
    }

    pub fn apply(&self, log: &mut TaskLog) {
        if let Some(status) = self.status {
            log.status = status;
        }
        if let Some(end) = self.end_time {
            log.end_time = Some(end);
        }
        if let Some(message) = &self.message {
            log.message = Some(message.clone());
        }
        if let Some(error) = &self.error {
            log.error = Some(error.clone());
        }
    }
}

/// How a file was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    /// `.strm` pointer generated for a media file.
    Strm,
    /// Sidecar file copied verbatim.
    Copy,
}

impl FileType {
    pub fn as_str(self) -> &'static str {
        match self {
            FileType::Strm => "strm",
            FileType::Copy => "copy",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for FileType {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "strm" => Ok(FileType::Strm),
            "copy" => Ok(FileType::Copy),
            other => Err(StoreError::InvalidData(format!(
                "unknown file type '{}'",
                other
            ))),
        }
    }
}

/// A file written by a task run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileHistory {
    pub id: i64,
    pub task_id: Option<TaskId>,
    pub file_name: String,
    pub source_path: String,
    pub target_file_path: String,
    pub file_type: FileType,
    pub file_suffix: String,
    pub file_size: i64,
    pub created_at: DateTime<Utc>,
}

/// Fields for recording a produced file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFileHistory {
    pub task_id: Option<TaskId>,
    pub file_name: String,
    pub source_path: String,
    pub target_file_path: String,
    pub file_type: FileType,
    pub file_suffix: String,
    pub file_size: i64,
}

#[cfg(test)]
#[path = "model_tests.rs"]
mod tests;
