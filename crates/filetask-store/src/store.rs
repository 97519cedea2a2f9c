//! Store traits implemented by every backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::StoreResult;
use crate::invalid_strm::{
    InvalidStatus, InvalidStrmFile, InvalidStrmQuery, InvalidStrmStats, NewInvalidStrmFile,
};
use crate::model::{
    FileHistory, NewFileHistory, NewTask, NewTaskLog, Task, TaskId, TaskLog, TaskLogPatch,
    TaskPatch,
};
use crate::query::{FileHistoryQuery, Page, TaskLogQuery, TaskLogStats, TaskQuery};

/// Task definition persistence.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Insert a task and return it with its assigned ID.
    async fn create(&self, task: NewTask) -> StoreResult<Task>;

    /// Load a task by ID.
    async fn find(&self, id: TaskId) -> StoreResult<Option<Task>>;

    /// Apply a patch. Returns `None` when the task does not exist.
    async fn update(&self, id: TaskId, patch: TaskPatch) -> StoreResult<Option<Task>>;

    /// Set `running` and `last_run_at` only if the task is not already
    /// running. Returns `None` when the task is missing or already claimed.
    async fn claim_running(&self, id: TaskId, at: DateTime<Utc>) -> StoreResult<Option<Task>>;

    /// Delete a task. Returns whether a row was removed.
    async fn delete(&self, id: TaskId) -> StoreResult<bool>;

    /// Filtered, paged listing.
    async fn list(&self, query: &TaskQuery) -> StoreResult<Page<Task>>;

    /// Every task, ordered by ID.
    async fn list_all(&self) -> StoreResult<Vec<Task>>;
}

/// Execution log persistence.
#[async_trait]
pub trait TaskLogStore: Send + Sync {
    async fn create(&self, log: NewTaskLog) -> StoreResult<TaskLog>;

    /// Apply a patch. Returns `None` when the row does not exist.
    async fn update(&self, id: i64, patch: TaskLogPatch) -> StoreResult<Option<TaskLog>>;

    async fn find(&self, id: i64) -> StoreResult<Option<TaskLog>>;

    /// Most recent attempt of a task by start time.
    async fn latest_for_task(&self, task_id: TaskId) -> StoreResult<Option<TaskLog>>;

    /// Filtered, paged listing, newest first.
    async fn list(&self, query: &TaskLogQuery) -> StoreResult<Page<TaskLog>>;

    /// Rows still pending or running, oldest first.
    async fn list_unfinished(&self) -> StoreResult<Vec<TaskLog>>;

    /// Per-status counts, optionally limited to attempts started at or after `since`.
    async fn stats(&self, since: Option<DateTime<Utc>>) -> StoreResult<TaskLogStats>;
}

/// Produced-file history persistence.
#[async_trait]
pub trait FileHistoryStore: Send + Sync {
    async fn create(&self, entry: NewFileHistory) -> StoreResult<FileHistory>;

    async fn find(&self, id: i64) -> StoreResult<Option<FileHistory>>;

    /// Filtered, paged listing, newest first.
    async fn list(&self, query: &FileHistoryQuery) -> StoreResult<Page<FileHistory>>;

    /// Whether a file with this source path and name was already recorded.
    async fn exists(&self, source_path: &str, file_name: &str) -> StoreResult<bool>;

    /// Delete the given rows. Returns the number removed.
    async fn bulk_delete(&self, ids: &[i64]) -> StoreResult<u64>;

    /// Delete every row. Returns the number removed.
    async fn clear_all(&self) -> StoreResult<u64>;
}

/// Invalid `.strm` detection persistence.
#[async_trait]
pub trait InvalidStrmStore: Send + Sync {
    /// Insert a detection, or refresh the existing row for the same file
    /// history entry without touching its review status.
    async fn record(&self, entry: NewInvalidStrmFile) -> StoreResult<InvalidStrmFile>;

    async fn find_invalid(&self, id: i64) -> StoreResult<Option<InvalidStrmFile>>;

    /// Filtered, paged listing, newest detection first.
    async fn list_invalid(&self, query: &InvalidStrmQuery) -> StoreResult<Page<InvalidStrmFile>>;

    /// Counts over detections within the optional inclusive time range.
    async fn invalid_stats(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> StoreResult<InvalidStrmStats>;

    /// Move the given rows to `status`, stamping `processed_at`. Returns the
    /// number of rows changed.
    async fn set_status(
        &self,
        ids: &[i64],
        status: InvalidStatus,
        result: Option<String>,
    ) -> StoreResult<u64>;

    /// Delete the given rows. Returns the number removed.
    async fn delete_invalid(&self, ids: &[i64]) -> StoreResult<u64>;
}
