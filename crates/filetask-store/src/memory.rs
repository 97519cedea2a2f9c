//! In-memory store for tests and throwaway runs.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::error::StoreResult;
use crate::invalid_strm::{
    InvalidStatus, InvalidStrmFile, InvalidStrmQuery, InvalidStrmStats, NewInvalidStrmFile,
};
use crate::model::{
    FileHistory, NewFileHistory, NewTask, NewTaskLog, Task, TaskId, TaskLog, TaskLogPatch,
    TaskPatch, now,
};
use crate::query::{FileHistoryQuery, Page, TaskLogQuery, TaskLogStats, TaskQuery};
use crate::store::{FileHistoryStore, InvalidStrmStore, TaskLogStore, TaskStore};

#[derive(Default)]
struct Tables {
    tasks: BTreeMap<TaskId, Task>,
    logs: BTreeMap<i64, TaskLog>,
    files: BTreeMap<i64, FileHistory>,
    invalid: BTreeMap<i64, InvalidStrmFile>,
    next_task_id: i64,
    next_log_id: i64,
    next_file_id: i64,
    next_invalid_id: i64,
}

fn next_id(counter: &mut i64) -> i64 {
    *counter += 1;
    *counter
}

/// Store backed by ordered maps behind a single lock.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first(a: &TaskLog, b: &TaskLog) -> std::cmp::Ordering {
    b.start_time.cmp(&a.start_time).then(b.id.cmp(&a.id))
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn create(&self, task: NewTask) -> StoreResult<Task> {
        let mut tables = self.tables.write();
        let id = next_id(&mut tables.next_task_id);
        let ts = now();
        let task = Task {
            id,
            name: task.name,
            source_path: task.source_path,
            target_path: task.target_path,
            cron: task.cron,
            enabled: task.enabled,
            overwrite: task.overwrite,
            running: false,
            last_run_at: None,
            created_at: ts,
            updated_at: ts,
        };
        tables.tasks.insert(id, task.clone());
        Ok(task)
    }

    async fn find(&self, id: TaskId) -> StoreResult<Option<Task>> {
        Ok(self.tables.read().tasks.get(&id).cloned())
    }

    async fn update(&self, id: TaskId, patch: TaskPatch) -> StoreResult<Option<Task>> {
        let mut tables = self.tables.write();
        let Some(task) = tables.tasks.get_mut(&id) else {
            return Ok(None);
        };
        patch.apply(task);
        task.updated_at = now();
        Ok(Some(task.clone()))
    }

    async fn claim_running(&self, id: TaskId, at: DateTime<Utc>) -> StoreResult<Option<Task>> {
        let mut tables = self.tables.write();
        let Some(task) = tables.tasks.get_mut(&id).filter(|t| !t.running) else {
            return Ok(None);
        };
        task.running = true;
        task.last_run_at = Some(at);
        task.updated_at = now();
        Ok(Some(task.clone()))
    }

    async fn delete(&self, id: TaskId) -> StoreResult<bool> {
        Ok(self.tables.write().tasks.remove(&id).is_some())
    }

    async fn list(&self, query: &TaskQuery) -> StoreResult<Page<Task>> {
        let mut matched: Vec<Task> = self
            .tables
            .read()
            .tasks
            .values()
            .filter(|t| query.matches(t))
            .cloned()
            .collect();
        query.sort_tasks(&mut matched);
        Ok(Page::from_sorted(matched, query.page))
    }

    async fn list_all(&self) -> StoreResult<Vec<Task>> {
        Ok(self.tables.read().tasks.values().cloned().collect())
    }
}

#[async_trait]
impl TaskLogStore for MemoryStore {
    async fn create(&self, log: NewTaskLog) -> StoreResult<TaskLog> {
        let mut tables = self.tables.write();
        let id = next_id(&mut tables.next_log_id);
        let log = TaskLog {
            id,
            task_id: log.task_id,
            status: log.status,
            start_time: log.start_time,
            end_time: log.end_time,
            message: log.message,
            error: log.error,
        };
        tables.logs.insert(id, log.clone());
        Ok(log)
    }

    async fn update(&self, id: i64, patch: TaskLogPatch) -> StoreResult<Option<TaskLog>> {
        let mut tables = self.tables.write();
        Ok(tables.logs.get_mut(&id).map(|log| {
            patch.apply(log);
            log.clone()
        }))
    }

    async fn find(&self, id: i64) -> StoreResult<Option<TaskLog>> {
        Ok(self.tables.read().logs.get(&id).cloned())
    }

    async fn latest_for_task(&self, task_id: TaskId) -> StoreResult<Option<TaskLog>> {
        Ok(self
            .tables
            .read()
            .logs
            .values()
            .filter(|l| l.task_id == task_id)
            .min_by(|a, b| newest_first(a, b))
            .cloned())
    }

    async fn list(&self, query: &TaskLogQuery) -> StoreResult<Page<TaskLog>> {
        let mut matched: Vec<TaskLog> = self
            .tables
            .read()
            .logs
            .values()
            .filter(|l| query.matches(l))
            .cloned()
            .collect();
        matched.sort_by(newest_first);
        Ok(Page::from_sorted(matched, query.page))
    }

    async fn list_unfinished(&self) -> StoreResult<Vec<TaskLog>> {
        let mut open: Vec<TaskLog> = self
            .tables
            .read()
            .logs
            .values()
            .filter(|l| l.status.is_active())
            .cloned()
            .collect();
        open.sort_by(|a, b| a.start_time.cmp(&b.start_time).then(a.id.cmp(&b.id)));
        Ok(open)
    }

    async fn stats(&self, since: Option<DateTime<Utc>>) -> StoreResult<TaskLogStats> {
        let mut stats = TaskLogStats::default();
        for log in self.tables.read().logs.values() {
            if since.is_none_or(|s| log.start_time >= s) {
                stats.record(log.status, 1);
            }
        }
        Ok(stats)
    }
}

#[async_trait]
impl FileHistoryStore for MemoryStore {
    async fn create(&self, entry: NewFileHistory) -> StoreResult<FileHistory> {
        let mut tables = self.tables.write();
        let id = next_id(&mut tables.next_file_id);
        let entry = FileHistory {
            id,
            task_id: entry.task_id,
            file_name: entry.file_name,
            source_path: entry.source_path,
            target_file_path: entry.target_file_path,
            file_type: entry.file_type,
            file_suffix: entry.file_suffix,
            file_size: entry.file_size,
            created_at: now(),
        };
        tables.files.insert(id, entry.clone());
        Ok(entry)
    }

    async fn find(&self, id: i64) -> StoreResult<Option<FileHistory>> {
        Ok(self.tables.read().files.get(&id).cloned())
    }

    async fn list(&self, query: &FileHistoryQuery) -> StoreResult<Page<FileHistory>> {
        let mut matched: Vec<FileHistory> = self
            .tables
            .read()
            .files
            .values()
            .filter(|f| query.matches(f))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(Page::from_sorted(matched, query.page))
    }

    async fn exists(&self, source_path: &str, file_name: &str) -> StoreResult<bool> {
        Ok(self
            .tables
            .read()
            .files
            .values()
            .any(|f| f.source_path == source_path && f.file_name == file_name))
    }

    async fn bulk_delete(&self, ids: &[i64]) -> StoreResult<u64> {
        let mut tables = self.tables.write();
        let removed = ids
            .iter()
            .filter(|id| tables.files.remove(*id).is_some())
            .count();
        Ok(removed as u64)
    }

    async fn clear_all(&self) -> StoreResult<u64> {
        let mut tables = self.tables.write();
        let removed = tables.files.len() as u64;
        tables.files.clear();
        Ok(removed)
    }
}

#[async_trait]
impl InvalidStrmStore for MemoryStore {
    async fn record(&self, entry: NewInvalidStrmFile) -> StoreResult<InvalidStrmFile> {
        let mut tables = self.tables.write();
        let ts = now();
        if let Some(existing) = tables
            .invalid
            .values_mut()
            .find(|r| r.file_history_id == entry.file_history_id)
        {
            entry.refresh(existing, ts);
            return Ok(existing.clone());
        }
        let id = next_id(&mut tables.next_invalid_id);
        let record = entry.into_record(id, ts);
        tables.invalid.insert(id, record.clone());
        Ok(record)
    }

    async fn find_invalid(&self, id: i64) -> StoreResult<Option<InvalidStrmFile>> {
        Ok(self.tables.read().invalid.get(&id).cloned())
    }

    async fn list_invalid(&self, query: &InvalidStrmQuery) -> StoreResult<Page<InvalidStrmFile>> {
        let mut matched: Vec<InvalidStrmFile> = self
            .tables
            .read()
            .invalid
            .values()
            .filter(|r| query.matches(r))
            .cloned()
            .collect();
        matched.sort_by(|a, b| {
            b.detection_time
                .cmp(&a.detection_time)
                .then(b.id.cmp(&a.id))
        });
        Ok(Page::from_sorted(matched, query.page))
    }

    async fn invalid_stats(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> StoreResult<InvalidStrmStats> {
        let mut stats = InvalidStrmStats::default();
        for record in self.tables.read().invalid.values() {
            if from.is_none_or(|f| record.detection_time >= f)
                && to.is_none_or(|t| record.detection_time <= t)
            {
                stats.record(record.status, record.reason, 1);
            }
        }
        Ok(stats)
    }

    async fn set_status(
        &self,
        ids: &[i64],
        status: InvalidStatus,
        result: Option<String>,
    ) -> StoreResult<u64> {
        let mut tables = self.tables.write();
        let ts = now();
        let mut changed = 0;
        for id in ids {
            if let Some(record) = tables.invalid.get_mut(id) {
                record.status = status;
                record.process_result = result.clone();
                record.processed_at = Some(ts);
                record.updated_at = ts;
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn delete_invalid(&self, ids: &[i64]) -> StoreResult<u64> {
        let mut tables = self.tables.write();
        let removed = ids
            .iter()
            .filter(|id| tables.invalid.remove(*id).is_some())
            .count();
        Ok(removed as u64)
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
