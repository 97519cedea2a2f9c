//! Paging, filtering and aggregate types shared by every backend.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{FileHistory, FileType, JobStatus, Task, TaskId, TaskLog};

/// Largest page size a caller may request.
pub const MAX_PAGE_SIZE: u32 = 500;
/// Page size used when none is given.
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// 1-based page selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    pub page: u32,
    pub page_size: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl PageRequest {
    /// Build a request, clamping out-of-range values.
    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            page: page.max(1),
            page_size: page_size.clamp(1, MAX_PAGE_SIZE),
        }
    }

    /// Rows to skip.
    pub fn offset(&self) -> u64 {
        u64::from(self.page.max(1) - 1) * u64::from(self.limit())
    }

    /// Rows to return.
    pub fn limit(&self) -> u32 {
        self.page_size.clamp(1, MAX_PAGE_SIZE)
    }
}

/// One page of results plus the unpaged total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

impl<T> Page<T> {
    /// Cut a page out of an already filtered and ordered list.
    pub fn from_sorted(all: Vec<T>, request: PageRequest) -> Self {
        let total = all.len() as u64;
        let offset = usize::try_from(request.offset()).unwrap_or(usize::MAX);
        let items = all
            .into_iter()
            .skip(offset)
            .take(request.limit() as usize)
            .collect();
        Self {
            items,
            total,
            page: request.page.max(1),
            page_size: request.limit(),
        }
    }

    /// Number of pages needed for `total`.
    pub fn page_count(&self) -> u64 {
        if self.page_size == 0 {
            return 0;
        }
        self.total.div_ceil(u64::from(self.page_size))
    }
}

/// Sort column for task listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskSort {
    #[default]
    CreatedAt,
    UpdatedAt,
    Name,
    LastRunAt,
}

impl TaskSort {
    pub(crate) fn column(self) -> &'static str {
        match self {
            TaskSort::CreatedAt => "created_at",
            TaskSort::UpdatedAt => "updated_at",
            TaskSort::Name => "name",
            TaskSort::LastRunAt => "last_run_at",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub(crate) fn keyword(self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

/// Filter for task listings. Keyword matches name, source or target path.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskQuery {
    pub keyword: Option<String>,
    pub enabled: Option<bool>,
    pub running: Option<bool>,
    pub sort: TaskSort,
    pub order: SortOrder,
    pub page: PageRequest,
}

impl TaskQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = Some(keyword.into());
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = Some(enabled);
        self
    }

    pub fn running(mut self, running: bool) -> Self {
        self.running = Some(running);
        self
    }

    pub fn sort(mut self, sort: TaskSort, order: SortOrder) -> Self {
        self.sort = sort;
        self.order = order;
        self
    }

    pub fn page(mut self, page: PageRequest) -> Self {
        self.page = page;
        self
    }

    pub fn matches(&self, task: &Task) -> bool {
        if let Some(keyword) = normalized(&self.keyword) {
            let hit = [&task.name, &task.source_path, &task.target_path]
                .iter()
                .any(|field| field.to_lowercase().contains(&keyword));
            if !hit {
                return false;
            }
        }
        if self.enabled.is_some_and(|e| e != task.enabled) {
            return false;
        }
        if self.running.is_some_and(|r| r != task.running) {
            return false;
        }
        true
    }

    /// Order tasks in place according to `sort`/`order`, ties broken by id.
    pub fn sort_tasks(&self, tasks: &mut [Task]) {
        tasks.sort_by(|a, b| {
            let ord = match self.sort {
                TaskSort::CreatedAt => a.created_at.cmp(&b.created_at),
                TaskSort::UpdatedAt => a.updated_at.cmp(&b.updated_at),
                TaskSort::Name => a.name.cmp(&b.name),
                TaskSort::LastRunAt => a.last_run_at.cmp(&b.last_run_at),
            }
            .then(a.id.cmp(&b.id));
            match self.order {
                SortOrder::Asc => ord,
                SortOrder::Desc => ord.reverse(),
            }
        });
    }
}

/// Filter for execution logs. Results are newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskLogQuery {
    pub task_id: Option<TaskId>,
    pub status: Option<JobStatus>,
    /// Inclusive lower bound on `start_time`.
    pub start_time: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `start_time`.
    pub end_time: Option<DateTime<Utc>>,
    pub page: PageRequest,
}

impl TaskLogQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn task(mut self, task_id: TaskId) -> Self {
        self.task_id = Some(task_id);
        self
    }

    pub fn status(mut self, status: JobStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn between(mut self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        self.start_time = from;
        self.end_time = to;
        self
    }

    pub fn page(mut self, page: PageRequest) -> Self {
        self.page = page;
        self
    }

    pub fn matches(&self, log: &TaskLog) -> bool {
        self.task_id.is_none_or(|id| id == log.task_id)
            && self.status.is_none_or(|s| s == log.status)
            && self.start_time.is_none_or(|from| log.start_time >= from)
            && self.end_time.is_none_or(|to| log.start_time <= to)
    }
}

/// Filter for produced-file history. Results are newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileHistoryQuery {
    /// Matches file name, source path or target path.
    pub keyword: Option<String>,
    pub task_id: Option<TaskId>,
    pub file_type: Option<FileType>,
    pub file_suffix: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub page: PageRequest,
}

impl FileHistoryQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keyword(mut self, keyword: impl Into<String>) -> Self {
        self.keyword = Some(keyword.into());
        self
    }

    pub fn task(mut self, task_id: TaskId) -> Self {
        self.task_id = Some(task_id);
        self
    }

    pub fn file_type(mut self, file_type: FileType) -> Self {
        self.file_type = Some(file_type);
        self
    }

    pub fn suffix(mut self, suffix: impl Into<String>) -> Self {
        self.file_suffix = Some(suffix.into());
        self
    }

    pub fn between(mut self, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) -> Self {
        self.start_time = from;
        self.end_time = to;
        self
    }

    pub fn page(mut self, page: PageRequest) -> Self {
        self.page = page;
        self
    }

    pub fn matches(&self, entry: &FileHistory) -> bool {
        if let Some(keyword) = normalized(&self.keyword) {
            let hit = [&entry.file_name, &entry.source_path, &entry.target_file_path]
                .iter()
                .any(|field| field.to_lowercase().contains(&keyword));
            if !hit {
                return false;
            }
        }
        if let Some(suffix) = normalized(&self.file_suffix) {
            if entry.file_suffix.to_lowercase() != suffix.trim_start_matches('.') {
                return false;
            }
        }
        self.file_type.is_none_or(|t| t == entry.file_type)
            && self.task_id.is_none_or(|id| entry.task_id == Some(id))
            && self.start_time.is_none_or(|from| entry.created_at >= from)
            && self.end_time.is_none_or(|to| entry.created_at <= to)
    }
}

/// Per-status counts of execution logs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskLogStats {
    pub total: u64,
    pub pending: u64,
    pub running: u64,
    pub success: u64,
    pub failed: u64,
    pub stopped: u64,
}

impl TaskLogStats {
    pub fn record(&mut self, status: JobStatus, count: u64) {
        self.total += count;
        match status {
            JobStatus::Pending => self.pending += count,
            JobStatus::Running => self.running += count,
            JobStatus::Success => self.success += count,
            JobStatus::Failed => self.failed += count,
            JobStatus::Stopped => self.stopped += count,
        }
    }

    /// Share of finished runs that succeeded, in percent.
    pub fn success_rate(&self) -> Option<f64> {
        let finished = self.success + self.failed + self.stopped;
        (finished > 0).then(|| self.success as f64 * 100.0 / finished as f64)
    }
}

/// Trimmed, lowercased keyword; blank becomes `None`.
pub(crate) fn normalized(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_lowercase)
}

#[cfg(test)]
#[path = "query_tests.rs"]
mod tests;
