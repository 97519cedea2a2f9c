//! Request and response bodies of the control API.
//!
//! Listing parameters travel as query strings; both the handlers and
//! [`ApiClient`](crate::ApiClient) use these types so the two sides agree.

use chrono::{DateTime, Utc};
use filetask_store::query::DEFAULT_PAGE_SIZE;
use filetask_store::{
    DetectionType, FileHistoryQuery, FileType, InvalidReason, InvalidStatus, InvalidStrmQuery,
    JobStatus, PageRequest, SortOrder, TaskId, TaskLogQuery, TaskPatch, TaskQuery, TaskSort,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

fn page_request(page: Option<u32>, page_size: Option<u32>) -> PageRequest {
    PageRequest::new(page.unwrap_or(1), page_size.unwrap_or(DEFAULT_PAGE_SIZE))
}

/// `GET /tasks`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskListParams {
    pub keyword: Option<String>,
    pub enabled: Option<bool>,
    pub running: Option<bool>,
    pub sort: Option<TaskSort>,
    pub order: Option<SortOrder>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl TaskListParams {
    pub fn into_query(self) -> TaskQuery {
        let mut query = TaskQuery::new()
            .sort(self.sort.unwrap_or_default(), self.order.unwrap_or_default())
            .page(page_request(self.page, self.page_size));
        if let Some(keyword) = self.keyword {
            query = query.keyword(keyword);
        }
        if let Some(enabled) = self.enabled {
            query = query.enabled(enabled);
        }
        if let Some(running) = self.running {
            query = query.running(running);
        }
        query
    }
}

/// `GET /tasks/{id}/logs`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogListParams {
    pub status: Option<JobStatus>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl LogListParams {
    pub fn into_query(self, task_id: TaskId) -> TaskLogQuery {
        let mut query = TaskLogQuery::new()
            .task(task_id)
            .between(self.from, self.to)
            .page(page_request(self.page, self.page_size));
        if let Some(status) = self.status {
            query = query.status(status);
        }
        query
    }
}

/// `GET /history`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryParams {
    pub keyword: Option<String>,
    pub task_id: Option<TaskId>,
    pub file_type: Option<FileType>,
    pub suffix: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl HistoryParams {
    pub fn into_query(self) -> FileHistoryQuery {
        let mut query = FileHistoryQuery::new()
            .between(self.from, self.to)
            .page(page_request(self.page, self.page_size));
        if let Some(keyword) = self.keyword {
            query = query.keyword(keyword);
        }
        if let Some(task_id) = self.task_id {
            query = query.task(task_id);
        }
        if let Some(file_type) = self.file_type {
            query = query.file_type(file_type);
        }
        if let Some(suffix) = self.suffix {
            query = query.suffix(suffix);
        }
        query
    }
}

/// `GET /invalid-strm`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvalidListParams {
    pub keyword: Option<String>,
    pub status: Option<InvalidStatus>,
    pub reason: Option<InvalidReason>,
    pub detection_type: Option<DetectionType>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

impl InvalidListParams {
    pub fn into_query(self) -> InvalidStrmQuery {
        let mut query = InvalidStrmQuery::new()
            .between(self.from, self.to)
            .page(page_request(self.page, self.page_size));
        if let Some(keyword) = self.keyword {
            query = query.keyword(keyword);
        }
        if let Some(status) = self.status {
            query = query.status(status);
        }
        if let Some(reason) = self.reason {
            query = query.reason(reason);
        }
        if let Some(detection_type) = self.detection_type {
            query = query.detection_type(detection_type);
        }
        query
    }
}

/// Optional inclusive time range.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeParams {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

/// `GET /logs/stats`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinceParams {
    pub since: Option<DateTime<Utc>>,
}

/// `PATCH /tasks/{id}`. Absent fields are left alone; an empty `cron`
/// removes the schedule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTaskRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cron: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overwrite: Option<bool>,
}

impl UpdateTaskRequest {
    pub fn into_patch(self) -> TaskPatch {
        TaskPatch {
            name: self.name,
            source_path: self.source_path,
            target_path: self.target_path,
            cron: self
                .cron
                .map(|cron| (!cron.trim().is_empty()).then_some(cron)),
            enabled: self.enabled,
            overwrite: self.overwrite,
            ..TaskPatch::default()
        }
    }
}

/// `POST /invalid-strm/check`. Without a task every `.strm` row is checked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckRequest {
    pub task_id: Option<TaskId>,
    pub detection_type: Option<DetectionType>,
}

/// `POST /invalid-strm/status`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChangeRequest {
    pub ids: Vec<i64>,
    pub status: InvalidStatus,
    #[serde(default)]
    pub note: Option<String>,
}

/// Batch delete by id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdsRequest {
    pub ids: Vec<i64>,
}

/// Rows affected by a batch operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountResponse {
    pub count: u64,
}

/// `POST /tasks/{id}/execute`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteResponse {
    pub task_id: TaskId,
    pub job_id: Uuid,
}

/// `GET /health`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub active_jobs: usize,
}
