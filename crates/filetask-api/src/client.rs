//! Typed client for the control API.

use std::pin::Pin;
use std::time::Duration;

use axum::body::Bytes;
use filetask_engine::{TaskEvent, TaskStatusReport};
use filetask_store::{
    FileHistory, InvalidStrmFile, InvalidStrmStats, NewTask, Page, Task, TaskId, TaskLog,
    TaskLogStats,
};
use filetask_worker::CheckReport;
use futures::{Stream, StreamExt};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;

use crate::dto::{
    CheckRequest, CountResponse, ExecuteResponse, HealthResponse, HistoryParams, IdsRequest,
    InvalidListParams, LogListParams, RangeParams, SinceParams, StatusChangeRequest,
    TaskListParams, UpdateTaskRequest,
};
use crate::error::ClientError;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(2);

/// Client bound to one control endpoint.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    http: Client,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            // the endpoint is local; never route it through a proxy
            http: Client::builder()
                .no_proxy()
                .build()
                .unwrap_or_else(|_| Client::new()),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn dispatch(&self, request: RequestBuilder) -> Result<Response, ClientError> {
        let response = request
            .send()
            .await
            .map_err(|source| ClientError::Unreachable {
                url: self.base_url.clone(),
                source,
            })?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v["error"].as_str().map(String::from))
            .unwrap_or_else(|| {
                if body.trim().is_empty() {
                    status.to_string()
                } else {
                    body
                }
            });
        Err(ClientError::Api {
            status: status.as_u16(),
            message,
        })
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ClientError> {
        let response = self.dispatch(request).await?;
        let body = response
            .bytes()
            .await
            .map_err(|source| ClientError::Unreachable {
                url: self.base_url.clone(),
                source,
            })?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn send_empty(&self, request: RequestBuilder) -> Result<(), ClientError> {
        self.dispatch(request).await.map(drop)
    }

    /// Succeeds only if an engine host answers at the address.
    pub async fn health(&self) -> Result<HealthResponse, ClientError> {
        self.send(self.http.get(self.url("/health")).timeout(HEALTH_TIMEOUT))
            .await
    }

    pub async fn list_tasks(&self, params: &TaskListParams) -> Result<Page<Task>, ClientError> {
        self.send(self.http.get(self.url("/tasks")).query(params)).await
    }

    pub async fn create_task(&self, def: &NewTask) -> Result<Task, ClientError> {
        self.send(self.http.post(self.url("/tasks")).json(def)).await
    }

    pub async fn get_task(&self, id: TaskId) -> Result<Task, ClientError> {
        self.send(self.http.get(self.url(&format!("/tasks/{}", id))))
            .await
    }

    pub async fn update_task(
        &self,
        id: TaskId,
        request: &UpdateTaskRequest,
    ) -> Result<Task, ClientError> {
        self.send(self.http.patch(self.url(&format!("/tasks/{}", id))).json(request))
            .await
    }

    pub async fn delete_task(&self, id: TaskId) -> Result<(), ClientError> {
        self.send_empty(self.http.delete(self.url(&format!("/tasks/{}", id))))
            .await
    }

    pub async fn toggle_task(&self, id: TaskId) -> Result<Task, ClientError> {
        self.send(self.http.post(self.url(&format!("/tasks/{}/toggle", id))))
            .await
    }

    pub async fn reset_task(&self, id: TaskId) -> Result<Task, ClientError> {
        self.send(self.http.post(self.url(&format!("/tasks/{}/reset", id))))
            .await
    }

    pub async fn execute_task(&self, id: TaskId) -> Result<ExecuteResponse, ClientError> {
        self.send(self.http.post(self.url(&format!("/tasks/{}/execute", id))))
            .await
    }

    pub async fn stop_task(&self, id: TaskId) -> Result<(), ClientError> {
        self.send_empty(self.http.post(self.url(&format!("/tasks/{}/stop", id))))
            .await
    }

    pub async fn task_status(&self, id: TaskId) -> Result<TaskStatusReport, ClientError> {
        self.send(self.http.get(self.url(&format!("/tasks/{}/status", id))))
            .await
    }

    pub async fn task_logs(
        &self,
        id: TaskId,
        params: &LogListParams,
    ) -> Result<Page<TaskLog>, ClientError> {
        self.send(
            self.http
                .get(self.url(&format!("/tasks/{}/logs", id)))
                .query(params),
        )
        .await
    }

    /// Subscribe to the task's events. Events published after this returns
    /// are delivered.
    pub async fn task_events(&self, id: TaskId) -> Result<EventStream, ClientError> {
        let response = self
            .dispatch(self.http.get(self.url(&format!("/tasks/{}/events", id))))
            .await?;
        Ok(EventStream {
            url: self.base_url.clone(),
            body: Box::pin(response.bytes_stream()),
            buffer: Vec::new(),
        })
    }

    pub async fn log_stats(&self, params: &SinceParams) -> Result<TaskLogStats, ClientError> {
        self.send(self.http.get(self.url("/logs/stats")).query(params))
            .await
    }

    pub async fn list_history(
        &self,
        params: &HistoryParams,
    ) -> Result<Page<FileHistory>, ClientError> {
        self.send(self.http.get(self.url("/history")).query(params))
            .await
    }

    pub async fn clear_history(&self) -> Result<u64, ClientError> {
        let response: CountResponse = self.send(self.http.delete(self.url("/history"))).await?;
        Ok(response.count)
    }

    pub async fn delete_history(&self, ids: &[i64]) -> Result<u64, ClientError> {
        let body = IdsRequest { ids: ids.to_vec() };
        let response: CountResponse = self
            .send(self.http.post(self.url("/history/delete")).json(&body))
            .await?;
        Ok(response.count)
    }

    pub async fn list_invalid(
        &self,
        params: &InvalidListParams,
    ) -> Result<Page<InvalidStrmFile>, ClientError> {
        self.send(self.http.get(self.url("/invalid-strm")).query(params))
            .await
    }

    pub async fn invalid_stats(&self, range: &RangeParams) -> Result<InvalidStrmStats, ClientError> {
        self.send(self.http.get(self.url("/invalid-strm/stats")).query(range))
            .await
    }

    pub async fn get_invalid(&self, id: i64) -> Result<InvalidStrmFile, ClientError> {
        self.send(self.http.get(self.url(&format!("/invalid-strm/{}", id))))
            .await
    }

    pub async fn check_invalid(&self, request: &CheckRequest) -> Result<CheckReport, ClientError> {
        self.send(self.http.post(self.url("/invalid-strm/check")).json(request))
            .await
    }

    pub async fn mark_invalid(&self, request: &StatusChangeRequest) -> Result<u64, ClientError> {
        let response: CountResponse = self
            .send(self.http.post(self.url("/invalid-strm/status")).json(request))
            .await?;
        Ok(response.count)
    }

    pub async fn delete_invalid(&self, ids: &[i64]) -> Result<u64, ClientError> {
        let body = IdsRequest { ids: ids.to_vec() };
        let response: CountResponse = self
            .send(self.http.post(self.url("/invalid-strm/delete")).json(&body))
            .await?;
        Ok(response.count)
    }
}

type ByteStream = Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>;

/// Live events of one task, read line by line from the response body.
pub struct EventStream {
    url: String,
    body: ByteStream,
    buffer: Vec<u8>,
}

/// Take the first complete line out of `buffer`, without its newline.
fn take_line(buffer: &mut Vec<u8>) -> Option<Vec<u8>> {
    let end = buffer.iter().position(|b| *b == b'\n')?;
    let mut line: Vec<u8> = buffer.drain(..=end).collect();
    line.pop();
    Some(line)
}

impl EventStream {
    /// Next event, or `None` once the server closes the stream.
    pub async fn next(&mut self) -> Result<Option<TaskEvent>, ClientError> {
        loop {
            while let Some(line) = take_line(&mut self.buffer) {
                if line.iter().all(u8::is_ascii_whitespace) {
                    continue;
                }
                return Ok(Some(serde_json::from_slice(&line)?));
            }
            match self.body.next().await {
                Some(Ok(chunk)) => self.buffer.extend_from_slice(&chunk),
                Some(Err(source)) => {
                    return Err(ClientError::Unreachable {
                        url: self.url.clone(),
                        source,
                    });
                }
                None => return Ok(None),
            }
        }
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
