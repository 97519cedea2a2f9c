//! Validity check over generated `.strm` files.
//!
//! Every `strm` row in the file history is re-examined: the pointer file
//! must still exist and be readable, its body must be an absolute path or an
//! http(s) URL, and the media it points at must still exist. Failures are
//! recorded as invalid-file detections.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use filetask_store::{
    DetectionType, FileHistory, FileHistoryQuery, FileHistoryStore, FileType, InvalidReason,
    InvalidStrmStore, NewInvalidStrmFile, PageRequest, StoreResult, TaskId, now,
    query::MAX_PAGE_SIZE,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use url::Url;

/// Outcome of one check pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckReport {
    /// `.strm` history rows examined.
    pub checked: u64,
    /// Rows recorded as invalid.
    pub invalid: u64,
}

/// What a `.strm` body points at.
#[derive(Debug, PartialEq, Eq)]
enum Pointer {
    Url,
    Path(PathBuf),
}

#[derive(Debug, PartialEq, Eq)]
struct Finding {
    reason: InvalidReason,
    message: String,
    strm_url: Option<String>,
}

impl Finding {
    fn new(reason: InvalidReason, message: impl Into<String>, strm_url: Option<&str>) -> Self {
        Self {
            reason,
            message: message.into(),
            strm_url: strm_url.map(String::from),
        }
    }
}

fn parse_pointer(body: &str) -> Result<Pointer, String> {
    if body.is_empty() {
        return Err("empty .strm file".to_string());
    }
    if body.contains("://") {
        let url = Url::parse(body).map_err(|e| format!("unparseable URL: {}", e))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(format!("unsupported URL scheme '{}'", url.scheme()));
        }
        if url.host_str().is_none_or(str::is_empty) {
            return Err("URL has no host".to_string());
        }
        return Ok(Pointer::Url);
    }
    let path = Path::new(body);
    if path.is_absolute() {
        Ok(Pointer::Path(path.to_path_buf()))
    } else {
        Err(format!("'{}' is neither a URL nor an absolute path", body))
    }
}

/// `None` when the media at `path` exists.
async fn missing_media(path: &Path, strm_url: &str) -> Option<Finding> {
    match tokio::fs::try_exists(path).await {
        Ok(true) => None,
        Ok(false) => Some(Finding::new(
            InvalidReason::FileNotFound,
            format!("{} no longer exists", path.display()),
            Some(strm_url),
        )),
        Err(e) => Some(Finding::new(
            InvalidReason::AccessDenied,
            format!("cannot stat {}: {}", path.display(), e),
            Some(strm_url),
        )),
    }
}

async fn inspect(entry: &FileHistory) -> Option<Finding> {
    let target = Path::new(&entry.target_file_path);
    let body = match tokio::fs::read_to_string(target).await {
        Ok(body) => body,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Some(Finding::new(
                InvalidReason::StrmFileNotFound,
                format!("{} does not exist", target.display()),
                None,
            ));
        }
        Err(e) => {
            return Some(Finding::new(
                InvalidReason::AccessDenied,
                format!("cannot read {}: {}", target.display(), e),
                None,
            ));
        }
    };

    let body = body.trim();
    match parse_pointer(body) {
        Err(message) => Some(Finding::new(InvalidReason::UrlInvalid, message, Some(body))),
        Ok(Pointer::Path(media)) => missing_media(&media, body).await,
        // remote URLs are not fetched; the local source they mirror must exist
        Ok(Pointer::Url) => missing_media(Path::new(&entry.source_path), body).await,
    }
}

/// Scans file history for broken `.strm` files.
pub struct StrmChecker {
    history: Arc<dyn FileHistoryStore>,
    invalid: Arc<dyn InvalidStrmStore>,
}

impl StrmChecker {
    pub fn new(history: Arc<dyn FileHistoryStore>, invalid: Arc<dyn InvalidStrmStore>) -> Self {
        Self { history, invalid }
    }

    /// Check every `.strm` row, or only those produced by `task_id`.
    pub async fn check(
        &self,
        task_id: Option<TaskId>,
        detection: DetectionType,
    ) -> StoreResult<CheckReport> {
        let mut report = CheckReport::default();
        let mut query = FileHistoryQuery::new().file_type(FileType::Strm);
        if let Some(task_id) = task_id {
            query = query.task(task_id);
        }

        for page_no in 1.. {
            let page = self
                .history
                .list(&query.clone().page(PageRequest::new(page_no, MAX_PAGE_SIZE)))
                .await?;
            if page.items.is_empty() {
                break;
            }
            for entry in &page.items {
                report.checked += 1;
                let Some(finding) = inspect(entry).await else {
                    continue;
                };
                debug!(
                    history_id = entry.id,
                    reason = %finding.reason,
                    "Invalid .strm file"
                );
                self.invalid
                    .record(NewInvalidStrmFile {
                        file_history_id: entry.id,
                        detection_time: now(),
                        detection_type: detection,
                        reason: finding.reason,
                        error_message: Some(finding.message),
                        file_name: entry.file_name.clone(),
                        source_path: entry.source_path.clone(),
                        target_file_path: entry.target_file_path.clone(),
                        file_size: entry.file_size,
                        strm_url: finding.strm_url,
                    })
                    .await?;
                report.invalid += 1;
            }
            if report.checked >= page.total {
                break;
            }
        }

        info!(
            checked = report.checked,
            invalid = report.invalid,
            "Checked .strm files"
        );
        Ok(report)
    }
}

#[cfg(test)]
#[path = "check_tests.rs"]
mod tests;
