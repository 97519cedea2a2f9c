//! Translation of query filters into SQL `WHERE` clauses.

use chrono::{DateTime, Utc};
use rusqlite::types::Value;

use crate::invalid_strm::InvalidStrmQuery;
use crate::query::{FileHistoryQuery, TaskLogQuery, TaskQuery, normalized};

use super::encode_time;

/// A conjunction of clauses with positional `?` parameters.
#[derive(Debug, Default)]
pub(crate) struct SqlFilter {
    clauses: Vec<String>,
    pub(crate) params: Vec<Value>,
}

impl SqlFilter {
    fn push(&mut self, clause: impl Into<String>, params: impl IntoIterator<Item = Value>) {
        self.clauses.push(clause.into());
        self.params.extend(params);
    }

    fn push_range(&mut self, column: &str, from: Option<DateTime<Utc>>, to: Option<DateTime<Utc>>) {
        if let Some(from) = from {
            self.push(format!("{} >= ?", column), [Value::Text(encode_time(&from))]);
        }
        if let Some(to) = to {
            self.push(format!("{} <= ?", column), [Value::Text(encode_time(&to))]);
        }
    }

    /// ` WHERE ...` or an empty string.
    pub(crate) fn where_sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }
}

/// `%keyword%` with LIKE wildcards escaped by `\`.
fn like_pattern(keyword: &str) -> Value {
    let mut escaped = String::with_capacity(keyword.len() + 2);
    escaped.push('%');
    for c in keyword.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    Value::Text(escaped)
}

pub(crate) trait ToSqlFilter {
    fn to_filter(&self) -> SqlFilter;
}

impl ToSqlFilter for TaskQuery {
    fn to_filter(&self) -> SqlFilter {
        let mut filter = SqlFilter::default();
        if let Some(keyword) = normalized(&self.keyword) {
            let pattern = like_pattern(&keyword);
            filter.push(
                "(name LIKE ? ESCAPE '\\' OR source_path LIKE ? ESCAPE '\\' OR target_path LIKE ? ESCAPE '\\')",
                [pattern.clone(), pattern.clone(), pattern],
            );
        }
        if let Some(enabled) = self.enabled {
            filter.push("enabled = ?", [Value::Integer(enabled.into())]);
        }
        if let Some(running) = self.running {
            filter.push("running = ?", [Value::Integer(running.into())]);
        }
        filter
    }
}

impl ToSqlFilter for TaskLogQuery {
    fn to_filter(&self) -> SqlFilter {
        let mut filter = SqlFilter::default();
        if let Some(task_id) = self.task_id {
            filter.push("task_id = ?", [Value::Integer(task_id)]);
        }
        if let Some(status) = self.status {
            filter.push("status = ?", [Value::Text(status.as_str().to_string())]);
        }
        filter.push_range("start_time", self.start_time, self.end_time);
        filter
    }
}

impl ToSqlFilter for FileHistoryQuery {
    fn to_filter(&self) -> SqlFilter {
        let mut filter = SqlFilter::default();
        if let Some(keyword) = normalized(&self.keyword) {
            let pattern = like_pattern(&keyword);
            filter.push(
                "(file_name LIKE ? ESCAPE '\\' OR source_path LIKE ? ESCAPE '\\' \
                 OR target_file_path LIKE ? ESCAPE '\\')",
                [pattern.clone(), pattern.clone(), pattern],
            );
        }
        if let Some(task_id) = self.task_id {
            filter.push("task_id = ?", [Value::Integer(task_id)]);
        }
        if let Some(file_type) = self.file_type {
            filter.push("file_type = ?", [Value::Text(file_type.as_str().to_string())]);
        }
        if let Some(suffix) = normalized(&self.file_suffix) {
            filter.push(
                "LOWER(file_suffix) = ?",
                [Value::Text(suffix.trim_start_matches('.').to_string())],
            );
        }
        filter.push_range("created_at", self.start_time, self.end_time);
        filter
    }
}

impl ToSqlFilter for InvalidStrmQuery {
    fn to_filter(&self) -> SqlFilter {
        let mut filter = SqlFilter::default();
        if let Some(keyword) = normalized(&self.keyword) {
            let pattern = like_pattern(&keyword);
            filter.push(
                "(file_name LIKE ? ESCAPE '\\' OR source_path LIKE ? ESCAPE '\\' \
                 OR target_file_path LIKE ? ESCAPE '\\')",
                [pattern.clone(), pattern.clone(), pattern],
            );
        }
        if let Some(status) = self.status {
            filter.push("status = ?", [Value::Text(status.as_str().to_string())]);
        }
        if let Some(reason) = self.reason {
            filter.push("reason = ?", [Value::Text(reason.as_str().to_string())]);
        }
        if let Some(detection_type) = self.detection_type {
            filter.push(
                "detection_type = ?",
                [Value::Text(detection_type.as_str().to_string())],
            );
        }
        filter.push_range("detection_time", self.start_time, self.end_time);
        filter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::JobStatus;

    #[test]
    fn test_empty_filter() {
        let filter = TaskQuery::new().to_filter();
        assert_eq!(filter.where_sql(), "");
        assert!(filter.params.is_empty());
    }

    #[test]
    fn test_log_filter_params_line_up() {
        let now = Utc::now();
        let filter = TaskLogQuery::new()
            .task(3)
            .status(JobStatus::Failed)
            .between(Some(now), Some(now))
            .to_filter();
        let sql = filter.where_sql();
        assert_eq!(sql.matches('?').count(), filter.params.len());
        assert!(sql.starts_with(" WHERE task_id = ?"));
    }

    #[test]
    fn test_invalid_strm_filter() {
        use crate::invalid_strm::{InvalidReason, InvalidStatus};

        let filter = InvalidStrmQuery::new()
            .keyword("movie")
            .status(InvalidStatus::Pending)
            .reason(InvalidReason::UrlInvalid)
            .to_filter();
        let sql = filter.where_sql();
        assert_eq!(sql.matches('?').count(), filter.params.len());
        assert!(sql.contains("reason = ?"));
        assert_eq!(filter.params.len(), 5);
    }

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("50%_off"), Value::Text("%50\\%\\_off%".into()));
    }
}
