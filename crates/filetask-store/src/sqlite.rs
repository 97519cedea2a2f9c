//! SQLite store backed by `tokio-rusqlite`.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::types::Type;
use rusqlite::{OptionalExtension, Row, params, params_from_iter};
use tokio_rusqlite::Connection;
use tracing::debug;

use crate::error::{StoreError, StoreResult};
use crate::invalid_strm::{
    InvalidStatus, InvalidStrmFile, InvalidStrmQuery, InvalidStrmStats, NewInvalidStrmFile,
};
use crate::model::{
    FileHistory, NewFileHistory, NewTask, NewTaskLog, Task, TaskId, TaskLog, TaskLogPatch,
    TaskPatch, now,
};
use crate::query::{FileHistoryQuery, Page, TaskLogQuery, TaskLogStats, TaskQuery};
use crate::schema::init_schema;
use crate::store::{FileHistoryStore, InvalidStrmStore, TaskLogStore, TaskStore};

#[path = "sqlite_filter.rs"]
mod sqlite_filter;
use sqlite_filter::ToSqlFilter;

#[cfg(test)]
#[path = "sqlite_tests.rs"]
mod tests;

const TASK_COLUMNS: &str = "id, name, source_path, target_path, cron, enabled, overwrite, \
     running, last_run_at, created_at, updated_at";
const LOG_COLUMNS: &str = "id, task_id, status, start_time, end_time, message, error";
const FILE_COLUMNS: &str = "id, task_id, file_name, source_path, target_file_path, file_type, \
     file_suffix, file_size, created_at";

const INVALID_COLUMNS: &str = "id, file_history_id, detection_time, detection_type, reason, \
     error_message, status, file_name, source_path, target_file_path, file_size, strm_url, \
     processed_at, process_result, created_at, updated_at";

/// Fixed-width RFC 3339 so stored timestamps sort lexically.
pub(crate) fn encode_time(dt: &DateTime<Utc>) -> String {
    dt.trunc_subsecs(6)
        .to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn decode_time(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn decode_opt_time(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|raw| {
        DateTime::parse_from_rfc3339(&raw)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
    })
    .transpose()
}

fn decode_parsed<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: std::str::FromStr<Err = StoreError>,
{
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn task_from_row(row: &Row<'_>) -> rusqlite::Result<Task> {
    Ok(Task {
        id: row.get(0)?,
        name: row.get(1)?,
        source_path: row.get(2)?,
        target_path: row.get(3)?,
        cron: row.get(4)?,
        enabled: row.get(5)?,
        overwrite: row.get(6)?,
        running: row.get(7)?,
        last_run_at: decode_opt_time(row, 8)?,
        created_at: decode_time(row, 9)?,
        updated_at: decode_time(row, 10)?,
    })
}

fn log_from_row(row: &Row<'_>) -> rusqlite::Result<TaskLog> {
    Ok(TaskLog {
        id: row.get(0)?,
        task_id: row.get(1)?,
        status: decode_parsed(row, 2)?,
        start_time: decode_time(row, 3)?,
        end_time: decode_opt_time(row, 4)?,
        message: row.get(5)?,
        error: row.get(6)?,
    })
}

fn file_from_row(row: &Row<'_>) -> rusqlite::Result<FileHistory> {
    Ok(FileHistory {
        id: row.get(0)?,
        task_id: row.get(1)?,
        file_name: row.get(2)?,
        source_path: row.get(3)?,
        target_file_path: row.get(4)?,
        file_type: decode_parsed(row, 5)?,
        file_suffix: row.get(6)?,
        file_size: row.get(7)?,
        created_at: decode_time(row, 8)?,
    })
}

fn invalid_from_row(row: &Row<'_>) -> rusqlite::Result<InvalidStrmFile> {
    Ok(InvalidStrmFile {
        id: row.get(0)?,
        file_history_id: row.get(1)?,
        detection_time: decode_time(row, 2)?,
        detection_type: decode_parsed(row, 3)?,
        reason: decode_parsed(row, 4)?,
        error_message: row.get(5)?,
        status: decode_parsed(row, 6)?,
        file_name: row.get(7)?,
        source_path: row.get(8)?,
        target_file_path: row.get(9)?,
        file_size: row.get(10)?,
        strm_url: row.get(11)?,
        processed_at: decode_opt_time(row, 12)?,
        process_result: row.get(13)?,
        created_at: decode_time(row, 14)?,
        updated_at: decode_time(row, 15)?,
    })
}

fn select_invalid(
    conn: &rusqlite::Connection,
    column: &str,
    value: i64,
) -> rusqlite::Result<Option<InvalidStrmFile>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM invalid_strm_files WHERE {} = ?1",
            INVALID_COLUMNS, column
        ),
        [value],
        invalid_from_row,
    )
    .optional()
}

fn select_task(conn: &rusqlite::Connection, id: TaskId) -> rusqlite::Result<Option<Task>> {
    conn.query_row(
        &format!("SELECT {} FROM tasks WHERE id = ?1", TASK_COLUMNS),
        [id],
        task_from_row,
    )
    .optional()
}

fn select_log(conn: &rusqlite::Connection, id: i64) -> rusqlite::Result<Option<TaskLog>> {
    conn.query_row(
        &format!("SELECT {} FROM task_logs WHERE id = ?1", LOG_COLUMNS),
        [id],
        log_from_row,
    )
    .optional()
}

fn select_file(conn: &rusqlite::Connection, id: i64) -> rusqlite::Result<Option<FileHistory>> {
    conn.query_row(
        &format!("SELECT {} FROM file_histories WHERE id = ?1", FILE_COLUMNS),
        [id],
        file_from_row,
    )
    .optional()
}

/// Run a filtered count plus a paged select against `table`.
fn paged<T>(
    conn: &rusqlite::Connection,
    table: &str,
    columns: &str,
    filter: &sqlite_filter::SqlFilter,
    order_by: &str,
    page: crate::query::PageRequest,
    map: fn(&Row<'_>) -> rusqlite::Result<T>,
) -> rusqlite::Result<Page<T>> {
    let where_sql = filter.where_sql();
    let total: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {}{}", table, where_sql),
        params_from_iter(filter.params.iter()),
        |row| row.get(0),
    )?;

    let sql = format!(
        "SELECT {} FROM {}{} ORDER BY {} LIMIT {} OFFSET {}",
        columns,
        table,
        where_sql,
        order_by,
        page.limit(),
        page.offset()
    );
    let mut stmt = conn.prepare(&sql)?;
    let items = stmt
        .query_map(params_from_iter(filter.params.iter()), map)?
        .collect::<rusqlite::Result<Vec<_>>>()?;

    Ok(Page {
        items,
        total: total.max(0) as u64,
        page: page.page.max(1),
        page_size: page.limit(),
    })
}

/// SQLite-based store implementing every store trait.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Create a new in-memory database.
    pub async fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory().await?;
        conn.call(|conn| init_schema(conn)).await?;
        Ok(Self { conn })
    }

    /// Open or create a file-backed database.
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| StoreError::Database(format!("{}: {}", parent.display(), e)))?;
        }
        debug!("Opening task database at {}", path.display());

        let conn = Connection::open(path).await?;
        conn.call(|conn| {
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
            init_schema(conn)
        })
        .await?;
        Ok(Self { conn })
    }
}

#[async_trait]
impl TaskStore for SqliteStore {
    async fn create(&self, task: NewTask) -> StoreResult<Task> {
        let ts = encode_time(&now());
        let task = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO tasks (name, source_path, target_path, cron, enabled, overwrite,
                     running, last_run_at, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, NULL, ?7, ?7)",
                    params![
                        task.name,
                        task.source_path,
                        task.target_path,
                        task.cron,
                        task.enabled,
                        task.overwrite,
                        ts
                    ],
                )?;
                let id = conn.last_insert_rowid();
                Ok(select_task(conn, id)?)
            })
            .await?;
        task.ok_or(StoreError::Database("inserted task vanished".into()))
    }

    async fn find(&self, id: TaskId) -> StoreResult<Option<Task>> {
        Ok(self.conn.call(move |conn| Ok(select_task(conn, id)?)).await?)
    }

    async fn update(&self, id: TaskId, patch: TaskPatch) -> StoreResult<Option<Task>> {
        let updated_at = now();
        Ok(self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let Some(mut task) = select_task(&tx, id)? else {
                    return Ok(None);
                };
                patch.apply(&mut task);
                task.last_run_at = task.last_run_at.map(|t| t.trunc_subsecs(6));
                task.updated_at = updated_at;
                tx.execute(
                    "UPDATE tasks SET name = ?1, source_path = ?2, target_path = ?3, cron = ?4,
                     enabled = ?5, overwrite = ?6, running = ?7, last_run_at = ?8, updated_at = ?9
                     WHERE id = ?10",
                    params![
                        task.name,
                        task.source_path,
                        task.target_path,
                        task.cron,
                        task.enabled,
                        task.overwrite,
                        task.running,
                        task.last_run_at.as_ref().map(encode_time),
                        encode_time(&task.updated_at),
                        id
                    ],
                )?;
                tx.commit()?;
                Ok(Some(task))
            })
            .await?)
    }

    async fn claim_running(&self, id: TaskId, at: DateTime<Utc>) -> StoreResult<Option<Task>> {
        let at = encode_time(&at);
        let updated_at = encode_time(&now());
        Ok(self
            .conn
            .call(move |conn| {
                let claimed = conn.execute(
                    "UPDATE tasks SET running = 1, last_run_at = ?1, updated_at = ?2
                     WHERE id = ?3 AND running = 0",
                    params![at, updated_at, id],
                )?;
                if claimed == 0 {
                    return Ok(None);
                }
                Ok(select_task(conn, id)?)
            })
            .await?)
    }

    async fn delete(&self, id: TaskId) -> StoreResult<bool> {
        let removed = self
            .conn
            .call(move |conn| Ok(conn.execute("DELETE FROM tasks WHERE id = ?1", [id])?))
            .await?;
        Ok(removed > 0)
    }

    async fn list(&self, query: &TaskQuery) -> StoreResult<Page<Task>> {
        let filter = query.to_filter();
        let order = query.order.keyword();
        let order_by = format!("{} {}, id {}", query.sort.column(), order, order);
        let page = query.page;
        Ok(self
            .conn
            .call(move |conn| {
                Ok(paged(
                    conn,
                    "tasks",
                    TASK_COLUMNS,
                    &filter,
                    &order_by,
                    page,
                    task_from_row,
                )?)
            })
            .await?)
    }

    async fn list_all(&self) -> StoreResult<Vec<Task>> {
        Ok(self
            .conn
            .call(|conn| {
                let mut stmt =
                    conn.prepare(&format!("SELECT {} FROM tasks ORDER BY id", TASK_COLUMNS))?;
                let tasks = stmt
                    .query_map([], task_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(tasks)
            })
            .await?)
    }
}

#[async_trait]
impl TaskLogStore for SqliteStore {
    async fn create(&self, log: NewTaskLog) -> StoreResult<TaskLog> {
        let created = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO task_logs (task_id, status, start_time, end_time, message, error)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        log.task_id,
                        log.status.as_str(),
                        encode_time(&log.start_time),
                        log.end_time.as_ref().map(encode_time),
                        log.message,
                        log.error
                    ],
                )?;
                let id = conn.last_insert_rowid();
                Ok(select_log(conn, id)?)
            })
            .await?;
        created.ok_or(StoreError::Database("inserted task log vanished".into()))
    }

    async fn update(&self, id: i64, patch: TaskLogPatch) -> StoreResult<Option<TaskLog>> {
        Ok(self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let Some(mut log) = select_log(&tx, id)? else {
                    return Ok(None);
                };
                patch.apply(&mut log);
                tx.execute(
                    "UPDATE task_logs SET status = ?1, end_time = ?2, message = ?3, error = ?4
                     WHERE id = ?5",
                    params![
                        log.status.as_str(),
                        log.end_time.as_ref().map(encode_time),
                        log.message,
                        log.error,
                        id
                    ],
                )?;
                tx.commit()?;
                log.start_time = log.start_time.trunc_subsecs(6);
                log.end_time = log.end_time.map(|t| t.trunc_subsecs(6));
                Ok(Some(log))
            })
            .await?)
    }

    async fn find(&self, id: i64) -> StoreResult<Option<TaskLog>> {
        Ok(self.conn.call(move |conn| Ok(select_log(conn, id)?)).await?)
    }

    async fn latest_for_task(&self, task_id: TaskId) -> StoreResult<Option<TaskLog>> {
        Ok(self
            .conn
            .call(move |conn| {
                Ok(conn
                    .query_row(
                        &format!(
                            "SELECT {} FROM task_logs WHERE task_id = ?1
                             ORDER BY start_time DESC, id DESC LIMIT 1",
                            LOG_COLUMNS
                        ),
                        [task_id],
                        log_from_row,
                    )
                    .optional()?)
            })
            .await?)
    }

    async fn list(&self, query: &TaskLogQuery) -> StoreResult<Page<TaskLog>> {
        let filter = query.to_filter();
        let page = query.page;
        Ok(self
            .conn
            .call(move |conn| {
                Ok(paged(
                    conn,
                    "task_logs",
                    LOG_COLUMNS,
                    &filter,
                    "start_time DESC, id DESC",
                    page,
                    log_from_row,
                )?)
            })
            .await?)
    }

    async fn list_unfinished(&self) -> StoreResult<Vec<TaskLog>> {
        Ok(self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM task_logs WHERE status IN ('pending', 'running')
                     ORDER BY start_time ASC, id ASC",
                    LOG_COLUMNS
                ))?;
                let logs = stmt
                    .query_map([], log_from_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(logs)
            })
            .await?)
    }

    async fn stats(&self, since: Option<DateTime<Utc>>) -> StoreResult<TaskLogStats> {
        let since = since.as_ref().map(encode_time);
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT status, COUNT(*) FROM task_logs
                     WHERE ?1 IS NULL OR start_time >= ?1
                     GROUP BY status",
                )?;
                let rows = stmt
                    .query_map([since], |row| {
                        Ok((decode_parsed(row, 0)?, row.get::<_, i64>(1)?))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        let mut stats = TaskLogStats::default();
        for (status, count) in rows {
            stats.record(status, count.max(0) as u64);
        }
        Ok(stats)
    }
}

#[async_trait]
impl FileHistoryStore for SqliteStore {
    async fn create(&self, entry: NewFileHistory) -> StoreResult<FileHistory> {
        let ts = encode_time(&now());
        let created = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO file_histories (task_id, file_name, source_path, target_file_path,
                     file_type, file_suffix, file_size, created_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        entry.task_id,
                        entry.file_name,
                        entry.source_path,
                        entry.target_file_path,
                        entry.file_type.as_str(),
                        entry.file_suffix,
                        entry.file_size,
                        ts
                    ],
                )?;
                let id = conn.last_insert_rowid();
                Ok(select_file(conn, id)?)
            })
            .await?;
        created.ok_or(StoreError::Database("inserted file history vanished".into()))
    }

    async fn find(&self, id: i64) -> StoreResult<Option<FileHistory>> {
        Ok(self.conn.call(move |conn| Ok(select_file(conn, id)?)).await?)
    }

    async fn list(&self, query: &FileHistoryQuery) -> StoreResult<Page<FileHistory>> {
        let filter = query.to_filter();
        let page = query.page;
        Ok(self
            .conn
            .call(move |conn| {
                Ok(paged(
                    conn,
                    "file_histories",
                    FILE_COLUMNS,
                    &filter,
                    "created_at DESC, id DESC",
                    page,
                    file_from_row,
                )?)
            })
            .await?)
    }

    async fn exists(&self, source_path: &str, file_name: &str) -> StoreResult<bool> {
        let source_path = source_path.to_string();
        let file_name = file_name.to_string();
        Ok(self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT 1 FROM file_histories WHERE source_path = ?1 AND file_name = ?2",
                )?;
                Ok(stmt.exists(params![source_path, file_name])?)
            })
            .await?)
    }

    async fn bulk_delete(&self, ids: &[i64]) -> StoreResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let ids = ids.to_vec();
        let removed = self
            .conn
            .call(move |conn| {
                let placeholders = vec!["?"; ids.len()].join(", ");
                Ok(conn.execute(
                    &format!("DELETE FROM file_histories WHERE id IN ({})", placeholders),
                    params_from_iter(ids.iter()),
                )?)
            })
            .await?;
        Ok(removed as u64)
    }

    async fn clear_all(&self) -> StoreResult<u64> {
        let removed = self
            .conn
            .call(|conn| Ok(conn.execute("DELETE FROM file_histories", [])?))
            .await?;
        Ok(removed as u64)
    }
}

#[async_trait]
impl InvalidStrmStore for SqliteStore {
    async fn record(&self, entry: NewInvalidStrmFile) -> StoreResult<InvalidStrmFile> {
        let ts = encode_time(&now());
        let recorded = self
            .conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO invalid_strm_files (file_history_id, detection_time,
                     detection_type, reason, error_message, status, file_name, source_path,
                     target_file_path, file_size, strm_url, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, 'pending', ?6, ?7, ?8, ?9, ?10, ?11, ?11)
                     ON CONFLICT(file_history_id) DO UPDATE SET
                        detection_time = excluded.detection_time,
                        detection_type = excluded.detection_type,
                        reason = excluded.reason,
                        error_message = excluded.error_message,
                        file_name = excluded.file_name,
                        source_path = excluded.source_path,
                        target_file_path = excluded.target_file_path,
                        file_size = excluded.file_size,
                        strm_url = excluded.strm_url,
                        updated_at = excluded.updated_at",
                    params![
                        entry.file_history_id,
                        encode_time(&entry.detection_time),
                        entry.detection_type.as_str(),
                        entry.reason.as_str(),
                        entry.error_message,
                        entry.file_name,
                        entry.source_path,
                        entry.target_file_path,
                        entry.file_size,
                        entry.strm_url,
                        ts
                    ],
                )?;
                Ok(select_invalid(conn, "file_history_id", entry.file_history_id)?)
            })
            .await?;
        recorded.ok_or(StoreError::Database("recorded invalid strm file vanished".into()))
    }

    async fn find_invalid(&self, id: i64) -> StoreResult<Option<InvalidStrmFile>> {
        Ok(self
            .conn
            .call(move |conn| Ok(select_invalid(conn, "id", id)?))
            .await?)
    }

    async fn list_invalid(&self, query: &InvalidStrmQuery) -> StoreResult<Page<InvalidStrmFile>> {
        let filter = query.to_filter();
        let page = query.page;
        Ok(self
            .conn
            .call(move |conn| {
                Ok(paged(
                    conn,
                    "invalid_strm_files",
                    INVALID_COLUMNS,
                    &filter,
                    "detection_time DESC, id DESC",
                    page,
                    invalid_from_row,
                )?)
            })
            .await?)
    }

    async fn invalid_stats(
        &self,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> StoreResult<InvalidStrmStats> {
        let from = from.as_ref().map(encode_time);
        let to = to.as_ref().map(encode_time);
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT status, reason, COUNT(*) FROM invalid_strm_files
                     WHERE (?1 IS NULL OR detection_time >= ?1)
                       AND (?2 IS NULL OR detection_time <= ?2)
                     GROUP BY status, reason",
                )?;
                let rows = stmt
                    .query_map(params![from, to], |row| {
                        Ok((
                            decode_parsed(row, 0)?,
                            decode_parsed(row, 1)?,
                            row.get::<_, i64>(2)?,
                        ))
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await?;

        let mut stats = InvalidStrmStats::default();
        for (status, reason, count) in rows {
            stats.record(status, reason, count.max(0) as u64);
        }
        Ok(stats)
    }

    async fn set_status(
        &self,
        ids: &[i64],
        status: InvalidStatus,
        result: Option<String>,
    ) -> StoreResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let ids = ids.to_vec();
        let ts = encode_time(&now());
        let changed = self
            .conn
            .call(move |conn| {
                let placeholders = vec!["?"; ids.len()].join(", ");
                let mut values: Vec<rusqlite::types::Value> = vec![
                    status.as_str().to_string().into(),
                    result.into(),
                    ts.clone().into(),
                    ts.into(),
                ];
                values.extend(ids.into_iter().map(rusqlite::types::Value::from));
                Ok(conn.execute(
                    &format!(
                        "UPDATE invalid_strm_files SET status = ?, process_result = ?,
                         processed_at = ?, updated_at = ? WHERE id IN ({})",
                        placeholders
                    ),
                    params_from_iter(values.iter()),
                )?)
            })
            .await?;
        Ok(changed as u64)
    }

    async fn delete_invalid(&self, ids: &[i64]) -> StoreResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let ids = ids.to_vec();
        let removed = self
            .conn
            .call(move |conn| {
                let placeholders = vec!["?"; ids.len()].join(", ");
                Ok(conn.execute(
                    &format!("DELETE FROM invalid_strm_files WHERE id IN ({})", placeholders),
                    params_from_iter(ids.iter()),
                )?)
            })
            .await?;
        Ok(removed as u64)
    }
}
