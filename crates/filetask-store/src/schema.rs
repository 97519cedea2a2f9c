//! Database schema management.

use rusqlite::Connection;
use tokio_rusqlite::Error;

/// Initialize the database schema.
pub fn init_schema(conn: &Connection) -> Result<(), Error> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

const SCHEMA: &str = r#"
-- Task definitions
CREATE TABLE IF NOT EXISTS tasks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    source_path TEXT NOT NULL,
    target_path TEXT NOT NULL,
    cron TEXT,
    enabled INTEGER NOT NULL DEFAULT 1,
    overwrite INTEGER NOT NULL DEFAULT 0,
    running INTEGER NOT NULL DEFAULT 0,
    last_run_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- One row per execution attempt. Kept after the task is deleted.
CREATE TABLE IF NOT EXISTS task_logs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    task_id INTEGER NOT NULL,
    status TEXT NOT NULL,
    start_time TEXT NOT NULL,
    end_time TEXT,
    message TEXT,
    error TEXT
);

-- Files produced by task runs
CREATE TABLE IF NOT EXISTS file_histories (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    task_id INTEGER,
    file_name TEXT NOT NULL,
    source_path TEXT NOT NULL,
    target_file_path TEXT NOT NULL,
    file_type TEXT NOT NULL,
    file_suffix TEXT NOT NULL,
    file_size INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);

-- Produced .strm files that failed a validity check, one per history row
CREATE TABLE IF NOT EXISTS invalid_strm_files (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    file_history_id INTEGER NOT NULL UNIQUE,
    detection_time TEXT NOT NULL,
    detection_type TEXT NOT NULL,
    reason TEXT NOT NULL,
    error_message TEXT,
    status TEXT NOT NULL DEFAULT 'pending',
    file_name TEXT NOT NULL,
    source_path TEXT NOT NULL,
    target_file_path TEXT NOT NULL,
    file_size INTEGER NOT NULL DEFAULT 0,
    strm_url TEXT,
    processed_at TEXT,
    process_result TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_task_logs_task_start ON task_logs(task_id, start_time);
CREATE INDEX IF NOT EXISTS idx_task_logs_status ON task_logs(status);
CREATE INDEX IF NOT EXISTS idx_file_histories_created ON file_histories(created_at);
CREATE INDEX IF NOT EXISTS idx_file_histories_source ON file_histories(source_path, file_name);
CREATE INDEX IF NOT EXISTS idx_invalid_strm_detection ON invalid_strm_files(detection_time);
CREATE INDEX IF NOT EXISTS idx_invalid_strm_status ON invalid_strm_files(status);
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_creation() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        for table in [
            "tasks",
            "task_logs",
            "file_histories",
            "invalid_strm_files",
        ] {
            let mut stmt = conn
                .prepare("SELECT name FROM sqlite_master WHERE type='table' AND name=?1")
                .unwrap();
            assert!(stmt.exists([table]).unwrap(), "missing table {}", table);
        }
    }

    #[test]
    fn test_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
    }
}
