//! # filetask Store
//!
//! Durable records behind the scheduling engine:
//!
//! - [`Task`]: a named, optionally cron-scheduled file job definition
//! - [`TaskLog`]: one row per execution attempt, browsed newest-first
//! - [`FileHistory`]: one row per file a job produced
//! - [`InvalidStrmFile`]: a produced `.strm` file that failed a validity check
//!
//! Two backends implement the store traits: [`MemoryStore`] for tests and
//! throwaway runs, and [`SqliteStore`] for real deployments.

pub mod error;
pub mod invalid_strm;
pub mod memory;
pub mod model;
pub mod query;
mod schema;
pub mod sqlite;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use invalid_strm::{
    DetectionType, InvalidReason, InvalidStatus, InvalidStrmFile, InvalidStrmQuery,
    InvalidStrmStats, NewInvalidStrmFile,
};
pub use memory::MemoryStore;
pub use model::{
    FileHistory, FileType, JobStatus, NewFileHistory, NewTask, NewTaskLog, Task, TaskId, TaskLog,
    TaskLogPatch, TaskPatch, now,
};
pub use query::{
    FileHistoryQuery, Page, PageRequest, SortOrder, TaskLogQuery, TaskLogStats, TaskQuery,
    TaskSort,
};
pub use sqlite::SqliteStore;
pub use store::{FileHistoryStore, InvalidStrmStore, TaskLogStore, TaskStore};
