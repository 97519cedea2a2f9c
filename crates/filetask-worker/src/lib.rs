//! # filetask Worker
//!
//! The file side of a task run. [`StrmWorkUnit`] walks a task's source tree
//! and mirrors it into the target tree: media files become `.strm` pointer
//! files, sidecar files are copied, and every written file is recorded as a
//! file history row. [`StrmChecker`] later re-validates those `.strm` rows
//! and records the broken ones as invalid-file detections.

mod check;
mod scan;
mod settings;
mod strm;

pub use check::{CheckReport, StrmChecker};
pub use settings::WorkerSettings;
pub use strm::StrmWorkUnit;
