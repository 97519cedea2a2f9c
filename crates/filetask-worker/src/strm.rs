//! `.strm` generation work unit.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use filetask_engine::{WorkContext, WorkOutcome, WorkUnit, WorkUnitFailure};
use filetask_store::{DetectionType, FileHistoryStore, FileType, NewFileHistory, Task};
use tracing::{debug, info, warn};

use crate::check::StrmChecker;
use crate::scan::{SourceFile, scan_source, url_path};
use crate::settings::{FileAction, WorkerSettings};

/// Mirrors a task's source tree into its target tree.
pub struct StrmWorkUnit {
    history: Arc<dyn FileHistoryStore>,
    settings: WorkerSettings,
    checker: Option<Arc<StrmChecker>>,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Tally {
    strm: usize,
    copied: usize,
    skipped: usize,
}

impl Tally {
    fn summary(&self) -> String {
        format!(
            "strm: {}, copied: {}, skipped: {}",
            self.strm, self.copied, self.skipped
        )
    }
}

/// Suppresses progress reports smaller than `step`; 100 always passes.
struct ProgressThrottle {
    step: u8,
    last: u8,
}

impl ProgressThrottle {
    fn new(step: u8) -> Self {
        Self { step, last: 0 }
    }

    fn should_report(&mut self, progress: u8) -> bool {
        if progress == 100 || progress >= self.last.saturating_add(self.step) {
            self.last = progress;
            true
        } else {
            false
        }
    }
}

fn io_failure(action: &str, path: &Path, e: std::io::Error) -> WorkUnitFailure {
    WorkUnitFailure::with_source(format!("failed to {} {}", action, path.display()), e)
}

impl StrmWorkUnit {
    pub fn new(history: Arc<dyn FileHistoryStore>, settings: WorkerSettings) -> Self {
        Self {
            history,
            settings,
            checker: None,
        }
    }

    /// Re-check the task's `.strm` files after every completed pass.
    pub fn with_checker(mut self, checker: Arc<StrmChecker>) -> Self {
        self.checker = Some(checker);
        self
    }

    pub fn settings(&self) -> &WorkerSettings {
        &self.settings
    }

    fn target_for(&self, task: &Task, file: &SourceFile) -> PathBuf {
        let target = Path::new(&task.target_path).join(&file.relative);
        match file.action {
            FileAction::Strm => target.with_extension("strm"),
            FileAction::Copy => target,
        }
    }

    fn strm_body(&self, file: &SourceFile) -> String {
        match self.settings.url_prefix() {
            Some(prefix) => format!(
                "{}/{}",
                prefix.trim_end_matches('/'),
                url_path(&file.relative)
            ),
            None => file.path.display().to_string(),
        }
    }

    /// Write one target file. `None` means the target existed and was kept.
    async fn process(
        &self,
        task: &Task,
        file: &SourceFile,
    ) -> Result<Option<FileType>, WorkUnitFailure> {
        let target = self.target_for(task, file);
        if !task.overwrite && matches!(tokio::fs::try_exists(&target).await, Ok(true)) {
            debug!(task_id = task.id, target = %target.display(), "Target exists, skipping");
            return Ok(None);
        }
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| io_failure("create directory", parent, e))?;
        }

        let file_type = match file.action {
            FileAction::Strm => {
                tokio::fs::write(&target, self.strm_body(file))
                    .await
                    .map_err(|e| io_failure("write", &target, e))?;
                FileType::Strm
            }
            FileAction::Copy => {
                tokio::fs::copy(&file.path, &target)
                    .await
                    .map_err(|e| io_failure("copy", &file.path, e))?;
                FileType::Copy
            }
        };

        let entry = NewFileHistory {
            task_id: Some(task.id),
            file_name: file
                .path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
            source_path: file.path.display().to_string(),
            target_file_path: target.display().to_string(),
            file_type,
            file_suffix: file
                .path
                .extension()
                .map(|e| e.to_string_lossy().to_ascii_lowercase())
                .unwrap_or_default(),
            file_size: i64::try_from(file.size).unwrap_or(i64::MAX),
        };
        self.history
            .create(entry)
            .await
            .map_err(|e| WorkUnitFailure::with_source("failed to record file history", e))?;
        debug!(task_id = task.id, target = %target.display(), %file_type, "Wrote target file");
        Ok(Some(file_type))
    }
}

#[async_trait]
impl WorkUnit for StrmWorkUnit {
    async fn run(&self, task: &Task, ctx: WorkContext) -> Result<WorkOutcome, WorkUnitFailure> {
        let root = PathBuf::from(&task.source_path);
        match tokio::fs::metadata(&root).await {
            Ok(meta) if meta.is_dir() => {}
            _ => {
                return Err(WorkUnitFailure::new(format!(
                    "source directory not found: {}",
                    root.display()
                )));
            }
        }

        let settings = self.settings.clone();
        let files = tokio::task::spawn_blocking(move || scan_source(&root, &settings))
            .await
            .map_err(|e| WorkUnitFailure::with_source("source scan aborted", e))??;
        info!(task_id = task.id, files = files.len(), "Scanned source tree");

        let total = files.len();
        let mut tally = Tally::default();
        let mut throttle = ProgressThrottle::new(self.settings.progress_step());
        for (index, file) in files.iter().enumerate() {
            if ctx.is_cancelled() {
                info!(task_id = task.id, processed = index, "Stop requested, leaving early");
                return Ok(WorkOutcome::with_message(format!(
                    "{} (stopped after {} of {})",
                    tally.summary(),
                    index,
                    total
                )));
            }
            match self.process(task, file).await? {
                Some(FileType::Strm) => tally.strm += 1,
                Some(FileType::Copy) => tally.copied += 1,
                None => tally.skipped += 1,
            }
            let progress = ((index + 1) * 100 / total) as u8;
            if throttle.should_report(progress) {
                ctx.report_progress(progress);
            }
        }

        if total == 0 {
            ctx.report_progress(100);
        }
        info!(
            task_id = task.id,
            strm = tally.strm,
            copied = tally.copied,
            skipped = tally.skipped,
            "Task files processed"
        );

        // a failed check never fails the run that produced the files
        if let Some(checker) = &self.checker {
            match checker.check(Some(task.id), DetectionType::Auto).await {
                Ok(report) if report.invalid > 0 => {
                    warn!(task_id = task.id, invalid = report.invalid, "Task has invalid .strm files");
                }
                Ok(_) => {}
                Err(e) => warn!(task_id = task.id, error = %e, "Post-run .strm check failed"),
            }
        }
        Ok(WorkOutcome::with_message(tally.summary()))
    }
}

#[cfg(test)]
#[path = "strm_tests.rs"]
mod tests;
