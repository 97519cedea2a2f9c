//! Source tree scanning.

use std::path::{Path, PathBuf};

use filetask_engine::WorkUnitFailure;
use walkdir::WalkDir;

use crate::settings::{FileAction, WorkerSettings};

/// A source file the worker will act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SourceFile {
    pub path: PathBuf,
    /// Path relative to the source root.
    pub relative: PathBuf,
    pub action: FileAction,
    pub size: u64,
}

/// Collect every file under `root` with a known suffix, in file-name order.
pub(crate) fn scan_source(
    root: &Path,
    settings: &WorkerSettings,
) -> Result<Vec<SourceFile>, WorkUnitFailure> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(root).display().to_string();
            WorkUnitFailure::with_source(format!("failed to scan {}", path), e)
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Some(action) = settings.action_for(entry.path()) else {
            continue;
        };
        let relative = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_path_buf();
        let size = entry.metadata().map(|m| m.len()).unwrap_or(0);
        files.push(SourceFile {
            path: entry.path().to_path_buf(),
            relative,
            action,
            size,
        });
    }
    Ok(files)
}

/// `relative` rendered with `/` separators, for use in URLs.
pub(crate) fn url_path(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_scan_filters_and_orders() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("Show/S01")).unwrap();
        fs::write(dir.path().join("Show/S01/e02.mkv"), b"22").unwrap();
        fs::write(dir.path().join("Show/S01/e01.mkv"), b"1").unwrap();
        fs::write(dir.path().join("Show/S01/e01.srt"), b"sub").unwrap();
        fs::write(dir.path().join("Show/notes.txt"), b"x").unwrap();

        let settings = WorkerSettings::new(["mkv"], ["srt"]);
        let files = scan_source(dir.path(), &settings).unwrap();
        let names: Vec<_> = files.iter().map(|f| url_path(&f.relative)).collect();
        assert_eq!(names, vec!["Show/S01/e01.mkv", "Show/S01/e01.srt", "Show/S01/e02.mkv"]);
        assert_eq!(files[0].action, FileAction::Strm);
        assert_eq!(files[1].action, FileAction::Copy);
        assert_eq!(files[2].size, 2);
    }

    #[test]
    fn test_scan_missing_root_fails() {
        let dir = TempDir::new().unwrap();
        let settings = WorkerSettings::default();
        let err = scan_source(&dir.path().join("absent"), &settings).unwrap_err();
        assert!(err.message().starts_with("failed to scan"));
    }
}
