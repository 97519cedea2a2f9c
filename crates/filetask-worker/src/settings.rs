//! Worker settings derived from the `[worker]` config section.

use std::collections::HashSet;
use std::path::Path;

use filetask_config::WorkerConfig;

/// What the worker does with a file, decided by its extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FileAction {
    Strm,
    Copy,
}

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    media_suffixes: HashSet<String>,
    copy_suffixes: HashSet<String>,
    url_prefix: Option<String>,
    progress_step: u8,
}

fn normalize_suffix(suffix: &str) -> String {
    suffix.trim().trim_start_matches('.').to_ascii_lowercase()
}

impl WorkerSettings {
    pub fn new<I, J, S, T>(media: I, copy: J) -> Self
    where
        I: IntoIterator<Item = S>,
        J: IntoIterator<Item = T>,
        S: AsRef<str>,
        T: AsRef<str>,
    {
        Self {
            media_suffixes: media.into_iter().map(|s| normalize_suffix(s.as_ref())).collect(),
            copy_suffixes: copy.into_iter().map(|s| normalize_suffix(s.as_ref())).collect(),
            url_prefix: None,
            progress_step: 1,
        }
    }

    pub fn with_url_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        self.url_prefix = (!prefix.trim().is_empty()).then_some(prefix);
        self
    }

    /// Clamped to 1..=100.
    pub fn with_progress_step(mut self, step: u8) -> Self {
        self.progress_step = step.clamp(1, 100);
        self
    }

    pub fn url_prefix(&self) -> Option<&str> {
        self.url_prefix.as_deref()
    }

    pub fn progress_step(&self) -> u8 {
        self.progress_step
    }

    /// Media wins when a suffix is listed in both sets.
    pub(crate) fn action_for(&self, path: &Path) -> Option<FileAction> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        if self.media_suffixes.contains(&ext) {
            Some(FileAction::Strm)
        } else if self.copy_suffixes.contains(&ext) {
            Some(FileAction::Copy)
        } else {
            None
        }
    }
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self::from(&WorkerConfig::default())
    }
}

impl From<&WorkerConfig> for WorkerSettings {
    fn from(config: &WorkerConfig) -> Self {
        let settings = Self::new(&config.media_suffixes, &config.copy_suffixes)
            .with_progress_step(config.progress_step);
        match &config.url_prefix {
            Some(prefix) => settings.with_url_prefix(prefix.clone()),
            None => settings,
        }
    }
}
