//! CLI definitions for filetask.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use filetask_store::{TaskId, TaskSort};

/// filetask CLI.
#[derive(Parser)]
#[command(name = "filetask")]
#[command(about = "Cron-driven file task runner")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path
    #[arg(
        short,
        long,
        default_value = "config/filetask.toml",
        env = "FILETASK_CONFIG",
        global = true
    )]
    pub config: PathBuf,

    /// Keep all state in memory for this process only
    #[arg(long, global = true)]
    pub in_memory: bool,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Host the engine, scheduler and control API in the foreground (default)
    Run,

    /// Task management commands
    Task {
        #[command(subcommand)]
        action: TaskAction,
    },

    /// List execution logs of a task, newest first
    Logs {
        /// Task ID
        task_id: i64,

        /// Filter by status (pending, running, success, failed, stopped)
        #[arg(long)]
        status: Option<String>,

        #[command(flatten)]
        page: PageArgs,
    },

    /// Execution log counts per status
    Stats {
        /// Only count runs started at or after this RFC 3339 time
        #[arg(long)]
        since: Option<DateTime<Utc>>,
    },

    /// List, clear or delete generated file history
    #[command(args_conflicts_with_subcommands = true)]
    History {
        #[command(subcommand)]
        action: Option<HistoryAction>,

        #[command(flatten)]
        filter: HistoryFilter,
    },

    /// Check generated .strm files and review the ones found invalid
    Invalid {
        #[command(subcommand)]
        action: InvalidAction,
    },
}

#[derive(Subcommand)]
pub(crate) enum TaskAction {
    /// Create a task
    Create {
        /// Task name
        name: String,

        /// Source directory
        source: String,

        /// Target directory
        target: String,

        /// Cron expression (5, 6 or 7 fields)
        #[arg(long)]
        cron: Option<String>,

        /// Create the task disabled
        #[arg(long)]
        disabled: bool,

        /// Overwrite existing target files
        #[arg(long)]
        overwrite: bool,
    },

    /// Update fields of a task
    Update {
        /// Task ID
        id: i64,

        #[arg(long)]
        name: Option<String>,

        #[arg(long)]
        source: Option<String>,

        #[arg(long)]
        target: Option<String>,

        /// New cron expression; an empty string removes the schedule
        #[arg(long)]
        cron: Option<String>,

        #[arg(long)]
        enabled: Option<bool>,

        #[arg(long)]
        overwrite: Option<bool>,
    },

    /// Delete a task
    Delete {
        /// Task ID
        id: i64,
    },

    /// List tasks
    List {
        /// Match against name, source and target
        #[arg(long)]
        keyword: Option<String>,

        #[arg(long)]
        enabled: Option<bool>,

        #[arg(long, value_enum, default_value = "created")]
        sort: SortKey,

        /// Sort ascending instead of descending
        #[arg(long)]
        asc: bool,

        #[command(flatten)]
        page: PageArgs,
    },

    /// Flip the enabled flag of a task
    Toggle {
        /// Task ID
        id: i64,
    },

    /// Clear the running flag and last run time of a task
    Reset {
        /// Task ID
        id: i64,
    },

    /// Show the execution status of a task
    Status {
        /// Task ID
        id: i64,
    },

    /// Execute a task now and stream its progress
    Run {
        /// Task ID
        id: i64,
    },
}

#[derive(Subcommand)]
pub(crate) enum HistoryAction {
    /// Delete every file history row
    Clear,

    /// Delete file history rows by id
    Delete {
        #[arg(required = true)]
        ids: Vec<i64>,
    },
}

#[derive(Subcommand)]
pub(crate) enum InvalidAction {
    /// List detections, newest first
    List {
        /// Match against file name, source and target path
        #[arg(long)]
        keyword: Option<String>,

        /// Review status (pending, confirmed, ignored, processing)
        #[arg(long)]
        status: Option<String>,

        /// Reason (file_not_found, strm_file_not_found, url_invalid, access_denied)
        #[arg(long)]
        reason: Option<String>,

        #[command(flatten)]
        page: PageArgs,
    },

    /// Show one detection
    Show { id: i64 },

    /// Counts by review status and reason
    Stats,

    /// Check .strm files now
    Check {
        /// Only files generated by this task
        #[arg(long)]
        task: Option<TaskId>,
    },

    /// Set the review status of detections
    Mark {
        /// New status (pending, confirmed, ignored, processing)
        status: String,

        #[arg(required = true)]
        ids: Vec<i64>,

        /// Note stored with the status change
        #[arg(long)]
        note: Option<String>,
    },

    /// Delete detections by id
    Delete {
        #[arg(required = true)]
        ids: Vec<i64>,
    },
}

#[derive(Args)]
pub(crate) struct HistoryFilter {
    /// Match against file name, source and target path
    #[arg(long)]
    pub keyword: Option<String>,

    /// Only rows generated by this task
    #[arg(long)]
    pub task: Option<TaskId>,

    /// File type (strm, copy)
    #[arg(long = "type")]
    pub file_type: Option<String>,

    /// File suffix, e.g. mkv
    #[arg(long)]
    pub suffix: Option<String>,

    #[command(flatten)]
    pub page: PageArgs,
}

#[derive(Args)]
pub(crate) struct PageArgs {
    /// Page number, starting at 1
    #[arg(long, default_value_t = 1)]
    pub page: u32,

    /// Rows per page
    #[arg(long, default_value_t = 10)]
    pub page_size: u32,
}

#[derive(Clone, Copy, ValueEnum)]
pub(crate) enum SortKey {
    Created,
    Updated,
    Name,
    LastRun,
}

impl From<SortKey> for TaskSort {
    fn from(key: SortKey) -> Self {
        match key {
            SortKey::Created => TaskSort::CreatedAt,
            SortKey::Updated => TaskSort::UpdatedAt,
            SortKey::Name => TaskSort::Name,
            SortKey::LastRun => TaskSort::LastRunAt,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_to_run() {
        let cli = Cli::try_parse_from(["filetask"]).unwrap();
        assert!(cli.command.is_none());
        assert!(!cli.in_memory);
    }

    #[test]
    fn test_task_create() {
        let cli = Cli::try_parse_from([
            "filetask",
            "--in-memory",
            "task",
            "create",
            "movies",
            "/mnt/media",
            "/srv/strm",
            "--cron",
            "0 3 * * *",
        ])
        .unwrap();
        assert!(cli.in_memory);
        match cli.command {
            Some(Commands::Task {
                action: TaskAction::Create { name, cron, disabled, .. },
            }) => {
                assert_eq!(name, "movies");
                assert_eq!(cron.as_deref(), Some("0 3 * * *"));
                assert!(!disabled);
            }
            _ => panic!("expected task create"),
        }
    }

    #[test]
    fn test_history_clear_and_filters() {
        let cli = Cli::try_parse_from(["filetask", "history", "clear"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::History { action: Some(HistoryAction::Clear), .. })
        ));

        let cli = Cli::try_parse_from(["filetask", "history", "--type", "strm", "--page", "2"])
            .unwrap();
        match cli.command {
            Some(Commands::History { action: None, filter }) => {
                assert_eq!(filter.file_type.as_deref(), Some("strm"));
                assert_eq!(filter.page.page, 2);
            }
            _ => panic!("expected history listing"),
        }
    }

    #[test]
    fn test_history_delete_needs_ids() {
        assert!(Cli::try_parse_from(["filetask", "history", "delete"]).is_err());
        let cli = Cli::try_parse_from(["filetask", "history", "delete", "3", "5"]).unwrap();
        match cli.command {
            Some(Commands::History {
                action: Some(HistoryAction::Delete { ids }),
                ..
            }) => assert_eq!(ids, vec![3, 5]),
            _ => panic!("expected history delete"),
        }
    }

    #[test]
    fn test_invalid_commands() {
        let cli = Cli::try_parse_from(["filetask", "invalid", "check", "--task", "7"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Invalid { action: InvalidAction::Check { task: Some(7) } })
        ));

        let cli = Cli::try_parse_from([
            "filetask", "invalid", "mark", "ignored", "1", "2", "--note", "archived",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::Invalid {
                action: InvalidAction::Mark { status, ids, note },
            }) => {
                assert_eq!(status, "ignored");
                assert_eq!(ids, vec![1, 2]);
                assert_eq!(note.as_deref(), Some("archived"));
            }
            _ => panic!("expected invalid mark"),
        }
        assert!(Cli::try_parse_from(["filetask", "invalid", "mark", "ignored"]).is_err());
    }

    #[test]
    fn test_stats_since_parses_rfc3339() {
        let cli = Cli::try_parse_from(["filetask", "stats", "--since", "2024-05-01T00:00:00Z"])
            .unwrap();
        match cli.command {
            Some(Commands::Stats { since: Some(since) }) => {
                assert_eq!(since.to_rfc3339(), "2024-05-01T00:00:00+00:00");
            }
            _ => panic!("expected stats"),
        }
        assert!(Cli::try_parse_from(["filetask", "stats", "--since", "yesterday"]).is_err());
    }

    #[test]
    fn test_logs_requires_task_id() {
        assert!(Cli::try_parse_from(["filetask", "logs"]).is_err());
    }
}
