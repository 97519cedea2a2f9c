//! Execution log and file history subcommands.

use anyhow::bail;
use chrono::{DateTime, Utc};

use filetask_api::ApiClient;
use filetask_api::dto::{HistoryParams, LogListParams, SinceParams};
use filetask_store::{FileType, JobStatus, TaskId};

use crate::cli::{HistoryAction, HistoryFilter, PageArgs};
use crate::output;

pub(crate) async fn list_logs(
    client: &ApiClient,
    task_id: TaskId,
    status: Option<String>,
    page: &PageArgs,
    json: bool,
) -> anyhow::Result<()> {
    let params = LogListParams {
        status: status.map(|s| s.parse::<JobStatus>()).transpose()?,
        page: Some(page.page),
        page_size: Some(page.page_size),
        ..Default::default()
    };
    let logs = client.task_logs(task_id, &params).await?;
    if json {
        output::print_json(&logs)
    } else {
        output::print_logs(&logs);
        Ok(())
    }
}

pub(crate) async fn show_log_stats(
    client: &ApiClient,
    since: Option<DateTime<Utc>>,
    json: bool,
) -> anyhow::Result<()> {
    let stats = client.log_stats(&SinceParams { since }).await?;
    if json {
        output::print_json(&stats)
    } else {
        output::print_log_stats(&stats);
        Ok(())
    }
}

pub(crate) async fn handle_history_command(
    client: &ApiClient,
    action: Option<HistoryAction>,
    filter: HistoryFilter,
    json: bool,
) -> anyhow::Result<()> {
    match action {
        Some(HistoryAction::Clear) => {
            let removed = client.clear_history().await?;
            println!("removed {} file history rows", removed);
            Ok(())
        }
        Some(HistoryAction::Delete { ids }) => {
            if ids.is_empty() {
                bail!("pass at least one id");
            }
            let removed = client.delete_history(&ids).await?;
            println!("removed {} file history rows", removed);
            Ok(())
        }
        None => {
            let params = HistoryParams {
                keyword: filter.keyword,
                task_id: filter.task,
                file_type: filter
                    .file_type
                    .map(|t| t.parse::<FileType>())
                    .transpose()?,
                suffix: filter.suffix,
                page: Some(filter.page.page),
                page_size: Some(filter.page.page_size),
                ..Default::default()
            };
            let page = client.list_history(&params).await?;
            if json {
                output::print_json(&page)
            } else {
                output::print_history(&page);
                Ok(())
            }
        }
    }
}
