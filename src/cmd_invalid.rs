//! Invalid `.strm` file subcommands.

use anyhow::bail;

use filetask_api::ApiClient;
use filetask_api::dto::{CheckRequest, InvalidListParams, RangeParams, StatusChangeRequest};
use filetask_store::{DetectionType, InvalidReason, InvalidStatus};

use crate::cli::InvalidAction;
use crate::output;

pub(crate) async fn handle_invalid_command(
    action: InvalidAction,
    client: &ApiClient,
    json: bool,
) -> anyhow::Result<()> {
    match action {
        InvalidAction::List {
            keyword,
            status,
            reason,
            page,
        } => {
            let params = InvalidListParams {
                keyword,
                status: status.map(|s| s.parse::<InvalidStatus>()).transpose()?,
                reason: reason.map(|r| r.parse::<InvalidReason>()).transpose()?,
                page: Some(page.page),
                page_size: Some(page.page_size),
                ..Default::default()
            };
            let page = client.list_invalid(&params).await?;
            if json {
                output::print_json(&page)
            } else {
                output::print_invalid_list(&page);
                Ok(())
            }
        }
        InvalidAction::Show { id } => {
            let record = client.get_invalid(id).await?;
            if json {
                output::print_json(&record)
            } else {
                output::print_invalid(&record);
                Ok(())
            }
        }
        InvalidAction::Stats => {
            let stats = client.invalid_stats(&RangeParams::default()).await?;
            if json {
                output::print_json(&stats)
            } else {
                output::print_invalid_stats(&stats);
                Ok(())
            }
        }
        InvalidAction::Check { task } => {
            let report = client
                .check_invalid(&CheckRequest {
                    task_id: task,
                    detection_type: Some(DetectionType::Manual),
                })
                .await?;
            if json {
                output::print_json(&report)
            } else {
                output::print_check_report(&report);
                Ok(())
            }
        }
        InvalidAction::Mark { status, ids, note } => {
            if ids.is_empty() {
                bail!("pass at least one id");
            }
            let request = StatusChangeRequest {
                ids,
                status: status.parse::<InvalidStatus>()?,
                note,
            };
            let changed = client.mark_invalid(&request).await?;
            println!("marked {} rows {}", changed, request.status);
            Ok(())
        }
        InvalidAction::Delete { ids } => {
            if ids.is_empty() {
                bail!("pass at least one id");
            }
            let removed = client.delete_invalid(&ids).await?;
            println!("removed {} invalid .strm rows", removed);
            Ok(())
        }
    }
}
