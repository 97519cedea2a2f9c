//! Task subcommand handlers.

use anyhow::bail;
use tracing::info;

use filetask_api::ApiClient;
use filetask_api::dto::{TaskListParams, UpdateTaskRequest};
use filetask_engine::{TaskEvent, TaskStatusReport};
use filetask_store::{JobStatus, NewTask, SortOrder, Task, TaskId};

use crate::cli::TaskAction;
use crate::output;

/// Handle task subcommands.
pub(crate) async fn handle_task_command(
    action: TaskAction,
    client: &ApiClient,
    json: bool,
) -> anyhow::Result<()> {
    match action {
        TaskAction::Create {
            name,
            source,
            target,
            cron,
            disabled,
            overwrite,
        } => {
            let mut def = NewTask::new(name, source, target)
                .with_enabled(!disabled)
                .with_overwrite(overwrite);
            if let Some(cron) = cron {
                def = def.with_cron(cron);
            }
            let task = client.create_task(&def).await?;
            info!(task_id = task.id, "Task created");
            show_task(&task, json)
        }
        TaskAction::Update {
            id,
            name,
            source,
            target,
            cron,
            enabled,
            overwrite,
        } => {
            let request = UpdateTaskRequest {
                name,
                source_path: source,
                target_path: target,
                cron,
                enabled,
                overwrite,
            };
            if request == UpdateTaskRequest::default() {
                bail!("nothing to update; pass at least one field");
            }
            let task = client.update_task(id, &request).await?;
            show_task(&task, json)
        }
        TaskAction::Delete { id } => {
            client.delete_task(id).await?;
            println!("deleted task {}", id);
            Ok(())
        }
        TaskAction::List {
            keyword,
            enabled,
            sort,
            asc,
            page,
        } => {
            let params = TaskListParams {
                keyword,
                enabled,
                running: None,
                sort: Some(sort.into()),
                order: Some(if asc { SortOrder::Asc } else { SortOrder::Desc }),
                page: Some(page.page),
                page_size: Some(page.page_size),
            };
            let tasks = client.list_tasks(&params).await?;
            if json {
                output::print_json(&tasks)
            } else {
                output::print_tasks(&tasks);
                Ok(())
            }
        }
        TaskAction::Toggle { id } => {
            let task = client.toggle_task(id).await?;
            show_task(&task, json)
        }
        TaskAction::Reset { id } => {
            let task = client.reset_task(id).await?;
            show_task(&task, json)
        }
        TaskAction::Status { id } => {
            let report = client.task_status(id).await?;
            if json {
                output::print_json(&report)
            } else {
                output::print_status(&report);
                Ok(())
            }
        }
        TaskAction::Run { id } => run_task(id, client, json).await,
    }
}

fn show_task(task: &Task, json: bool) -> anyhow::Result<()> {
    if json {
        output::print_json(task)
    } else {
        output::print_task(task);
        Ok(())
    }
}

/// Start a run on the engine host and follow its events until it finishes.
/// Ctrl-C requests a cooperative stop.
async fn run_task(id: TaskId, client: &ApiClient, json: bool) -> anyhow::Result<()> {
    // subscribe first so the Started event is not missed
    let mut events = client.task_events(id).await?;
    let accepted = client.execute_task(id).await?;

    let mut stop_sent = false;
    let status = loop {
        tokio::select! {
            event = events.next() => {
                let Some(event) = event? else {
                    bail!("lost connection to the engine before task {} finished", id);
                };
                // a scheduled run may overlap with the subscription
                if event.job_id() != accepted.job_id {
                    continue;
                }
                if json {
                    output::print_json(&event)?;
                } else {
                    output::print_event(&event);
                }
                if let TaskEvent::Finished { status, .. } = event {
                    break status;
                }
            }
            _ = tokio::signal::ctrl_c(), if !stop_sent => {
                stop_sent = true;
                eprintln!("stop requested, waiting for the job to finish...");
                client.stop_task(id).await?;
            }
        }
    };
    drop(events);

    if !json {
        if let TaskStatusReport::Idle { last_log: Some(log) } = client.task_status(id).await? {
            output::print_log(&log);
        }
    }
    if status == JobStatus::Failed {
        bail!("task {} failed", id);
    }
    Ok(())
}
