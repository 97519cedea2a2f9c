//! filetask - cron-driven file task runner
//!
//! Main entry point for the filetask CLI and engine host.

mod backend;
mod cli;
mod cmd_invalid;
mod cmd_records;
mod cmd_task;
mod output;
mod server;

use anyhow::bail;
use clap::Parser;
use tracing::warn;

use filetask_api::ApiClient;
use filetask_config::{ConfigLoader, ConfigValidator};

use crate::backend::Backend;
use crate::cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = ConfigLoader::load_or_default(&cli.config)?;
    server::init_tracing(&config.logging)?;
    for warning in ConfigValidator::validate(&config).into_result()? {
        warn!(field = %warning.path, "{}", warning.message);
    }

    let command = match cli.command {
        None | Some(Commands::Run) => {
            return server::run_foreground(&config, cli.in_memory).await;
        }
        Some(command) => command,
    };

    let backend = Backend::connect(&config, cli.in_memory).await?;
    let result = dispatch(command, backend.client(), cli.json).await;
    backend.close().await;
    result
}

/// Run one command against the engine host.
async fn dispatch(command: Commands, client: &ApiClient, json: bool) -> anyhow::Result<()> {
    match command {
        Commands::Run => bail!("`run` hosts the engine itself and is not sent to a host"),
        Commands::Task { action } => cmd_task::handle_task_command(action, client, json).await,
        Commands::Logs {
            task_id,
            status,
            page,
        } => cmd_records::list_logs(client, task_id, status, &page, json).await,
        Commands::Stats { since } => cmd_records::show_log_stats(client, since, json).await,
        Commands::History { action, filter } => {
            cmd_records::handle_history_command(client, action, filter, json).await
        }
        Commands::Invalid { action } => {
            cmd_invalid::handle_invalid_command(action, client, json).await
        }
    }
}
