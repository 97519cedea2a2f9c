//! Plain-text and JSON rendering of command results.

use chrono::{DateTime, Local, Utc};
use serde::Serialize;

use filetask_engine::{TaskEvent, TaskStatusReport};
use filetask_store::{
    FileHistory, InvalidStrmFile, InvalidStrmStats, Page, Task, TaskLog, TaskLogStats,
};
use filetask_worker::CheckReport;

pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn time(at: Option<DateTime<Utc>>) -> String {
    at.map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "-".to_string())
}

fn page_footer<T>(page: &Page<T>) {
    println!(
        "page {}/{} ({} total)",
        page.page,
        page.page_count().max(1),
        page.total
    );
}

pub(crate) fn print_task(task: &Task) {
    println!("#{} {}", task.id, task.name);
    println!("  source:    {}", task.source_path);
    println!("  target:    {}", task.target_path);
    println!("  cron:      {}", task.cron.as_deref().unwrap_or("-"));
    println!("  enabled:   {}", task.enabled);
    println!("  overwrite: {}", task.overwrite);
    println!("  running:   {}", task.running);
    println!("  last run:  {}", time(task.last_run_at));
}

pub(crate) fn print_tasks(page: &Page<Task>) {
    for task in &page.items {
        println!(
            "{:>5}  {:<24} {:<16} {:<8} {}",
            task.id,
            task.name,
            task.cron.as_deref().unwrap_or("-"),
            if task.enabled { "enabled" } else { "disabled" },
            time(task.last_run_at),
        );
    }
    page_footer(page);
}

pub(crate) fn print_log(log: &TaskLog) {
    println!(
        "{:>6}  {:<8} {}  ->  {}",
        log.id,
        log.status,
        time(Some(log.start_time)),
        time(log.end_time),
    );
    if let Some(message) = &log.message {
        println!("        {}", message);
    }
    if let Some(error) = &log.error {
        println!("        error: {}", error);
    }
}

pub(crate) fn print_logs(page: &Page<TaskLog>) {
    page.items.iter().for_each(print_log);
    page_footer(page);
}

pub(crate) fn print_history(page: &Page<FileHistory>) {
    for entry in &page.items {
        println!(
            "{:>6}  {:<5} {:>12}  {}  {}",
            entry.id,
            entry.file_type,
            entry.file_size,
            time(Some(entry.created_at)),
            entry.target_file_path,
        );
    }
    page_footer(page);
}

pub(crate) fn print_status(report: &TaskStatusReport) {
    match report {
        TaskStatusReport::Active(job) => {
            println!(
                "{} ({}%), job {}{}",
                job.status,
                job.progress,
                job.job_id,
                if job.cancel_requested { ", stop requested" } else { "" }
            );
        }
        TaskStatusReport::Idle { last_log: Some(log) } => {
            println!("idle, last run:");
            print_log(log);
        }
        TaskStatusReport::Idle { last_log: None } => println!("idle, never run"),
    }
}

pub(crate) fn print_event(event: &TaskEvent) {
    match event {
        TaskEvent::Started { job_id, .. } => println!("started job {}", job_id),
        TaskEvent::Progress { progress, .. } => println!("progress {:>3}%", progress),
        TaskEvent::Finished { status, error, .. } => match error {
            Some(error) => println!("finished: {} ({})", status, error),
            None => println!("finished: {}", status),
        },
    }
}

pub(crate) fn print_log_stats(stats: &TaskLogStats) {
    println!("total:   {}", stats.total);
    println!("pending: {}", stats.pending);
    println!("running: {}", stats.running);
    println!("success: {}", stats.success);
    println!("failed:  {}", stats.failed);
    println!("stopped: {}", stats.stopped);
}

pub(crate) fn print_invalid_list(page: &Page<InvalidStrmFile>) {
    for record in &page.items {
        println!(
            "{:>6}  {:<10} {:<19} {}  {}",
            record.id,
            record.status,
            record.reason,
            time(Some(record.detection_time)),
            record.target_file_path,
        );
    }
    page_footer(page);
}

pub(crate) fn print_invalid(record: &InvalidStrmFile) {
    println!("#{} {}", record.id, record.file_name);
    println!("  status:    {}", record.status);
    println!("  reason:    {}", record.reason);
    if let Some(message) = &record.error_message {
        println!("  message:   {}", message);
    }
    println!("  strm file: {}", record.target_file_path);
    println!("  source:    {}", record.source_path);
    println!("  points to: {}", record.strm_url.as_deref().unwrap_or("-"));
    println!(
        "  detected:  {} ({})",
        time(Some(record.detection_time)),
        record.detection_type
    );
    if record.processed_at.is_some() {
        println!(
            "  reviewed:  {} {}",
            time(record.processed_at),
            record.process_result.as_deref().unwrap_or("")
        );
    }
}

pub(crate) fn print_invalid_stats(stats: &InvalidStrmStats) {
    println!("total:      {}", stats.total);
    println!("pending:    {}", stats.pending);
    println!("confirmed:  {}", stats.confirmed);
    println!("ignored:    {}", stats.ignored);
    println!("processing: {}", stats.processing);
    for (reason, count) in &stats.by_reason {
        println!("  {:<20} {}", reason, count);
    }
}

pub(crate) fn print_check_report(report: &CheckReport) {
    println!("checked {} .strm files, {} invalid", report.checked, report.invalid);
}
