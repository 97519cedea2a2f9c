//! Cron scheduler: one armed timer per schedulable task.
//!
//! Each timer is a spawned loop that sleeps until the next occurrence of its
//! schedule and then hands the task id to a [`TaskTrigger`]. Trigger failures
//! are logged and the loop re-arms for the following occurrence.
//!
//! Expressions are evaluated in the host's local time unless the scheduler
//! is switched to [`ScheduleTimezone::Utc`].

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Local, Utc};
use cron::Schedule;
use filetask_store::{Task, TaskId};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cron_expr::parse_cron;
use crate::error::EngineError;

/// Receives cron fires.
#[async_trait]
pub trait TaskTrigger: Send + Sync {
    async fn fire(&self, task_id: TaskId) -> Result<(), EngineError>;
}

/// Wall clock that cron fields are matched against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScheduleTimezone {
    /// The host's local time zone.
    #[default]
    Local,
    Utc,
}

/// First occurrence of `schedule` strictly after `after`, evaluated in `zone`.
pub(crate) fn next_occurrence(
    schedule: &Schedule,
    after: DateTime<Utc>,
    zone: ScheduleTimezone,
) -> Option<DateTime<Utc>> {
    match zone {
        ScheduleTimezone::Local => schedule
            .after(&after.with_timezone(&Local))
            .next()
            .map(|at| at.with_timezone(&Utc)),
        ScheduleTimezone::Utc => schedule.after(&after).next(),
    }
}

/// A single armed timer.
struct CronTimer {
    expression: String,
    schedule: Schedule,
    token: CancellationToken,
    fire_count: Arc<AtomicU64>,
}

impl CronTimer {
    fn disarm(&self) {
        self.token.cancel();
    }
}

/// Owns the live set of cron timers.
///
/// Dropping the scheduler disarms every timer.
pub struct CronScheduler {
    trigger: Arc<dyn TaskTrigger>,
    timers: Mutex<HashMap<TaskId, CronTimer>>,
    zone: ScheduleTimezone,
}

impl CronScheduler {
    pub fn new(trigger: Arc<dyn TaskTrigger>) -> Self {
        Self {
            trigger,
            timers: Mutex::new(HashMap::new()),
            zone: ScheduleTimezone::default(),
        }
    }

    /// Evaluate expressions in `zone`. Applies to timers armed afterwards.
    pub fn with_timezone(mut self, zone: ScheduleTimezone) -> Self {
        self.zone = zone;
        self
    }

    pub fn timezone(&self) -> ScheduleTimezone {
        self.zone
    }

    /// Arm a timer for `task`, replacing any existing one.
    ///
    /// The first fire is the next occurrence strictly after now; scheduling
    /// never fires immediately. Must be called from within a tokio runtime.
    pub fn schedule_task(&self, task: &Task) -> Result<(), EngineError> {
        let expression = task.cron.as_deref().unwrap_or_default();
        let schedule = parse_cron(expression)?;

        let timer = CronTimer {
            expression: expression.to_string(),
            schedule: schedule.clone(),
            token: CancellationToken::new(),
            fire_count: Arc::new(AtomicU64::new(0)),
        };
        tokio::spawn(run_timer(
            task.id,
            schedule,
            self.zone,
            timer.token.clone(),
            self.trigger.clone(),
            timer.fire_count.clone(),
        ));

        let replaced = self.timers.lock().insert(task.id, timer);
        if let Some(old) = replaced {
            old.disarm();
            debug!(task_id = task.id, "Replaced cron timer");
        }
        info!(task_id = task.id, cron = %expression, "Scheduled task");
        Ok(())
    }

    /// Disarm the timer for `task_id`. Returns false if none was armed.
    pub fn unschedule_task(&self, task_id: TaskId) -> bool {
        match self.timers.lock().remove(&task_id) {
            Some(timer) => {
                timer.disarm();
                info!(task_id, "Unscheduled task");
                true
            }
            None => false,
        }
    }

    pub fn is_scheduled(&self, task_id: TaskId) -> bool {
        self.timers.lock().contains_key(&task_id)
    }

    pub fn timer_count(&self) -> usize {
        self.timers.lock().len()
    }

    pub fn scheduled_ids(&self) -> Vec<TaskId> {
        let mut ids: Vec<_> = self.timers.lock().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn cron_expression(&self, task_id: TaskId) -> Option<String> {
        self.timers
            .lock()
            .get(&task_id)
            .map(|t| t.expression.clone())
    }

    pub fn next_fire_time(&self, task_id: TaskId) -> Option<DateTime<Utc>> {
        self.timers
            .lock()
            .get(&task_id)
            .and_then(|t| next_occurrence(&t.schedule, Utc::now(), self.zone))
    }

    /// Number of times the current timer for `task_id` has fired.
    pub fn fire_count(&self, task_id: TaskId) -> Option<u64> {
        self.timers
            .lock()
            .get(&task_id)
            .map(|t| t.fire_count.load(Ordering::Relaxed))
    }

    /// Disarm every timer. Returns how many were armed.
    pub fn shutdown(&self) -> usize {
        let timers: Vec<_> = self.timers.lock().drain().collect();
        for (_, timer) in &timers {
            timer.disarm();
        }
        if !timers.is_empty() {
            info!(count = timers.len(), "Cron scheduler shut down");
        }
        timers.len()
    }
}

impl Drop for CronScheduler {
    fn drop(&mut self) {
        for (_, timer) in self.timers.get_mut().drain() {
            timer.disarm();
        }
    }
}

async fn run_timer(
    task_id: TaskId,
    schedule: Schedule,
    zone: ScheduleTimezone,
    token: CancellationToken,
    trigger: Arc<dyn TaskTrigger>,
    fire_count: Arc<AtomicU64>,
) {
    let mut after = Utc::now();
    loop {
        let Some(next) = next_occurrence(&schedule, after, zone) else {
            debug!(task_id, "Cron schedule has no further occurrences");
            return;
        };
        let wait = (next - Utc::now()).to_std().unwrap_or_default();

        tokio::select! {
            biased;
            _ = token.cancelled() => return,
            _ = tokio::time::sleep(wait) => {}
        }

        fire_count.fetch_add(1, Ordering::Relaxed);
        debug!(task_id, scheduled_for = %next, "Cron timer fired");

        let trigger = trigger.clone();
        tokio::spawn(async move {
            match trigger.fire(task_id).await {
                Ok(()) => {}
                Err(EngineError::TaskAlreadyRunning(_)) => {
                    info!(task_id, "Skipping cron run, previous execution still active");
                }
                Err(e) => warn!(task_id, error = %e, "Cron trigger failed"),
            }
        });

        after = next.max(Utc::now());
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
