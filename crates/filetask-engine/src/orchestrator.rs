//! Task orchestrator: the single entry point for task lifecycle operations.
//!
//! Every create, update and delete goes through both the task store and the
//! cron scheduler so the two never drift apart. Mutations of one task hold
//! that task's lock from the store write until its timer is re-evaluated.
//! Manual execute, stop and reset requests are routed to the execution queue.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use filetask_store::{
    NewTask, Page, Task, TaskId, TaskLog, TaskLogQuery, TaskLogStats, TaskLogStore, TaskPatch,
    TaskQuery, TaskStore,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::cron_expr::validate_cron;
use crate::error::EngineError;
use crate::event_bus::{EventBus, EventHandler, SubscriptionId};
use crate::job::{JobHandle, JobSnapshot};
use crate::queue::ExecutionQueue;
use crate::recovery::{RecoveryReport, recover};
use crate::scheduler::{CronScheduler, ScheduleTimezone};
use crate::work_unit::WorkUnit;

/// Current execution state of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TaskStatusReport {
    /// A job is pending or running.
    Active(JobSnapshot),
    /// No active job; the most recent log row, if any.
    Idle { last_log: Option<TaskLog> },
}

pub struct TaskOrchestrator {
    tasks: Arc<dyn TaskStore>,
    logs: Arc<dyn TaskLogStore>,
    bus: Arc<EventBus>,
    queue: ExecutionQueue,
    scheduler: CronScheduler,
    locks: DashMap<TaskId, Arc<AsyncMutex<()>>>,
}

fn blank(cron: Option<&str>) -> bool {
    cron.is_none_or(|c| c.trim().is_empty())
}

impl TaskOrchestrator {
    /// Wire a bus, queue and scheduler over the given stores.
    pub fn new(
        tasks: Arc<dyn TaskStore>,
        logs: Arc<dyn TaskLogStore>,
        work_unit: Arc<dyn WorkUnit>,
    ) -> Self {
        let bus = Arc::new(EventBus::new());
        let queue = ExecutionQueue::new(tasks.clone(), logs.clone(), work_unit, bus.clone());
        let scheduler = CronScheduler::new(Arc::new(queue.clone()));
        Self {
            tasks,
            logs,
            bus,
            queue,
            scheduler,
            locks: DashMap::new(),
        }
    }

    /// Evaluate cron expressions in `zone`. Call before any task is scheduled.
    pub fn with_schedule_timezone(mut self, zone: ScheduleTimezone) -> Self {
        let trigger = Arc::new(self.queue.clone());
        self.scheduler = CronScheduler::new(trigger).with_timezone(zone);
        self
    }

    pub fn queue(&self) -> &ExecutionQueue {
        &self.queue
    }

    pub fn scheduler(&self) -> &CronScheduler {
        &self.scheduler
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Create a task. The cron expression is validated before anything is
    /// persisted; a blank expression is stored as none.
    pub async fn create(&self, mut def: NewTask) -> Result<Task, EngineError> {
        if blank(def.cron.as_deref()) {
            def.cron = None;
        }
        if let Some(cron) = &def.cron {
            validate_cron(cron)?;
        }

        let task = self.tasks.create(def).await?;
        let lock = self.task_lock(task.id);
        let _guard = lock.lock().await;
        // a concurrent update may have won the lock; arm from what is stored
        if let Some(current) = self.tasks.find(task.id).await? {
            self.sync_schedule(&current)?;
        }
        info!(task_id = task.id, name = %task.name, "Task created");
        Ok(task)
    }

    /// Apply `patch` and re-evaluate the task's timer.
    ///
    /// `running` and `last_run_at` are owned by the execution queue and
    /// reset operation; they are ignored here.
    pub async fn update(&self, id: TaskId, patch: TaskPatch) -> Result<Task, EngineError> {
        let lock = self.task_lock(id);
        let _guard = lock.lock().await;
        self.update_locked(id, patch).await
    }

    /// Flip the enabled flag.
    pub async fn toggle_enabled(&self, id: TaskId) -> Result<Task, EngineError> {
        let lock = self.task_lock(id);
        let _guard = lock.lock().await;
        let task = self.find_task(id).await?;
        self.update_locked(id, TaskPatch::default().enabled(!task.enabled))
            .await
    }

    async fn update_locked(&self, id: TaskId, mut patch: TaskPatch) -> Result<Task, EngineError> {
        patch.running = None;
        patch.last_run_at = None;
        if patch.cron.as_ref().is_some_and(|c| blank(c.as_deref())) {
            patch.cron = Some(None);
        }

        let current = self.find_task(id).await?;
        let mut effective = current.clone();
        patch.apply(&mut effective);
        if let Some(cron) = &effective.cron {
            validate_cron(cron)?;
        }

        let task = self
            .tasks
            .update(id, patch)
            .await?
            .ok_or(EngineError::TaskNotFound(id))?;
        self.sync_schedule(&task)?;
        debug!(task_id = id, "Task updated");
        Ok(task)
    }

    /// Remove the task's timer, then the task. An in-flight execution is
    /// left to finish.
    pub async fn delete(&self, id: TaskId) -> Result<(), EngineError> {
        let lock = self.task_lock(id);
        let _guard = lock.lock().await;
        self.find_task(id).await?;
        self.scheduler.unschedule_task(id);
        if !self.tasks.delete(id).await? {
            return Err(EngineError::TaskNotFound(id));
        }
        // ids are never reused, so later callers only ever see "not found"
        self.locks.remove(&id);
        info!(task_id = id, "Task deleted");
        Ok(())
    }

    /// Start an execution now. Refused while the task's persisted
    /// `running` flag is set, whichever process set it.
    pub async fn execute(&self, id: TaskId) -> Result<JobHandle, EngineError> {
        self.queue.add_task(id).await
    }

    /// Request a stop. Stopping a task that is not running succeeds.
    pub async fn stop(&self, id: TaskId) -> Result<(), EngineError> {
        let task = self.find_task(id).await?;
        match self.queue.stop_task(id).await {
            Ok(()) => Ok(()),
            Err(EngineError::TaskNotRunning(_)) => {
                if task.running {
                    warn!(
                        task_id = id,
                        "Task is marked running but has no active job; reset its status"
                    );
                }
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Clear `running` and `last_run_at`. Refused while a job is active.
    pub async fn reset_status(&self, id: TaskId) -> Result<Task, EngineError> {
        self.find_task(id).await?;
        if self.queue.is_active(id) {
            return Err(EngineError::TaskRunning(id));
        }
        let task = self
            .tasks
            .update(id, TaskPatch::default().running(false).last_run_at(None))
            .await?
            .ok_or(EngineError::TaskNotFound(id))?;
        info!(task_id = id, "Task status reset");
        Ok(task)
    }

    /// Live job state, falling back to the latest log row.
    pub async fn get_task_status(&self, id: TaskId) -> Result<TaskStatusReport, EngineError> {
        self.find_task(id).await?;
        if let Some(snapshot) = self.queue.get_task_status(id) {
            return Ok(TaskStatusReport::Active(snapshot));
        }
        let last_log = self.logs.latest_for_task(id).await?;
        Ok(TaskStatusReport::Idle { last_log })
    }

    pub fn subscribe_progress(&self, id: TaskId, handler: Arc<dyn EventHandler>) -> SubscriptionId {
        self.bus.subscribe(id, handler)
    }

    pub fn unsubscribe_progress(&self, id: TaskId, subscription: SubscriptionId) -> bool {
        self.bus.unsubscribe(id, subscription)
    }

    pub async fn find_task(&self, id: TaskId) -> Result<Task, EngineError> {
        self.tasks
            .find(id)
            .await?
            .ok_or(EngineError::TaskNotFound(id))
    }

    pub async fn list_tasks(&self, query: &TaskQuery) -> Result<Page<Task>, EngineError> {
        Ok(self.tasks.list(query).await?)
    }

    pub async fn list_logs(&self, query: &TaskLogQuery) -> Result<Page<TaskLog>, EngineError> {
        Ok(self.logs.list(query).await?)
    }

    pub async fn log_stats(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> Result<TaskLogStats, EngineError> {
        Ok(self.logs.stats(since).await?)
    }

    /// Reconcile state left behind by a previous process.
    pub async fn recover(&self) -> Result<RecoveryReport, EngineError> {
        recover(self.tasks.as_ref(), self.logs.as_ref(), &self.queue).await
    }

    /// Arm timers for every schedulable task. Tasks whose expression no
    /// longer parses are logged and skipped. Returns how many were armed.
    pub async fn load_schedules(&self) -> Result<usize, EngineError> {
        let mut armed = 0;
        for task in self.tasks.list_all().await? {
            if !task.is_schedulable() {
                continue;
            }
            match self.scheduler.schedule_task(&task) {
                Ok(()) => armed += 1,
                Err(e) => warn!(task_id = task.id, error = %e, "Skipping task with invalid schedule"),
            }
        }
        info!(armed, "Loaded task schedules");
        Ok(armed)
    }

    /// Disarm timers, stop active jobs and drop subscriptions.
    /// Returns false if jobs were still running when `timeout` elapsed.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.scheduler.shutdown();
        let drained = self.queue.shutdown(timeout).await;
        self.bus.clear();
        drained
    }

    fn task_lock(&self, id: TaskId) -> Arc<AsyncMutex<()>> {
        self.locks.entry(id).or_default().clone()
    }

    fn sync_schedule(&self, task: &Task) -> Result<(), EngineError> {
        if task.is_schedulable() {
            self.scheduler.schedule_task(task)
        } else {
            self.scheduler.unschedule_task(task.id);
            Ok(())
        }
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
