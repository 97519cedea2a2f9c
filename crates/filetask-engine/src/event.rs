//! Execution events published on the [`EventBus`](crate::EventBus).

use filetask_store::{JobStatus, TaskId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle event of a single execution job.
///
/// For one job, subscribers observe at most one `Started`, then `Progress`
/// events with non-decreasing values, then exactly one `Finished`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TaskEvent {
    /// The job left `pending` and its work unit is about to run.
    Started { task_id: TaskId, job_id: Uuid },

    /// Progress in percent, 0 to 100.
    Progress {
        task_id: TaskId,
        job_id: Uuid,
        progress: u8,
    },

    /// Terminal outcome.
    Finished {
        task_id: TaskId,
        job_id: Uuid,
        status: JobStatus,
        error: Option<String>,
    },
}

impl TaskEvent {
    pub fn task_id(&self) -> TaskId {
        match self {
            TaskEvent::Started { task_id, .. }
            | TaskEvent::Progress { task_id, .. }
            | TaskEvent::Finished { task_id, .. } => *task_id,
        }
    }

    pub fn job_id(&self) -> Uuid {
        match self {
            TaskEvent::Started { job_id, .. }
            | TaskEvent::Progress { job_id, .. }
            | TaskEvent::Finished { job_id, .. } => *job_id,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskEvent::Finished { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_accessors() {
        let job_id = Uuid::new_v4();
        let event = TaskEvent::Progress {
            task_id: 3,
            job_id,
            progress: 40,
        };
        assert_eq!(event.task_id(), 3);
        assert_eq!(event.job_id(), job_id);
        assert!(!event.is_terminal());
    }

    #[test]
    fn test_event_serialization() {
        let event = TaskEvent::Finished {
            task_id: 1,
            job_id: Uuid::nil(),
            status: JobStatus::Stopped,
            error: None,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "finished");
        assert_eq!(json["status"], "stopped");
        assert_eq!(json["task_id"], 1);
    }
}
