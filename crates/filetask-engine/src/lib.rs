//! # filetask Engine
//!
//! Runtime side of filetask:
//!
//! - Event bus with per-task subscriptions and isolated handlers
//! - Execution queue enforcing at most one active job per task
//! - Cron scheduler arming one timer per enabled task
//! - Task orchestrator keeping the store and the scheduler in step
//! - Crash recovery for state left behind by a previous process

mod cron_expr;
pub mod error;
pub mod event;
pub mod event_bus;
pub mod job;
pub mod orchestrator;
pub mod queue;
pub mod recovery;
pub mod scheduler;
pub mod work_unit;

#[cfg(test)]
mod testing;

pub use cron_expr::{parse_cron, validate_cron};
pub use error::EngineError;
pub use event::TaskEvent;
pub use event_bus::{ChannelHandler, EventBus, EventHandler, SubscriptionId, handler_fn};
pub use job::{JobHandle, JobSnapshot};
pub use orchestrator::{TaskOrchestrator, TaskStatusReport};
pub use queue::ExecutionQueue;
pub use recovery::{INTERRUPTED, RecoveryReport, recover};
pub use scheduler::{CronScheduler, ScheduleTimezone, TaskTrigger};
pub use work_unit::{WorkContext, WorkOutcome, WorkUnit, WorkUnitFailure};
