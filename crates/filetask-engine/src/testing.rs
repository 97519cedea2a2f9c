//! Test doubles shared by the engine's unit tests.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use filetask_store::{MemoryStore, NewTask, Task, TaskLogStore, TaskStore};
use tokio::sync::{Semaphore, mpsc};

use crate::event::TaskEvent;
use crate::event_bus::EventBus;
use crate::queue::ExecutionQueue;
use crate::work_unit::{WorkContext, WorkOutcome, WorkUnit, WorkUnitFailure};

struct FnWorkUnit<F>(F);

#[async_trait]
impl<F, Fut> WorkUnit for FnWorkUnit<F>
where
    F: Fn(WorkContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<WorkOutcome, WorkUnitFailure>> + Send,
{
    async fn run(&self, _task: &Task, ctx: WorkContext) -> Result<WorkOutcome, WorkUnitFailure> {
        (self.0)(ctx).await
    }
}

/// Work unit driven by a closure.
pub(crate) fn work_fn<F, Fut>(f: F) -> Arc<dyn WorkUnit>
where
    F: Fn(WorkContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<WorkOutcome, WorkUnitFailure>> + Send + 'static,
{
    Arc::new(FnWorkUnit(f))
}

/// Succeeds immediately.
pub(crate) fn instant_success() -> Arc<dyn WorkUnit> {
    work_fn(|_ctx| async { Ok(WorkOutcome::with_message("done")) })
}

/// Blocks each run until a permit is added to the returned semaphore.
/// Ignores cancellation.
pub(crate) fn gated() -> (Arc<dyn WorkUnit>, Arc<Semaphore>) {
    let gate = Arc::new(Semaphore::new(0));
    let held = gate.clone();
    let unit = work_fn(move |_ctx| {
        let gate = held.clone();
        async move {
            gate.acquire()
                .await
                .map_err(|_| WorkUnitFailure::new("gate closed"))?
                .forget();
            Ok(WorkOutcome::with_message("released"))
        }
    });
    (unit, gate)
}

/// Reports progress in steps until cancelled.
pub(crate) fn cooperative() -> Arc<dyn WorkUnit> {
    work_fn(|ctx| async move {
        let mut step = 0u8;
        while !ctx.is_cancelled() {
            step = step.saturating_add(1).min(99);
            ctx.report_progress(step);
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        Ok(WorkOutcome::with_message(format!("cancelled at {}", ctx.progress())))
    })
}

pub(crate) struct Harness {
    pub store: Arc<MemoryStore>,
    pub bus: Arc<EventBus>,
    pub queue: ExecutionQueue,
}

impl Harness {
    pub(crate) fn new(work_unit: Arc<dyn WorkUnit>) -> Self {
        let store = Arc::new(MemoryStore::new());
        let bus = Arc::new(EventBus::new());
        let queue = ExecutionQueue::new(
            store.clone() as Arc<dyn TaskStore>,
            store.clone() as Arc<dyn TaskLogStore>,
            work_unit,
            bus.clone(),
        );
        Self { store, bus, queue }
    }

    pub(crate) async fn task(&self, name: &str) -> Task {
        TaskStore::create(self.store.as_ref(), NewTask::new(name, "/src", "/dst"))
            .await
            .unwrap()
    }

    pub(crate) async fn reload(&self, task: &Task) -> Task {
        TaskStore::find(self.store.as_ref(), task.id)
            .await
            .unwrap()
            .unwrap()
    }
}

/// Receive events until the terminal one, failing after two seconds.
pub(crate) async fn collect_until_finished(
    rx: &mut mpsc::UnboundedReceiver<TaskEvent>,
) -> Vec<TaskEvent> {
    let mut events = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for events")
            .expect("event channel closed");
        let terminal = event.is_terminal();
        events.push(event);
        if terminal {
            return events;
        }
    }
}
