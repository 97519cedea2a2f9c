//! Test doubles shared by the API tests.

use std::sync::Arc;

use async_trait::async_trait;
use filetask_engine::{TaskOrchestrator, WorkContext, WorkOutcome, WorkUnit, WorkUnitFailure};
use filetask_store::{MemoryStore, NewTask, Task};
use filetask_worker::StrmChecker;

use crate::state::AppState;

/// Reports half progress, then runs until stopped.
struct UntilStopped;

#[async_trait]
impl WorkUnit for UntilStopped {
    async fn run(&self, _task: &Task, ctx: WorkContext) -> Result<WorkOutcome, WorkUnitFailure> {
        ctx.report_progress(50);
        ctx.cancellation_token().cancelled().await;
        Ok(WorkOutcome::with_message("stopped on request"))
    }
}

pub(crate) struct Harness {
    pub state: Arc<AppState>,
    pub store: Arc<MemoryStore>,
}

impl Harness {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let orchestrator = Arc::new(TaskOrchestrator::new(
            store.clone(),
            store.clone(),
            Arc::new(UntilStopped),
        ));
        let checker = Arc::new(StrmChecker::new(store.clone(), store.clone()));
        let state = Arc::new(AppState::new(
            orchestrator,
            store.clone(),
            store.clone(),
            checker,
        ));
        Self { state, store }
    }

    pub async fn task(&self, name: &str) -> Task {
        self.state
            .orchestrator
            .create(NewTask::new(name, "/mnt/in", "/srv/out"))
            .await
            .unwrap()
    }
}
