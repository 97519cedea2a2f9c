//! Shared handler state.

use std::sync::Arc;

use filetask_engine::TaskOrchestrator;
use filetask_store::{FileHistoryStore, InvalidStrmStore};
use filetask_worker::StrmChecker;

/// Everything the routes reach into. Task and log access goes through the
/// orchestrator; history and invalid-file records are read from the store.
pub struct AppState {
    pub orchestrator: Arc<TaskOrchestrator>,
    pub history: Arc<dyn FileHistoryStore>,
    pub invalid: Arc<dyn InvalidStrmStore>,
    pub checker: Arc<StrmChecker>,
}

impl AppState {
    pub fn new(
        orchestrator: Arc<TaskOrchestrator>,
        history: Arc<dyn FileHistoryStore>,
        invalid: Arc<dyn InvalidStrmStore>,
        checker: Arc<StrmChecker>,
    ) -> Self {
        Self {
            orchestrator,
            history,
            invalid,
            checker,
        }
    }
}
