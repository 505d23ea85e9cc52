use std::sync::Arc;
use tokio::sync::Mutex;
use triage_core::OrderStore;
use triage_order::{BatchSession, ReviewController};

#[derive(Clone)]
pub struct AppState {
    pub controller: ReviewController,
    /// Counters for the batch currently under review. Locked only to read or
    /// bump them, never across a store call.
    pub session: Arc<Mutex<BatchSession>>,
}

impl AppState {
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self::with_controller(ReviewController::new(store))
    }

    pub fn with_controller(controller: ReviewController) -> Self {
        Self {
            controller,
            session: Arc::new(Mutex::new(BatchSession::default())),
        }
    }

    pub fn store(&self) -> &Arc<dyn OrderStore> {
        self.controller.store()
    }
}
