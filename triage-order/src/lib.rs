pub mod models;
pub mod controller;
pub mod session;

pub use models::{DecisionPayload, ReviewAction, ReviewOutcome, ReviewResult};
pub use controller::{decide, ReviewController};
pub use session::{BatchSession, Progress, Summary};
