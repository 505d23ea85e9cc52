pub mod order;
pub mod transition;
pub mod repository;
pub mod ingest;

pub use order::{Decision, Order, OrderInput, OrderStatus, MAX_REJECTIONS};
pub use repository::OrderStore;
pub use transition::{TerminalState, Transition};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Order not found: {0}")]
    NotFoundError(i64),
    #[error("Invariant violation on order {order_id} ({attempted}): {reason}")]
    InvariantViolation {
        order_id: i64,
        attempted: String,
        reason: String,
    },
    #[error("Order store unavailable: {0}")]
    TransientStoreError(String),
    /// Stored data the service cannot read back or a write the schema refused
    /// for reasons other than a caller mistake. Never retried.
    #[error("Order store integrity error: {0}")]
    StoreIntegrityError(String),
}

impl CoreError {
    pub fn invariant(order_id: i64, attempted: impl Into<String>, reason: impl Into<String>) -> Self {
        CoreError::InvariantViolation {
            order_id,
            attempted: attempted.into(),
            reason: reason.into(),
        }
    }

    /// Only store outages may be retried with the same payload.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CoreError::TransientStoreError(_))
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
