use async_trait::async_trait;

use crate::order::{Order, OrderInput};
use crate::transition::Transition;
use crate::CoreResult;

/// Durable record of every order in the batch; the single source of truth
/// for review state.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persists one `pending` order per record and returns how many were written.
    /// The whole batch is rejected if any record fails validation.
    async fn insert_batch(&self, records: &[OrderInput]) -> CoreResult<u64>;

    /// Lowest-id order still awaiting review.
    async fn next_pending(&self) -> CoreResult<Option<Order>>;

    async fn get_order(&self, id: i64) -> CoreResult<Option<Order>>;

    /// Writes every field of `transition` in one step or nothing at all.
    ///
    /// The write only lands while the row is still `pending` and still holds
    /// the rejection count the transition was computed from, so a replayed
    /// reject can never double-increment.
    async fn apply_decision(&self, id: i64, transition: &Transition) -> CoreResult<Order>;

    /// Full dump in id order, for export.
    async fn all_orders(&self) -> CoreResult<Vec<Order>>;
}
