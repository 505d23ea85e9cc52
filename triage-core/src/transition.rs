use chrono::NaiveDate;
use serde::Serialize;

use crate::order::{Decision, Order, OrderStatus, MAX_REJECTIONS};
use crate::{CoreError, CoreResult};

/// Fields written when an order leaves `pending` for good.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TerminalState {
    pub status: OrderStatus,
    pub decision: Decision,
    pub delay_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub rejection_count: i32,
}

/// Result of a review decision, applied by the store as one atomic write.
///
/// `Requeued` is the only self-loop in the review machine: the order goes back
/// to `pending` carrying its incremented rejection counter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Transition {
    Terminal(TerminalState),
    Requeued {
        rejection_count: i32,
        notes: Option<String>,
    },
}

impl Transition {
    pub fn status(&self) -> OrderStatus {
        match self {
            Transition::Terminal(t) => t.status,
            Transition::Requeued { .. } => OrderStatus::Pending,
        }
    }

    pub fn decision(&self) -> Decision {
        match self {
            Transition::Terminal(t) => t.decision,
            Transition::Requeued { .. } => Decision::Rejected,
        }
    }

    pub fn rejection_count(&self) -> i32 {
        match self {
            Transition::Terminal(t) => t.rejection_count,
            Transition::Requeued { rejection_count, .. } => *rejection_count,
        }
    }

    pub fn delay_date(&self) -> Option<NaiveDate> {
        match self {
            Transition::Terminal(t) => t.delay_date,
            Transition::Requeued { .. } => None,
        }
    }

    pub fn notes(&self) -> Option<&str> {
        match self {
            Transition::Terminal(t) => t.notes.as_deref(),
            Transition::Requeued { notes, .. } => notes.as_deref(),
        }
    }

    pub fn is_requeue(&self) -> bool {
        matches!(self, Transition::Requeued { .. })
    }

    /// Rejection count the row must still hold for this write to land.
    /// Reject transitions were computed from `count - 1`.
    pub fn prior_rejection_count(&self) -> i32 {
        match self.decision() {
            Decision::Rejected | Decision::RejectedFinal => self.rejection_count() - 1,
            Decision::Accepted | Decision::Delayed => self.rejection_count(),
        }
    }

    /// Checks the status/decision domain and the rejection bound before any
    /// write reaches storage.
    pub fn validate(&self, order_id: i64) -> CoreResult<()> {
        let attempted = self.decision().as_str();
        let count = self.rejection_count();

        if !(0..=MAX_REJECTIONS).contains(&count) {
            return Err(CoreError::invariant(
                order_id,
                attempted,
                format!("rejection count {} outside 0..={}", count, MAX_REJECTIONS),
            ));
        }

        match self {
            Transition::Requeued { rejection_count, .. } => {
                if *rejection_count < 1 || *rejection_count >= MAX_REJECTIONS {
                    return Err(CoreError::invariant(
                        order_id,
                        attempted,
                        format!("cannot re-queue with rejection count {}", rejection_count),
                    ));
                }
            }
            Transition::Terminal(t) => {
                let consistent = match (t.status, t.decision) {
                    (OrderStatus::Completed, Decision::Accepted) => true,
                    (OrderStatus::Delayed, Decision::Delayed) => t.delay_date.is_some(),
                    (OrderStatus::Rejected, Decision::RejectedFinal) => t.rejection_count == MAX_REJECTIONS,
                    _ => false,
                };
                if !consistent {
                    return Err(CoreError::invariant(
                        order_id,
                        attempted,
                        format!("status {} cannot carry decision {}", t.status, t.decision),
                    ));
                }
                if t.decision != Decision::RejectedFinal && t.rejection_count == MAX_REJECTIONS {
                    return Err(CoreError::invariant(
                        order_id,
                        attempted,
                        "an order at the rejection cap must be rejected_final",
                    ));
                }
            }
        }

        Ok(())
    }

    /// Applies the transition to an in-memory copy of the order.
    pub fn apply_to(&self, order: &mut Order) {
        order.status = self.status();
        order.decision = Some(self.decision());
        order.rejection_count = self.rejection_count();
        order.notes = self.notes().map(str::to_string);
        if let Some(date) = self.delay_date() {
            order.delay_date = Some(date);
        }
    }
}
