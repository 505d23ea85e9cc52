use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use triage_core::{Decision, Order};
use uuid::Uuid;

/// Progress counters for one ingested batch.
///
/// Progress is measured in reviewer actions, so a re-queued order that is
/// reviewed again advances the counter again.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BatchSession {
    pub id: Uuid,
    pub total_orders: u64,
    pub processed_count: u64,
    pub started_at: DateTime<Utc>,
}

impl BatchSession {
    pub fn new(total: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            total_orders: total,
            processed_count: 0,
            started_at: Utc::now(),
        }
    }

    /// Resets the counters for a freshly ingested batch.
    pub fn start(&mut self, total: u64) {
        *self = Self::new(total);
    }

    /// One review action taken. Not clamped to `total_orders`.
    pub fn advance(&mut self) {
        self.processed_count += 1;
    }

    /// Signed on purpose: a negative value exposes a caller advancing too often.
    pub fn remaining(&self) -> i64 {
        self.total_orders as i64 - self.processed_count as i64
    }

    pub fn progress(&self) -> Progress {
        Progress {
            total: self.total_orders,
            processed: self.processed_count,
            remaining: self.remaining(),
        }
    }

    pub fn summary(orders: &[Order]) -> Summary {
        Summary::from_orders(orders)
    }
}

impl Default for BatchSession {
    fn default() -> Self {
        Self::new(0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Progress {
    pub total: u64,
    pub processed: u64,
    pub remaining: i64,
}

/// End-of-batch disposition counts.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Summary {
    pub accepted: u64,
    pub delayed: u64,
    pub rejected: u64,
}

impl Summary {
    /// Pure aggregate over a store snapshot.
    pub fn from_orders(orders: &[Order]) -> Self {
        orders.iter().fold(Summary::default(), |mut acc, order| {
            match order.decision {
                Some(Decision::Accepted) => acc.accepted += 1,
                Some(Decision::Delayed) => acc.delayed += 1,
                Some(Decision::Rejected) | Some(Decision::RejectedFinal) => acc.rejected += 1,
                None => {}
            }
            acc
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use triage_core::{OrderInput, OrderStatus};

    fn order(id: i64, status: OrderStatus, decision: Option<Decision>) -> Order {
        let input = OrderInput {
            order_id: format!("ORDER-1-{}", id),
            first_name: "Test".to_string(),
            ..Default::default()
        };
        let mut order = Order::from_input(id, input, Utc::now());
        order.status = status;
        order.decision = decision;
        order
    }

    #[test]
    fn test_session_lifecycle() {
        let mut session = BatchSession::new(3);
        assert_eq!(session.remaining(), 3);

        session.advance();
        session.advance();
        assert_eq!(session.processed_count, 2);
        assert_eq!(session.progress(), Progress { total: 3, processed: 2, remaining: 1 });

        let previous = session.id;
        session.start(5);
        assert_eq!(session.total_orders, 5);
        assert_eq!(session.processed_count, 0);
        assert_ne!(session.id, previous);
    }

    #[test]
    fn test_remaining_is_not_clamped() {
        let mut session = BatchSession::new(1);
        session.advance();
        session.advance();
        assert_eq!(session.remaining(), -1);
    }

    #[test]
    fn test_summary_counts_terminal_decisions() {
        let orders = vec![
            order(1, OrderStatus::Completed, Some(Decision::Accepted)),
            order(2, OrderStatus::Delayed, Some(Decision::Delayed)),
            order(3, OrderStatus::Rejected, Some(Decision::RejectedFinal)),
            order(4, OrderStatus::Rejected, Some(Decision::RejectedFinal)),
            order(5, OrderStatus::Pending, None),
        ];

        let summary = BatchSession::summary(&orders);
        assert_eq!(summary, Summary { accepted: 1, delayed: 1, rejected: 2 });
    }

    #[test]
    fn test_summary_counts_requeued_rejections() {
        let orders = vec![order(1, OrderStatus::Pending, Some(Decision::Rejected))];
        assert_eq!(Summary::from_orders(&orders).rejected, 1);
    }
}
