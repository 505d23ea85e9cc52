use crate::models::{DecisionPayload, ReviewAction, ReviewOutcome, ReviewResult};
use crate::session::BatchSession;
use chrono::{NaiveDate, Utc};
use std::sync::Arc;
use tracing::{info, warn};
use triage_core::{
    CoreError, CoreResult, Decision, Order, OrderStatus, OrderStore, TerminalState, Transition,
    MAX_REJECTIONS,
};
use triage_shared::models::events::{to_payload, OrderReviewedEvent};
use uuid::Uuid;

/// Review state machine.
///
/// `pending` is the only state that accepts actions. Accept and delay are
/// one-shot; reject loops back to `pending` until the counter reaches the cap.
pub fn decide(
    order: &Order,
    action: ReviewAction,
    payload: &DecisionPayload,
    today: NaiveDate,
) -> CoreResult<ReviewOutcome> {
    if order.status != OrderStatus::Pending {
        return replay(order, action);
    }

    let notes = payload.normalized_notes();

    let transition = match action {
        ReviewAction::Accept => Transition::Terminal(TerminalState {
            status: OrderStatus::Completed,
            decision: Decision::Accepted,
            delay_date: None,
            notes,
            rejection_count: order.rejection_count,
        }),
        ReviewAction::Delay => {
            let date = payload.delay_date.ok_or_else(|| {
                CoreError::ValidationError(format!("order {} ({}): a delay date is required", order.id, action))
            })?;
            if date < today {
                return Err(CoreError::ValidationError(format!(
                    "order {} ({}): delay date {} is in the past",
                    order.id, action, date
                )));
            }
            Transition::Terminal(TerminalState {
                status: OrderStatus::Delayed,
                decision: Decision::Delayed,
                delay_date: Some(date),
                notes,
                rejection_count: order.rejection_count,
            })
        }
        ReviewAction::Reject => {
            let rejection_count = order.rejection_count + 1;
            if rejection_count >= MAX_REJECTIONS {
                Transition::Terminal(TerminalState {
                    status: OrderStatus::Rejected,
                    decision: Decision::RejectedFinal,
                    delay_date: None,
                    notes,
                    rejection_count,
                })
            } else {
                Transition::Requeued { rejection_count, notes }
            }
        }
    };

    transition.validate(order.id)?;
    Ok(ReviewOutcome::Applied(transition))
}

/// Terminal orders only tolerate a replay of the action that closed them.
fn replay(order: &Order, action: ReviewAction) -> CoreResult<ReviewOutcome> {
    match (action, order.status) {
        (ReviewAction::Accept, OrderStatus::Completed) | (ReviewAction::Delay, OrderStatus::Delayed) => {
            Ok(ReviewOutcome::Unchanged)
        }
        _ => Err(CoreError::invariant(
            order.id,
            action.as_str(),
            format!("order is already {}", order.status),
        )),
    }
}

fn utc_today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Drives reviews against an [`OrderStore`].
#[derive(Clone)]
pub struct ReviewController {
    store: Arc<dyn OrderStore>,
    today: fn() -> NaiveDate,
}

impl ReviewController {
    pub fn new(store: Arc<dyn OrderStore>) -> Self {
        Self {
            store,
            today: utc_today,
        }
    }

    /// Uses `today` instead of the UTC calendar date for delay validation.
    pub fn with_clock(store: Arc<dyn OrderStore>, today: fn() -> NaiveDate) -> Self {
        Self { store, today }
    }

    pub fn store(&self) -> &Arc<dyn OrderStore> {
        &self.store
    }

    pub async fn next_pending(&self) -> CoreResult<Option<Order>> {
        self.store.next_pending().await
    }

    /// Applies one reviewer action for the batch `batch_id`.
    ///
    /// On error nothing is written, so the caller can keep presenting the
    /// same order. The batch session is not touched here: callers advance it
    /// once this returns `Ok`, without holding it across store I/O.
    pub async fn review(
        &self,
        batch_id: Option<Uuid>,
        order_id: i64,
        action: ReviewAction,
        payload: &DecisionPayload,
    ) -> CoreResult<ReviewResult> {
        let order = self
            .store
            .get_order(order_id)
            .await?
            .ok_or(CoreError::NotFoundError(order_id))?;

        let outcome = match decide(&order, action, payload, (self.today)()) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(order_id, action = %action, "Review action refused: {}", e);
                return Err(e);
            }
        };

        let order = match &outcome {
            ReviewOutcome::Applied(transition) => self.store.apply_decision(order_id, transition).await?,
            ReviewOutcome::Unchanged => {
                info!(order_id, action = %action, "Replayed terminal action, order left as is");
                order
            }
        };

        let event = OrderReviewedEvent {
            batch_id,
            order_id: order.id,
            order_label: order.order_id.clone(),
            action: action.to_string(),
            status: order.status.to_string(),
            decision: order.decision.map(|d| d.to_string()),
            rejection_count: order.rejection_count,
            requeued: outcome.is_requeue(),
            timestamp: Utc::now().timestamp_millis(),
        };
        info!(topic = OrderReviewedEvent::TOPIC, payload = %to_payload(&event), "Order reviewed");

        Ok(ReviewResult { order, outcome })
    }

    /// Disposition counts over the current store contents.
    pub async fn summary(&self) -> CoreResult<crate::session::Summary> {
        let orders = self.store.all_orders().await?;
        Ok(BatchSession::summary(&orders))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use triage_core::OrderInput;
    use triage_store::MemoryOrderStore;

    fn fixed_today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2030, 6, 1).unwrap()
    }

    fn input(i: usize) -> OrderInput {
        OrderInput {
            order_id: format!("ORDER-1-{}", i),
            first_name: format!("Customer {}", i),
            ..Default::default()
        }
    }

    /// Mirrors the request handler: advance only once the review stuck.
    async fn review(
        controller: &ReviewController,
        session: &mut BatchSession,
        order_id: i64,
        action: ReviewAction,
        payload: &DecisionPayload,
    ) -> CoreResult<ReviewResult> {
        let result = controller.review(Some(session.id), order_id, action, payload).await?;
        session.advance();
        Ok(result)
    }

    async fn setup(count: usize) -> (ReviewController, BatchSession) {
        let store = Arc::new(MemoryOrderStore::new());
        let records: Vec<OrderInput> = (0..count).map(input).collect();
        let total = store.insert_batch(&records).await.unwrap();
        let controller = ReviewController::with_clock(store, fixed_today);
        (controller, BatchSession::new(total))
    }

    #[tokio::test]
    async fn test_rejection_cap_requeues_then_closes() {
        let (controller, mut session) = setup(3).await;
        let first = controller.next_pending().await.unwrap().unwrap();

        for expected in 1..MAX_REJECTIONS {
            let result = review(&controller, &mut session, first.id, ReviewAction::Reject, &DecisionPayload::default())
                .await
                .unwrap();
            assert!(result.outcome.is_requeue());
            assert_eq!(result.order.status, OrderStatus::Pending);
            assert_eq!(result.order.decision, Some(Decision::Rejected));
            assert_eq!(result.order.rejection_count, expected);

            // Re-queued order comes straight back
            let next = controller.next_pending().await.unwrap().unwrap();
            assert_eq!(next.id, first.id);
        }

        let result = review(&controller, &mut session, first.id, ReviewAction::Reject, &DecisionPayload::default())
            .await
            .unwrap();
        assert_eq!(result.order.status, OrderStatus::Rejected);
        assert_eq!(result.order.decision, Some(Decision::RejectedFinal));
        assert_eq!(result.order.rejection_count, 3);

        let next = controller.next_pending().await.unwrap().unwrap();
        assert_ne!(next.id, first.id);
        assert_eq!(next.order_id, "ORDER-1-1");
        assert_eq!(session.processed_count, 3);
    }

    #[tokio::test]
    async fn test_reject_after_final_is_refused() {
        let (controller, mut session) = setup(1).await;
        let order = controller.next_pending().await.unwrap().unwrap();
        for _ in 0..MAX_REJECTIONS {
            review(&controller, &mut session, order.id, ReviewAction::Reject, &DecisionPayload::default())
                .await
                .unwrap();
        }

        let err = review(&controller, &mut session, order.id, ReviewAction::Reject, &DecisionPayload::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::InvariantViolation { .. }));

        let stored = controller.store().get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.rejection_count, 3);
        assert_eq!(session.processed_count, 3);
        assert!(controller.next_pending().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delay_requires_present_or_future_date() {
        let (controller, mut session) = setup(1).await;
        let order = controller.next_pending().await.unwrap().unwrap();

        let past = DecisionPayload::delay_until(NaiveDate::from_ymd_opt(2000, 1, 1).unwrap());
        let err = review(&controller, &mut session, order.id, ReviewAction::Delay, &past)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::ValidationError(_)));

        let missing = review(&controller, &mut session, order.id, ReviewAction::Delay, &DecisionPayload::with_notes("call back"))
            .await;
        assert!(missing.is_err());

        let untouched = controller.store().get_order(order.id).await.unwrap().unwrap();
        assert_eq!(untouched, order);
        assert_eq!(session.processed_count, 0);

        let date = NaiveDate::from_ymd_opt(2099, 1, 1).unwrap();
        let result = review(&controller, &mut session, order.id, ReviewAction::Delay, &DecisionPayload::delay_until(date))
            .await
            .unwrap();
        assert_eq!(result.order.status, OrderStatus::Delayed);
        assert_eq!(result.order.decision, Some(Decision::Delayed));
        assert_eq!(result.order.delay_date, Some(date));
        assert_eq!(session.processed_count, 1);
    }

    #[tokio::test]
    async fn test_delay_to_today_is_allowed() {
        let (controller, mut session) = setup(1).await;
        let order = controller.next_pending().await.unwrap().unwrap();
        let result = review(&controller, &mut session, order.id, ReviewAction::Delay, &DecisionPayload::delay_until(fixed_today()))
            .await
            .unwrap();
        assert_eq!(result.order.delay_date, Some(fixed_today()));
    }

    #[tokio::test]
    async fn test_accept_replay_is_a_no_op() {
        let (controller, mut session) = setup(1).await;
        let order = controller.next_pending().await.unwrap().unwrap();

        let first = review(&controller, &mut session, order.id, ReviewAction::Accept, &DecisionPayload::with_notes("ok"))
            .await
            .unwrap();
        assert_eq!(first.order.status, OrderStatus::Completed);
        assert_eq!(first.order.notes.as_deref(), Some("ok"));

        let replay = review(&controller, &mut session, order.id, ReviewAction::Accept, &DecisionPayload::with_notes("changed"))
            .await
            .unwrap();
        assert_eq!(replay.outcome, ReviewOutcome::Unchanged);
        assert_eq!(replay.order.decision, Some(Decision::Accepted));
        assert_eq!(replay.order.notes.as_deref(), Some("ok"));
        assert_eq!(session.processed_count, 2);
    }

    #[tokio::test]
    async fn test_terminal_order_refuses_other_actions() {
        let (controller, mut session) = setup(1).await;
        let order = controller.next_pending().await.unwrap().unwrap();
        review(&controller, &mut session, order.id, ReviewAction::Accept, &DecisionPayload::default())
            .await
            .unwrap();

        let delay = DecisionPayload::delay_until(NaiveDate::from_ymd_opt(2099, 1, 1).unwrap());
        assert!(review(&controller, &mut session, order.id, ReviewAction::Delay, &delay).await.is_err());
        assert!(review(&controller, &mut session, order.id, ReviewAction::Reject, &DecisionPayload::default())
            .await
            .is_err());

        let stored = controller.store().get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Completed);
        assert_eq!(stored.rejection_count, 0);
    }

    #[tokio::test]
    async fn test_unknown_order() {
        let (controller, mut session) = setup(1).await;
        let err = review(&controller, &mut session, 999, ReviewAction::Accept, &DecisionPayload::default())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFoundError(999)));
    }

    #[tokio::test]
    async fn test_full_pass_and_summary() {
        let (controller, mut session) = setup(4).await;
        let date = NaiveDate::from_ymd_opt(2099, 1, 1).unwrap();

        let mut actions = vec![
            (ReviewAction::Accept, DecisionPayload::default()),
            (ReviewAction::Delay, DecisionPayload::delay_until(date)),
        ];
        for _ in 0..(2 * MAX_REJECTIONS) {
            actions.push((ReviewAction::Reject, DecisionPayload::default()));
        }

        let mut steps = 0;
        for (action, payload) in actions {
            let order = controller.next_pending().await.unwrap().unwrap();
            review(&controller, &mut session, order.id, action, &payload).await.unwrap();
            steps += 1;
            assert_eq!(session.processed_count, steps);
        }

        assert!(controller.next_pending().await.unwrap().is_none());
        let summary = controller.summary().await.unwrap();
        assert_eq!((summary.accepted, summary.delayed, summary.rejected), (1, 1, 2));
    }

    /// Store whose writes always fail, to check that a failed action leaves
    /// both the order and the session untouched.
    struct UnavailableStore(MemoryOrderStore);

    #[async_trait]
    impl OrderStore for UnavailableStore {
        async fn insert_batch(&self, records: &[OrderInput]) -> CoreResult<u64> {
            self.0.insert_batch(records).await
        }

        async fn next_pending(&self) -> CoreResult<Option<Order>> {
            self.0.next_pending().await
        }

        async fn get_order(&self, id: i64) -> CoreResult<Option<Order>> {
            self.0.get_order(id).await
        }

        async fn apply_decision(&self, _id: i64, _transition: &Transition) -> CoreResult<Order> {
            Err(CoreError::TransientStoreError("connection reset".to_string()))
        }

        async fn all_orders(&self) -> CoreResult<Vec<Order>> {
            self.0.all_orders().await
        }
    }

    #[tokio::test]
    async fn test_store_failure_leaves_state_untouched() {
        let store = Arc::new(UnavailableStore(MemoryOrderStore::new()));
        store.insert_batch(&[input(0)]).await.unwrap();
        let controller = ReviewController::with_clock(store, fixed_today);
        let mut session = BatchSession::new(1);

        let order = controller.next_pending().await.unwrap().unwrap();
        let err = review(&controller, &mut session, order.id, ReviewAction::Reject, &DecisionPayload::default())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(session.processed_count, 0);

        let again = controller.next_pending().await.unwrap().unwrap();
        assert_eq!(again, order);
    }

    #[test]
    fn test_validation_errors_name_order_and_action() {
        let order = Order::from_input(5, input(0), Utc::now());

        let missing = decide(&order, ReviewAction::Delay, &DecisionPayload::default(), fixed_today()).unwrap_err();
        assert_eq!(
            missing.to_string(),
            "Validation failed: order 5 (delay): a delay date is required"
        );

        let past = DecisionPayload::delay_until(NaiveDate::from_ymd_opt(2000, 1, 1).unwrap());
        let err = decide(&order, ReviewAction::Delay, &past, fixed_today()).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Validation failed: order 5 (delay): delay date 2000-01-01 is in the past"
        );
    }

    #[test]
    fn test_decide_is_pure() {
        let order = Order::from_input(1, input(0), Utc::now());
        let outcome = decide(&order, ReviewAction::Reject, &DecisionPayload::with_notes("  "), fixed_today()).unwrap();
        assert_eq!(
            outcome,
            ReviewOutcome::Applied(Transition::Requeued { rejection_count: 1, notes: None })
        );
        assert!(order.is_pending());
        assert_eq!(order.rejection_count, 0);
    }
}
