use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashSet};
use tokio::sync::RwLock;
use tracing::{debug, info};
use triage_core::{CoreError, CoreResult, Order, OrderInput, OrderStore, Transition};

/// Process-local order store. Backs tests and `store.backend = "memory"`.
pub struct MemoryOrderStore {
    inner: RwLock<Inner>,
}

struct Inner {
    next_id: i64,
    orders: BTreeMap<i64, Order>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                next_id: 1,
                orders: BTreeMap::new(),
            }),
        }
    }
}

impl Default for MemoryOrderStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn insert_batch(&self, records: &[OrderInput]) -> CoreResult<u64> {
        if records.is_empty() {
            return Err(CoreError::ValidationError("batch contains no records".to_string()));
        }

        let mut inner = self.inner.write().await;

        let mut labels: HashSet<&str> = inner.orders.values().map(|o| o.order_id.as_str()).collect();
        for record in records {
            record.validate()?;
            if !labels.insert(record.order_id.as_str()) {
                return Err(CoreError::ValidationError(format!(
                    "duplicate order label: {}",
                    record.order_id
                )));
            }
        }
        drop(labels);

        let now = Utc::now();
        for record in records {
            let id = inner.next_id;
            inner.next_id += 1;
            inner.orders.insert(id, Order::from_input(id, record.clone(), now));
        }

        info!("Inserted {} orders", records.len());
        Ok(records.len() as u64)
    }

    async fn next_pending(&self) -> CoreResult<Option<Order>> {
        let inner = self.inner.read().await;
        Ok(inner.orders.values().find(|o| o.is_pending()).cloned())
    }

    async fn get_order(&self, id: i64) -> CoreResult<Option<Order>> {
        let inner = self.inner.read().await;
        Ok(inner.orders.get(&id).cloned())
    }

    async fn apply_decision(&self, id: i64, transition: &Transition) -> CoreResult<Order> {
        transition.validate(id)?;

        // Write lock held across check and write
        let mut inner = self.inner.write().await;
        let order = inner.orders.get_mut(&id).ok_or(CoreError::NotFoundError(id))?;

        if !order.is_pending() || order.rejection_count != transition.prior_rejection_count() {
            return Err(CoreError::invariant(
                id,
                transition.decision().as_str(),
                format!(
                    "order changed since it was read (status {}, rejection count {})",
                    order.status, order.rejection_count
                ),
            ));
        }

        transition.apply_to(order);
        debug!(order_id = id, status = %order.status, "Decision persisted");
        Ok(order.clone())
    }

    async fn all_orders(&self) -> CoreResult<Vec<Order>> {
        let inner = self.inner.read().await;
        Ok(inner.orders.values().cloned().collect())
    }
}
