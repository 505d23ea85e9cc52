use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use tracing::{debug, info};
use triage_core::{
    CoreError, CoreResult, Decision, Order, OrderInput, OrderStatus, OrderStore, Transition,
};
use triage_shared::Masked;

const ORDER_COLUMNS: &str = "id, order_id, first_name, last_name, phone, state, municipality, \
     status, decision, delay_date, notes, rejection_count, created_at";

pub struct PgOrderStore {
    pool: PgPool,
}

impl PgOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: i64,
    order_id: String,
    first_name: String,
    last_name: String,
    phone: String,
    state: String,
    municipality: String,
    status: String,
    decision: Option<String>,
    delay_date: Option<NaiveDate>,
    notes: Option<String>,
    rejection_count: i32,
    created_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
    type Error = CoreError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        let id = row.id;
        let corrupt = |e: CoreError| CoreError::StoreIntegrityError(format!("order {}: {}", id, e));

        Ok(Order {
            id: row.id,
            order_id: row.order_id,
            first_name: row.first_name,
            last_name: row.last_name,
            phone: Masked::new(row.phone),
            state: row.state,
            municipality: row.municipality,
            status: row.status.parse::<OrderStatus>().map_err(corrupt)?,
            decision: row
                .decision
                .as_deref()
                .map(str::parse::<Decision>)
                .transpose()
                .map_err(corrupt)?,
            delay_date: row.delay_date,
            notes: row.notes,
            rejection_count: row.rejection_count,
            created_at: row.created_at,
        })
    }
}

/// Unique-label clashes are caller bugs. Schema refusals and rows that do not
/// decode are integrity errors; only connection-level failures are transient.
fn store_error(e: sqlx::Error) -> CoreError {
    match &e {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            CoreError::ValidationError(format!("duplicate order label: {}", db.message()))
        }
        sqlx::Error::Database(db) if db.is_check_violation() => {
            CoreError::StoreIntegrityError(db.message().to_string())
        }
        sqlx::Error::RowNotFound
        | sqlx::Error::TypeNotFound { .. }
        | sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::Decode(_) => CoreError::StoreIntegrityError(e.to_string()),
        _ => CoreError::TransientStoreError(e.to_string()),
    }
}

/// A CHECK refusal on a decision write means the transition broke the
/// status/decision domain or the rejection bound.
fn decision_error(id: i64, transition: &Transition, e: sqlx::Error) -> CoreError {
    if let sqlx::Error::Database(db) = &e {
        if db.is_check_violation() {
            return CoreError::invariant(
                id,
                transition.decision().as_str(),
                format!("rejected by {}", db.constraint().unwrap_or("a check constraint")),
            );
        }
    }
    store_error(e)
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn insert_batch(&self, records: &[OrderInput]) -> CoreResult<u64> {
        if records.is_empty() {
            return Err(CoreError::ValidationError("batch contains no records".to_string()));
        }
        for record in records {
            record.validate()?;
        }

        let mut tx = self.pool.begin().await.map_err(store_error)?;

        for record in records {
            sqlx::query(
                r#"
                INSERT INTO orders (order_id, first_name, last_name, phone, state, municipality)
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(&record.order_id)
            .bind(&record.first_name)
            .bind(&record.last_name)
            .bind(record.phone.expose())
            .bind(&record.state)
            .bind(&record.municipality)
            .execute(&mut *tx)
            .await
            .map_err(store_error)?;
        }

        tx.commit().await.map_err(store_error)?;

        info!("Inserted {} orders", records.len());
        Ok(records.len() as u64)
    }

    async fn next_pending(&self) -> CoreResult<Option<Order>> {
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            "SELECT {} FROM orders WHERE status = 'pending' ORDER BY id LIMIT 1",
            ORDER_COLUMNS
        ))
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        row.map(Order::try_from).transpose()
    }

    async fn get_order(&self, id: i64) -> CoreResult<Option<Order>> {
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            "SELECT {} FROM orders WHERE id = $1",
            ORDER_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(store_error)?;

        row.map(Order::try_from).transpose()
    }

    async fn apply_decision(&self, id: i64, transition: &Transition) -> CoreResult<Order> {
        transition.validate(id)?;

        let mut tx = self.pool.begin().await.map_err(store_error)?;

        // Row lock serializes concurrent writers to the same order
        let current: Option<(String, i32)> =
            sqlx::query_as("SELECT status, rejection_count FROM orders WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(store_error)?;

        let (status, rejection_count) = current.ok_or(CoreError::NotFoundError(id))?;
        if status != "pending" || rejection_count != transition.prior_rejection_count() {
            // Dropping the transaction rolls it back
            return Err(CoreError::invariant(
                id,
                transition.decision().as_str(),
                format!(
                    "order changed since it was read (status {}, rejection count {})",
                    status, rejection_count
                ),
            ));
        }

        let row: OrderRow = sqlx::query_as(&format!(
            r#"
            UPDATE orders
            SET status = $2, decision = $3, rejection_count = $4, notes = $5,
                delay_date = COALESCE($6, delay_date)
            WHERE id = $1
            RETURNING {}
            "#,
            ORDER_COLUMNS
        ))
        .bind(id)
        .bind(transition.status().as_str())
        .bind(transition.decision().as_str())
        .bind(transition.rejection_count())
        .bind(transition.notes())
        .bind(transition.delay_date())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| decision_error(id, transition, e))?;

        tx.commit().await.map_err(store_error)?;

        debug!(order_id = id, status = %transition.status(), "Decision persisted");
        Order::try_from(row)
    }

    async fn all_orders(&self) -> CoreResult<Vec<Order>> {
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            "SELECT {} FROM orders ORDER BY id",
            ORDER_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(store_error)?;

        rows.into_iter().map(Order::try_from).collect()
    }
}
