use axum::{
    extract::{rejection::JsonRejection, State},
    http::header,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;
use triage_core::{ingest, Order};
use triage_order::{DecisionPayload, Progress, ReviewAction, ReviewOutcome};
use triage_shared::models::events::{to_payload, BatchIngestedEvent};
use uuid::Uuid;

use crate::error::AppError;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Sheet rows as produced by the spreadsheet reader, one JSON object per row.
#[derive(Debug, Deserialize)]
pub struct UploadRequest {
    pub rows: Vec<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub success: bool,
    pub total: u64,
    pub batch_id: Uuid,
    pub current_order: Option<Order>,
}

#[derive(Debug, Serialize)]
pub struct NextOrderResponse {
    pub order: Option<Order>,
}

#[derive(Debug, Deserialize)]
pub struct ProcessOrderRequest {
    #[serde(alias = "orderId")]
    pub order_id: i64,
    pub decision: ReviewAction,
    #[serde(default, alias = "delayDate")]
    pub delay_date: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ProcessOrderResponse {
    pub success: bool,
    pub outcome: ReviewOutcome,
    pub order: Order,
    pub progress: Progress,
}

impl ProcessOrderRequest {
    fn payload(&self) -> Result<DecisionPayload, AppError> {
        let delay_date = match self.delay_date.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(raw) => Some(NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
                AppError::ValidationError(format!(
                    "order {} ({}): invalid delay date '{}', expected YYYY-MM-DD",
                    self.order_id, self.decision, raw
                ))
            })?),
        };

        Ok(DecisionPayload {
            notes: self.notes.clone(),
            delay_date,
        })
    }
}

// ============================================================================
// Handlers
// ============================================================================

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/upload", post(upload))
        .route("/next-order", get(next_order))
        .route("/process-order", post(process_order))
        .route("/download-final", get(download_final))
}

/// POST /upload
/// Ingest a sheet and start a new review session
async fn upload(
    State(state): State<AppState>,
    body: Result<Json<UploadRequest>, JsonRejection>,
) -> Result<Json<UploadResponse>, AppError> {
    let Json(req) = body?;
    let batch_millis = chrono::Utc::now().timestamp_millis();
    let records = ingest::build_batch(&req.rows, batch_millis)?;

    let total = state.store().insert_batch(&records).await?;

    let batch_id = {
        let mut session = state.session.lock().await;
        session.start(total);
        session.id
    };

    let event = BatchIngestedEvent::new(batch_id, total);
    info!(topic = BatchIngestedEvent::TOPIC, payload = %to_payload(&event), "Batch ingested");

    let current_order = state.controller.next_pending().await?;

    Ok(Json(UploadResponse {
        success: true,
        total,
        batch_id,
        current_order,
    }))
}

/// GET /next-order
async fn next_order(State(state): State<AppState>) -> Result<Json<NextOrderResponse>, AppError> {
    let order = state.controller.next_pending().await?;
    Ok(Json(NextOrderResponse { order }))
}

/// POST /process-order
/// Record the reviewer's decision for one order
async fn process_order(
    State(state): State<AppState>,
    body: Result<Json<ProcessOrderRequest>, JsonRejection>,
) -> Result<Json<ProcessOrderResponse>, AppError> {
    let Json(req) = body?;
    let payload = req.payload()?;

    // The session lock covers the counters only, never the store round trip
    let batch_id = state.session.lock().await.id;
    let result = state
        .controller
        .review(Some(batch_id), req.order_id, req.decision, &payload)
        .await?;

    let progress = {
        let mut session = state.session.lock().await;
        session.advance();
        session.progress()
    };

    Ok(Json(ProcessOrderResponse {
        success: true,
        outcome: result.outcome,
        order: result.order,
        progress,
    }))
}

/// GET /download-final
/// Every order with its final disposition
async fn download_final(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let orders = state.store().all_orders().await?;
    info!("Exporting {} orders", orders.len());

    Ok((
        [(header::CONTENT_DISPOSITION, "attachment; filename=\"final_orders.json\"")],
        Json(orders),
    ))
}
