use axum::{extract::State, routing::get, Json, Router};
use triage_order::{Progress, Summary};

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/get-summary", get(get_summary))
        .route("/progress", get(get_progress))
}

/// GET /get-summary
/// Disposition counts once the queue has been drained
async fn get_summary(State(state): State<AppState>) -> Result<Json<Summary>, AppError> {
    let summary = state.controller.summary().await?;
    Ok(Json(summary))
}

/// GET /progress
async fn get_progress(State(state): State<AppState>) -> Json<Progress> {
    let session = state.session.lock().await;
    Json(session.progress())
}
