use uuid::Uuid;

/// Emitted once per ingested batch.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct BatchIngestedEvent {
    pub batch_id: Uuid,
    pub total: u64,
    pub timestamp: i64,
}

/// Emitted after every successful review action.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct OrderReviewedEvent {
    pub batch_id: Option<Uuid>,
    pub order_id: i64,
    pub order_label: String,
    pub action: String,
    pub status: String,
    pub decision: Option<String>,
    pub rejection_count: i32,
    pub requeued: bool,
    pub timestamp: i64,
}

impl OrderReviewedEvent {
    /// Topic-style name used as the tracing target field.
    pub const TOPIC: &'static str = "order.reviewed";
}

impl BatchIngestedEvent {
    pub const TOPIC: &'static str = "batch.ingested";

    pub fn new(batch_id: Uuid, total: u64) -> Self {
        Self {
            batch_id,
            total,
            timestamp: chrono::Utc::now().timestamp_millis(),
        }
    }
}

/// Serializes an event for the log sink; falls back to the Debug form.
pub fn to_payload<T: serde::Serialize + std::fmt::Debug>(event: &T) -> String {
    serde_json::to_string(event).unwrap_or_else(|_| format!("{:?}", event))
}
