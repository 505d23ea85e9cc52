use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use triage_shared::Masked;

use crate::{CoreError, CoreResult};

/// Rejections allowed before an order is closed out for good.
pub const MAX_REJECTIONS: i32 = 3;

/// Review status. Only `Pending` orders are eligible for review.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Pending,
    Completed,
    Delayed,
    Rejected,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Completed => "completed",
            OrderStatus::Delayed => "delayed",
            OrderStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(OrderStatus::Pending),
            "completed" => Ok(OrderStatus::Completed),
            "delayed" => Ok(OrderStatus::Delayed),
            "rejected" => Ok(OrderStatus::Rejected),
            other => Err(CoreError::ValidationError(format!("unknown order status '{}'", other))),
        }
    }
}

/// The reviewer's recorded decision.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Accepted,
    Delayed,
    Rejected,
    RejectedFinal,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Accepted => "accepted",
            Decision::Delayed => "delayed",
            Decision::Rejected => "rejected",
            Decision::RejectedFinal => "rejected_final",
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Decision {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accepted" => Ok(Decision::Accepted),
            "delayed" => Ok(Decision::Delayed),
            "rejected" => Ok(Decision::Rejected),
            "rejected_final" => Ok(Decision::RejectedFinal),
            other => Err(CoreError::ValidationError(format!("unknown decision '{}'", other))),
        }
    }
}

/// One customer record under review.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Order {
    pub id: i64,
    pub order_id: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Masked<String>,
    pub state: String,
    pub municipality: String,
    pub status: OrderStatus,
    pub decision: Option<Decision>,
    pub delay_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub rejection_count: i32,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Builds a freshly ingested order as the store would persist it.
    pub fn from_input(id: i64, input: OrderInput, created_at: DateTime<Utc>) -> Self {
        Self {
            id,
            order_id: input.order_id,
            first_name: input.first_name,
            last_name: input.last_name,
            phone: input.phone,
            state: input.state,
            municipality: input.municipality,
            status: OrderStatus::Pending,
            decision: None,
            delay_date: None,
            notes: None,
            rejection_count: 0,
            created_at,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == OrderStatus::Pending
    }
}

/// Normalized ingestion record; see [`crate::ingest`].
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct OrderInput {
    pub order_id: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Masked<String>,
    pub state: String,
    pub municipality: String,
}

impl OrderInput {
    /// Individual fields may be empty; a record with neither label nor any
    /// descriptive field is not a record at all.
    pub fn validate(&self) -> CoreResult<()> {
        if self.order_id.trim().is_empty() {
            return Err(CoreError::ValidationError("order label is required".to_string()));
        }

        let descriptive = [
            self.first_name.as_str(),
            self.last_name.as_str(),
            self.phone.expose().as_str(),
            self.state.as_str(),
            self.municipality.as_str(),
        ];
        if descriptive.iter().all(|field| field.trim().is_empty()) {
            return Err(CoreError::ValidationError(format!(
                "record {} has no descriptive fields",
                self.order_id
            )));
        }

        Ok(())
    }
}
