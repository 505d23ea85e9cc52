use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use triage_core::{Order, Transition};

/// What the reviewer chose for the order on screen.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ReviewAction {
    Accept,
    Delay,
    Reject,
}

impl ReviewAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewAction::Accept => "accept",
            ReviewAction::Delay => "delay",
            ReviewAction::Reject => "reject",
        }
    }
}

impl fmt::Display for ReviewAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reviewer-supplied extras for a decision.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DecisionPayload {
    pub notes: Option<String>,
    pub delay_date: Option<NaiveDate>,
}

impl DecisionPayload {
    pub fn with_notes(notes: impl Into<String>) -> Self {
        Self {
            notes: Some(notes.into()),
            delay_date: None,
        }
    }

    pub fn delay_until(date: NaiveDate) -> Self {
        Self {
            notes: None,
            delay_date: Some(date),
        }
    }

    /// Blank notes are stored as absent.
    pub fn normalized_notes(&self) -> Option<String> {
        self.notes
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
    }
}

/// What a review action did to the order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "transition", rename_all = "snake_case")]
pub enum ReviewOutcome {
    Applied(Transition),
    /// Terminal action replayed on an order already in that state.
    Unchanged,
}

impl ReviewOutcome {
    pub fn is_requeue(&self) -> bool {
        matches!(self, ReviewOutcome::Applied(t) if t.is_requeue())
    }
}

/// Order as it stands after a review action.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewResult {
    pub order: Order,
    pub outcome: ReviewOutcome,
}
