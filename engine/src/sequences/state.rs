// Durable sequence state - one row per lead + drip campaign

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::classifier::LeadCategory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SequenceStatus {
    Active,
    Paused,
    Completed,
    Unsubscribed,
}

impl SequenceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Unsubscribed => "unsubscribed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Unsubscribed)
    }
}

impl fmt::Display for SequenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SequenceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "unsubscribed" => Ok(Self::Unsubscribed),
            other => Err(format!("unknown sequence status '{other}'")),
        }
    }
}

/// Per-step delivery record. `scheduled_at` is computed once at creation;
/// `sent_at` is written at most once, and an already-set `sent_at` is
/// authoritative proof of prior dispatch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SequenceStepState {
    #[serde(default)]
    pub scheduled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub sent_at: Option<DateTime<Utc>>,
}

/// One lead's enrolment in a drip campaign. Created when the campaign
/// starts, mutated only by the scheduler tick, terminal once completed or
/// unsubscribed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceState {
    pub id: Uuid,
    pub contact_id: Option<String>,
    pub email: String,
    pub category: LeadCategory,
    pub source: String,
    /// Number of steps dispatched so far (1-based step counter).
    pub current_step: usize,
    pub status: SequenceStatus,
    /// Snapshot of the lead event, used to render later steps.
    pub lead: Value,
    pub steps: Vec<SequenceStepState>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SequenceState {
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }
}
