// Sequence store - durable rows behind a pluggable backend

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use super::state::{SequenceState, SequenceStatus};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("sequence {0} not found")]
    NotFound(Uuid),
    #[error("{0}")]
    Invalid(String),
}

/// Append/update/query interface over sequence rows. No multi-row
/// transactional guarantees; each row's update is independent.
#[async_trait]
pub trait SequenceStore: Send + Sync {
    async fn insert(&self, state: &SequenceState) -> Result<(), StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<SequenceState>, StoreError>;

    /// Find a non-terminal (active or paused) row for a contact address,
    /// used to prevent duplicate concurrent campaigns for one person.
    async fn find_open_by_email(&self, email: &str) -> Result<Option<SequenceState>, StoreError>;

    async fn list_by_status(&self, status: SequenceStatus)
        -> Result<Vec<SequenceState>, StoreError>;

    /// Record a step as sent, conditioned on `sent_at` still being empty.
    /// Returns false when the guard loses (another tick already sent it);
    /// the caller must then treat the step as dispatched elsewhere.
    async fn mark_step_sent(
        &self,
        id: Uuid,
        step_index: usize,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    async fn set_current_step(&self, id: Uuid, step: usize) -> Result<(), StoreError>;

    async fn set_status(&self, id: Uuid, status: SequenceStatus) -> Result<(), StoreError>;

    async fn set_status_by_email(
        &self,
        email: &str,
        status: SequenceStatus,
    ) -> Result<u64, StoreError>;
}

pub mod memory;
pub mod postgres;
