// In-memory sequence store, used by tests

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{SequenceStore, StoreError};
use crate::sequences::state::{SequenceState, SequenceStatus};

#[derive(Clone, Default)]
pub struct MemorySequenceStore {
    rows: Arc<RwLock<HashMap<Uuid, SequenceState>>>,
}

impl MemorySequenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SequenceStore for MemorySequenceStore {
    async fn insert(&self, state: &SequenceState) -> Result<(), StoreError> {
        let mut rows = self.rows.write().await;
        rows.insert(state.id, state.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<SequenceState>, StoreError> {
        let rows = self.rows.read().await;
        Ok(rows.get(&id).cloned())
    }

    async fn find_open_by_email(&self, email: &str) -> Result<Option<SequenceState>, StoreError> {
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .find(|r| {
                r.email.eq_ignore_ascii_case(email)
                    && matches!(r.status, SequenceStatus::Active | SequenceStatus::Paused)
            })
            .cloned())
    }

    async fn list_by_status(
        &self,
        status: SequenceStatus,
    ) -> Result<Vec<SequenceState>, StoreError> {
        let rows = self.rows.read().await;
        let mut matching: Vec<SequenceState> = rows
            .values()
            .filter(|r| r.status == status)
            .cloned()
            .collect();
        matching.sort_by_key(|r| r.created_at);
        Ok(matching)
    }

    async fn mark_step_sent(
        &self,
        id: Uuid,
        step_index: usize,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let mut rows = self.rows.write().await;
        let row = rows.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        let step = row
            .steps
            .get_mut(step_index)
            .ok_or_else(|| StoreError::Invalid(format!("step index {step_index} out of range")))?;
        // Checked and written under the same lock: the compare-and-swap.
        if step.sent_at.is_some() {
            return Ok(false);
        }
        step.sent_at = Some(at);
        row.updated_at = at;
        Ok(true)
    }

    async fn set_current_step(&self, id: Uuid, step: usize) -> Result<(), StoreError> {
        let mut rows = self.rows.write().await;
        let row = rows.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        row.current_step = step;
        row.updated_at = Utc::now();
        Ok(())
    }

    async fn set_status(&self, id: Uuid, status: SequenceStatus) -> Result<(), StoreError> {
        let mut rows = self.rows.write().await;
        let row = rows.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        row.status = status;
        row.updated_at = Utc::now();
        Ok(())
    }

    async fn set_status_by_email(
        &self,
        email: &str,
        status: SequenceStatus,
    ) -> Result<u64, StoreError> {
        let mut rows = self.rows.write().await;
        let mut updated = 0;
        for row in rows.values_mut() {
            if row.email.eq_ignore_ascii_case(email) {
                row.status = status;
                row.updated_at = Utc::now();
                updated += 1;
            }
        }
        Ok(updated)
    }
}
