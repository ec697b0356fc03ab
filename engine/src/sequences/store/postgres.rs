// Postgres-backed sequence store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use uuid::Uuid;

use super::{SequenceStore, StoreError};
use crate::classifier::LeadCategory;
use crate::sequences::state::{SequenceState, SequenceStatus};

#[derive(Clone)]
pub struct PgSequenceStore {
    pool: PgPool,
}

impl PgSequenceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

type SequenceRow = (
    Uuid,
    Option<String>,
    String,
    String,
    String,
    i32,
    String,
    Value,
    Value,
    DateTime<Utc>,
    DateTime<Utc>,
);

const SELECT_COLUMNS: &str = "id, contact_id, email, category, source, current_step, status, lead, steps, created_at, updated_at";

fn from_row(row: SequenceRow) -> Result<SequenceState, StoreError> {
    Ok(SequenceState {
        id: row.0,
        contact_id: row.1,
        email: row.2,
        category: row.3.parse::<LeadCategory>().map_err(StoreError::Invalid)?,
        source: row.4,
        current_step: row.5.max(0) as usize,
        status: row.6.parse::<SequenceStatus>().map_err(StoreError::Invalid)?,
        lead: row.7,
        steps: serde_json::from_value(row.8)?,
        created_at: row.9,
        updated_at: row.10,
    })
}

#[async_trait]
impl SequenceStore for PgSequenceStore {
    async fn insert(&self, state: &SequenceState) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO lead_sequences
            (id, contact_id, email, category, source, current_step, status, lead, steps, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(state.id)
        .bind(&state.contact_id)
        .bind(&state.email)
        .bind(state.category.as_str())
        .bind(&state.source)
        .bind(state.current_step as i32)
        .bind(state.status.as_str())
        .bind(&state.lead)
        .bind(serde_json::to_value(&state.steps)?)
        .bind(state.created_at)
        .bind(state.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<SequenceState>, StoreError> {
        let row: Option<SequenceRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM lead_sequences WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(from_row).transpose()
    }

    async fn find_open_by_email(&self, email: &str) -> Result<Option<SequenceState>, StoreError> {
        let row: Option<SequenceRow> = sqlx::query_as(&format!(
            r#"
            SELECT {SELECT_COLUMNS} FROM lead_sequences
            WHERE LOWER(email) = LOWER($1) AND status IN ('active', 'paused')
            ORDER BY created_at DESC
            LIMIT 1
            "#
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        row.map(from_row).transpose()
    }

    async fn list_by_status(
        &self,
        status: SequenceStatus,
    ) -> Result<Vec<SequenceState>, StoreError> {
        let rows: Vec<SequenceRow> = sqlx::query_as(&format!(
            "SELECT {SELECT_COLUMNS} FROM lead_sequences WHERE status = $1 ORDER BY created_at ASC"
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(from_row).collect()
    }

    async fn mark_step_sent(
        &self,
        id: Uuid,
        step_index: usize,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        // Compare-and-swap: the write only lands while sent_at is still
        // empty, closing the race between overlapping ticks.
        let result = sqlx::query(
            r#"
            UPDATE lead_sequences
            SET steps = jsonb_set(steps, ARRAY[$2::text, 'sent_at'], to_jsonb($3::timestamptz)),
                updated_at = NOW()
            WHERE id = $1
              AND steps->($2::int)->>'sent_at' IS NULL
            "#,
        )
        .bind(id)
        .bind(step_index as i32)
        .bind(at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    async fn set_current_step(&self, id: Uuid, step: usize) -> Result<(), StoreError> {
        sqlx::query(
            "UPDATE lead_sequences SET current_step = $2, updated_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(step as i32)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_status(&self, id: Uuid, status: SequenceStatus) -> Result<(), StoreError> {
        sqlx::query("UPDATE lead_sequences SET status = $2, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .bind(status.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn set_status_by_email(
        &self,
        email: &str,
        status: SequenceStatus,
    ) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE lead_sequences SET status = $2, updated_at = NOW() WHERE LOWER(email) = LOWER($1)",
        )
        .bind(email)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
