// Sequence scheduler - starts drip campaigns and advances them each tick

use chrono::{Duration, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use super::state::{SequenceState, SequenceStatus, SequenceStepState};
use super::store::{SequenceStore, StoreError};
use super::templates::SequenceTemplate;
use crate::classifier::{LeadCategory, LeadEvent};
use crate::workflows::dispatch::DispatchTable;

#[derive(Debug, Error)]
pub enum SequenceError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("sequence {0} not found")]
    NotFound(Uuid),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum StartOutcome {
    /// A new row was created; `first_send` reports whether step 1 went out.
    Started { id: Uuid, first_send: bool },
    /// An active or paused campaign already exists for this address.
    AlreadyEnrolled { id: Uuid },
}

/// Summary of one tick over all active rows.
#[derive(Debug, Default, Serialize)]
pub struct TickReport {
    pub rows_examined: usize,
    pub sent: usize,
    pub completed: usize,
    pub failures: usize,
    pub errors: Vec<String>,
}

/// Advances persisted drip campaigns. Dispatch goes through the same
/// adapter table the workflow runner uses; a send failure never advances
/// the row, so the next tick naturally retries it with no retry cap.
pub struct SequenceScheduler {
    store: Arc<dyn SequenceStore>,
    table: Arc<DispatchTable>,
    env: Value,
}

impl SequenceScheduler {
    pub fn new(store: Arc<dyn SequenceStore>, table: Arc<DispatchTable>, env: Value) -> Self {
        Self { store, table, env }
    }

    /// Enroll a lead in the drip campaign for its category. Skips creation
    /// when an open campaign already exists for the same address, then
    /// sends step 1 inline and persists the row with every remaining
    /// step's `scheduled_at` precomputed.
    pub async fn start(
        &self,
        lead: &LeadEvent,
        category: LeadCategory,
        contact_id: Option<String>,
    ) -> Result<StartOutcome, SequenceError> {
        if let Some(existing) = self.store.find_open_by_email(&lead.email).await? {
            info!(email = %lead.email, id = %existing.id, "campaign already open, skipping enrolment");
            return Ok(StartOutcome::AlreadyEnrolled { id: existing.id });
        }

        let template = SequenceTemplate::for_category(category);
        let now = Utc::now();
        let lead_snapshot = serde_json::to_value(lead).map_err(StoreError::Serialization)?;

        let mut cumulative = 0i64;
        let steps: Vec<SequenceStepState> = template
            .steps
            .iter()
            .map(|s| {
                cumulative += s.delay_hours;
                SequenceStepState {
                    scheduled_at: Some(now + Duration::hours(cumulative)),
                    sent_at: None,
                }
            })
            .collect();

        let mut state = SequenceState {
            id: Uuid::new_v4(),
            contact_id,
            email: lead.email.clone(),
            category,
            source: lead.source.clone(),
            current_step: 0,
            status: SequenceStatus::Active,
            lead: lead_snapshot,
            steps,
            created_at: now,
            updated_at: now,
        };

        // Step 1 goes out synchronously. A failure here is not retried
        // inline; the row persists unsent and the next tick picks it up
        // as the earliest overdue step.
        let first_send = self.send_step(&state, &template, 0).await;
        if first_send {
            state.steps[0].sent_at = Some(now);
            state.current_step = 1;
        } else {
            warn!(email = %lead.email, sequence = %template.name, "initial drip send failed, leaving for tick");
        }

        self.store.insert(&state).await?;
        info!(
            id = %state.id,
            sequence = %template.name,
            email = %lead.email,
            first_send,
            "drip campaign started"
        );
        Ok(StartOutcome::Started {
            id: state.id,
            first_send,
        })
    }

    /// One periodic pass over all active rows, sending whatever step has
    /// come due. Safe to invoke from overlapping schedules: the store's
    /// conditional `mark_step_sent` makes the send-at-most-once decision.
    pub async fn tick(&self) -> TickReport {
        let mut report = TickReport::default();

        let rows = match self.store.list_by_status(SequenceStatus::Active).await {
            Ok(rows) => rows,
            Err(e) => {
                report.errors.push(e.to_string());
                return report;
            }
        };

        for row in rows {
            report.rows_examined += 1;
            if let Err(e) = self.advance_row(&row, &mut report).await {
                report.errors.push(format!("sequence {}: {e}", row.id));
            }
        }

        info!(
            rows = report.rows_examined,
            sent = report.sent,
            completed = report.completed,
            failures = report.failures,
            "sequence tick finished"
        );
        report
    }

    async fn advance_row(
        &self,
        row: &SequenceState,
        report: &mut TickReport,
    ) -> Result<(), SequenceError> {
        let template = SequenceTemplate::for_category(row.category);
        let next_step = row.current_step + 1;

        if next_step > template.len() {
            self.store
                .set_status(row.id, SequenceStatus::Completed)
                .await?;
            report.completed += 1;
            return Ok(());
        }

        let index = next_step - 1;
        let Some(step) = row.steps.get(index) else {
            report
                .errors
                .push(format!("sequence {}: step {next_step} has no state", row.id));
            return Ok(());
        };
        match step.scheduled_at {
            Some(at) if at <= Utc::now() => {}
            _ => return Ok(()), // not due yet
        }

        if step.sent_at.is_some() {
            // Already dispatched (a prior tick won the race or crashed
            // before advancing the pointer). Advance without resending.
            self.finish_step(row, next_step, template.len(), report)
                .await?;
            return Ok(());
        }

        if !self.send_step(row, &template, index).await {
            report.failures += 1;
            return Ok(());
        }

        if !self.store.mark_step_sent(row.id, index, Utc::now()).await? {
            // Lost the compare-and-swap to a concurrent tick; its writer
            // owns the advance.
            warn!(id = %row.id, step = next_step, "step already marked sent by another tick");
            return Ok(());
        }

        report.sent += 1;
        self.finish_step(row, next_step, template.len(), report)
            .await
    }

    async fn finish_step(
        &self,
        row: &SequenceState,
        next_step: usize,
        template_len: usize,
        report: &mut TickReport,
    ) -> Result<(), SequenceError> {
        self.store.set_current_step(row.id, next_step).await?;
        if next_step >= template_len {
            self.store
                .set_status(row.id, SequenceStatus::Completed)
                .await?;
            report.completed += 1;
        }
        Ok(())
    }

    async fn send_step(
        &self,
        row: &SequenceState,
        template: &SequenceTemplate,
        index: usize,
    ) -> bool {
        let Some((subject, html_body)) = template.render(index, &row.lead, &self.env) else {
            warn!(id = %row.id, index, "no template step to render");
            return false;
        };

        let params = json!({
            "to": row.email,
            "subject": subject,
            "html_body": html_body,
            "track_opens": true,
            "track_clicks": true,
        });

        match self.table.dispatch("email", "send", &params).await {
            Ok(value) if value.get("skipped").and_then(Value::as_bool) == Some(true) => {
                warn!(id = %row.id, "email channel not wired, treating send as failed");
                false
            }
            Ok(_) => true,
            Err(e) => {
                warn!(id = %row.id, step = index + 1, error = %e, "drip send failed");
                false
            }
        }
    }

    /// External unsubscribe signal: flips the row unconditionally; the
    /// tick never acts on a non-active row afterwards.
    pub async fn unsubscribe(&self, id: Uuid) -> Result<(), SequenceError> {
        if self.store.get(id).await?.is_none() {
            return Err(SequenceError::NotFound(id));
        }
        self.store
            .set_status(id, SequenceStatus::Unsubscribed)
            .await?;
        info!(%id, "sequence unsubscribed");
        Ok(())
    }

    pub async fn unsubscribe_email(&self, email: &str) -> Result<u64, SequenceError> {
        let updated = self
            .store
            .set_status_by_email(email, SequenceStatus::Unsubscribed)
            .await?;
        info!(email = %email, updated, "unsubscribed by address");
        Ok(updated)
    }
}
