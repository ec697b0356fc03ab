// Sequence endpoints - inspection, manual tick, unsubscribe

use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{ApiResult, AppError};
use crate::sequences::SequenceStatus;
use crate::AppState;

pub fn sequence_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(list_sequences))
        .route("/tick", post(run_tick))
        .route("/unsubscribe", post(unsubscribe_by_email))
        .route("/:id", get(get_sequence))
        .route("/:id/unsubscribe", post(unsubscribe))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    status: Option<String>,
}

async fn list_sequences(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListQuery>,
) -> ApiResult<impl IntoResponse> {
    let status = match query.status.as_deref() {
        Some(raw) => raw
            .parse::<SequenceStatus>()
            .map_err(AppError::BadRequest)?,
        None => SequenceStatus::Active,
    };
    let rows = state.store.list_by_status(status).await?;
    Ok(Json(rows))
}

async fn get_sequence(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let row = state
        .store
        .get(id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Sequence {}", id)))?;
    Ok(Json(row))
}

async fn run_tick(State(state): State<Arc<AppState>>) -> ApiResult<impl IntoResponse> {
    let log = state.jobs.run_tick_now().await;
    Ok(Json(log))
}

async fn unsubscribe(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    state.sequences.unsubscribe(id).await?;
    Ok(Json(json!({"id": id, "status": "unsubscribed"})))
}

#[derive(Debug, Deserialize)]
struct UnsubscribeQuery {
    email: String,
}

async fn unsubscribe_by_email(
    State(state): State<Arc<AppState>>,
    Query(query): Query<UnsubscribeQuery>,
) -> ApiResult<impl IntoResponse> {
    let updated = state.sequences.unsubscribe_email(&query.email).await?;
    Ok(Json(json!({"email": query.email, "updated": updated})))
}
