use axum::{response::Json, routing::get, Router};
use serde_json::json;
use std::sync::Arc;

use crate::AppState;

pub mod leads;
pub mod sequences;

pub use leads::lead_routes;
pub use sequences::sequence_routes;

pub async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

pub fn job_routes() -> Router<Arc<AppState>> {
    Router::new().route("/logs", get(job_logs))
}

async fn job_logs(
    state: axum::extract::State<Arc<AppState>>,
) -> Json<Vec<crate::jobs::JobExecutionLog>> {
    Json(state.jobs.execution_logs().await)
}
