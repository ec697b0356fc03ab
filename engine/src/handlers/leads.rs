// Lead intake endpoint - classify, run the intake workflow, enroll in drip

use axum::{
    extract::State,
    response::{IntoResponse, Json},
    routing::post,
    Router,
};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::classifier::{self, LeadEvent};
use crate::error::{validation_error, ApiResult, AppError};
use crate::workflows::{provision_dependencies, RunStatus};
use crate::AppState;

pub fn lead_routes() -> Router<Arc<AppState>> {
    Router::new().route("/", post(submit_lead))
}

async fn submit_lead(
    State(state): State<Arc<AppState>>,
    Json(lead): Json<LeadEvent>,
) -> ApiResult<impl IntoResponse> {
    if lead.name.trim().is_empty() {
        return Err(validation_error("name", "name is required"));
    }
    if lead.email.trim().is_empty() || !lead.email.contains('@') {
        return Err(validation_error("email", "a valid email is required"));
    }

    let score = classifier::score(&lead, &state.catalog, &state.weights);
    info!(
        email = %lead.email,
        category = %score.category,
        total = score.total,
        "lead classified"
    );

    // Missing labels or fields degrade individual steps at run time;
    // never refuse the lead over them.
    let report = provision_dependencies(&state.crm, &state.intake.dependencies).await;
    if !report.all_ensured() {
        warn!(failed = report.failed.len(), "some workflow dependencies missing");
    }

    let inputs = json!({
        "name": lead.name,
        "email": lead.email,
        "phone": lead.phone.clone().unwrap_or_default(),
        "category": score.category.as_str(),
        "score": score.total,
        "message": lead.message.clone().unwrap_or_default(),
        "source": lead.source,
    });
    let result = state.runner.execute(&state.intake, inputs).await;

    if result.status == RunStatus::Failed {
        return Err(AppError::AutomationFailed(format!(
            "workflow '{}' failed ({} steps failed)",
            result.workflow,
            result.steps_failed()
        )));
    }

    let contact_id = result.outputs["contact_id"].as_str().map(str::to_string);
    let enrollment = state
        .sequences
        .start(&lead, score.category, contact_id)
        .await?;

    Ok(Json(json!({
        "lead": {
            "category": score.category.as_str(),
            "score": score.total,
            "factors": score.factors,
        },
        "workflow": {
            "execution_id": result.execution_id,
            "status": result.status,
            "steps_run": result.steps_run(),
            "steps_skipped": result.steps_skipped(),
            "steps_failed": result.steps_failed(),
            "outputs": result.outputs,
        },
        "sequence": enrollment,
    })))
}
