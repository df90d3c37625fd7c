use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use onboard_core::error::ServerError;
use onboard_core::models::instance::{SubmitResult, WorkflowStatusView};
use onboard_core::state::AppState;
use onboard_core::workflow::DefinitionSummary;

use crate::error::ApiError;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(get_definition))
        .route("/status/{subject_id}", get(get_status))
        .route("/step/{step_name}", post(submit_step))
}

async fn get_definition(State(state): State<AppState>) -> Json<DefinitionSummary> {
    Json(state.engine.definition().summary())
}

async fn get_status(
    State(state): State<AppState>,
    Path(subject_id): Path<String>,
) -> Result<Json<WorkflowStatusView>, ApiError> {
    let subject_id = require_subject(&subject_id)?;
    Ok(Json(state.engine.get_status(subject_id).await?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubmitStepRequest {
    subject_id: String,
    #[serde(default)]
    payload: serde_json::Value,
}

async fn submit_step(
    State(state): State<AppState>,
    Path(step_name): Path<String>,
    Json(body): Json<SubmitStepRequest>,
) -> Result<Json<SubmitResult>, ApiError> {
    let subject_id = require_subject(&body.subject_id)?;
    let result = state
        .engine
        .submit_step(subject_id, &step_name, body.payload)
        .await?;
    Ok(Json(result))
}

/// Blank ids are rejected; anything else is passed through verbatim.
fn require_subject(subject_id: &str) -> Result<&str, ServerError> {
    if subject_id.trim().is_empty() {
        return Err(ServerError::BadRequest("subjectId is required".to_string()));
    }
    Ok(subject_id)
}
