//! `onboard steps|status|submit|reset|list|validate` — workflow commands.

use std::sync::Arc;

use onboard_core::error::WorkflowError;
use onboard_core::models::instance::WorkflowStatus;
use onboard_core::payment::MockPaymentProvider;
use onboard_core::state::AppState;
use onboard_core::workflow::WorkflowSchema;

use super::print_json;

/// Print the active definition.
pub fn steps(state: &AppState) -> Result<(), String> {
    let summary = state.engine.definition().summary();
    print_json(&serde_json::to_value(summary).map_err(|e| e.to_string())?);
    Ok(())
}

pub async fn status(state: &AppState, subject_id: &str) -> Result<(), String> {
    let view = state
        .engine
        .get_status(subject_id)
        .await
        .map_err(|e| describe(&e))?;
    print_json(&serde_json::to_value(view).map_err(|e| e.to_string())?);
    Ok(())
}

/// Submit `payload` (a JSON object string) for `step`.
pub async fn submit(
    state: &AppState,
    subject_id: &str,
    step: &str,
    payload: &str,
) -> Result<(), String> {
    let payload = parse_payload(payload)?;
    tracing::debug!("[Submit] {} for subject '{}'", step, subject_id);
    let result = state
        .engine
        .submit_step(subject_id, step, payload)
        .await
        .map_err(|e| describe(&e))?;
    print_json(&serde_json::to_value(result).map_err(|e| e.to_string())?);
    Ok(())
}

/// Administrative reset. Not exposed over HTTP.
pub async fn reset(state: &AppState, subject_id: &str) -> Result<(), String> {
    let view = state
        .engine
        .reset_workflow(subject_id)
        .await
        .map_err(|e| describe(&e))?;
    tracing::info!("[Reset] Workflow progress cleared for subject '{}'", subject_id);
    print_json(&serde_json::to_value(view).map_err(|e| e.to_string())?);
    Ok(())
}

/// Stored subjects, optionally only those in `status`.
pub async fn list(state: &AppState, status: Option<WorkflowStatus>) -> Result<(), String> {
    let mut views = state
        .engine
        .list_statuses()
        .await
        .map_err(|e| describe(&e))?;
    if let Some(status) = status {
        views.retain(|v| v.status == status);
    }
    print_json(&serde_json::json!({ "instances": views }));
    Ok(())
}

/// Parse and build a YAML definition without touching any store.
pub fn validate(file: &str) -> Result<(), String> {
    let schema = WorkflowSchema::from_file(file).map_err(|e| e.to_string())?;
    tracing::debug!("[Validate] Parsed '{}' ({} step(s))", file, schema.steps.len());
    let version = schema.version.clone();
    let definition = schema
        .build(Some(Arc::new(MockPaymentProvider::new())))
        .map_err(|e| e.to_string())?;

    println!("📄 Valid workflow: {} v{} ({})", definition.name(), version, file);
    for (i, step) in definition.steps().iter().enumerate() {
        let marker = if step.is_required() { "required" } else { "optional" };
        match step.description() {
            Some(description) => {
                println!("   {}. {} [{}] {}", i + 1, step.name(), marker, description)
            }
            None => println!("   {}. {} [{}]", i + 1, step.name(), marker),
        }
    }
    Ok(())
}

pub fn parse_payload(raw: &str) -> Result<serde_json::Value, String> {
    let value: serde_json::Value =
        serde_json::from_str(raw).map_err(|e| format!("Invalid payload JSON: {}", e))?;
    if !value.is_object() {
        return Err("Payload must be a JSON object".to_string());
    }
    Ok(value)
}

/// One-line error text; field errors are listed individually.
fn describe(err: &WorkflowError) -> String {
    match err {
        WorkflowError::ValidationFailed { errors, .. } => {
            let fields: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            format!("{} [{}]", err, fields.join("; "))
        }
        other => other.to_string(),
    }
}
