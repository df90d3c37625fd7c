//! Core error types for the onboarding platform.
//!
//! `ServerError` is the infrastructure error used by stores and providers.
//! `WorkflowError` is what the engine returns to callers; every variant names
//! the step involved and the reason it was rejected.
//!
//! When the `axum` feature is enabled, both implement `IntoResponse` so they
//! can be used directly as axum handler error types.

use crate::workflow::validation::FieldError;

#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Errors returned by `WorkflowEngine` operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum WorkflowError {
    #[error("Unknown step: {0}")]
    UnknownStep(String),

    #[error("Validation failed for step {step}: {} field error(s)", .errors.len())]
    ValidationFailed {
        step: String,
        errors: Vec<FieldError>,
    },

    #[error("Payment rejected for step {step}: {message}")]
    PaymentRejected { step: String, message: String },

    #[error("Step {step} submitted out of order: {missing} must be completed first")]
    OutOfOrder { step: String, missing: String },

    #[error("Workflow already complete; step {0} cannot be started")]
    WorkflowAlreadyComplete(String),

    #[error("Concurrent modification: {0}")]
    ConcurrentModification(String),

    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),
}

impl WorkflowError {
    /// Stable machine-readable code for the error kind.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownStep(_) => "UNKNOWN_STEP",
            Self::ValidationFailed { .. } => "VALIDATION_FAILED",
            Self::PaymentRejected { .. } => "PAYMENT_REJECTED",
            Self::OutOfOrder { .. } => "OUT_OF_ORDER",
            Self::WorkflowAlreadyComplete(_) => "WORKFLOW_ALREADY_COMPLETE",
            Self::ConcurrentModification(_) => "CONCURRENT_MODIFICATION",
            Self::StorageUnavailable(_) => "STORAGE_UNAVAILABLE",
        }
    }

    /// Whether the same request may succeed if retried unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::StorageUnavailable(_) | Self::ConcurrentModification(_)
        )
    }

    /// Structured JSON body describing the rejection.
    pub fn to_body(&self) -> serde_json::Value {
        let mut body = serde_json::json!({
            "error": self.code(),
            "message": self.to_string(),
            "retryable": self.is_retryable(),
        });
        match self {
            Self::UnknownStep(step) | Self::WorkflowAlreadyComplete(step) => {
                body["step"] = serde_json::json!(step);
            }
            Self::ValidationFailed { step, errors } => {
                body["step"] = serde_json::json!(step);
                body["fieldErrors"] = serde_json::json!(errors);
            }
            Self::PaymentRejected { step, message } => {
                body["step"] = serde_json::json!(step);
                body["providerMessage"] = serde_json::json!(message);
            }
            Self::OutOfOrder { step, missing } => {
                body["step"] = serde_json::json!(step);
                body["missingStep"] = serde_json::json!(missing);
            }
            Self::ConcurrentModification(_) | Self::StorageUnavailable(_) => {}
        }
        body
    }
}

impl From<ServerError> for WorkflowError {
    fn from(err: ServerError) -> Self {
        match err {
            ServerError::Conflict(msg) => WorkflowError::ConcurrentModification(msg),
            other => WorkflowError::StorageUnavailable(other.to_string()),
        }
    }
}

/// Errors raised while building or loading a workflow definition.
#[derive(Debug, thiserror::Error)]
pub enum DefinitionError {
    #[error("Workflow definition has no steps")]
    Empty,

    #[error("Workflow definition has no required steps")]
    NoRequiredSteps,

    #[error("Step name must not be empty (position {0})")]
    EmptyStepName(usize),

    #[error("Duplicate step name: {0}")]
    DuplicateStep(String),

    #[error("Invalid field rule in step {step}: {reason}")]
    InvalidRule { step: String, reason: String },

    #[error("Step {0} creates a payment intent but no payment provider is configured")]
    MissingPaymentProvider(String),

    #[error("Failed to parse workflow YAML: {0}")]
    Parse(String),

    #[error("Failed to read workflow file '{path}': {reason}")]
    Io { path: String, reason: String },
}

impl ServerError {
    pub fn to_body(&self) -> serde_json::Value {
        serde_json::json!({ "error": self.to_string() })
    }
}

// ---------------------------------------------------------------------------
// axum integration (opt-in via feature flag)
// ---------------------------------------------------------------------------

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for ServerError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        let status = match &self {
            ServerError::Database(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Conflict(_) => StatusCode::CONFLICT,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, axum::Json(self.to_body())).into_response()
    }
}

#[cfg(feature = "axum")]
impl axum::response::IntoResponse for WorkflowError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        let status = match &self {
            WorkflowError::UnknownStep(_) => StatusCode::NOT_FOUND,
            WorkflowError::ValidationFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            WorkflowError::PaymentRejected { .. } => StatusCode::PAYMENT_REQUIRED,
            WorkflowError::OutOfOrder { .. }
            | WorkflowError::WorkflowAlreadyComplete(_)
            | WorkflowError::ConcurrentModification(_) => StatusCode::CONFLICT,
            WorkflowError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        };

        (status, axum::Json(self.to_body())).into_response()
    }
}
