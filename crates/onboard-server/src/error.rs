//! Handler error type combining request-shape and engine errors.

use axum::response::{IntoResponse, Response};
use onboard_core::error::{ServerError, WorkflowError};

#[derive(Debug)]
pub enum ApiError {
    Server(ServerError),
    Workflow(WorkflowError),
}

impl From<ServerError> for ApiError {
    fn from(err: ServerError) -> Self {
        ApiError::Server(err)
    }
}

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        ApiError::Workflow(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Server(err) => err.into_response(),
            ApiError::Workflow(err) => err.into_response(),
        }
    }
}
