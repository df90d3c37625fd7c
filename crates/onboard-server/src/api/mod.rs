pub mod workflow;

use axum::Router;

use onboard_core::state::AppState;

/// Build the complete API router with all sub-routes.
pub fn api_router() -> Router<AppState> {
    Router::new().nest("/api/workflow", workflow::router())
}
