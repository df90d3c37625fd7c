//! Onboard Server — HTTP front end for the onboarding workflow engine.
//!
//! A thin axum adapter over `onboard-core`:
//! - `GET  /api/health`
//! - `GET  /api/workflow`
//! - `GET  /api/workflow/status/{subjectId}`
//! - `POST /api/workflow/step/{stepName}`
//!
//! Administrative operations (reset) are deliberately not routed here; they
//! live in the `onboard` CLI.

pub mod api;
pub mod error;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use onboard_core::db::Database;
use onboard_core::state::{AppState, AppStateInner};

/// Configuration for the onboarding backend server.
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub db_path: String,
    /// Optional YAML workflow definition. The built-in onboarding flow is
    /// used when unset.
    pub definition_path: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3210,
            db_path: "onboard.db".to_string(),
            definition_path: None,
        }
    }
}

/// Create a shared `AppState` from a database path and optional definition.
pub async fn create_app_state(
    db_path: &str,
    definition_path: Option<&str>,
) -> Result<AppState, String> {
    let db = Database::open(db_path).map_err(|e| format!("Failed to open database: {}", e))?;

    let inner = AppStateInner::new(db, definition_path)
        .map_err(|e| format!("Failed to load workflow definition: {}", e))?;

    Ok(Arc::new(inner))
}

/// Build the full router (API + health) around `state`.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(api::api_router())
        .route("/api/health", axum::routing::get(health_check))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the backend server.
///
/// Returns the actual address the server is listening on.
pub async fn start_server(config: ServerConfig) -> Result<SocketAddr, String> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "onboard_server=info,onboard_core=info,tower_http=info".into()),
        )
        .try_init()
        .ok();

    tracing::info!(
        "Starting onboarding server on {}:{}",
        config.host,
        config.port
    );

    let state = create_app_state(&config.db_path, config.definition_path.as_deref()).await?;

    start_server_with_state(config, state).await
}

/// Start the HTTP server with a pre-built `AppState`.
pub async fn start_server_with_state(
    config: ServerConfig,
    state: AppState,
) -> Result<SocketAddr, String> {
    let definition = state.engine.definition();
    tracing::info!(
        "Serving workflow '{}' with steps [{}]",
        definition.name(),
        definition.step_names().join(", ")
    );

    let app = app(state);

    // Bind and serve
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| format!("Invalid address: {}", e))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| format!("Failed to bind to {}: {}", addr, e))?;

    let local_addr = listener
        .local_addr()
        .map_err(|e| format!("Failed to get local address: {}", e))?;

    tracing::info!("Onboarding server listening on {}", local_addr);

    // Spawn the server in a background task
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok(local_addr)
}

async fn health_check() -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "status": "ok",
        "server": "onboard-server",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
