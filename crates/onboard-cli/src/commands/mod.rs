//! CLI command implementations.
//!
//! Each submodule corresponds to a top-level CLI command and reuses
//! the onboard-core domain logic through `AppState`.

pub mod server;
pub mod workflow;

use onboard_core::state::AppState;
use std::sync::Arc;

/// Initialize a shared `AppState` from the given SQLite database path.
///
/// This mirrors `onboard_server::create_app_state` but avoids starting
/// the HTTP server for non-server commands.
pub async fn init_state(db_path: &str, definition_path: Option<&str>) -> AppState {
    let db = onboard_core::Database::open(db_path).unwrap_or_else(|e| {
        eprintln!("Failed to open database '{}': {}", db_path, e);
        std::process::exit(1);
    });

    let inner = onboard_core::AppStateInner::new(db, definition_path).unwrap_or_else(|e| {
        eprintln!("Failed to load workflow definition: {}", e);
        std::process::exit(1);
    });

    tracing::debug!(
        "Workflow '{}' ready on database '{}'",
        inner.engine.definition().name(),
        db_path
    );
    Arc::new(inner)
}

/// Pretty-print a JSON value to stdout.
pub fn print_json(value: &serde_json::Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
    );
}
