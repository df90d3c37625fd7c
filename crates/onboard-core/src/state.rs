//! Shared application state for the HTTP server and CLI.

use std::sync::Arc;

use crate::db::Database;
use crate::error::DefinitionError;
use crate::payment::{MockPaymentProvider, PaymentProvider};
use crate::store::{InMemoryProfileStore, ProfileStore, SqliteProfileStore};
use crate::workflow::{onboarding_definition, WorkflowDefinition, WorkflowEngine, WorkflowSchema};

/// Shared state accessible by all API handlers and CLI commands.
pub struct AppStateInner {
    pub engine: WorkflowEngine,
    pub profile_store: Arc<dyn ProfileStore>,
}

pub type AppState = Arc<AppStateInner>;

impl AppStateInner {
    /// SQLite-backed state. Uses the definition at `definition_path` when
    /// given, otherwise the built-in onboarding flow.
    pub fn new(db: Database, definition_path: Option<&str>) -> Result<Self, DefinitionError> {
        let provider: Arc<dyn PaymentProvider> = Arc::new(MockPaymentProvider::new());
        let definition = load_definition(definition_path, provider)?;
        let store: Arc<dyn ProfileStore> = Arc::new(SqliteProfileStore::new(db));
        Ok(Self::from_parts(definition, store))
    }

    /// Ephemeral state with the built-in onboarding flow (for testing).
    pub fn in_memory() -> Result<Self, DefinitionError> {
        let provider: Arc<dyn PaymentProvider> = Arc::new(MockPaymentProvider::new());
        let definition = onboarding_definition(provider)?;
        Ok(Self::from_parts(definition, Arc::new(InMemoryProfileStore::new())))
    }

    /// Assemble state from an already-built definition and store.
    pub fn from_parts(definition: WorkflowDefinition, profile_store: Arc<dyn ProfileStore>) -> Self {
        Self {
            engine: WorkflowEngine::new(Arc::new(definition), profile_store.clone()),
            profile_store,
        }
    }
}

/// Load a definition from YAML, or fall back to the built-in onboarding flow.
pub fn load_definition(
    path: Option<&str>,
    provider: Arc<dyn PaymentProvider>,
) -> Result<WorkflowDefinition, DefinitionError> {
    match path {
        Some(path) => {
            let definition = WorkflowSchema::from_file(path)?.build(Some(provider))?;
            tracing::info!(
                "Loaded workflow '{}' ({} steps) from {}",
                definition.name(),
                definition.steps().len(),
                path
            );
            Ok(definition)
        }
        None => onboarding_definition(provider),
    }
}
