//! Identity/profile stores holding per-subject workflow progress.
//!
//! Stores are the only place instance state lives. Writes are
//! compare-and-swap on `InstanceState::version`: a save succeeds only when
//! the stored version is exactly one behind the incoming state (or the
//! record is new and the incoming version is 1). Anything else is a
//! `ServerError::Conflict`.

pub mod memory_store;
pub mod profile_store;

use async_trait::async_trait;

use crate::error::ServerError;
use crate::models::instance::InstanceState;

pub use memory_store::InMemoryProfileStore;
pub use profile_store::SqliteProfileStore;

#[async_trait]
pub trait ProfileStore: Send + Sync {
    /// Load the state for `subject_id`, `None` if the subject has never been saved.
    async fn load(&self, subject_id: &str) -> Result<Option<InstanceState>, ServerError>;

    /// Atomically persist `state`, enforcing the version check.
    async fn save(&self, state: &InstanceState) -> Result<(), ServerError>;

    /// All stored instances, most recently updated first.
    async fn list(&self) -> Result<Vec<InstanceState>, ServerError>;
}

pub(crate) fn conflict(state: &InstanceState) -> ServerError {
    ServerError::Conflict(format!(
        "subject {} is not at version {}",
        state.subject_id,
        state.version - 1
    ))
}
