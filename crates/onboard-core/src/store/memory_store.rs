use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{conflict, ProfileStore};
use crate::error::ServerError;
use crate::models::instance::InstanceState;

/// Process-local `ProfileStore`, used by tests and ephemeral deployments.
///
/// `set_available(false)` makes every call fail with `ServerError::Database`
/// so callers can exercise the storage-outage path.
pub struct InMemoryProfileStore {
    records: Mutex<HashMap<String, InstanceState>>,
    available: AtomicBool,
}

impl Default for InMemoryProfileStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryProfileStore {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn records(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, InstanceState>>, ServerError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(ServerError::Database("profile store unavailable".to_string()));
        }
        self.records
            .lock()
            .map_err(|e| ServerError::Database(format!("Lock poisoned: {}", e)))
    }
}

#[async_trait]
impl ProfileStore for InMemoryProfileStore {
    async fn load(&self, subject_id: &str) -> Result<Option<InstanceState>, ServerError> {
        Ok(self.records()?.get(subject_id).cloned())
    }

    async fn save(&self, state: &InstanceState) -> Result<(), ServerError> {
        let mut records = self.records()?;
        let stored_version = records.get(&state.subject_id).map(|s| s.version).unwrap_or(0);
        if stored_version + 1 != state.version {
            return Err(conflict(state));
        }
        records.insert(state.subject_id.clone(), state.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<InstanceState>, ServerError> {
        let mut all: Vec<InstanceState> = self.records()?.values().cloned().collect();
        all.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(all)
    }
}
