use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{OptionalExtension, Row};

use super::{conflict, ProfileStore};
use crate::db::Database;
use crate::error::ServerError;
use crate::models::instance::InstanceState;

/// `ProfileStore` backed by the `workflow_instances` SQLite table.
pub struct SqliteProfileStore {
    db: Database,
}

impl SqliteProfileStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl ProfileStore for SqliteProfileStore {
    async fn load(&self, subject_id: &str) -> Result<Option<InstanceState>, ServerError> {
        let subject_id = subject_id.to_string();
        self.db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT subject_id, completed_steps, step_payloads, step_updated_at,
                            version, created_at, updated_at
                     FROM workflow_instances WHERE subject_id = ?1",
                )?;
                stmt.query_row(rusqlite::params![subject_id], row_to_instance)
                    .optional()
            })
            .await
    }

    async fn save(&self, state: &InstanceState) -> Result<(), ServerError> {
        let st = state.clone();
        let completed = to_json(&st.completed_steps)?;
        let payloads = to_json(&st.step_payloads)?;
        let step_times = to_json(&st.step_updated_at)?;

        let changed = self
            .db
            .with_conn_async(move |conn| {
                if st.version == 1 {
                    conn.execute(
                        "INSERT INTO workflow_instances
                           (subject_id, completed_steps, step_payloads, step_updated_at,
                            version, created_at, updated_at)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                         ON CONFLICT(subject_id) DO NOTHING",
                        rusqlite::params![
                            st.subject_id,
                            completed,
                            payloads,
                            step_times,
                            st.version,
                            st.created_at.timestamp_millis(),
                            st.updated_at.timestamp_millis(),
                        ],
                    )
                } else {
                    conn.execute(
                        "UPDATE workflow_instances SET
                           completed_steps = ?1,
                           step_payloads = ?2,
                           step_updated_at = ?3,
                           version = ?4,
                           updated_at = ?5
                         WHERE subject_id = ?6 AND version = ?7",
                        rusqlite::params![
                            completed,
                            payloads,
                            step_times,
                            st.version,
                            st.updated_at.timestamp_millis(),
                            st.subject_id,
                            st.version - 1,
                        ],
                    )
                }
            })
            .await?;

        if changed == 0 {
            return Err(conflict(state));
        }
        Ok(())
    }

    async fn list(&self) -> Result<Vec<InstanceState>, ServerError> {
        self.db
            .with_conn_async(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT subject_id, completed_steps, step_payloads, step_updated_at,
                            version, created_at, updated_at
                     FROM workflow_instances ORDER BY updated_at DESC",
                )?;
                let rows = stmt
                    .query_map([], row_to_instance)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, ServerError> {
    serde_json::to_string(value)
        .map_err(|e| ServerError::Internal(format!("Failed to serialize instance state: {}", e)))
}

fn from_json<T: serde::de::DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    serde_json::from_str(&raw).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn row_to_instance(row: &Row<'_>) -> rusqlite::Result<InstanceState> {
    let created_ms: i64 = row.get(5)?;
    let updated_ms: i64 = row.get(6)?;

    Ok(InstanceState {
        subject_id: row.get(0)?,
        completed_steps: from_json(row, 1)?,
        step_payloads: from_json(row, 2)?,
        step_updated_at: from_json(row, 3)?,
        version: row.get(4)?,
        created_at: chrono::DateTime::from_timestamp_millis(created_ms)
            .unwrap_or_else(Utc::now),
        updated_at: chrono::DateTime::from_timestamp_millis(updated_ms)
            .unwrap_or_else(Utc::now),
    })
}
