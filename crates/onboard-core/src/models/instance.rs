use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Derived progress status of a workflow instance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStatus {
    NotStarted,
    InProgress,
    Complete,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "NOT_STARTED",
            Self::InProgress => "IN_PROGRESS",
            Self::Complete => "COMPLETE",
        }
    }
}

impl std::str::FromStr for WorkflowStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "NOT_STARTED" => Ok(Self::NotStarted),
            "IN_PROGRESS" => Ok(Self::InProgress),
            "COMPLETE" => Ok(Self::Complete),
            other => Err(format!(
                "unknown status '{}' (expected NOT_STARTED, IN_PROGRESS or COMPLETE)",
                other
            )),
        }
    }
}

impl std::fmt::Display for WorkflowStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted progress of one subject through a workflow definition.
///
/// `completed_steps` keeps completion order and never holds duplicates.
/// Status and current step are derived from it against the definition and
/// are not stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceState {
    pub subject_id: String,
    pub completed_steps: Vec<String>,
    #[serde(default)]
    pub step_payloads: HashMap<String, Value>,
    #[serde(default)]
    pub step_updated_at: HashMap<String, DateTime<Utc>>,
    /// Number of committed writes; the store rejects saves that skip or repeat a version.
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl InstanceState {
    pub fn new(subject_id: String) -> Self {
        let now = Utc::now();
        Self {
            subject_id,
            completed_steps: Vec::new(),
            step_payloads: HashMap::new(),
            step_updated_at: HashMap::new(),
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_completed(&self, step: &str) -> bool {
        self.completed_steps.iter().any(|s| s == step)
    }

    /// Record an accepted payload for `step`.
    ///
    /// Returns `true` if the step was newly completed, `false` if this was a
    /// resubmission that only replaced the payload.
    pub fn record(&mut self, step: &str, payload: Value) -> bool {
        let now = Utc::now();
        let newly_completed = !self.is_completed(step);
        if newly_completed {
            self.completed_steps.push(step.to_string());
        }
        self.step_payloads.insert(step.to_string(), payload);
        self.step_updated_at.insert(step.to_string(), now);
        self.touch(now);
        newly_completed
    }

    /// Clear all progress, keeping identity and creation time.
    pub fn reset(&mut self) {
        self.completed_steps.clear();
        self.step_payloads.clear();
        self.step_updated_at.clear();
        self.touch(Utc::now());
    }

    fn touch(&mut self, now: DateTime<Utc>) {
        self.version += 1;
        self.updated_at = now;
    }
}

/// Read-only view returned by status queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStatusView {
    pub subject_id: String,
    pub status: WorkflowStatus,
    pub current_step: Option<String>,
    pub completed_steps: Vec<String>,
    pub remaining_steps: Vec<String>,
}

/// Outcome of an accepted step submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResult {
    pub success: bool,
    pub step: String,
    pub status: WorkflowStatus,
    pub next_step: Option<String>,
    /// `false` when the submission replaced the payload of an already-completed step
    pub newly_completed: bool,
}
