//! Runtime workflow definition: an ordered, immutable list of steps.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::error::DefinitionError;
use crate::models::instance::{InstanceState, WorkflowStatus, WorkflowStatusView};
use crate::workflow::validation::{AcceptAll, StepValidator};

/// One named stage of a workflow.
#[derive(Clone)]
pub struct WorkflowStep {
    name: String,
    required: bool,
    description: Option<String>,
    validator: Arc<dyn StepValidator>,
}

impl WorkflowStep {
    /// A required step validated by `validator`.
    pub fn new(name: impl Into<String>, validator: Arc<dyn StepValidator>) -> Self {
        Self {
            name: name.into(),
            required: true,
            description: None,
            validator,
        }
    }

    /// A required step that accepts any payload.
    pub fn accept_all(name: impl Into<String>) -> Self {
        Self::new(name, Arc::new(AcceptAll))
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_required(&self) -> bool {
        self.required
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn validator(&self) -> &dyn StepValidator {
        self.validator.as_ref()
    }
}

impl fmt::Debug for WorkflowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkflowStep")
            .field("name", &self.name)
            .field("required", &self.required)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Serializable description of a definition, without validators.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DefinitionSummary {
    pub name: String,
    pub steps: Vec<StepSummary>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepSummary {
    pub name: String,
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Ordered sequence of steps, fixed at construction.
#[derive(Debug, Clone)]
pub struct WorkflowDefinition {
    name: String,
    steps: Vec<WorkflowStep>,
}

impl WorkflowDefinition {
    /// Build a definition, rejecting empty, unnamed, or duplicate steps and
    /// definitions without any required step.
    pub fn new(name: impl Into<String>, steps: Vec<WorkflowStep>) -> Result<Self, DefinitionError> {
        if steps.is_empty() {
            return Err(DefinitionError::Empty);
        }

        let mut seen = HashSet::new();
        for (index, step) in steps.iter().enumerate() {
            if step.name.trim().is_empty() {
                return Err(DefinitionError::EmptyStepName(index));
            }
            if !seen.insert(step.name.as_str()) {
                return Err(DefinitionError::DuplicateStep(step.name.clone()));
            }
        }

        if !steps.iter().any(|s| s.required) {
            return Err(DefinitionError::NoRequiredSteps);
        }

        Ok(Self {
            name: name.into(),
            steps,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn steps(&self) -> &[WorkflowStep] {
        &self.steps
    }

    pub fn step(&self, name: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.name == name)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.name == name)
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn status_of(&self, state: &InstanceState) -> WorkflowStatus {
        if state.completed_steps.is_empty() {
            WorkflowStatus::NotStarted
        } else if self
            .steps
            .iter()
            .filter(|s| s.required)
            .all(|s| state.is_completed(&s.name))
        {
            WorkflowStatus::Complete
        } else {
            WorkflowStatus::InProgress
        }
    }

    /// First step not yet completed; `None` once the workflow is complete.
    pub fn current_step(&self, state: &InstanceState) -> Option<&str> {
        if self.status_of(state) == WorkflowStatus::Complete {
            return None;
        }
        self.steps
            .iter()
            .find(|s| !state.is_completed(&s.name))
            .map(|s| s.name.as_str())
    }

    /// Steps not yet completed, in definition order.
    pub fn remaining_steps(&self, state: &InstanceState) -> Vec<&str> {
        self.steps
            .iter()
            .filter(|s| !state.is_completed(&s.name))
            .map(|s| s.name.as_str())
            .collect()
    }

    /// First required step before `index` that `state` has not completed.
    pub fn first_missing_prerequisite(&self, state: &InstanceState, index: usize) -> Option<&str> {
        self.steps
            .iter()
            .take(index)
            .find(|s| s.required && !state.is_completed(&s.name))
            .map(|s| s.name.as_str())
    }

    pub fn view(&self, state: &InstanceState) -> WorkflowStatusView {
        WorkflowStatusView {
            subject_id: state.subject_id.clone(),
            status: self.status_of(state),
            current_step: self.current_step(state).map(str::to_string),
            completed_steps: state.completed_steps.clone(),
            remaining_steps: self
                .remaining_steps(state)
                .into_iter()
                .map(str::to_string)
                .collect(),
        }
    }

    pub fn summary(&self) -> DefinitionSummary {
        DefinitionSummary {
            name: self.name.clone(),
            steps: self
                .steps
                .iter()
                .map(|s| StepSummary {
                    name: s.name.clone(),
                    required: s.required,
                    description: s.description.clone(),
                })
                .collect(),
        }
    }
}
