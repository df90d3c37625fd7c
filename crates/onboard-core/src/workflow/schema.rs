//! YAML schema types for workflow definitions.
//!
//! A workflow YAML declares the ordered steps and the rules each step's
//! payload must satisfy:
//!
//! ```yaml
//! name: "onboarding"
//! description: "Account onboarding"
//! version: "1.0"
//!
//! steps:
//!   - name: "userInfo"
//!     fields:
//!       - { name: firstName, type: string, required: true }
//!       - { name: email, type: email, required: true }
//!
//!   - name: "newsletter"
//!     required: false
//!
//!   - name: "payment"
//!     payment:
//!       currency: "usd"
//!     fields:
//!       - { name: planId, type: string, required: true }
//! ```
//!
//! `WorkflowSchema::build` turns the schema into a runtime
//! `WorkflowDefinition`.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::DefinitionError;
use crate::payment::{PaymentConfig, PaymentProvider, PaymentStepValidator};
use crate::workflow::definition::{WorkflowDefinition, WorkflowStep};
use crate::workflow::validation::{FieldRule, FieldRulesValidator, StepValidator};

/// Top-level workflow definition loaded from a YAML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowSchema {
    /// Workflow name
    pub name: String,

    /// Optional description
    #[serde(default)]
    pub description: Option<String>,

    /// Version string
    #[serde(default = "default_version")]
    pub version: String,

    /// Ordered list of workflow steps
    pub steps: Vec<StepSchema>,
}

fn default_version() -> String {
    "1.0".to_string()
}

/// A single step in the workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepSchema {
    /// Step name (unique within the workflow)
    pub name: String,

    /// Whether the step must be completed before later steps and for completion
    #[serde(default = "default_required")]
    pub required: bool,

    #[serde(default)]
    pub description: Option<String>,

    /// Field rules for the step payload
    #[serde(default)]
    pub fields: Vec<FieldRule>,

    /// Present when the step creates a payment intent
    #[serde(default)]
    pub payment: Option<PaymentConfig>,
}

fn default_required() -> bool {
    true
}

impl WorkflowSchema {
    /// Parse a workflow schema from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self, DefinitionError> {
        serde_yaml::from_str(yaml).map_err(|e| DefinitionError::Parse(e.to_string()))
    }

    /// Load a workflow schema from a file path.
    pub fn from_file(path: &str) -> Result<Self, DefinitionError> {
        let content = std::fs::read_to_string(path).map_err(|e| DefinitionError::Io {
            path: path.to_string(),
            reason: e.to_string(),
        })?;
        Self::from_yaml(&content)
    }

    /// Build the runtime definition. `provider` backs any payment steps.
    pub fn build(
        self,
        provider: Option<Arc<dyn PaymentProvider>>,
    ) -> Result<WorkflowDefinition, DefinitionError> {
        let mut steps = Vec::with_capacity(self.steps.len());

        for step in self.steps {
            for rule in &step.fields {
                rule.check().map_err(|reason| DefinitionError::InvalidRule {
                    step: step.name.clone(),
                    reason,
                })?;
            }

            let validator: Arc<dyn StepValidator> = match step.payment {
                Some(config) => {
                    let provider = provider
                        .clone()
                        .ok_or_else(|| DefinitionError::MissingPaymentProvider(step.name.clone()))?;
                    Arc::new(PaymentStepValidator::new(provider, config, step.fields))
                }
                None => Arc::new(FieldRulesValidator::new(step.fields)),
            };

            let mut built = WorkflowStep::new(step.name, validator);
            if !step.required {
                built = built.optional();
            }
            if let Some(description) = step.description {
                built = built.with_description(description);
            }
            steps.push(built);
        }

        WorkflowDefinition::new(self.name, steps)
    }
}
