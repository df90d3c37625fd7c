//! Workflow engine — ordered, resumable multi-step processes.
//!
//! # Architecture
//!
//! ```text
//! workflow.yaml ──► WorkflowSchema ──► WorkflowDefinition ──► WorkflowEngine
//!                                        (steps + validators)      │
//!                                                                   ├──► ProfileStore
//!                                          PaymentStepValidator ────┴──► PaymentProvider
//! ```

pub mod definition;
pub mod engine;
pub mod onboarding;
pub mod schema;
pub mod validation;

pub use definition::{DefinitionSummary, StepSummary, WorkflowDefinition, WorkflowStep};
pub use engine::WorkflowEngine;
pub use onboarding::onboarding_definition;
pub use schema::{StepSchema, WorkflowSchema};
pub use validation::{
    AcceptAll, FieldError, FieldKind, FieldRule, FieldRulesValidator, StepContext, StepRejection,
    StepValidator,
};
