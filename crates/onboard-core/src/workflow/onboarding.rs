//! Built-in onboarding flow: `userInfo → additionalDetails → payment → complete`.

use std::sync::Arc;

use serde_json::json;

use crate::error::DefinitionError;
use crate::payment::{PaymentConfig, PaymentProvider, PaymentStepValidator};
use crate::workflow::definition::{WorkflowDefinition, WorkflowStep};
use crate::workflow::validation::{FieldKind, FieldRule, FieldRulesValidator};

pub const ONBOARDING_WORKFLOW: &str = "onboarding";

pub fn onboarding_definition(
    provider: Arc<dyn PaymentProvider>,
) -> Result<WorkflowDefinition, DefinitionError> {
    let user_info = FieldRulesValidator::new(vec![
        FieldRule::new("firstName", FieldKind::String).required().min_length(1).max_length(100),
        FieldRule::new("lastName", FieldKind::String).required().min_length(1).max_length(100),
        FieldRule::new("email", FieldKind::Email).required(),
    ]);

    let additional_details = FieldRulesValidator::new(vec![
        FieldRule::new("country", FieldKind::String).required().min_length(2).max_length(2),
        FieldRule::new("phone", FieldKind::String).max_length(32),
        FieldRule::new("company", FieldKind::String).max_length(200),
        FieldRule::new("interests", FieldKind::Array),
    ]);

    let payment = PaymentStepValidator::new(
        provider,
        PaymentConfig::default(),
        vec![FieldRule::new("planId", FieldKind::String).required().min_length(1)],
    );

    let complete = FieldRulesValidator::new(vec![FieldRule::new("acceptedTerms", FieldKind::Boolean)
        .required()
        .equals(json!(true))]);

    WorkflowDefinition::new(
        ONBOARDING_WORKFLOW,
        vec![
            WorkflowStep::new("userInfo", Arc::new(user_info))
                .with_description("Name and contact email"),
            WorkflowStep::new("additionalDetails", Arc::new(additional_details))
                .with_description("Country, phone, company, interests"),
            WorkflowStep::new("payment", Arc::new(payment))
                .with_description("Plan selection and payment intent"),
            WorkflowStep::new("complete", Arc::new(complete))
                .with_description("Terms acceptance"),
        ],
    )
}
