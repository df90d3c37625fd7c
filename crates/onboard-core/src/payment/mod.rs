//! Payment provider integration.
//!
//! The engine never talks to a payment processor directly. A step that needs a
//! charge uses `PaymentStepValidator`, which checks the amount/currency fields
//! and, once the submission is otherwise admissible, asks a `PaymentProvider`
//! to create a payment intent. The intent id
//! and client secret are recorded with the step payload so the front end can
//! confirm the payment with the processor.

pub mod mock;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::workflow::validation::{
    check_fields, FieldError, FieldKind, FieldRule, StepContext, StepRejection, StepValidator,
};

pub use mock::MockPaymentProvider;

/// A created (unconfirmed) payment intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntent {
    pub intent_id: String,
    pub client_secret: String,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProviderError {
    #[error("Payment declined: {0}")]
    Declined(String),

    #[error("Payment provider unavailable: {0}")]
    Unavailable(String),
}

/// Metadata key identifying one submission attempt. Providers should return
/// the same intent when they see a key again.
pub const IDEMPOTENCY_KEY: &str = "idempotencyKey";

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    /// Create a payment intent for `amount` minor units of `currency`.
    async fn create_intent(
        &self,
        amount: i64,
        currency: &str,
        metadata: HashMap<String, String>,
    ) -> Result<PaymentIntent, ProviderError>;
}

/// Settings for a payment-backed step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentConfig {
    /// Payload field carrying the amount in minor units
    #[serde(default = "default_amount_field")]
    pub amount_field: String,

    /// Payload field carrying the ISO currency code
    #[serde(default = "default_currency_field")]
    pub currency_field: String,

    /// Currency used when the payload omits one
    #[serde(default = "default_currency")]
    pub currency: String,
}

fn default_amount_field() -> String {
    "amount".to_string()
}

fn default_currency_field() -> String {
    "currency".to_string()
}

fn default_currency() -> String {
    "usd".to_string()
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            amount_field: default_amount_field(),
            currency_field: default_currency_field(),
            currency: default_currency(),
        }
    }
}

/// Validator for a step that creates a payment intent once its fields check out.
pub struct PaymentStepValidator {
    provider: Arc<dyn PaymentProvider>,
    config: PaymentConfig,
    rules: Vec<FieldRule>,
}

impl PaymentStepValidator {
    /// `extra_rules` are checked alongside the amount and currency fields.
    pub fn new(
        provider: Arc<dyn PaymentProvider>,
        config: PaymentConfig,
        extra_rules: Vec<FieldRule>,
    ) -> Self {
        let mut rules = vec![
            FieldRule::new(&config.amount_field, FieldKind::Integer)
                .required()
                .min(1.0),
            FieldRule::new(&config.currency_field, FieldKind::String)
                .min_length(3)
                .max_length(3),
        ];
        rules.extend(
            extra_rules
                .into_iter()
                .filter(|r| r.name != config.amount_field && r.name != config.currency_field),
        );
        Self {
            provider,
            config,
            rules,
        }
    }
}

impl PaymentStepValidator {
    fn amount(&self, payload: &Value) -> Result<i64, StepRejection> {
        payload[&self.config.amount_field].as_i64().ok_or_else(|| {
            StepRejection::Fields(vec![FieldError::new(
                &self.config.amount_field,
                "is out of range",
            )])
        })
    }
}

#[async_trait]
impl StepValidator for PaymentStepValidator {
    fn check(&self, _ctx: StepContext<'_>, payload: &Value) -> Result<(), StepRejection> {
        check_fields(&self.rules, payload).map_err(StepRejection::Fields)?;
        self.amount(payload).map(|_| ())
    }

    async fn accept(&self, ctx: StepContext<'_>, payload: Value) -> Result<Value, StepRejection> {
        let amount = self.amount(&payload)?;
        let currency = payload[&self.config.currency_field]
            .as_str()
            .unwrap_or(&self.config.currency)
            .to_lowercase();

        let metadata = HashMap::from([
            ("subjectId".to_string(), ctx.subject_id.to_string()),
            ("step".to_string(), ctx.step.to_string()),
            (IDEMPOTENCY_KEY.to_string(), ctx.idempotency_key()),
        ]);

        let intent = self
            .provider
            .create_intent(amount, &currency, metadata)
            .await
            .map_err(|e| {
                tracing::warn!(
                    subject_id = ctx.subject_id,
                    step = ctx.step,
                    "payment provider rejected intent: {}",
                    e
                );
                StepRejection::Provider(e.to_string())
            })?;

        let mut accepted = payload;
        if let Some(obj) = accepted.as_object_mut() {
            obj.insert(self.config.currency_field.clone(), Value::String(currency));
            obj.insert("intentId".to_string(), Value::String(intent.intent_id));
            obj.insert("clientSecret".to_string(), Value::String(intent.client_secret));
        }
        Ok(accepted)
    }
}
