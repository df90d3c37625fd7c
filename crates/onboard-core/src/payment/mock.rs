//! In-process payment provider used by the default deployment and tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{PaymentIntent, PaymentProvider, ProviderError, IDEMPOTENCY_KEY};

/// A payment intent recorded by `MockPaymentProvider`.
#[derive(Debug, Clone)]
pub struct RecordedIntent {
    pub intent: PaymentIntent,
    pub amount: i64,
    pub currency: String,
    pub metadata: HashMap<String, String>,
}

/// Creates fake intents without contacting a processor.
///
/// A repeated `idempotencyKey` returns the intent created the first time.
///
/// Optionally declines any amount above a threshold, which lets tests exercise
/// the provider-rejection path.
#[derive(Default)]
pub struct MockPaymentProvider {
    decline_above: Option<i64>,
    intents: Mutex<Vec<RecordedIntent>>,
}

impl MockPaymentProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declining_above(limit: i64) -> Self {
        Self {
            decline_above: Some(limit),
            intents: Mutex::new(Vec::new()),
        }
    }

    /// Snapshot of all intents created so far.
    pub fn intents(&self) -> Vec<RecordedIntent> {
        self.intents
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl PaymentProvider for MockPaymentProvider {
    async fn create_intent(
        &self,
        amount: i64,
        currency: &str,
        metadata: HashMap<String, String>,
    ) -> Result<PaymentIntent, ProviderError> {
        if let Some(limit) = self.decline_above {
            if amount > limit {
                return Err(ProviderError::Declined(format!(
                    "amount {} {} exceeds limit {}",
                    amount, currency, limit
                )));
            }
        }

        let mut intents = self
            .intents
            .lock()
            .map_err(|e| ProviderError::Unavailable(format!("Lock poisoned: {}", e)))?;

        if let Some(key) = metadata.get(IDEMPOTENCY_KEY) {
            if let Some(existing) = intents
                .iter()
                .find(|r| r.metadata.get(IDEMPOTENCY_KEY) == Some(key))
            {
                tracing::debug!("mock payment intent {} replayed for key {}", existing.intent.intent_id, key);
                return Ok(existing.intent.clone());
            }
        }

        let id = uuid::Uuid::new_v4().simple().to_string();
        let intent = PaymentIntent {
            intent_id: format!("pi_{}", id),
            client_secret: format!("pi_{}_secret_mock", id),
        };

        tracing::debug!("mock payment intent {} created for {} {}", intent.intent_id, amount, currency);

        intents.push(RecordedIntent {
            intent: intent.clone(),
            amount,
            currency: currency.to_string(),
            metadata,
        });

        Ok(intent)
    }
}
