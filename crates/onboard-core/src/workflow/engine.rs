//! Workflow engine — ordered, resumable, idempotent step submission.
//!
//! The engine holds one immutable `WorkflowDefinition` and delegates all
//! state to a `ProfileStore`. Mutations (`submit_step`, `reset_workflow`) are
//! serialized per subject by an async lock; different subjects never contend.
//! Status reads take no lock and see whatever record the store last committed.
//!
//! A submission either commits a single new version of the subject's state
//! or fails before anything is written.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::error::WorkflowError;
use crate::models::instance::{InstanceState, SubmitResult, WorkflowStatus, WorkflowStatusView};
use crate::store::ProfileStore;
use crate::workflow::definition::WorkflowDefinition;
use crate::workflow::validation::{StepContext, StepRejection};

pub struct WorkflowEngine {
    definition: Arc<WorkflowDefinition>,
    store: Arc<dyn ProfileStore>,
    locks: SubjectLocks,
}

impl WorkflowEngine {
    pub fn new(definition: Arc<WorkflowDefinition>, store: Arc<dyn ProfileStore>) -> Self {
        Self {
            definition,
            store,
            locks: SubjectLocks::default(),
        }
    }

    pub fn definition(&self) -> &WorkflowDefinition {
        &self.definition
    }

    /// Current progress of `subject_id`. Unknown subjects report `NOT_STARTED`
    /// without anything being persisted.
    pub async fn get_status(&self, subject_id: &str) -> Result<WorkflowStatusView, WorkflowError> {
        let state = self.load_or_new(subject_id).await?;
        Ok(self.definition.view(&state))
    }

    /// Submit `payload` for `step_name` on behalf of `subject_id`.
    pub async fn submit_step(
        &self,
        subject_id: &str,
        step_name: &str,
        payload: Value,
    ) -> Result<SubmitResult, WorkflowError> {
        let _guard = self.locks.acquire(subject_id).await;

        let mut state = self.load_or_new(subject_id).await?;

        let index = self
            .definition
            .position(step_name)
            .ok_or_else(|| WorkflowError::UnknownStep(step_name.to_string()))?;
        let step = &self.definition.steps()[index];

        let resubmission = state.is_completed(step_name);
        if !resubmission && self.definition.status_of(&state) == WorkflowStatus::Complete {
            tracing::debug!(subject_id, step = step_name, "rejected: workflow already complete");
            return Err(WorkflowError::WorkflowAlreadyComplete(step_name.to_string()));
        }

        let ctx = StepContext {
            subject_id,
            step: step_name,
            version: state.version + 1,
        };
        let validator = step.validator();
        validator
            .check(ctx, &payload)
            .map_err(|rejection| rejection_error(ctx, rejection))?;

        if !resubmission {
            if let Some(missing) = self.definition.first_missing_prerequisite(&state, index) {
                tracing::debug!(subject_id, step = step_name, missing, "rejected: out of order");
                return Err(WorkflowError::OutOfOrder {
                    step: step_name.to_string(),
                    missing: missing.to_string(),
                });
            }
        }

        // Side effects (payment intents) only for admissible submissions.
        let accepted = validator
            .accept(ctx, payload)
            .await
            .map_err(|rejection| rejection_error(ctx, rejection))?;

        let newly_completed = state.record(step_name, accepted);
        self.store.save(&state).await.map_err(|e| {
            tracing::warn!(subject_id, step = step_name, "failed to persist submission: {}", e);
            WorkflowError::from(e)
        })?;

        let status = self.definition.status_of(&state);
        let next_step = self.definition.current_step(&state).map(str::to_string);

        tracing::info!(
            subject_id,
            step = step_name,
            status = %status,
            version = state.version,
            newly_completed,
            "step accepted"
        );

        Ok(SubmitResult {
            success: true,
            step: step_name.to_string(),
            status,
            next_step,
            newly_completed,
        })
    }

    /// Administrative reset back to `NOT_STARTED`. Not part of the public API.
    pub async fn reset_workflow(&self, subject_id: &str) -> Result<WorkflowStatusView, WorkflowError> {
        let _guard = self.locks.acquire(subject_id).await;

        let Some(mut state) = self.store.load(subject_id).await? else {
            return Ok(self.definition.view(&InstanceState::new(subject_id.to_string())));
        };

        let cleared = state.completed_steps.len();
        state.reset();
        self.store.save(&state).await?;

        tracing::warn!(subject_id, cleared, version = state.version, "workflow reset");
        Ok(self.definition.view(&state))
    }

    /// Last accepted payload for a step, if any.
    pub async fn get_payload(
        &self,
        subject_id: &str,
        step_name: &str,
    ) -> Result<Option<Value>, WorkflowError> {
        if self.definition.position(step_name).is_none() {
            return Err(WorkflowError::UnknownStep(step_name.to_string()));
        }
        let state = self.load_or_new(subject_id).await?;
        Ok(state.step_payloads.get(step_name).cloned())
    }

    /// Status of every stored subject, most recently updated first.
    pub async fn list_statuses(&self) -> Result<Vec<WorkflowStatusView>, WorkflowError> {
        let all = self.store.list().await?;
        Ok(all.iter().map(|s| self.definition.view(s)).collect())
    }

    async fn load_or_new(&self, subject_id: &str) -> Result<InstanceState, WorkflowError> {
        Ok(self
            .store
            .load(subject_id)
            .await?
            .unwrap_or_else(|| InstanceState::new(subject_id.to_string())))
    }
}

fn rejection_error(ctx: StepContext<'_>, rejection: StepRejection) -> WorkflowError {
    tracing::debug!(subject_id = ctx.subject_id, step = ctx.step, "rejected: {:?}", rejection);
    let step = ctx.step.to_string();
    match rejection {
        StepRejection::Fields(errors) => WorkflowError::ValidationFailed { step, errors },
        StepRejection::Provider(message) => WorkflowError::PaymentRejected { step, message },
    }
}

/// Per-subject async locks, created on demand and dropped when idle.
#[derive(Default)]
struct SubjectLocks {
    inner: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl SubjectLocks {
    async fn acquire(&self, subject_id: &str) -> SubjectGuard<'_> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            map.entry(subject_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        let guard = lock.lock_owned().await;
        SubjectGuard {
            locks: self,
            subject_id: subject_id.to_string(),
            guard: Some(guard),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().map(|m| m.len()).unwrap_or_default()
    }
}

struct SubjectGuard<'a> {
    locks: &'a SubjectLocks,
    subject_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for SubjectGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut map = self.locks.inner.lock().unwrap_or_else(|e| e.into_inner());
        // Only the map itself still references the lock: nobody holds or waits on it.
        if map
            .get(&self.subject_id)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            map.remove(&self.subject_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payment::MockPaymentProvider;
    use crate::store::InMemoryProfileStore;
    use crate::workflow::definition::WorkflowStep;
    use crate::workflow::onboarding::onboarding_definition;
    use serde_json::json;

    fn plain_definition() -> Arc<WorkflowDefinition> {
        Arc::new(
            WorkflowDefinition::new(
                "onboarding",
                vec![
                    WorkflowStep::accept_all("userInfo"),
                    WorkflowStep::accept_all("additionalDetails"),
                    WorkflowStep::accept_all("payment"),
                    WorkflowStep::accept_all("complete"),
                ],
            )
            .unwrap(),
        )
    }

    fn engine_with(definition: Arc<WorkflowDefinition>) -> (WorkflowEngine, Arc<InMemoryProfileStore>) {
        let store = Arc::new(InMemoryProfileStore::new());
        (WorkflowEngine::new(definition, store.clone()), store)
    }

    #[tokio::test]
    async fn test_unknown_subject_is_not_started() {
        let (engine, store) = engine_with(plain_definition());
        let view = engine.get_status("nobody").await.unwrap();
        assert_eq!(view.status, WorkflowStatus::NotStarted);
        assert!(view.completed_steps.is_empty());
        assert_eq!(view.current_step.as_deref(), Some("userInfo"));
        assert_eq!(view.remaining_steps.len(), 4);
        // Status queries never persist anything.
        assert!(store.load("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_onboarding_scenario() {
        let (engine, _) = engine_with(plain_definition());

        let res = engine.submit_step("u1", "userInfo", json!({})).await.unwrap();
        assert_eq!(res.status, WorkflowStatus::InProgress);
        assert_eq!(res.next_step.as_deref(), Some("additionalDetails"));

        let err = engine.submit_step("u1", "payment", json!({})).await.unwrap_err();
        assert_eq!(
            err,
            WorkflowError::OutOfOrder {
                step: "payment".to_string(),
                missing: "additionalDetails".to_string(),
            }
        );

        engine.submit_step("u1", "additionalDetails", json!({})).await.unwrap();
        engine.submit_step("u1", "payment", json!({})).await.unwrap();
        let res = engine.submit_step("u1", "complete", json!({})).await.unwrap();
        assert_eq!(res.status, WorkflowStatus::Complete);
        assert_eq!(res.next_step, None);

        let view = engine.get_status("u1").await.unwrap();
        assert_eq!(view.status, WorkflowStatus::Complete);
        assert_eq!(view.current_step, None);
        assert!(view.remaining_steps.is_empty());
        assert_eq!(
            view.completed_steps,
            vec!["userInfo", "additionalDetails", "payment", "complete"]
        );
    }

    #[tokio::test]
    async fn test_out_of_order_leaves_state_unchanged() {
        let (engine, store) = engine_with(plain_definition());
        engine.submit_step("u1", "userInfo", json!({})).await.unwrap();
        let before = store.load("u1").await.unwrap().unwrap();

        assert!(engine.submit_step("u1", "complete", json!({})).await.is_err());

        let after = store.load("u1").await.unwrap().unwrap();
        assert_eq!(before, after);
        let view = engine.get_status("u1").await.unwrap();
        assert_eq!(view.completed_steps, vec!["userInfo"]);
    }

    #[tokio::test]
    async fn test_first_step_out_of_order_names_first_missing() {
        let (engine, _) = engine_with(plain_definition());
        let err = engine.submit_step("u1", "complete", json!({})).await.unwrap_err();
        assert!(matches!(err, WorkflowError::OutOfOrder { missing, .. } if missing == "userInfo"));
    }

    #[tokio::test]
    async fn test_resubmission_updates_payload_only() {
        let (engine, _) = engine_with(plain_definition());
        engine.submit_step("u1", "userInfo", json!({ "v": 1 })).await.unwrap();
        engine.submit_step("u1", "additionalDetails", json!({})).await.unwrap();

        let res = engine.submit_step("u1", "userInfo", json!({ "v": 2 })).await.unwrap();
        assert!(!res.newly_completed);
        assert_eq!(res.next_step.as_deref(), Some("payment"));

        let view = engine.get_status("u1").await.unwrap();
        assert_eq!(view.completed_steps, vec!["userInfo", "additionalDetails"]);
        let payload = engine.get_payload("u1", "userInfo").await.unwrap().unwrap();
        assert_eq!(payload, json!({ "v": 2 }));
    }

    #[tokio::test]
    async fn test_complete_workflow_is_terminal() {
        let definition = Arc::new(
            WorkflowDefinition::new(
                "short",
                vec![
                    WorkflowStep::accept_all("userInfo"),
                    WorkflowStep::accept_all("newsletter").optional(),
                ],
            )
            .unwrap(),
        );
        let (engine, _) = engine_with(definition);
        let res = engine.submit_step("u1", "userInfo", json!({})).await.unwrap();
        assert_eq!(res.status, WorkflowStatus::Complete);

        let err = engine.submit_step("u1", "newsletter", json!({})).await.unwrap_err();
        assert_eq!(err, WorkflowError::WorkflowAlreadyComplete("newsletter".to_string()));

        // Resubmitting a completed step is still allowed.
        let res = engine.submit_step("u1", "userInfo", json!({ "again": true })).await.unwrap();
        assert_eq!(res.status, WorkflowStatus::Complete);
    }

    #[tokio::test]
    async fn test_optional_step_can_be_skipped() {
        let definition = Arc::new(
            WorkflowDefinition::new(
                "with-optional",
                vec![
                    WorkflowStep::accept_all("userInfo"),
                    WorkflowStep::accept_all("newsletter").optional(),
                    WorkflowStep::accept_all("complete"),
                ],
            )
            .unwrap(),
        );
        let (engine, _) = engine_with(definition);
        engine.submit_step("u1", "userInfo", json!({})).await.unwrap();
        let res = engine.submit_step("u1", "complete", json!({})).await.unwrap();
        assert_eq!(res.status, WorkflowStatus::Complete);

        let view = engine.get_status("u1").await.unwrap();
        assert_eq!(view.current_step, None);
        assert_eq!(view.remaining_steps, vec!["newsletter"]);
    }

    #[tokio::test]
    async fn test_unknown_step() {
        let (engine, _) = engine_with(plain_definition());
        let err = engine.submit_step("u1", "bogus", json!({})).await.unwrap_err();
        assert_eq!(err, WorkflowError::UnknownStep("bogus".to_string()));
        assert!(engine.get_payload("u1", "bogus").await.is_err());
    }

    #[tokio::test]
    async fn test_validation_failure_is_reported_before_ordering() {
        let provider = Arc::new(MockPaymentProvider::new());
        let definition = Arc::new(onboarding_definition(provider).unwrap());
        let (engine, store) = engine_with(definition);

        let err = engine
            .submit_step("u1", "userInfo", json!({ "firstName": "Ada" }))
            .await
            .unwrap_err();
        match err {
            WorkflowError::ValidationFailed { step, errors } => {
                assert_eq!(step, "userInfo");
                let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
                assert_eq!(fields, vec!["lastName", "email"]);
            }
            other => panic!("expected ValidationFailed, got {:?}", other),
        }
        assert!(store.load("u1").await.unwrap().is_none());

        // Invalid and out of order: validation wins.
        let err = engine.submit_step("u1", "complete", json!({})).await.unwrap_err();
        assert!(matches!(err, WorkflowError::ValidationFailed { .. }));
    }

    #[tokio::test]
    async fn test_payment_rejection_is_distinct_from_field_errors() {
        let provider = Arc::new(MockPaymentProvider::declining_above(10_000));
        let definition = Arc::new(onboarding_definition(provider).unwrap());
        let (engine, _) = engine_with(definition);

        engine
            .submit_step(
                "u1",
                "userInfo",
                json!({ "firstName": "Ada", "lastName": "Lovelace", "email": "ada@example.com" }),
            )
            .await
            .unwrap();
        engine
            .submit_step("u1", "additionalDetails", json!({ "country": "GB" }))
            .await
            .unwrap();

        let err = engine
            .submit_step("u1", "payment", json!({ "planId": "pro", "amount": 50_000 }))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::PaymentRejected { ref step, .. } if step == "payment"));

        let res = engine
            .submit_step("u1", "payment", json!({ "planId": "basic", "amount": 900 }))
            .await
            .unwrap();
        assert_eq!(res.next_step.as_deref(), Some("complete"));
        let payload = engine.get_payload("u1", "payment").await.unwrap().unwrap();
        assert!(payload["intentId"].as_str().unwrap().starts_with("pi_"));
    }

    async fn onboard_through_details(engine: &WorkflowEngine, subject_id: &str) {
        engine
            .submit_step(
                subject_id,
                "userInfo",
                json!({ "firstName": "Ada", "lastName": "Lovelace", "email": "ada@example.com" }),
            )
            .await
            .unwrap();
        engine
            .submit_step(subject_id, "additionalDetails", json!({ "country": "GB" }))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_out_of_order_payment_creates_no_intent() {
        let provider = Arc::new(MockPaymentProvider::new());
        let definition = Arc::new(onboarding_definition(provider.clone()).unwrap());
        let (engine, _) = engine_with(definition);

        let err = engine
            .submit_step("u1", "payment", json!({ "planId": "pro", "amount": 900 }))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::OutOfOrder { ref missing, .. } if missing == "userInfo"));
        assert!(provider.intents().is_empty());
    }

    #[tokio::test]
    async fn test_oversized_amount_is_rejected_without_charging() {
        let provider = Arc::new(MockPaymentProvider::new());
        let definition = Arc::new(onboarding_definition(provider.clone()).unwrap());
        let (engine, _) = engine_with(definition);
        onboard_through_details(&engine, "u1").await;

        let payload: Value =
            serde_json::from_str(r#"{"planId": "pro", "amount": 18446744073709551615}"#).unwrap();
        let err = engine.submit_step("u1", "payment", payload).await.unwrap_err();
        match err {
            WorkflowError::ValidationFailed { errors, .. } => {
                assert_eq!(errors[0].field, "amount");
                assert_eq!(errors[0].message, "is out of range");
            }
            other => panic!("expected ValidationFailed, got {:?}", other),
        }
        assert!(provider.intents().is_empty());
        let view = engine.get_status("u1").await.unwrap();
        assert_eq!(view.current_step.as_deref(), Some("payment"));
    }

    /// Store whose next `save` fails once.
    struct FlakySaves {
        inner: InMemoryProfileStore,
        fail_next: std::sync::atomic::AtomicBool,
    }

    #[async_trait::async_trait]
    impl ProfileStore for FlakySaves {
        async fn load(&self, subject_id: &str) -> Result<Option<InstanceState>, crate::error::ServerError> {
            self.inner.load(subject_id).await
        }

        async fn save(&self, state: &InstanceState) -> Result<(), crate::error::ServerError> {
            if self.fail_next.swap(false, std::sync::atomic::Ordering::SeqCst) {
                return Err(crate::error::ServerError::Database("disk I/O error".to_string()));
            }
            self.inner.save(state).await
        }

        async fn list(&self) -> Result<Vec<InstanceState>, crate::error::ServerError> {
            self.inner.list().await
        }
    }

    #[tokio::test]
    async fn test_retry_after_failed_save_reuses_intent() {
        let provider = Arc::new(MockPaymentProvider::new());
        let definition = Arc::new(onboarding_definition(provider.clone()).unwrap());
        let store = Arc::new(FlakySaves {
            inner: InMemoryProfileStore::new(),
            fail_next: std::sync::atomic::AtomicBool::new(false),
        });
        let engine = WorkflowEngine::new(definition, store.clone());
        onboard_through_details(&engine, "u1").await;

        let payload = json!({ "planId": "pro", "amount": 900 });
        store.fail_next.store(true, std::sync::atomic::Ordering::SeqCst);
        let err = engine.submit_step("u1", "payment", payload.clone()).await.unwrap_err();
        assert!(matches!(err, WorkflowError::StorageUnavailable(_)));

        engine.submit_step("u1", "payment", payload).await.unwrap();

        let intents = provider.intents();
        assert_eq!(intents.len(), 1);
        let recorded = engine.get_payload("u1", "payment").await.unwrap().unwrap();
        assert_eq!(recorded["intentId"], intents[0].intent.intent_id.as_str());
    }

    #[tokio::test]
    async fn test_storage_outage_is_reported_and_retryable() {
        let (engine, store) = engine_with(plain_definition());
        engine.submit_step("u1", "userInfo", json!({})).await.unwrap();

        store.set_available(false);
        let err = engine.get_status("u1").await.unwrap_err();
        assert!(matches!(err, WorkflowError::StorageUnavailable(_)));
        let err = engine
            .submit_step("u1", "additionalDetails", json!({}))
            .await
            .unwrap_err();
        assert!(err.is_retryable());

        store.set_available(true);
        let view = engine.get_status("u1").await.unwrap();
        assert_eq!(view.completed_steps, vec!["userInfo"]);
        engine.submit_step("u1", "additionalDetails", json!({})).await.unwrap();
    }

    #[tokio::test]
    async fn test_reset_returns_to_not_started() {
        let (engine, _) = engine_with(plain_definition());
        for step in ["userInfo", "additionalDetails", "payment", "complete"] {
            engine.submit_step("u1", step, json!({})).await.unwrap();
        }

        let view = engine.reset_workflow("u1").await.unwrap();
        assert_eq!(view.status, WorkflowStatus::NotStarted);

        let view = engine.get_status("u1").await.unwrap();
        assert_eq!(view.status, WorkflowStatus::NotStarted);
        assert!(view.completed_steps.is_empty());
        assert_eq!(engine.get_payload("u1", "userInfo").await.unwrap(), None);

        // Progress can start over after a reset.
        engine.submit_step("u1", "userInfo", json!({})).await.unwrap();

        // Resetting a subject that was never seen is a no-op.
        let view = engine.reset_workflow("ghost").await.unwrap();
        assert_eq!(view.status, WorkflowStatus::NotStarted);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_submissions_for_one_subject() {
        let (engine, _) = engine_with(plain_definition());
        let engine = Arc::new(engine);

        let mut handles = Vec::new();
        for n in 0..16 {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move {
                engine.submit_step("u1", "userInfo", json!({ "n": n })).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let view = engine.get_status("u1").await.unwrap();
        assert_eq!(view.completed_steps, vec!["userInfo"]);

        let payload = engine.get_payload("u1", "userInfo").await.unwrap().unwrap();
        let n = payload["n"].as_i64().unwrap();
        assert!((0..16).contains(&n));
        assert_eq!(payload.as_object().unwrap().len(), 1);

        assert_eq!(engine.locks.len(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_subjects_progress_independently() {
        let (engine, _) = engine_with(plain_definition());
        let engine = Arc::new(engine);

        let mut handles = Vec::new();
        for i in 0..8 {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move {
                let subject = format!("user-{}", i);
                for step in ["userInfo", "additionalDetails", "payment", "complete"] {
                    engine.submit_step(&subject, step, json!({})).await?;
                }
                Ok::<_, WorkflowError>(())
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let all = engine.list_statuses().await.unwrap();
        assert_eq!(all.len(), 8);
        assert!(all.iter().all(|v| v.status == WorkflowStatus::Complete));
    }
}
