//! Step payload validation.
//!
//! Every step in a `WorkflowDefinition` owns a `StepValidator`. `check`
//! inspects the payload without side effects; `accept` returns the value to
//! record, which may be enriched (e.g. with a payment intent id). Either phase
//! can reject with a `StepRejection`.

use std::fmt;
use std::sync::OnceLock;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single field-level validation error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Why a validator refused a payload.
#[derive(Debug, Clone, PartialEq)]
pub enum StepRejection {
    /// The payload itself is malformed.
    Fields(Vec<FieldError>),
    /// An external provider refused the operation backing this step.
    Provider(String),
}

/// Identifies the submission being validated.
#[derive(Debug, Clone, Copy)]
pub struct StepContext<'a> {
    pub subject_id: &'a str,
    pub step: &'a str,
    /// Version the subject's state will have if this submission commits.
    pub version: i64,
}

impl StepContext<'_> {
    /// Stable key for side effects of this submission attempt. A retry of
    /// the same submission against the same stored state yields the same key.
    pub fn idempotency_key(&self) -> String {
        format!("{}:{}:{}", self.subject_id, self.step, self.version)
    }
}

/// Two-phase step validation.
///
/// `check` must be free of side effects; the engine runs it before the
/// ordering check. `accept` runs only once the submission is otherwise
/// admissible and may call external services.
#[async_trait]
pub trait StepValidator: Send + Sync {
    fn check(&self, ctx: StepContext<'_>, payload: &Value) -> Result<(), StepRejection>;

    /// Produce the value to record for the step.
    async fn accept(&self, _ctx: StepContext<'_>, payload: Value) -> Result<Value, StepRejection> {
        Ok(payload)
    }
}

/// Accepts any payload unchanged.
#[derive(Debug, Default, Clone, Copy)]
pub struct AcceptAll;

impl StepValidator for AcceptAll {
    fn check(&self, _ctx: StepContext<'_>, _payload: &Value) -> Result<(), StepRejection> {
        Ok(())
    }
}

/// JSON type expected for a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    #[default]
    Any,
    String,
    Email,
    Number,
    Integer,
    Boolean,
    Array,
    Object,
}

impl FieldKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::String => "string",
            Self::Email => "email",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Array => "array",
            Self::Object => "object",
        }
    }

    fn matches(&self, value: &Value) -> bool {
        match self {
            Self::Any => true,
            Self::String => value.is_string(),
            Self::Email => value.as_str().is_some_and(is_email),
            Self::Number => value.is_number(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
            Self::Array => value.is_array(),
            Self::Object => value.is_object(),
        }
    }
}

fn is_email(s: &str) -> bool {
    static EMAIL_RE: OnceLock<Regex> = OnceLock::new();
    EMAIL_RE
        .get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap())
        .is_match(s)
}

/// Declarative rule for one payload field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldRule {
    pub name: String,

    #[serde(rename = "type", default)]
    pub kind: FieldKind,

    #[serde(default)]
    pub required: bool,

    /// Minimum length in characters (strings only)
    #[serde(default)]
    pub min_length: Option<usize>,

    /// Maximum length in characters (strings only)
    #[serde(default)]
    pub max_length: Option<usize>,

    /// Inclusive lower bound (numbers only)
    #[serde(default)]
    pub min: Option<f64>,

    /// Allowed values (strings only)
    #[serde(default)]
    pub one_of: Vec<String>,

    /// Exact value the field must hold, e.g. `true` for a consent checkbox
    #[serde(default)]
    pub equals: Option<Value>,
}

impl FieldRule {
    pub fn new(name: impl Into<String>, kind: FieldKind) -> Self {
        Self {
            name: name.into(),
            kind,
            required: false,
            min_length: None,
            max_length: None,
            min: None,
            one_of: Vec::new(),
            equals: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn min_length(mut self, len: usize) -> Self {
        self.min_length = Some(len);
        self
    }

    pub fn max_length(mut self, len: usize) -> Self {
        self.max_length = Some(len);
        self
    }

    pub fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn one_of<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.one_of = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn equals(mut self, value: Value) -> Self {
        self.equals = Some(value);
        self
    }

    /// Sanity-check the rule itself (used when loading definitions).
    pub fn check(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("field name must not be empty".to_string());
        }
        if let (Some(lo), Some(hi)) = (self.min_length, self.max_length) {
            if lo > hi {
                return Err(format!(
                    "field '{}': minLength {} exceeds maxLength {}",
                    self.name, lo, hi
                ));
            }
        }
        Ok(())
    }

    /// Check `payload` against this rule, appending any violation to `errors`.
    fn apply(&self, payload: &serde_json::Map<String, Value>, errors: &mut Vec<FieldError>) {
        let value = match payload.get(&self.name) {
            None | Some(Value::Null) => {
                if self.required {
                    errors.push(FieldError::new(&self.name, "is required"));
                }
                return;
            }
            Some(v) => v,
        };

        if !self.kind.matches(value) {
            let message = match self.kind {
                FieldKind::Email => "must be a valid email address".to_string(),
                kind => format!("must be of type {}", kind.as_str()),
            };
            errors.push(FieldError::new(&self.name, message));
            return;
        }

        if self.kind == FieldKind::Integer && !value.is_i64() {
            errors.push(FieldError::new(&self.name, "is out of range"));
            return;
        }

        if let Some(s) = value.as_str() {
            let len = s.chars().count();
            if let Some(min) = self.min_length {
                if len < min {
                    errors.push(FieldError::new(
                        &self.name,
                        format!("must be at least {} characters", min),
                    ));
                }
            }
            if let Some(max) = self.max_length {
                if len > max {
                    errors.push(FieldError::new(
                        &self.name,
                        format!("must be at most {} characters", max),
                    ));
                }
            }
            if !self.one_of.is_empty() && !self.one_of.iter().any(|allowed| allowed == s) {
                errors.push(FieldError::new(
                    &self.name,
                    format!("must be one of: {}", self.one_of.join(", ")),
                ));
            }
        }

        if let (Some(min), Some(n)) = (self.min, value.as_f64()) {
            if n < min {
                errors.push(FieldError::new(&self.name, format!("must be at least {}", min)));
            }
        }

        if let Some(expected) = &self.equals {
            if value != expected {
                errors.push(FieldError::new(&self.name, format!("must equal {}", expected)));
            }
        }
    }
}

/// Check a payload against a list of rules, collecting every violation.
pub fn check_fields(rules: &[FieldRule], payload: &Value) -> Result<(), Vec<FieldError>> {
    let Some(object) = payload.as_object() else {
        return Err(vec![FieldError::new("$", "payload must be a JSON object")]);
    };

    let mut errors = Vec::new();
    for rule in rules {
        rule.apply(object, &mut errors);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validator backed by a list of declarative field rules.
#[derive(Debug, Clone, Default)]
pub struct FieldRulesValidator {
    rules: Vec<FieldRule>,
}

impl FieldRulesValidator {
    pub fn new(rules: Vec<FieldRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[FieldRule] {
        &self.rules
    }
}

impl StepValidator for FieldRulesValidator {
    fn check(&self, _ctx: StepContext<'_>, payload: &Value) -> Result<(), StepRejection> {
        check_fields(&self.rules, payload).map_err(StepRejection::Fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user_rules() -> Vec<FieldRule> {
        vec![
            FieldRule::new("firstName", FieldKind::String).required().min_length(1),
            FieldRule::new("email", FieldKind::Email).required(),
            FieldRule::new("age", FieldKind::Integer).min(18.0),
            FieldRule::new("plan", FieldKind::String).one_of(["basic", "pro"]),
        ]
    }

    #[test]
    fn test_valid_payload_passes() {
        let payload = json!({ "firstName": "Ada", "email": "ada@example.com", "age": 36, "plan": "pro" });
        assert!(check_fields(&user_rules(), &payload).is_ok());
    }

    #[test]
    fn test_collects_all_errors_in_rule_order() {
        let payload = json!({ "email": "not-an-email", "age": 12, "plan": "gold" });
        let errors = check_fields(&user_rules(), &payload).unwrap_err();
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["firstName", "email", "age", "plan"]);
        assert_eq!(errors[0].message, "is required");
        assert_eq!(errors[1].message, "must be a valid email address");
    }

    #[test]
    fn test_null_counts_as_missing() {
        let payload = json!({ "firstName": null, "email": "a@b.io" });
        let errors = check_fields(&user_rules(), &payload).unwrap_err();
        assert_eq!(errors, vec![FieldError::new("firstName", "is required")]);
    }

    #[test]
    fn test_non_object_payload_is_rejected() {
        let errors = check_fields(&user_rules(), &json!([1, 2, 3])).unwrap_err();
        assert_eq!(errors[0].field, "$");
    }

    #[test]
    fn test_equals_rule() {
        let rules = vec![FieldRule::new("acceptedTerms", FieldKind::Boolean)
            .required()
            .equals(json!(true))];
        assert!(check_fields(&rules, &json!({ "acceptedTerms": true })).is_ok());
        let errors = check_fields(&rules, &json!({ "acceptedTerms": false })).unwrap_err();
        assert_eq!(errors[0].message, "must equal true");
    }

    #[test]
    fn test_rule_check_rejects_inverted_length_bounds() {
        let rule = FieldRule::new("bio", FieldKind::String).min_length(10).max_length(5);
        assert!(rule.check().is_err());
    }

    #[tokio::test]
    async fn test_field_rules_validator_returns_payload() {
        let validator = FieldRulesValidator::new(user_rules());
        let payload = json!({ "firstName": "Ada", "email": "ada@example.com" });
        let ctx = StepContext { subject_id: "user-1", step: "userInfo", version: 1 };
        assert!(validator.check(ctx, &payload).is_ok());
        assert_eq!(validator.accept(ctx, payload.clone()).await.unwrap(), payload);
    }

    #[test]
    fn test_integer_beyond_i64_is_out_of_range() {
        let rules = vec![FieldRule::new("amount", FieldKind::Integer).required().min(1.0)];
        let payload: Value = serde_json::from_str(r#"{"amount": 18446744073709551615}"#).unwrap();
        let errors = check_fields(&rules, &payload).unwrap_err();
        assert_eq!(errors, vec![FieldError::new("amount", "is out of range")]);
    }

    #[test]
    fn test_idempotency_key_tracks_version() {
        let ctx = StepContext { subject_id: "user-1", step: "payment", version: 3 };
        assert_eq!(ctx.idempotency_key(), "user-1:payment:3");
    }
}
