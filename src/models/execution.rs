//! # Execution Context and Result
//!
//! The request parameters an operator runs with, and the outcome recorded on
//! the document once it reaches a terminal state.

use crate::constants::params;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Bundle of request parameters passed to an operator at execution time
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    #[serde(default)]
    pub request_params: Map<String, Value>,
}

impl ExecutionContext {
    pub fn new(request_params: Map<String, Value>) -> Self {
        Self { request_params }
    }

    /// Build a context from a JSON object; any other value yields empty params
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(request_params) => Self { request_params },
            _ => Self::default(),
        }
    }

    /// Builder-style insert of a single request parameter
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.request_params.insert(key.into(), value.into());
        self
    }

    pub fn param(&self, key: &str) -> Option<&Value> {
        self.request_params.get(key)
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.param(key).and_then(Value::as_str)
    }

    pub fn dataset_name(&self) -> Option<&str> {
        self.param_str(params::DATASET_NAME)
    }

    pub fn dataset_id(&self) -> Option<&str> {
        self.param_str(params::DATASET_ID)
    }

    /// Id of the run document this context is executing under, if injected
    pub fn run_doc(&self) -> Option<Uuid> {
        self.param_str(params::RUN_DOC)
            .and_then(|raw| raw.parse().ok())
    }

    pub(crate) fn inject_run_doc(&mut self, id: Uuid) {
        self.request_params
            .insert(params::RUN_DOC.to_string(), Value::String(id.to_string()));
    }

    pub(crate) fn strip_run_doc(&mut self) {
        self.request_params.remove(params::RUN_DOC);
    }
}

/// A single parameter validation failure reported during resolution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub path: String,
    pub reason: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Outcome of an execution: a success payload or an error trace, never both.
///
/// Fields are private so the two variants can only be built through
/// [`ExecutionResult::success`] and [`ExecutionResult::failure`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    validation_errors: Vec<ValidationError>,
}

impl ExecutionResult {
    pub fn success(result: Value) -> Self {
        Self {
            result: Some(result),
            ..Self::default()
        }
    }

    /// A success with no payload
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::default()
        }
    }

    pub fn validation_failure(error: impl Into<String>, errors: Vec<ValidationError>) -> Self {
        Self {
            error: Some(error.into()),
            validation_errors: errors,
            ..Self::default()
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn validation_errors(&self) -> &[ValidationError] {
        &self.validation_errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_context_from_object() {
        let ctx = ExecutionContext::from_value(json!({"dataset_name": "quickstart", "n": 3}));
        assert_eq!(ctx.dataset_name(), Some("quickstart"));
        assert_eq!(ctx.param("n"), Some(&json!(3)));
        assert_eq!(ctx.dataset_id(), None);
    }

    #[test]
    fn test_context_from_non_object_is_empty() {
        let ctx = ExecutionContext::from_value(json!([1, 2, 3]));
        assert!(ctx.request_params.is_empty());
    }

    #[test]
    fn test_run_doc_injection() {
        let id = Uuid::new_v4();
        let mut ctx = ExecutionContext::default().with_param("msg", "hi");
        assert_eq!(ctx.run_doc(), None);

        ctx.inject_run_doc(id);
        assert_eq!(ctx.run_doc(), Some(id));
        assert_eq!(ctx.param_str("msg"), Some("hi"));

        ctx.strip_run_doc();
        assert_eq!(ctx.run_doc(), None);
        assert_eq!(ctx.request_params.len(), 1);
    }

    #[test]
    fn test_result_variants_are_exclusive() {
        let ok = ExecutionResult::success(json!({"msg": "hi"}));
        assert!(!ok.is_error());
        assert_eq!(ok.result(), Some(&json!({"msg": "hi"})));
        assert_eq!(ok.error(), None);

        let failed = ExecutionResult::failure("boom");
        assert!(failed.is_error());
        assert_eq!(failed.result(), None);
        assert_eq!(failed.error(), Some("boom"));
    }

    #[test]
    fn test_validation_failure_serialization() {
        let failed = ExecutionResult::validation_failure(
            "Validation error",
            vec![ValidationError::new("msg", "required")],
        );
        let value = serde_json::to_value(&failed).unwrap();
        assert_eq!(
            value,
            json!({
                "error": "Validation error",
                "validation_errors": [{"path": "msg", "reason": "required"}]
            })
        );
        let parsed: ExecutionResult = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, failed);
    }
}
