//! # Operator Registry
//!
//! In-process resolver mapping operator URIs to executable operators.
//!
//! ## Usage
//!
//! ```rust
//! use async_trait::async_trait;
//! use delegated_ops::models::ExecutionContext;
//! use delegated_ops::registry::{ExecutableOperator, OperatorRegistry};
//! use serde_json::Value;
//! use std::sync::Arc;
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl ExecutableOperator for Echo {
//!     fn uri(&self) -> &str {
//!         "@demo/echo"
//!     }
//!
//!     async fn execute(&self, ctx: &ExecutionContext) -> anyhow::Result<Value> {
//!         Ok(Value::Object(ctx.request_params.clone()))
//!     }
//! }
//!
//! let registry = OperatorRegistry::new();
//! registry.register(Arc::new(Echo));
//! assert!(registry.contains("@demo/echo"));
//! ```

use crate::constants::errors::VALIDATION_ERROR;
use crate::models::{ExecutionContext, ExecutionResult, ValidationError};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

/// A unit of custom work that can run against an execution context
#[async_trait]
pub trait ExecutableOperator: Send + Sync {
    /// Identifier operations are queued under
    fn uri(&self) -> &str;

    /// Check request parameters before execution.
    ///
    /// Default implementation accepts everything.
    fn validate(&self, ctx: &ExecutionContext) -> Vec<ValidationError> {
        let _ = ctx;
        Vec::new()
    }

    /// Run the operator's business logic
    async fn execute(&self, ctx: &ExecutionContext) -> anyhow::Result<Value>;
}

/// An operator bound to the context it will execute with
#[derive(Clone)]
pub struct PreparedOperator {
    pub operator: Arc<dyn ExecutableOperator>,
    pub context: ExecutionContext,
}

impl fmt::Debug for PreparedOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PreparedOperator")
            .field("operator", &self.operator.uri())
            .field("context", &self.context)
            .finish()
    }
}

/// Outcome of resolving an operator URI
#[derive(Debug)]
pub enum Resolution {
    Ready(PreparedOperator),
    /// Resolution failed; the result is recorded on the document as-is
    Failed(ExecutionResult),
}

/// Looks up operators by URI and binds them to request parameters
#[async_trait]
pub trait OperatorResolver: Send + Sync {
    async fn resolve_and_bind(
        &self,
        operator_uri: &str,
        request_params: &Map<String, Value>,
    ) -> Resolution;
}

/// Resolver backed by operators registered in this process
#[derive(Default)]
pub struct OperatorRegistry {
    operators: DashMap<String, Arc<dyn ExecutableOperator>>,
}

impl OperatorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an operator under its URI, replacing any previous registration
    pub fn register(&self, operator: Arc<dyn ExecutableOperator>) {
        let uri = operator.uri().to_string();
        if self.operators.insert(uri.clone(), operator).is_some() {
            info!(operator = %uri, "Replaced registered operator");
        } else {
            debug!(operator = %uri, "Registered operator");
        }
    }

    pub fn unregister(&self, operator_uri: &str) -> bool {
        self.operators.remove(operator_uri).is_some()
    }

    pub fn contains(&self, operator_uri: &str) -> bool {
        self.operators.contains_key(operator_uri)
    }

    /// Registered URIs in sorted order
    pub fn operator_uris(&self) -> Vec<String> {
        let mut uris: Vec<String> = self.operators.iter().map(|e| e.key().clone()).collect();
        uris.sort();
        uris
    }

    pub fn len(&self) -> usize {
        self.operators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }
}

impl fmt::Debug for OperatorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OperatorRegistry")
            .field("operators", &self.operator_uris())
            .finish()
    }
}

#[async_trait]
impl OperatorResolver for OperatorRegistry {
    async fn resolve_and_bind(
        &self,
        operator_uri: &str,
        request_params: &Map<String, Value>,
    ) -> Resolution {
        // clone out of the map so no shard lock is held by the caller
        let Some(operator) = self.operators.get(operator_uri).map(|e| Arc::clone(e.value())) else {
            debug!(operator = %operator_uri, "Operator not registered");
            return Resolution::Failed(ExecutionResult::failure(format!(
                "Operator '{operator_uri}' does not exist"
            )));
        };

        let context = ExecutionContext::new(request_params.clone());
        let errors = operator.validate(&context);
        if !errors.is_empty() {
            debug!(
                operator = %operator_uri,
                error_count = errors.len(),
                "Operator rejected request parameters"
            );
            return Resolution::Failed(ExecutionResult::validation_failure(
                VALIDATION_ERROR,
                errors,
            ));
        }

        Resolution::Ready(PreparedOperator { operator, context })
    }
}
