//! Shared fixtures for integration tests: test operators, a repository that
//! records every run state write and can be told to fail one, and service
//! builders.

#![allow(dead_code)]

use async_trait::async_trait;
use delegated_ops::{
    DelegatedOperation, DelegatedOperationError, DelegatedOperationService, ExecutableOperator, ExecutionContext,
    ExecutionResult, ExecutorConfig, InMemoryOperationRepository, NewOperation, OperationFilter,
    OperationRepository, OperatorRegistry, PagingParams, Result, RunState, ValidationError,
};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

pub const ECHO: &str = "@test/echo";
pub const FAILING: &str = "@test/failing";
pub const PANICKING: &str = "@test/panicking";
pub const SLOW: &str = "@test/slow";
pub const VALIDATING: &str = "@test/validating";

/// Returns its request params, minus the injected run doc id
#[derive(Debug, Default)]
pub struct EchoOperator {
    pub calls: AtomicUsize,
}

#[async_trait]
impl ExecutableOperator for EchoOperator {
    fn uri(&self) -> &str {
        ECHO
    }

    async fn execute(&self, ctx: &ExecutionContext) -> anyhow::Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let params: Map<String, Value> = ctx
            .request_params
            .iter()
            .filter(|(key, _)| key.as_str() != "run_doc")
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        Ok(Value::Object(params))
    }
}

/// Always fails with a two-level error chain
#[derive(Debug, Default)]
pub struct FailingOperator;

#[async_trait]
impl ExecutableOperator for FailingOperator {
    fn uri(&self) -> &str {
        FAILING
    }

    async fn execute(&self, _ctx: &ExecutionContext) -> anyhow::Result<Value> {
        let root = anyhow::anyhow!("disk quota exceeded");
        Err(root.context("failed to write export"))
    }
}

#[derive(Debug, Default)]
pub struct PanickingOperator;

#[async_trait]
impl ExecutableOperator for PanickingOperator {
    fn uri(&self) -> &str {
        PANICKING
    }

    async fn execute(&self, _ctx: &ExecutionContext) -> anyhow::Result<Value> {
        panic!("operator exploded");
    }
}

/// Sleeps for `delay_ms` (request param, default 200) before succeeding
#[derive(Debug, Default)]
pub struct SlowOperator;

#[async_trait]
impl ExecutableOperator for SlowOperator {
    fn uri(&self) -> &str {
        SLOW
    }

    async fn execute(&self, ctx: &ExecutionContext) -> anyhow::Result<Value> {
        let delay_ms = ctx.param("delay_ms").and_then(Value::as_u64).unwrap_or(200);
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        Ok(Value::from(delay_ms))
    }
}

/// Requires a string `msg` request param
#[derive(Debug, Default)]
pub struct ValidatingOperator;

#[async_trait]
impl ExecutableOperator for ValidatingOperator {
    fn uri(&self) -> &str {
        VALIDATING
    }

    fn validate(&self, ctx: &ExecutionContext) -> Vec<ValidationError> {
        match ctx.param_str("msg") {
            Some(_) => Vec::new(),
            None => vec![ValidationError::new("msg", "must be a string")],
        }
    }

    async fn execute(&self, ctx: &ExecutionContext) -> anyhow::Result<Value> {
        Ok(Value::from(ctx.param_str("msg").unwrap_or_default()))
    }
}

/// Registry holding every test operator
pub fn test_registry() -> (Arc<OperatorRegistry>, Arc<EchoOperator>) {
    let registry = OperatorRegistry::new();
    let echo = Arc::new(EchoOperator::default());
    registry.register(echo.clone());
    registry.register(Arc::new(FailingOperator));
    registry.register(Arc::new(PanickingOperator));
    registry.register(Arc::new(SlowOperator));
    registry.register(Arc::new(ValidatingOperator));
    (Arc::new(registry), echo)
}

/// In-memory repository that records every run state it is asked to write
#[derive(Debug, Default)]
pub struct RecordingRepository {
    inner: InMemoryOperationRepository,
    transitions: Mutex<Vec<(Uuid, RunState)>>,
    write_faults: Mutex<Vec<(Uuid, RunState)>>,
    list_fault: Mutex<bool>,
}

impl RecordingRepository {
    /// Make the next write of `run_state` to `id` fail with a repository
    /// error. Each registered fault fires once.
    pub fn fail_next_write(&self, id: Uuid, run_state: RunState) {
        self.write_faults.lock().push((id, run_state));
    }

    /// Make the next listing call fail with a repository error
    pub fn fail_next_list(&self) {
        *self.list_fault.lock() = true;
    }

    fn take_fault(&self, id: Uuid, run_state: RunState) -> Result<()> {
        let mut faults = self.write_faults.lock();
        match faults.iter().position(|fault| *fault == (id, run_state)) {
            Some(index) => {
                faults.remove(index);
                Err(DelegatedOperationError::repository("connection reset"))
            }
            None => Ok(()),
        }
    }

    /// Run states written for one document, in order
    pub fn transitions_for(&self, id: Uuid) -> Vec<RunState> {
        self.transitions
            .lock()
            .iter()
            .filter(|(doc_id, _)| *doc_id == id)
            .map(|(_, state)| *state)
            .collect()
    }

    fn record(&self, id: Uuid, run_state: RunState) {
        self.transitions.lock().push((id, run_state));
    }
}

#[async_trait]
impl OperationRepository for RecordingRepository {
    async fn queue_operation(&self, request: NewOperation) -> Result<DelegatedOperation> {
        let doc = self.inner.queue_operation(request).await?;
        self.record(doc.id, doc.run_state);
        Ok(doc)
    }

    async fn update_run_state(
        &self,
        id: Uuid,
        run_state: RunState,
        result: Option<ExecutionResult>,
    ) -> Result<DelegatedOperation> {
        self.take_fault(id, run_state)?;
        let doc = self.inner.update_run_state(id, run_state, result).await?;
        self.record(id, run_state);
        Ok(doc)
    }

    async fn compare_and_set_run_state(
        &self,
        id: Uuid,
        expected: RunState,
        run_state: RunState,
        result: Option<ExecutionResult>,
    ) -> Result<Option<DelegatedOperation>> {
        self.take_fault(id, run_state)?;
        let doc = self
            .inner
            .compare_and_set_run_state(id, expected, run_state, result)
            .await?;
        if doc.is_some() {
            self.record(id, run_state);
        }
        Ok(doc)
    }

    async fn set_pinned(&self, id: Uuid, pinned: bool) -> Result<DelegatedOperation> {
        self.inner.set_pinned(id, pinned).await
    }

    async fn delete_operation(&self, id: Uuid) -> Result<Option<DelegatedOperation>> {
        self.inner.delete_operation(id).await
    }

    async fn delete_for_dataset(&self, dataset_id: &str) -> Result<u64> {
        self.inner.delete_for_dataset(dataset_id).await
    }

    async fn get(&self, id: Uuid) -> Result<DelegatedOperation> {
        self.inner.get(id).await
    }

    async fn list_operations(
        &self,
        filter: &OperationFilter,
        paging: Option<PagingParams>,
    ) -> Result<Vec<DelegatedOperation>> {
        if std::mem::take(&mut *self.list_fault.lock()) {
            return Err(DelegatedOperationError::repository("connection reset"));
        }
        self.inner.list_operations(filter, paging).await
    }

    async fn count_operations(&self, filter: &OperationFilter) -> Result<u64> {
        self.inner.count_operations(filter).await
    }
}

/// Everything a test needs to drive the service and inspect the outcome
pub struct TestHarness {
    pub service: DelegatedOperationService,
    pub repository: Arc<RecordingRepository>,
    pub echo: Arc<EchoOperator>,
}

pub fn setup() -> TestHarness {
    setup_with_config(ExecutorConfig::default())
}

pub fn setup_with_config(config: ExecutorConfig) -> TestHarness {
    let repository = Arc::new(RecordingRepository::default());
    let (registry, echo) = test_registry();
    let service = DelegatedOperationService::with_config(repository.clone(), registry, config);
    TestHarness {
        service,
        repository,
        echo,
    }
}

/// Context carrying the given JSON object as request params
pub fn context(value: Value) -> Option<ExecutionContext> {
    Some(ExecutionContext::from_value(value))
}
