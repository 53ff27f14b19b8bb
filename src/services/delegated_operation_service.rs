//! # Delegated Operation Service
//!
//! Lifecycle manager for delegated operations: queuing, run state writes,
//! reruns, deletion and queries. Batch execution lives in
//! [`batch_executor`](super::batch_executor).
//!
//! The service keeps no documents between calls; every read and write goes
//! through the [`OperationRepository`] it was built with.
//!
//! ## Usage
//!
//! ```rust
//! use delegated_ops::registry::OperatorRegistry;
//! use delegated_ops::repository::InMemoryOperationRepository;
//! use delegated_ops::services::DelegatedOperationService;
//! use std::sync::Arc;
//!
//! # async fn example() -> delegated_ops::Result<()> {
//! let service = DelegatedOperationService::new(
//!     Arc::new(InMemoryOperationRepository::new()),
//!     Arc::new(OperatorRegistry::new()),
//! );
//!
//! let doc = service.queue_operation("@demo/echo", None, None).await?;
//! let rerun = service.rerun_operation(doc.id).await?;
//! assert_ne!(rerun.id, doc.id);
//! # Ok(())
//! # }
//! ```

use crate::config::ExecutorConfig;
use crate::error::Result;
use crate::models::{
    DelegatedOperation, ExecutionContext, ExecutionResult, NewOperation, OperationFilter,
    PagingParams,
};
use crate::registry::OperatorResolver;
use crate::repository::OperationRepository;
use crate::state_machine::RunState;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Queues, tracks and executes delegated operations
#[derive(Clone)]
pub struct DelegatedOperationService {
    pub(super) repository: Arc<dyn OperationRepository>,
    pub(super) resolver: Arc<dyn OperatorResolver>,
    pub(super) config: ExecutorConfig,
}

impl fmt::Debug for DelegatedOperationService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DelegatedOperationService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl DelegatedOperationService {
    /// Create a service with the default executor configuration
    pub fn new(
        repository: Arc<dyn OperationRepository>,
        resolver: Arc<dyn OperatorResolver>,
    ) -> Self {
        Self::with_config(repository, resolver, ExecutorConfig::default())
    }

    pub fn with_config(
        repository: Arc<dyn OperationRepository>,
        resolver: Arc<dyn OperatorResolver>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            repository,
            resolver,
            config,
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn repository(&self) -> &Arc<dyn OperationRepository> {
        &self.repository
    }

    /// Queue a new operation for later execution
    pub async fn queue_operation(
        &self,
        operator: impl Into<String>,
        delegation_target: Option<String>,
        context: Option<ExecutionContext>,
    ) -> Result<DelegatedOperation> {
        let request = NewOperation {
            operator: operator.into(),
            delegation_target,
            label: None,
            context: context.unwrap_or_default(),
        };
        self.queue(request).await
    }

    /// Queue a fully specified request, including an explicit label
    pub async fn queue(&self, request: NewOperation) -> Result<DelegatedOperation> {
        let doc = self.repository.queue_operation(request).await?;
        info!(
            operation_id = %doc.id,
            operator = %doc.operator,
            delegation_target = ?doc.delegation_target,
            "Queued delegated operation"
        );
        Ok(doc)
    }

    pub async fn set_running(&self, id: Uuid) -> Result<DelegatedOperation> {
        self.repository
            .update_run_state(id, RunState::Running, None)
            .await
    }

    /// Mark an operation completed, attaching `result` when given
    pub async fn set_completed(
        &self,
        id: Uuid,
        result: Option<ExecutionResult>,
    ) -> Result<DelegatedOperation> {
        self.repository
            .update_run_state(id, RunState::Completed, result)
            .await
    }

    pub async fn set_failed(&self, id: Uuid, result: ExecutionResult) -> Result<DelegatedOperation> {
        self.repository
            .update_run_state(id, RunState::Failed, Some(result))
            .await
    }

    pub async fn set_pinned(&self, id: Uuid, pinned: bool) -> Result<DelegatedOperation> {
        self.repository.set_pinned(id, pinned).await
    }

    /// Delete one operation; deleting a missing id is a no-op
    pub async fn delete_operation(&self, id: Uuid) -> Result<Option<DelegatedOperation>> {
        let removed = self.repository.delete_operation(id).await?;
        debug!(operation_id = %id, removed = removed.is_some(), "Deleted delegated operation");
        Ok(removed)
    }

    /// Delete every operation belonging to a dataset
    pub async fn delete_for_dataset(&self, dataset_id: &str) -> Result<u64> {
        let removed = self.repository.delete_for_dataset(dataset_id).await?;
        debug!(dataset_id = %dataset_id, removed, "Deleted delegated operations for dataset");
        Ok(removed)
    }

    /// Queue a copy of an existing operation as a brand new document.
    ///
    /// The original document is left untouched.
    pub async fn rerun_operation(&self, id: Uuid) -> Result<DelegatedOperation> {
        let original = self.repository.get(id).await?;
        let doc = self.repository.queue_operation(original.rerun_request()).await?;
        info!(
            operation_id = %doc.id,
            rerun_of = %original.id,
            operator = %doc.operator,
            "Queued rerun of delegated operation"
        );
        Ok(doc)
    }

    pub async fn get_queued_operations(
        &self,
        operator: Option<&str>,
        dataset_name: Option<&str>,
    ) -> Result<Vec<DelegatedOperation>> {
        self.repository
            .get_queued_operations(operator, dataset_name)
            .await
    }

    pub async fn get(&self, id: Uuid) -> Result<DelegatedOperation> {
        self.repository.get(id).await
    }

    pub async fn list_operations(
        &self,
        filter: &OperationFilter,
        paging: Option<PagingParams>,
    ) -> Result<Vec<DelegatedOperation>> {
        self.repository.list_operations(filter, paging).await
    }

    pub async fn count_operations(&self, filter: &OperationFilter) -> Result<u64> {
        self.repository.count_operations(filter).await
    }
}
