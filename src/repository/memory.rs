//! # In-Memory Operation Repository
//!
//! Thread-safe repository backed by a single `parking_lot::RwLock`.
//!
//! Documents are kept in insertion order, which is also queue order, so
//! listings with equal sort keys stay FIFO. Every operation takes the lock
//! once, which makes each call atomic with respect to other callers.

use crate::error::{DelegatedOperationError, Result};
use crate::models::{
    DelegatedOperation, ExecutionResult, NewOperation, OperationFilter, PagingParams,
};
use crate::repository::OperationRepository;
use crate::state_machine::RunState;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct InMemoryOperationRepository {
    operations: RwLock<Vec<DelegatedOperation>>,
}

impl InMemoryOperationRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored documents (for testing)
    pub fn len(&self) -> usize {
        self.operations.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.read().is_empty()
    }

    /// Drop every stored document (for testing)
    pub fn clear(&self) {
        self.operations.write().clear();
    }

    fn with_document<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut DelegatedOperation) -> T,
    ) -> Result<T> {
        let mut operations = self.operations.write();
        let doc = operations
            .iter_mut()
            .find(|doc| doc.id == id)
            .ok_or(DelegatedOperationError::NotFound { id })?;
        Ok(f(doc))
    }
}

#[async_trait]
impl OperationRepository for InMemoryOperationRepository {
    async fn queue_operation(&self, request: NewOperation) -> Result<DelegatedOperation> {
        let doc = DelegatedOperation::queued(request);
        debug!(operation_id = %doc.id, operator = %doc.operator, "Queued delegated operation");
        self.operations.write().push(doc.clone());
        Ok(doc)
    }

    async fn update_run_state(
        &self,
        id: Uuid,
        run_state: RunState,
        result: Option<ExecutionResult>,
    ) -> Result<DelegatedOperation> {
        self.with_document(id, |doc| {
            if !doc.run_state.can_transition_to(run_state) {
                warn!(
                    operation_id = %id,
                    from = %doc.run_state,
                    to = %run_state,
                    "Overwriting run state outside the normal lifecycle"
                );
            }
            doc.apply_run_state(run_state, result, Utc::now());
            doc.clone()
        })
    }

    async fn compare_and_set_run_state(
        &self,
        id: Uuid,
        expected: RunState,
        run_state: RunState,
        result: Option<ExecutionResult>,
    ) -> Result<Option<DelegatedOperation>> {
        self.with_document(id, |doc| {
            if doc.run_state != expected {
                return None;
            }
            doc.apply_run_state(run_state, result, Utc::now());
            Some(doc.clone())
        })
    }

    async fn set_pinned(&self, id: Uuid, pinned: bool) -> Result<DelegatedOperation> {
        self.with_document(id, |doc| {
            doc.pinned = pinned;
            doc.updated_at = Utc::now();
            doc.clone()
        })
    }

    async fn delete_operation(&self, id: Uuid) -> Result<Option<DelegatedOperation>> {
        let mut operations = self.operations.write();
        let removed = operations
            .iter()
            .position(|doc| doc.id == id)
            .map(|index| operations.remove(index));
        Ok(removed)
    }

    async fn delete_for_dataset(&self, dataset_id: &str) -> Result<u64> {
        let mut operations = self.operations.write();
        let before = operations.len();
        operations.retain(|doc| doc.dataset_id.as_deref() != Some(dataset_id));
        Ok((before - operations.len()) as u64)
    }

    async fn get(&self, id: Uuid) -> Result<DelegatedOperation> {
        self.operations
            .read()
            .iter()
            .find(|doc| doc.id == id)
            .cloned()
            .ok_or(DelegatedOperationError::NotFound { id })
    }

    async fn list_operations(
        &self,
        filter: &OperationFilter,
        paging: Option<PagingParams>,
    ) -> Result<Vec<DelegatedOperation>> {
        let paging = paging.unwrap_or_default();
        let mut matched: Vec<DelegatedOperation> = self
            .operations
            .read()
            .iter()
            .filter(|doc| filter.matches(doc))
            .cloned()
            .collect();

        // stable sort keeps insertion order on ties
        matched.sort_by(|a, b| paging.compare(a, b));

        let page = matched
            .into_iter()
            .skip(paging.skip)
            .take(paging.limit.unwrap_or(usize::MAX))
            .collect();
        Ok(page)
    }

    async fn count_operations(&self, filter: &OperationFilter) -> Result<u64> {
        let count = self
            .operations
            .read()
            .iter()
            .filter(|doc| filter.matches(doc))
            .count();
        Ok(count as u64)
    }
}
