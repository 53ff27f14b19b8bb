//! # Operation Repository
//!
//! Storage contract for delegated operation documents. The service never keeps
//! documents between calls; every read and write goes through this trait.
//!
//! ## Implementations
//!
//! - [`InMemoryOperationRepository`]: process-local storage for tests and
//!   embedded use
//! - [`PostgresOperationRepository`]: sqlx-backed storage (feature `postgres`)

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::InMemoryOperationRepository;
#[cfg(feature = "postgres")]
pub use postgres::PostgresOperationRepository;

use crate::error::Result;
use crate::models::{
    DelegatedOperation, ExecutionResult, NewOperation, OperationFilter, PagingParams,
};
use crate::state_machine::RunState;
use async_trait::async_trait;
use uuid::Uuid;

/// Persistence contract consumed by the delegated operation service
#[async_trait]
pub trait OperationRepository: Send + Sync {
    /// Persist a new document in the `queued` state
    async fn queue_operation(&self, request: NewOperation) -> Result<DelegatedOperation>;

    /// Overwrite the run state of a document, attaching `result` when given.
    ///
    /// The write does not look at the current state.
    async fn update_run_state(
        &self,
        id: Uuid,
        run_state: RunState,
        result: Option<ExecutionResult>,
    ) -> Result<DelegatedOperation>;

    /// Atomically write `run_state` only if the document is currently in
    /// `expected`.
    ///
    /// Returns `None` when the document exists but is in another state, so at
    /// most one caller wins a given transition. Fails with `NotFound` if the
    /// document does not exist.
    async fn compare_and_set_run_state(
        &self,
        id: Uuid,
        expected: RunState,
        run_state: RunState,
        result: Option<ExecutionResult>,
    ) -> Result<Option<DelegatedOperation>>;

    /// Claim a queued document for execution (`queued` -> `running`)
    async fn claim_operation(&self, id: Uuid) -> Result<Option<DelegatedOperation>> {
        self.compare_and_set_run_state(id, RunState::Queued, RunState::Running, None)
            .await
    }

    async fn set_pinned(&self, id: Uuid, pinned: bool) -> Result<DelegatedOperation>;

    /// Remove one document, returning it if it existed
    async fn delete_operation(&self, id: Uuid) -> Result<Option<DelegatedOperation>>;

    /// Remove every document owned by a dataset, returning how many were removed
    async fn delete_for_dataset(&self, dataset_id: &str) -> Result<u64>;

    /// Fetch one document, failing with `NotFound` if absent
    async fn get(&self, id: Uuid) -> Result<DelegatedOperation>;

    async fn list_operations(
        &self,
        filter: &OperationFilter,
        paging: Option<PagingParams>,
    ) -> Result<Vec<DelegatedOperation>>;

    async fn count_operations(&self, filter: &OperationFilter) -> Result<u64>;

    async fn get_queued_operations(
        &self,
        operator: Option<&str>,
        dataset_name: Option<&str>,
    ) -> Result<Vec<DelegatedOperation>> {
        let mut filter = OperationFilter::queued();
        filter.operator = operator.map(str::to_string);
        filter.dataset_name = dataset_name.map(str::to_string);
        self.list_operations(&filter, None).await
    }
}
