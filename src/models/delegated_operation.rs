//! # Delegated Operation Document
//!
//! One delegated unit of work as stored by an [`OperationRepository`].
//!
//! [`OperationRepository`]: crate::repository::OperationRepository

use crate::models::execution::{ExecutionContext, ExecutionResult};
use crate::state_machine::RunState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A stored delegated operation and its run state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelegatedOperation {
    pub id: Uuid,
    pub operator: String,
    pub delegation_target: Option<String>,
    pub label: Option<String>,
    pub context: ExecutionContext,
    pub run_state: RunState,
    pub result: Option<ExecutionResult>,
    pub pinned: bool,
    pub dataset_id: Option<String>,
    pub queued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub failed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl DelegatedOperation {
    /// Materialize a freshly queued document from a request
    pub fn queued(request: NewOperation) -> Self {
        let now = Utc::now();
        let dataset_id = request.context.dataset_id().map(str::to_string);
        let label = request.label.or_else(|| Some(request.operator.clone()));

        Self {
            id: Uuid::new_v4(),
            operator: request.operator,
            delegation_target: request.delegation_target,
            label,
            context: request.context,
            run_state: RunState::Queued,
            result: None,
            pinned: false,
            dataset_id,
            queued_at: now,
            started_at: None,
            completed_at: None,
            failed_at: None,
            updated_at: now,
        }
    }

    pub fn dataset_name(&self) -> Option<&str> {
        self.context.dataset_name()
    }

    pub fn is_terminal(&self) -> bool {
        self.run_state.is_terminal()
    }

    /// Write a new run state and stamp the matching timestamp.
    ///
    /// The write is unconditional; lifecycle checks belong to the caller.
    pub fn apply_run_state(
        &mut self,
        run_state: RunState,
        result: Option<ExecutionResult>,
        at: DateTime<Utc>,
    ) {
        self.run_state = run_state;
        match run_state {
            RunState::Queued => {}
            RunState::Running => self.started_at = Some(at),
            RunState::Completed => self.completed_at = Some(at),
            RunState::Failed => self.failed_at = Some(at),
        }
        if result.is_some() {
            self.result = result;
        }
        self.updated_at = at;
    }

    /// The request that would queue this operation again as a new document.
    ///
    /// Only operator, delegation target, label and context carry over; the
    /// run doc id injected by a previous execution is dropped.
    pub fn rerun_request(&self) -> NewOperation {
        let mut context = self.context.clone();
        context.strip_run_doc();
        NewOperation {
            operator: self.operator.clone(),
            delegation_target: self.delegation_target.clone(),
            label: self.label.clone(),
            context,
        }
    }
}

/// Fields a caller supplies when queuing an operation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewOperation {
    pub operator: String,
    pub delegation_target: Option<String>,
    pub label: Option<String>,
    pub context: ExecutionContext,
}

impl NewOperation {
    pub fn new(operator: impl Into<String>) -> Self {
        Self {
            operator: operator.into(),
            ..Self::default()
        }
    }

    pub fn with_delegation_target(mut self, target: impl Into<String>) -> Self {
        self.delegation_target = Some(target.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_context(mut self, context: ExecutionContext) -> Self {
        self.context = context;
        self
    }
}
