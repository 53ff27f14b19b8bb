//! # Paging and Filtering
//!
//! Query shapes accepted by `list_operations`. Every filter field is optional
//! and all present fields must match (AND semantics).

use crate::models::delegated_operation::DelegatedOperation;
use crate::state_machine::RunState;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Document field to sort listings by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortField {
    #[default]
    QueuedAt,
    UpdatedAt,
    StartedAt,
    CompletedAt,
    FailedAt,
    Operator,
}

impl SortField {
    pub fn column(&self) -> &'static str {
        match self {
            Self::QueuedAt => "queued_at",
            Self::UpdatedAt => "updated_at",
            Self::StartedAt => "started_at",
            Self::CompletedAt => "completed_at",
            Self::FailedAt => "failed_at",
            Self::Operator => "operator",
        }
    }

    /// Compare two documents on this field, missing timestamps sorting first
    pub fn compare(&self, a: &DelegatedOperation, b: &DelegatedOperation) -> Ordering {
        match self {
            Self::QueuedAt => a.queued_at.cmp(&b.queued_at),
            Self::UpdatedAt => a.updated_at.cmp(&b.updated_at),
            Self::StartedAt => a.started_at.cmp(&b.started_at),
            Self::CompletedAt => a.completed_at.cmp(&b.completed_at),
            Self::FailedAt => a.failed_at.cmp(&b.failed_at),
            Self::Operator => a.operator.cmp(&b.operator),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Ascending => "ASC",
            Self::Descending => "DESC",
        }
    }
}

/// How many documents to return and in which order.
///
/// The default is unlimited and FIFO by queue time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PagingParams {
    pub limit: Option<usize>,
    #[serde(default)]
    pub skip: usize,
    #[serde(default)]
    pub sort_by: SortField,
    #[serde(default)]
    pub sort_direction: SortDirection,
}

impl PagingParams {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    pub fn skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    pub fn sort(mut self, sort_by: SortField, sort_direction: SortDirection) -> Self {
        self.sort_by = sort_by;
        self.sort_direction = sort_direction;
        self
    }

    pub fn compare(&self, a: &DelegatedOperation, b: &DelegatedOperation) -> Ordering {
        let ordering = self.sort_by.compare(a, b);
        match self.sort_direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    }
}

/// Conjunctive filter over operation documents
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationFilter {
    pub operator: Option<String>,
    pub dataset_name: Option<String>,
    pub dataset_id: Option<String>,
    pub run_state: Option<RunState>,
    pub delegation_target: Option<String>,
    pub pinned: Option<bool>,
    pub label: Option<String>,
}

impl OperationFilter {
    pub fn queued() -> Self {
        Self {
            run_state: Some(RunState::Queued),
            ..Self::default()
        }
    }

    pub fn operator(mut self, operator: impl Into<String>) -> Self {
        self.operator = Some(operator.into());
        self
    }

    pub fn dataset_name(mut self, dataset_name: impl Into<String>) -> Self {
        self.dataset_name = Some(dataset_name.into());
        self
    }

    pub fn dataset_id(mut self, dataset_id: impl Into<String>) -> Self {
        self.dataset_id = Some(dataset_id.into());
        self
    }

    pub fn run_state(mut self, run_state: RunState) -> Self {
        self.run_state = Some(run_state);
        self
    }

    pub fn delegation_target(mut self, target: impl Into<String>) -> Self {
        self.delegation_target = Some(target.into());
        self
    }

    pub fn pinned(mut self, pinned: bool) -> Self {
        self.pinned = Some(pinned);
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Fill any field left unset here from `other`
    pub fn merged_with(mut self, other: &OperationFilter) -> Self {
        self.operator = self.operator.or_else(|| other.operator.clone());
        self.dataset_name = self.dataset_name.or_else(|| other.dataset_name.clone());
        self.dataset_id = self.dataset_id.or_else(|| other.dataset_id.clone());
        self.run_state = self.run_state.or(other.run_state);
        self.delegation_target = self
            .delegation_target
            .or_else(|| other.delegation_target.clone());
        self.pinned = self.pinned.or(other.pinned);
        self.label = self.label.or_else(|| other.label.clone());
        self
    }

    pub fn matches(&self, doc: &DelegatedOperation) -> bool {
        fn eq_opt(expected: &Option<String>, actual: Option<&str>) -> bool {
            expected.as_deref().map_or(true, |e| actual == Some(e))
        }

        eq_opt(&self.operator, Some(doc.operator.as_str()))
            && eq_opt(&self.dataset_name, doc.dataset_name())
            && eq_opt(&self.dataset_id, doc.dataset_id.as_deref())
            && self.run_state.map_or(true, |s| doc.run_state == s)
            && eq_opt(&self.delegation_target, doc.delegation_target.as_deref())
            && self.pinned.map_or(true, |p| doc.pinned == p)
            && eq_opt(&self.label, doc.label.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::delegated_operation::NewOperation;
    use crate::models::execution::ExecutionContext;
    use serde_json::json;

    fn doc(operator: &str, dataset: &str) -> DelegatedOperation {
        DelegatedOperation::queued(
            NewOperation::new(operator)
                .with_context(ExecutionContext::from_value(json!({"dataset_name": dataset}))),
        )
    }

    #[test]
    fn test_empty_filter_matches_everything() {
        assert!(OperationFilter::default().matches(&doc("a", "x")));
    }

    #[test]
    fn test_filters_are_conjunctive() {
        let d = doc("a", "x");
        assert!(OperationFilter::queued().operator("a").matches(&d));
        assert!(!OperationFilter::queued().operator("a").dataset_name("y").matches(&d));
        assert!(!OperationFilter::default().run_state(RunState::Running).matches(&d));
        assert!(!OperationFilter::default().delegation_target("gpu").matches(&d));
        assert!(OperationFilter::default().pinned(false).matches(&d));
    }

    #[test]
    fn test_merged_with_prefers_own_fields() {
        let base = OperationFilter::queued().operator("a");
        let extra = OperationFilter::default().operator("b").pinned(true);
        let merged = base.merged_with(&extra);
        assert_eq!(merged.operator.as_deref(), Some("a"));
        assert_eq!(merged.pinned, Some(true));
        assert_eq!(merged.run_state, Some(RunState::Queued));
    }

    #[test]
    fn test_paging_compare_descending() {
        let first = doc("a", "x");
        let second = doc("b", "x");
        let paging = PagingParams::default().sort(SortField::Operator, SortDirection::Descending);
        assert_eq!(paging.compare(&first, &second), Ordering::Greater);
        assert_eq!(PagingParams::with_limit(2).limit, Some(2));
    }
}
