//! # Services
//!
//! The delegated operation service and its batch executor.

pub mod batch_executor;
pub mod delegated_operation_service;

pub use batch_executor::{BatchExecutionSummary, ExecuteQueuedOptions};
pub use delegated_operation_service::DelegatedOperationService;
