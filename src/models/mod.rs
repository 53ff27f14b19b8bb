//! # Data Models
//!
//! Operation documents, execution context/result and query shapes.

pub mod delegated_operation;
pub mod execution;
pub mod paging;

pub use delegated_operation::{DelegatedOperation, NewOperation};
pub use execution::{ExecutionContext, ExecutionResult, ValidationError};
pub use paging::{OperationFilter, PagingParams, SortDirection, SortField};
