//! # Registry Infrastructure
//!
//! Operator resolution for delegated operations.
//!
//! The service only depends on [`OperatorResolver`]; [`OperatorRegistry`] is
//! the in-process implementation used by embedded deployments and tests.

pub mod operator_registry;

pub use operator_registry::{
    ExecutableOperator, OperatorRegistry, OperatorResolver, PreparedOperator, Resolution,
};
