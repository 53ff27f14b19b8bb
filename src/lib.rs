#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Delegated Ops
//!
//! Queue and executor for long-running custom operations run on behalf of a
//! dataset-management application.
//!
//! ## Overview
//!
//! Callers queue an operation (an operator URI plus request parameters). The
//! document is persisted in the `queued` state and later picked up by a batch
//! executor, which resolves the operator, runs it and records the outcome.
//!
//! ```text
//! queued --(resolve fails)----------------------------> failed
//! queued --(claim)--> running --(ok)-----------------> completed
//!                             --(error/panic/timeout)-> failed
//! ```
//!
//! ## Module Organization
//!
//! - [`services`] - Lifecycle manager and batch executor
//! - [`repository`] - Document storage (in-memory and PostgreSQL)
//! - [`registry`] - Operator resolution
//! - [`models`] - Documents, execution context/result, filters and paging
//! - [`state_machine`] - Run states and their transitions
//! - [`config`] - Layered configuration
//! - [`logging`] - Structured logging setup
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use delegated_ops::config::ConfigManager;
//! use delegated_ops::registry::OperatorRegistry;
//! use delegated_ops::repository::InMemoryOperationRepository;
//! use delegated_ops::services::{DelegatedOperationService, ExecuteQueuedOptions};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! delegated_ops::logging::init_structured_logging();
//! let manager = ConfigManager::load()?;
//!
//! let service = DelegatedOperationService::with_config(
//!     Arc::new(InMemoryOperationRepository::new()),
//!     Arc::new(OperatorRegistry::new()),
//!     manager.config().executor.clone(),
//! );
//!
//! service.queue_operation("@demo/echo", None, None).await?;
//! let summary = service
//!     .execute_queued_operations(&ExecuteQueuedOptions::default().with_logging())
//!     .await?;
//! println!("processed {} operations", summary.processed);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod models;
pub mod registry;
pub mod repository;
pub mod services;
pub mod state_machine;

pub use config::{ConfigManager, DatabaseConfig, DelegatedOpsConfig, ExecutorConfig};
pub use error::{DelegatedOperationError, Result};
pub use models::{
    DelegatedOperation, ExecutionContext, ExecutionResult, NewOperation, OperationFilter,
    PagingParams, SortDirection, SortField, ValidationError,
};
pub use registry::{
    ExecutableOperator, OperatorRegistry, OperatorResolver, PreparedOperator, Resolution,
};
pub use repository::{InMemoryOperationRepository, OperationRepository};
#[cfg(feature = "postgres")]
pub use repository::PostgresOperationRepository;
pub use services::{BatchExecutionSummary, DelegatedOperationService, ExecuteQueuedOptions};
pub use state_machine::RunState;
