//! # System Constants
//!
//! Reserved request parameter keys and environment variable names shared by
//! the service, the repositories and the configuration loader.

/// Request parameter keys with a fixed meaning inside an execution context
pub mod params {
    /// Id of the document being executed, injected before the operator runs
    pub const RUN_DOC: &str = "run_doc";
    /// Name of the dataset the operation targets
    pub const DATASET_NAME: &str = "dataset_name";
    /// Id of the dataset that owns the operation document
    pub const DATASET_ID: &str = "dataset_id";
}

/// Environment variables read at startup
pub mod env {
    pub const ENVIRONMENT: &str = "DELEGATED_OPS_ENV";
    pub const FALLBACK_ENVIRONMENT: &str = "APP_ENV";
    pub const LOG_FORMAT: &str = "DELEGATED_OPS_LOG_FORMAT";
    pub const CONFIG_PREFIX: &str = "DELEGATED_OPS";
    pub const CONFIG_FILE: &str = "DELEGATED_OPS_CONFIG";
}

/// Error strings recorded on failed documents
pub mod errors {
    pub const VALIDATION_ERROR: &str = "Validation error";
}

pub const DEFAULT_CONFIG_FILE: &str = "config/delegated_ops";
pub const DEFAULT_TABLE_NAME: &str = "delegated_operations";
