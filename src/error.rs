//! Error types for the delegated operation system.
//!
//! Only plumbing failures surface as [`DelegatedOperationError`]. Failures of an
//! operator's own logic are absorbed into the document's `failed` state and
//! never reach the caller of the batch driver.

use crate::config::ConfigurationError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum DelegatedOperationError {
    #[error("Delegated operation {id} not found")]
    NotFound { id: Uuid },

    #[error("Repository error: {0}")]
    Repository(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
}

impl DelegatedOperationError {
    /// Create a repository error from any displayable failure
    pub fn repository(reason: impl std::fmt::Display) -> Self {
        Self::Repository(reason.to_string())
    }

    /// Whether this error means the requested document does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for DelegatedOperationError {
    fn from(err: sqlx::Error) -> Self {
        DelegatedOperationError::Repository(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DelegatedOperationError>;
