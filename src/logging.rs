//! # Structured Logging Module
//!
//! Environment-aware structured logging for batch executors. Console output by
//! default, JSON lines when `DELEGATED_OPS_LOG_FORMAT=json`. `RUST_LOG` always
//! wins over the environment-derived level.

use crate::config::ConfigManager;
use crate::constants::env as env_keys;
use crate::state_machine::RunState;
use chrono::Utc;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = ConfigManager::detect_environment();
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(get_log_level(&environment)));
        let json = use_json_format();

        let result = if json {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .json()
                        .with_target(true)
                        .with_thread_ids(true)
                        .with_current_span(true),
                )
                .try_init()
        } else {
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_thread_ids(true)
                        .with_level(true),
                )
                .try_init()
        };

        // A host application may already own the global subscriber
        if result.is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            pid = std::process::id(),
            environment = %environment,
            json = json,
            "Structured logging initialized"
        );
    });
}

fn use_json_format() -> bool {
    std::env::var(env_keys::LOG_FORMAT)
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false)
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        "test" => "warn",
        _ => "debug",
    }
}

/// Lifecycle point of a document inside a batch, for opt-in execution logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationEvent {
    Started,
    Completed,
    Failed,
    Skipped,
}

impl OperationEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

/// Log structured data for a delegated operation lifecycle event
pub fn log_operation_event(
    event: OperationEvent,
    operation_id: Uuid,
    operator: &str,
    run_state: Option<RunState>,
    details: Option<&str>,
) {
    let run_state = run_state.map(|s| s.as_str());
    match event {
        OperationEvent::Failed => tracing::warn!(
            event = event.as_str(),
            operation_id = %operation_id,
            operator = %operator,
            run_state = run_state,
            details = details,
            timestamp = %Utc::now().to_rfc3339(),
            "Operation {} failed",
            operation_id
        ),
        OperationEvent::Started => tracing::info!(
            event = event.as_str(),
            operation_id = %operation_id,
            operator = %operator,
            run_state = run_state,
            timestamp = %Utc::now().to_rfc3339(),
            "Running operation {} ({})",
            operation_id,
            operator
        ),
        _ => tracing::info!(
            event = event.as_str(),
            operation_id = %operation_id,
            operator = %operator,
            run_state = run_state,
            details = details,
            timestamp = %Utc::now().to_rfc3339(),
            "Operation {} {}",
            operation_id,
            event.as_str()
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_level_mapping() {
        assert_eq!(get_log_level("production"), "info");
        assert_eq!(get_log_level("test"), "warn");
        assert_eq!(get_log_level("development"), "debug");
        assert_eq!(get_log_level("unknown"), "debug");
    }

    #[test]
    fn test_init_is_idempotent() {
        init_structured_logging();
        init_structured_logging();
        log_operation_event(
            OperationEvent::Completed,
            Uuid::new_v4(),
            "echo",
            Some(RunState::Completed),
            None,
        );
    }
}
