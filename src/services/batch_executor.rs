//! # Batch Executor
//!
//! Runs queued delegated operations. Each document in a batch is resolved,
//! claimed, executed and finally marked completed or failed; a failing
//! operator never stops the rest of the batch.
//!
//! ## Single operation protocol
//!
//! 1. The document id is injected into the request params under `run_doc`.
//! 2. The resolver binds the operator. A resolution failure moves the document
//!    straight from `queued` to `failed` and nothing runs.
//! 3. The document is claimed (`queued` -> `running`). Losing the claim to
//!    another driver skips the document.
//! 4. The operator runs with panic capture and the optional timeout, and the
//!    driver writes `completed` or `failed`.
//!
//! A repository error while processing one document is logged, recorded on
//! that document when possible and counted as failed; the batch moves on. A
//! document deleted mid-run is counted as skipped. Only a failure to list the
//! queued documents propagates to the caller.

use crate::error::{DelegatedOperationError, Result};
use crate::logging::{log_operation_event, OperationEvent};
use crate::models::{DelegatedOperation, ExecutionResult, OperationFilter, PagingParams};
use crate::registry::{PreparedOperator, Resolution};
use crate::services::DelegatedOperationService;
use crate::state_machine::RunState;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Selection and logging options for one batch
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecuteQueuedOptions {
    pub operator: Option<String>,
    pub delegation_target: Option<String>,
    pub dataset_name: Option<String>,
    /// Maximum documents to process; falls back to the configured default
    pub limit: Option<usize>,
    /// Emit per-document lifecycle logs
    pub log: bool,
    /// Additional filter fields, applied where the named options are unset
    pub extra: OperationFilter,
}

impl ExecuteQueuedOptions {
    pub fn operator(mut self, operator: impl Into<String>) -> Self {
        self.operator = Some(operator.into());
        self
    }

    pub fn delegation_target(mut self, target: impl Into<String>) -> Self {
        self.delegation_target = Some(target.into());
        self
    }

    pub fn dataset_name(mut self, dataset_name: impl Into<String>) -> Self {
        self.dataset_name = Some(dataset_name.into());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_logging(mut self) -> Self {
        self.log = true;
        self
    }

    pub fn extra(mut self, extra: OperationFilter) -> Self {
        self.extra = extra;
        self
    }

    /// Filter selecting the queued documents this batch may pick up
    pub fn filter(&self) -> OperationFilter {
        let named = OperationFilter {
            operator: self.operator.clone(),
            dataset_name: self.dataset_name.clone(),
            delegation_target: self.delegation_target.clone(),
            ..OperationFilter::queued()
        };
        named.merged_with(&self.extra)
    }
}

/// Per-batch counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchExecutionSummary {
    pub processed: usize,
    pub completed: usize,
    pub failed: usize,
    /// Documents claimed by another driver before this one got to them
    pub skipped: usize,
}

impl BatchExecutionSummary {
    pub fn absorb(&mut self, other: BatchExecutionSummary) {
        self.processed += other.processed;
        self.completed += other.completed;
        self.failed += other.failed;
        self.skipped += other.skipped;
    }
}

/// Which summary counter a processed document lands in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tally {
    Completed,
    Failed,
    Skipped,
}

/// How a single document left the executor
#[derive(Debug)]
enum OperationOutcome {
    Completed(ExecutionResult),
    Failed(ExecutionResult),
    /// Resolution failed and the document was already marked failed
    Unresolved(ExecutionResult),
    Skipped,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}

impl DelegatedOperationService {
    /// Execute queued operations matching `options`, in queue order
    pub async fn execute_queued_operations(
        &self,
        options: &ExecuteQueuedOptions,
    ) -> Result<BatchExecutionSummary> {
        let paging = options
            .limit
            .or(self.config.default_limit)
            .map(PagingParams::with_limit);
        let queued = self
            .repository
            .list_operations(&options.filter(), paging)
            .await?;
        let log = options.log || self.config.log_executions;

        debug!(count = queued.len(), "Fetched queued delegated operations");

        let mut summary = BatchExecutionSummary::default();
        for doc in queued {
            summary.processed += 1;
            let (id, operator) = (doc.id, doc.operator.clone());

            match self.process_document(doc, log).await {
                Ok(Tally::Completed) => summary.completed += 1,
                Ok(Tally::Failed) => summary.failed += 1,
                Ok(Tally::Skipped) => summary.skipped += 1,
                Err(e) if e.is_not_found() => {
                    warn!(
                        operation_id = %id,
                        operator = %operator,
                        "Operation disappeared during execution"
                    );
                    summary.skipped += 1;
                    if log {
                        log_operation_event(OperationEvent::Skipped, id, &operator, None, None);
                    }
                }
                Err(e) => {
                    error!(
                        operation_id = %id,
                        operator = %operator,
                        error = %e,
                        "Repository error while executing operation"
                    );
                    self.record_executor_error(id, &e).await;
                    summary.failed += 1;
                    if log {
                        log_operation_event(
                            OperationEvent::Failed,
                            id,
                            &operator,
                            Some(RunState::Failed),
                            Some(&e.to_string()),
                        );
                    }
                }
            }
        }

        if summary.processed > 0 {
            info!(
                processed = summary.processed,
                completed = summary.completed,
                failed = summary.failed,
                skipped = summary.skipped,
                "Delegated operation batch finished"
            );
        }
        Ok(summary)
    }

    /// Run one document through the whole protocol, including its terminal
    /// write
    async fn process_document(&self, doc: DelegatedOperation, log: bool) -> Result<Tally> {
        let (id, operator) = (doc.id, doc.operator.clone());
        if log {
            log_operation_event(OperationEvent::Started, id, &operator, None, None);
        }

        let tally = match self.execute_operation(doc).await? {
            OperationOutcome::Completed(result) => {
                self.set_completed(id, Some(result)).await?;
                if log {
                    log_operation_event(
                        OperationEvent::Completed,
                        id,
                        &operator,
                        Some(RunState::Completed),
                        None,
                    );
                }
                Tally::Completed
            }
            OperationOutcome::Failed(result) => {
                let trace = result.error().map(str::to_string);
                self.set_failed(id, result).await?;
                if log {
                    log_operation_event(
                        OperationEvent::Failed,
                        id,
                        &operator,
                        Some(RunState::Failed),
                        trace.as_deref(),
                    );
                }
                Tally::Failed
            }
            OperationOutcome::Unresolved(result) => {
                if log {
                    log_operation_event(
                        OperationEvent::Failed,
                        id,
                        &operator,
                        Some(RunState::Failed),
                        result.error(),
                    );
                }
                Tally::Failed
            }
            OperationOutcome::Skipped => {
                if log {
                    log_operation_event(OperationEvent::Skipped, id, &operator, None, None);
                }
                Tally::Skipped
            }
        };
        Ok(tally)
    }

    /// Best-effort FAILED write after a repository error; a second failure is
    /// only logged
    async fn record_executor_error(&self, id: Uuid, err: &DelegatedOperationError) {
        let result = ExecutionResult::failure(err.to_string());
        if let Err(write_err) = self.set_failed(id, result).await {
            if !write_err.is_not_found() {
                error!(
                    operation_id = %id,
                    error = %write_err,
                    "Failed to record executor error on operation"
                );
            }
        }
    }

    /// Resolve, claim and run one document; terminal writes are left to the
    /// caller except for resolution failures
    async fn execute_operation(&self, mut doc: DelegatedOperation) -> Result<OperationOutcome> {
        doc.context.inject_run_doc(doc.id);

        let prepared = match self
            .resolver
            .resolve_and_bind(&doc.operator, &doc.context.request_params)
            .await
        {
            Resolution::Ready(prepared) => prepared,
            Resolution::Failed(result) => {
                // never observed as running
                let written = self
                    .repository
                    .compare_and_set_run_state(
                        doc.id,
                        RunState::Queued,
                        RunState::Failed,
                        Some(result.clone()),
                    )
                    .await?;
                return Ok(match written {
                    Some(_) => OperationOutcome::Unresolved(result),
                    None => OperationOutcome::Skipped,
                });
            }
        };

        if self.repository.claim_operation(doc.id).await?.is_none() {
            debug!(operation_id = %doc.id, "Operation claimed by another executor");
            return Ok(OperationOutcome::Skipped);
        }

        Ok(self.run_prepared(&doc, prepared).await)
    }

    async fn run_prepared(
        &self,
        doc: &DelegatedOperation,
        prepared: PreparedOperator,
    ) -> OperationOutcome {
        let start_time = Instant::now();
        let execution = AssertUnwindSafe(prepared.operator.execute(&prepared.context)).catch_unwind();

        let outcome = match self.config.operation_timeout() {
            Some(limit) => match tokio::time::timeout(limit, execution).await {
                Ok(outcome) => outcome,
                Err(_) => {
                    warn!(
                        operation_id = %doc.id,
                        operator = %doc.operator,
                        timeout_ms = limit.as_millis() as u64,
                        "Operation timed out"
                    );
                    return OperationOutcome::Failed(ExecutionResult::failure(format!(
                        "Operation timed out after {}ms",
                        limit.as_millis()
                    )));
                }
            },
            None => execution.await,
        };
        let execution_time_ms = start_time.elapsed().as_millis() as u64;

        match outcome {
            Ok(Ok(value)) => {
                debug!(
                    operation_id = %doc.id,
                    operator = %doc.operator,
                    execution_time_ms,
                    "Operation executed"
                );
                OperationOutcome::Completed(ExecutionResult::success(value))
            }
            Ok(Err(err)) => {
                error!(
                    operation_id = %doc.id,
                    operator = %doc.operator,
                    error = %err,
                    execution_time_ms,
                    "Operation returned error"
                );
                OperationOutcome::Failed(ExecutionResult::failure(format!("{err:?}")))
            }
            Err(payload) => {
                let panic_msg = panic_message(payload.as_ref());
                error!(
                    operation_id = %doc.id,
                    operator = %doc.operator,
                    panic_msg = %panic_msg,
                    execution_time_ms,
                    "Operation panicked"
                );
                OperationOutcome::Failed(ExecutionResult::failure(format!(
                    "Operation panicked: {panic_msg}"
                )))
            }
        }
    }

    /// Run batches every `interval` until `shutdown` fires, returning the
    /// accumulated counts.
    ///
    /// Batch errors are logged and the loop keeps going.
    pub async fn run_polling_loop(
        &self,
        options: ExecuteQueuedOptions,
        interval: Duration,
        mut shutdown: broadcast::Receiver<()>,
    ) -> BatchExecutionSummary {
        let mut totals = BatchExecutionSummary::default();
        info!(interval_ms = interval.as_millis() as u64, "Polling loop started");

        loop {
            match self.execute_queued_operations(&options).await {
                Ok(summary) => totals.absorb(summary),
                Err(e) => error!(error = %e, "Delegated operation batch failed"),
            }

            tokio::select! {
                _ = tokio::time::sleep(interval) => {},
                _ = shutdown.recv() => {
                    debug!("Shutdown notification received");
                    break;
                }
            }
        }

        info!(
            processed = totals.processed,
            completed = totals.completed,
            failed = totals.failed,
            skipped = totals.skipped,
            "Polling loop ended"
        );
        totals
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_forces_queued_state() {
        let options = ExecuteQueuedOptions::default()
            .operator("echo")
            .extra(OperationFilter::default().run_state(RunState::Failed).pinned(true));

        let filter = options.filter();
        assert_eq!(filter.run_state, Some(RunState::Queued));
        assert_eq!(filter.operator.as_deref(), Some("echo"));
        assert_eq!(filter.pinned, Some(true));
    }

    #[test]
    fn test_named_options_win_over_extra() {
        let options = ExecuteQueuedOptions::default()
            .dataset_name("quickstart")
            .extra(OperationFilter::default().dataset_name("other").label("nightly"));

        let filter = options.filter();
        assert_eq!(filter.dataset_name.as_deref(), Some("quickstart"));
        assert_eq!(filter.label.as_deref(), Some("nightly"));
    }

    #[test]
    fn test_summary_absorb() {
        let mut totals = BatchExecutionSummary::default();
        totals.absorb(BatchExecutionSummary {
            processed: 3,
            completed: 1,
            failed: 1,
            skipped: 1,
        });
        totals.absorb(BatchExecutionSummary {
            processed: 1,
            completed: 1,
            ..Default::default()
        });
        assert_eq!(totals.processed, 4);
        assert_eq!(totals.completed, 2);
    }

    #[test]
    fn test_panic_message_downcasts() {
        let payload: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(payload.as_ref()), "static message");

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned message"));
        assert_eq!(panic_message(payload.as_ref()), "owned message");

        let payload: Box<dyn Any + Send> = Box::new(42_u8);
        assert_eq!(panic_message(payload.as_ref()), "Unknown panic");
    }
}
