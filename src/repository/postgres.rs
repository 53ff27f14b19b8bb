//! # PostgreSQL Operation Repository
//!
//! sqlx-backed storage for delegated operation documents.
//!
//! ## Claiming
//!
//! `compare_and_set_run_state` is a single `UPDATE ... WHERE run_state = $5
//! RETURNING *`, so two drivers racing for the same document cannot both
//! claim it.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use delegated_ops::config::DatabaseConfig;
//! use delegated_ops::repository::PostgresOperationRepository;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = DatabaseConfig {
//!     url: Some("postgresql://localhost/delegated_ops".to_string()),
//!     ..DatabaseConfig::default()
//! };
//! let repo = PostgresOperationRepository::connect(&config).await?;
//! repo.ensure_schema().await?;
//! # Ok(())
//! # }
//! ```

use crate::config::{ConfigurationError, DatabaseConfig};
use crate::error::{DelegatedOperationError, Result};
use crate::models::{
    DelegatedOperation, ExecutionContext, ExecutionResult, NewOperation, OperationFilter,
    PagingParams, SortDirection,
};
use crate::repository::OperationRepository;
use crate::state_machine::RunState;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, Postgres};
use sqlx::types::Json;
use sqlx::{FromRow, PgPool, QueryBuilder};
use std::time::Duration;
use tracing::{debug, error, info, instrument};
use uuid::Uuid;

#[derive(Debug, FromRow)]
struct OperationRow {
    id: Uuid,
    operator: String,
    delegation_target: Option<String>,
    label: Option<String>,
    context: Json<ExecutionContext>,
    run_state: String,
    result: Option<Json<ExecutionResult>>,
    pinned: bool,
    dataset_id: Option<String>,
    queued_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    failed_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OperationRow> for DelegatedOperation {
    type Error = DelegatedOperationError;

    fn try_from(row: OperationRow) -> Result<Self> {
        let run_state = row
            .run_state
            .parse::<RunState>()
            .map_err(DelegatedOperationError::Repository)?;

        Ok(DelegatedOperation {
            id: row.id,
            operator: row.operator,
            delegation_target: row.delegation_target,
            label: row.label,
            context: row.context.0,
            run_state,
            result: row.result.map(|json| json.0),
            pinned: row.pinned,
            dataset_id: row.dataset_id,
            queued_at: row.queued_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            failed_at: row.failed_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_documents(rows: Vec<OperationRow>) -> Result<Vec<DelegatedOperation>> {
    rows.into_iter().map(DelegatedOperation::try_from).collect()
}

/// Timestamp column written alongside a run state
fn stamp_column(run_state: RunState) -> Option<&'static str> {
    match run_state {
        RunState::Queued => None,
        RunState::Running => Some("started_at"),
        RunState::Completed => Some("completed_at"),
        RunState::Failed => Some("failed_at"),
    }
}

/// LIMIT/OFFSET values saturate at the largest BIGINT
fn sql_count(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn push_paging(builder: &mut QueryBuilder<'_, Postgres>, paging: &PagingParams) {
    if let Some(limit) = paging.limit {
        builder.push(" LIMIT ").push_bind(sql_count(limit));
    }
    if paging.skip > 0 {
        builder.push(" OFFSET ").push_bind(sql_count(paging.skip));
    }
}

/// ORDER BY clause matching the in-memory ordering: missing timestamps first
/// when ascending, insertion order on ties
fn order_clause(paging: &PagingParams) -> String {
    let nulls = match paging.sort_direction {
        SortDirection::Ascending => "FIRST",
        SortDirection::Descending => "LAST",
    };
    format!(
        " ORDER BY {} {} NULLS {}, seq ASC",
        paging.sort_by.column(),
        paging.sort_direction.keyword(),
        nulls
    )
}

fn schema_sql(table: &str) -> Vec<String> {
    vec![
        format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                seq BIGSERIAL,
                id UUID PRIMARY KEY,
                operator TEXT NOT NULL,
                delegation_target TEXT,
                label TEXT,
                context JSONB NOT NULL,
                run_state TEXT NOT NULL,
                result JSONB,
                pinned BOOLEAN NOT NULL DEFAULT FALSE,
                dataset_id TEXT,
                dataset_name TEXT,
                queued_at TIMESTAMPTZ NOT NULL,
                started_at TIMESTAMPTZ,
                completed_at TIMESTAMPTZ,
                failed_at TIMESTAMPTZ,
                updated_at TIMESTAMPTZ NOT NULL
            )
            "#
        ),
        format!("CREATE INDEX IF NOT EXISTS {table}_run_state_idx ON {table} (run_state, queued_at)"),
        format!("CREATE INDEX IF NOT EXISTS {table}_dataset_id_idx ON {table} (dataset_id)"),
    ]
}

fn push_filters(builder: &mut QueryBuilder<'_, Postgres>, filter: &OperationFilter) {
    builder.push(" WHERE TRUE");
    if let Some(operator) = &filter.operator {
        builder.push(" AND operator = ").push_bind(operator.clone());
    }
    if let Some(dataset_name) = &filter.dataset_name {
        builder.push(" AND dataset_name = ").push_bind(dataset_name.clone());
    }
    if let Some(dataset_id) = &filter.dataset_id {
        builder.push(" AND dataset_id = ").push_bind(dataset_id.clone());
    }
    if let Some(run_state) = filter.run_state {
        builder.push(" AND run_state = ").push_bind(run_state.as_str());
    }
    if let Some(target) = &filter.delegation_target {
        builder.push(" AND delegation_target = ").push_bind(target.clone());
    }
    if let Some(pinned) = filter.pinned {
        builder.push(" AND pinned = ").push_bind(pinned);
    }
    if let Some(label) = &filter.label {
        builder.push(" AND label = ").push_bind(label.clone());
    }
}

/// Operation repository stored in a single PostgreSQL table
#[derive(Debug, Clone)]
pub struct PostgresOperationRepository {
    pool: PgPool,
    table: String,
}

impl PostgresOperationRepository {
    /// Create a repository over an existing pool using the default table
    pub fn new(pool: PgPool) -> Self {
        Self::with_table(pool, crate::constants::DEFAULT_TABLE_NAME)
    }

    /// Create a repository over an existing pool and table.
    ///
    /// The table name is interpolated into SQL; callers go through
    /// [`DatabaseConfig::validate`] first.
    pub fn with_table(pool: PgPool, table: impl Into<String>) -> Self {
        Self {
            pool,
            table: table.into(),
        }
    }

    /// Open a pool from configuration
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        config.validate()?;
        let url = config.url.as_deref().ok_or_else(|| {
            ConfigurationError::missing_required_field("database.url", "PostgreSQL repository")
        })?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_millis(config.acquire_timeout_ms))
            .connect(url)
            .await
            .map_err(|e| {
                error!("Failed to connect delegated operation repository: {}", e);
                DelegatedOperationError::repository(format!("Connection failed: {e}"))
            })?;

        info!(
            table = %config.table_name,
            max_connections = config.max_connections,
            "Connected PostgreSQL operation repository"
        );
        Ok(Self::with_table(pool, config.table_name.clone()))
    }

    /// Create the backing table and indexes when missing
    pub async fn ensure_schema(&self) -> Result<()> {
        for statement in schema_sql(&self.table) {
            sqlx::query(&statement).execute(&self.pool).await?;
        }
        debug!(table = %self.table, "Ensured delegated operation schema");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn exists(&self, id: Uuid) -> Result<bool> {
        let sql = format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = $1)", self.table);
        let (exists,): (bool,) = sqlx::query_as(&sql)
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }
}

#[async_trait]
impl OperationRepository for PostgresOperationRepository {
    #[instrument(skip(self, request), fields(operator = %request.operator))]
    async fn queue_operation(&self, request: NewOperation) -> Result<DelegatedOperation> {
        let doc = DelegatedOperation::queued(request);
        let sql = format!(
            r#"
            INSERT INTO {}
            (id, operator, delegation_target, label, context, run_state, result, pinned,
             dataset_id, dataset_name, queued_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, NULL, FALSE, $7, $8, $9, $9)
            RETURNING *
            "#,
            self.table
        );

        let row = sqlx::query_as::<_, OperationRow>(&sql)
            .bind(doc.id)
            .bind(&doc.operator)
            .bind(&doc.delegation_target)
            .bind(&doc.label)
            .bind(Json(&doc.context))
            .bind(doc.run_state.as_str())
            .bind(&doc.dataset_id)
            .bind(doc.dataset_name())
            .bind(doc.queued_at)
            .fetch_one(&self.pool)
            .await?;

        row.try_into()
    }

    #[instrument(skip(self, result))]
    async fn update_run_state(
        &self,
        id: Uuid,
        run_state: RunState,
        result: Option<ExecutionResult>,
    ) -> Result<DelegatedOperation> {
        let stamp = stamp_column(run_state)
            .map(|column| format!(", {column} = $4"))
            .unwrap_or_default();
        let sql = format!(
            "UPDATE {} SET run_state = $2, result = COALESCE($3, result), updated_at = $4{} \
             WHERE id = $1 RETURNING *",
            self.table, stamp
        );

        let row = sqlx::query_as::<_, OperationRow>(&sql)
            .bind(id)
            .bind(run_state.as_str())
            .bind(result.map(Json))
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(DelegatedOperationError::NotFound { id })?;

        row.try_into()
    }

    #[instrument(skip(self, result))]
    async fn compare_and_set_run_state(
        &self,
        id: Uuid,
        expected: RunState,
        run_state: RunState,
        result: Option<ExecutionResult>,
    ) -> Result<Option<DelegatedOperation>> {
        let stamp = stamp_column(run_state)
            .map(|column| format!(", {column} = $4"))
            .unwrap_or_default();
        let sql = format!(
            "UPDATE {} SET run_state = $2, result = COALESCE($3, result), updated_at = $4{} \
             WHERE id = $1 AND run_state = $5 RETURNING *",
            self.table, stamp
        );

        let row = sqlx::query_as::<_, OperationRow>(&sql)
            .bind(id)
            .bind(run_state.as_str())
            .bind(result.map(Json))
            .bind(Utc::now())
            .bind(expected.as_str())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(row.try_into()?)),
            None if self.exists(id).await? => {
                debug!(
                    operation_id = %id,
                    expected = %expected,
                    "Operation no longer in expected state"
                );
                Ok(None)
            }
            None => Err(DelegatedOperationError::NotFound { id }),
        }
    }

    async fn set_pinned(&self, id: Uuid, pinned: bool) -> Result<DelegatedOperation> {
        let sql = format!(
            "UPDATE {} SET pinned = $2, updated_at = $3 WHERE id = $1 RETURNING *",
            self.table
        );

        let row = sqlx::query_as::<_, OperationRow>(&sql)
            .bind(id)
            .bind(pinned)
            .bind(Utc::now())
            .fetch_optional(&self.pool)
            .await?
            .ok_or(DelegatedOperationError::NotFound { id })?;

        row.try_into()
    }

    async fn delete_operation(&self, id: Uuid) -> Result<Option<DelegatedOperation>> {
        let sql = format!("DELETE FROM {} WHERE id = $1 RETURNING *", self.table);

        let row = sqlx::query_as::<_, OperationRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(DelegatedOperation::try_from).transpose()
    }

    async fn delete_for_dataset(&self, dataset_id: &str) -> Result<u64> {
        let sql = format!("DELETE FROM {} WHERE dataset_id = $1", self.table);

        let outcome = sqlx::query(&sql)
            .bind(dataset_id)
            .execute(&self.pool)
            .await?;

        Ok(outcome.rows_affected())
    }

    async fn get(&self, id: Uuid) -> Result<DelegatedOperation> {
        let sql = format!("SELECT * FROM {} WHERE id = $1", self.table);

        let row = sqlx::query_as::<_, OperationRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(DelegatedOperationError::NotFound { id })?;

        row.try_into()
    }

    async fn list_operations(
        &self,
        filter: &OperationFilter,
        paging: Option<PagingParams>,
    ) -> Result<Vec<DelegatedOperation>> {
        let paging = paging.unwrap_or_default();
        let mut builder = QueryBuilder::<Postgres>::new(format!("SELECT * FROM {}", self.table));
        push_filters(&mut builder, filter);
        builder.push(order_clause(&paging));
        push_paging(&mut builder, &paging);

        let rows = builder
            .build_query_as::<OperationRow>()
            .fetch_all(&self.pool)
            .await?;

        into_documents(rows)
    }

    async fn count_operations(&self, filter: &OperationFilter) -> Result<u64> {
        let mut builder =
            QueryBuilder::<Postgres>::new(format!("SELECT COUNT(*) FROM {}", self.table));
        push_filters(&mut builder, filter);

        let count: i64 = builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        Ok(count.max(0) as u64)
    }
}
