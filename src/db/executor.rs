//! Query execution under a caller-supplied cancellation context.
//!
//! The executor checks a connection out of the source's pool, issues one
//! resolved statement with its ordered bind values, and drains the row
//! stream. Database-specific implementations live in submodules with
//! intentionally parallel structure so differences stay obvious. No retries
//! happen here.

use futures_util::StreamExt;
use std::fmt;
use std::time::Duration;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::db::source::{DbPool, Source};
use crate::error::{ToolError, ToolResult};
use crate::models::BindValue;
use crate::tools::binder::ResolvedStatement;

pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Cancellation and deadline context for one invocation.
#[derive(Debug, Clone)]
pub struct QueryContext {
    cancel: CancellationToken,
    timeout: Duration,
}

impl QueryContext {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_QUERY_TIMEOUT)
    }

    /// Fresh context with its own token and the given deadline.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            cancel: CancellationToken::new(),
            timeout,
        }
    }

    /// Context driven by an external token, for callers that propagate
    /// protocol-level cancellation.
    pub fn with_cancellation(cancel: CancellationToken, timeout: Duration) -> Self {
        Self { cancel, timeout }
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for QueryContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Rows fetched for one invocation, still in driver representation.
pub enum RowSet {
    MySql(Vec<sqlx::mysql::MySqlRow>),
    Postgres(Vec<sqlx::postgres::PgRow>),
    SQLite(Vec<sqlx::sqlite::SqliteRow>),
}

impl RowSet {
    pub fn len(&self) -> usize {
        match self {
            RowSet::MySql(rows) => rows.len(),
            RowSet::Postgres(rows) => rows.len(),
            RowSet::SQLite(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// Driver row types carry no Debug impl; report the backend and row count.
impl fmt::Debug for RowSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let backend = match self {
            RowSet::MySql(_) => "MySql",
            RowSet::Postgres(_) => "Postgres",
            RowSet::SQLite(_) => "SQLite",
        };
        f.debug_struct("RowSet")
            .field("backend", &backend)
            .field("rows", &self.len())
            .finish()
    }
}

/// Execute a resolved statement against a source.
///
/// Cancellation or deadline expiry surfaces as `ExecutionCanceled`. The
/// interrupted connection still has a statement in flight and cannot go
/// back into rotation, so it is detached from the pool and dropped; the
/// pool opens a replacement on the next acquire. Database failures surface
/// as `ExecutionFailed`.
pub async fn execute(
    source: &Source,
    statement: &ResolvedStatement,
    ctx: &QueryContext,
) -> ToolResult<RowSet> {
    debug!(
        source = %source.id(),
        binds = statement.binds.len(),
        "Executing statement"
    );

    match source.pool() {
        DbPool::MySql(pool) => mysql::run(pool, &statement.sql, &statement.binds, ctx)
            .await
            .map(RowSet::MySql),
        DbPool::Postgres(pool) => postgres::run(pool, &statement.sql, &statement.binds, ctx)
            .await
            .map(RowSet::Postgres),
        DbPool::SQLite(pool) => sqlite::run(pool, &statement.sql, &statement.binds, ctx)
            .await
            .map(RowSet::SQLite),
    }
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================
//
// Each module below provides the same interface adapted to its database type.
// The code structure is intentionally parallel to make differences obvious.

mod mysql {
    use super::*;
    use sqlx::MySqlPool;
    use sqlx::mysql::{MySqlArguments, MySqlConnection, MySqlRow};

    pub async fn run(
        pool: &MySqlPool,
        sql: &str,
        binds: &[BindValue],
        ctx: &QueryContext,
    ) -> ToolResult<Vec<MySqlRow>> {
        let cancel = ctx.cancel_token();
        let mut conn = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ToolError::ExecutionCanceled),
            acquired = pool.acquire() => acquired?,
        };
        let completed = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            fetched = timeout(ctx.timeout(), fetch_rows(&mut conn, sql, binds)) => fetched.ok(),
        };
        match completed {
            Some(result) => result,
            None => {
                drop(conn.detach());
                Err(ToolError::ExecutionCanceled)
            }
        }
    }

    async fn fetch_rows(
        conn: &mut MySqlConnection,
        sql: &str,
        binds: &[BindValue],
    ) -> ToolResult<Vec<MySqlRow>> {
        let mut query = sqlx::query(sql);
        for bind in binds {
            query = bind_value(query, bind)?;
        }
        let mut stream = query.fetch(&mut *conn);
        let mut rows = Vec::new();
        while let Some(row) = stream.next().await {
            rows.push(row?);
        }
        Ok(rows)
    }

    fn bind_value<'q>(
        query: sqlx::query::Query<'q, sqlx::MySql, MySqlArguments>,
        value: &'q BindValue,
    ) -> ToolResult<sqlx::query::Query<'q, sqlx::MySql, MySqlArguments>> {
        Ok(match value {
            BindValue::Null => query.bind(None::<String>),
            BindValue::Bool(v) => query.bind(*v),
            BindValue::Int(v) => query.bind(*v),
            BindValue::Float(v) => query.bind(*v),
            BindValue::Text(v) => query.bind(v.as_str()),
            BindValue::Array(_) => {
                return Err(ToolError::execution_failed(
                    "array parameters cannot be bound on mysql",
                    None,
                ));
            }
        })
    }
}

mod postgres {
    use super::*;
    use sqlx::PgPool;
    use sqlx::postgres::{PgArguments, PgConnection, PgRow};

    pub async fn run(
        pool: &PgPool,
        sql: &str,
        binds: &[BindValue],
        ctx: &QueryContext,
    ) -> ToolResult<Vec<PgRow>> {
        let cancel = ctx.cancel_token();
        let mut conn = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ToolError::ExecutionCanceled),
            acquired = pool.acquire() => acquired?,
        };
        let completed = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            fetched = timeout(ctx.timeout(), fetch_rows(&mut conn, sql, binds)) => fetched.ok(),
        };
        match completed {
            Some(result) => result,
            None => {
                drop(conn.detach());
                Err(ToolError::ExecutionCanceled)
            }
        }
    }

    async fn fetch_rows(
        conn: &mut PgConnection,
        sql: &str,
        binds: &[BindValue],
    ) -> ToolResult<Vec<PgRow>> {
        let mut query = sqlx::query(sql);
        for bind in binds {
            query = bind_value(query, bind)?;
        }
        let mut stream = query.fetch(&mut *conn);
        let mut rows = Vec::new();
        while let Some(row) = stream.next().await {
            rows.push(row?);
        }
        Ok(rows)
    }

    fn bind_value<'q>(
        query: sqlx::query::Query<'q, sqlx::Postgres, PgArguments>,
        value: &'q BindValue,
    ) -> ToolResult<sqlx::query::Query<'q, sqlx::Postgres, PgArguments>> {
        Ok(match value {
            BindValue::Null => query.bind(None::<String>),
            BindValue::Bool(v) => query.bind(*v),
            BindValue::Int(v) => query.bind(*v),
            BindValue::Float(v) => query.bind(*v),
            BindValue::Text(v) => query.bind(v.as_str()),
            BindValue::Array(elements) => bind_array(query, elements)?,
        })
    }

    /// Bind a homogeneous array. The binder coerced every element to one
    /// kind (plus nulls), so the driver type follows the first non-null
    /// element; an all-null array binds as text.
    pub fn bind_array<'q>(
        query: sqlx::query::Query<'q, sqlx::Postgres, PgArguments>,
        elements: &'q [BindValue],
    ) -> ToolResult<sqlx::query::Query<'q, sqlx::Postgres, PgArguments>> {
        match elements.iter().find(|e| !e.is_null()) {
            Some(BindValue::Int(_)) => {
                let values: Vec<Option<i64>> = elements
                    .iter()
                    .map(|e| match e {
                        BindValue::Int(v) => Some(*v),
                        _ => None,
                    })
                    .collect();
                Ok(query.bind(values))
            }
            Some(BindValue::Float(_)) => {
                let values: Vec<Option<f64>> = elements
                    .iter()
                    .map(|e| match e {
                        BindValue::Float(v) => Some(*v),
                        _ => None,
                    })
                    .collect();
                Ok(query.bind(values))
            }
            Some(BindValue::Bool(_)) => {
                let values: Vec<Option<bool>> = elements
                    .iter()
                    .map(|e| match e {
                        BindValue::Bool(v) => Some(*v),
                        _ => None,
                    })
                    .collect();
                Ok(query.bind(values))
            }
            Some(BindValue::Text(_)) => {
                let values: Vec<Option<String>> = elements
                    .iter()
                    .map(|e| match e {
                        BindValue::Text(v) => Some(v.clone()),
                        _ => None,
                    })
                    .collect();
                Ok(query.bind(values))
            }
            Some(BindValue::Array(_)) => Err(ToolError::execution_failed(
                "nested array parameters are not supported",
                None,
            )),
            Some(BindValue::Null) | None => {
                let values: Vec<Option<String>> = elements.iter().map(|_| None).collect();
                Ok(query.bind(values))
            }
        }
    }
}

mod sqlite {
    use super::*;
    use sqlx::SqlitePool;
    use sqlx::sqlite::{SqliteArguments, SqliteConnection, SqliteRow};

    pub async fn run(
        pool: &SqlitePool,
        sql: &str,
        binds: &[BindValue],
        ctx: &QueryContext,
    ) -> ToolResult<Vec<SqliteRow>> {
        let cancel = ctx.cancel_token();
        let mut conn = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ToolError::ExecutionCanceled),
            acquired = pool.acquire() => acquired?,
        };
        let completed = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            fetched = timeout(ctx.timeout(), fetch_rows(&mut conn, sql, binds)) => fetched.ok(),
        };
        match completed {
            Some(result) => result,
            None => {
                drop(conn.detach());
                Err(ToolError::ExecutionCanceled)
            }
        }
    }

    async fn fetch_rows(
        conn: &mut SqliteConnection,
        sql: &str,
        binds: &[BindValue],
    ) -> ToolResult<Vec<SqliteRow>> {
        let mut query = sqlx::query(sql);
        for bind in binds {
            query = bind_value(query, bind)?;
        }
        let mut stream = query.fetch(&mut *conn);
        let mut rows = Vec::new();
        while let Some(row) = stream.next().await {
            rows.push(row?);
        }
        Ok(rows)
    }

    fn bind_value<'q>(
        query: sqlx::query::Query<'q, sqlx::Sqlite, SqliteArguments<'q>>,
        value: &'q BindValue,
    ) -> ToolResult<sqlx::query::Query<'q, sqlx::Sqlite, SqliteArguments<'q>>> {
        Ok(match value {
            BindValue::Null => query.bind(None::<String>),
            BindValue::Bool(v) => query.bind(*v),
            BindValue::Int(v) => query.bind(*v),
            BindValue::Float(v) => query.bind(*v),
            BindValue::Text(v) => query.bind(v.as_str()),
            BindValue::Array(_) => {
                return Err(ToolError::execution_failed(
                    "array parameters cannot be bound on sqlite",
                    None,
                ));
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::source::Source;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn memory_source() -> Source {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        Source::from_pool("mem", DbPool::SQLite(pool))
    }

    #[tokio::test]
    async fn test_execute_with_binds() {
        let source = memory_source().await;
        let statement = ResolvedStatement {
            sql: "SELECT ?1 + 1 AS answer".to_string(),
            binds: vec![BindValue::Int(41)],
        };
        let rows = execute(&source, &statement, &QueryContext::new())
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn test_database_failure_is_execution_failed() {
        let source = memory_source().await;
        let statement = ResolvedStatement {
            sql: "SELECT * FROM missing_table".to_string(),
            binds: vec![],
        };
        let err = execute(&source, &statement, &QueryContext::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::ExecutionFailed { .. }));
    }

    #[tokio::test]
    async fn test_pre_canceled_context() {
        let source = memory_source().await;
        let statement = ResolvedStatement {
            sql: "SELECT 1".to_string(),
            binds: vec![],
        };
        let token = CancellationToken::new();
        token.cancel();
        let ctx = QueryContext::with_cancellation(token, DEFAULT_QUERY_TIMEOUT);
        let err = execute(&source, &statement, &ctx).await.unwrap_err();
        assert!(matches!(err, ToolError::ExecutionCanceled));
    }

    #[test]
    fn test_all_null_array_binds_as_text() {
        let query: sqlx::query::Query<'_, sqlx::Postgres, sqlx::postgres::PgArguments> =
            sqlx::query("SELECT $1");
        let elements = vec![BindValue::Null, BindValue::Null];
        assert!(postgres::bind_array(query, &elements).is_ok());
    }

    #[test]
    fn test_array_with_gaps_binds_by_first_non_null() {
        let query: sqlx::query::Query<'_, sqlx::Postgres, sqlx::postgres::PgArguments> =
            sqlx::query("SELECT $1");
        let elements = vec![BindValue::Null, BindValue::Int(7), BindValue::Null];
        assert!(postgres::bind_array(query, &elements).is_ok());
    }

    #[test]
    fn test_row_set_debug_reports_backend_and_count() {
        let rendered = format!("{:?}", RowSet::SQLite(Vec::new()));
        assert!(rendered.contains("SQLite"));
        assert!(rendered.contains('0'));
    }
}
