//! Capped, timed query execution shared by the sqlx adapters.
//!
//! Rows are streamed and at most `row_cap + 1` are pulled from the server;
//! the extra row only tells us whether the result was truncated. An empty
//! result takes its columns from the prepared statement instead.

use crate::db::adapter::QUERY_TIMEOUT;
use crate::db::types::RowToJson;
use crate::error::{DbError, DbResult};
use crate::models::{ColumnMetadata, QueryParam, QueryResult};
use futures_util::StreamExt;
use std::time::{Duration, Instant};
use tokio::time::timeout;
use tracing::{debug, warn};

/// Turn fetched rows into a `QueryResult`, keeping at most `row_cap` rows.
fn process_rows<R: RowToJson>(rows: Vec<R>, row_cap: usize, start: Instant) -> QueryResult {
    let execution_time_ms = start.elapsed().as_millis() as u64;

    let Some(first) = rows.first() else {
        return QueryResult::empty(execution_time_ms);
    };

    let columns = first.column_metadata();
    let total_rows = rows.len();
    let truncated = total_rows > row_cap;

    let json_rows: Vec<_> = rows.iter().take(row_cap).map(|r| r.to_json_map()).collect();

    if truncated {
        warn!(row_cap, "Query result truncated");
    }

    QueryResult::new(columns, json_rows, execution_time_ms, truncated)
}

fn collect_rows<R>(results: Vec<Result<R, sqlx::Error>>) -> DbResult<Vec<R>> {
    results
        .into_iter()
        .map(|r| r.map_err(DbError::from))
        .collect()
}

fn timeout_error(limit: Duration) -> DbError {
    DbError::invalid_sql(format!(
        "Query timed out after {} seconds",
        limit.as_secs()
    ))
}

/// Generates `fetch` for one sqlx backend. Parameterless statements go
/// through the raw executor so no prepared statement is created.
macro_rules! sqlx_fetcher {
    ($module:ident, $pool:ty, $label:literal) => {
        pub(crate) mod $module {
            use super::*;
            use crate::db::params::BindParams;

            pub async fn fetch(
                pool: &$pool,
                sql: &str,
                params: &[QueryParam],
                row_cap: usize,
            ) -> DbResult<QueryResult> {
                debug!(backend = $label, sql = %sql, params = params.len(), "Executing query");
                let start = Instant::now();
                let fetch_limit = row_cap + 1;

                let rows = if params.is_empty() {
                    use sqlx::Executor;
                    pool.fetch(sql).take(fetch_limit).collect::<Vec<_>>()
                } else {
                    sqlx::query(sql)
                        .bind_params(params)
                        .fetch(pool)
                        .take(fetch_limit)
                        .collect::<Vec<_>>()
                };

                let mut result = match timeout(QUERY_TIMEOUT, rows).await {
                    Ok(results) => process_rows(collect_rows(results)?, row_cap, start),
                    Err(_) => return Err(timeout_error(QUERY_TIMEOUT)),
                };
                if result.columns.is_empty() {
                    result.columns = describe_columns(pool, sql).await;
                }
                Ok(result)
            }

            async fn describe_columns(pool: &$pool, sql: &str) -> Vec<ColumnMetadata> {
                use sqlx::{Column, Executor, TypeInfo};

                match timeout(QUERY_TIMEOUT, pool.describe(sql)).await {
                    Ok(Ok(described)) => described
                        .columns()
                        .iter()
                        .map(|col| ColumnMetadata::new(col.name(), col.type_info().name()))
                        .collect(),
                    Ok(Err(e)) => {
                        warn!(backend = $label, error = %e, "Failed to describe empty result");
                        Vec::new()
                    }
                    Err(_) => Vec::new(),
                }
            }
        }
    };
}

sqlx_fetcher!(mysql, sqlx::MySqlPool, "MySQL");
sqlx_fetcher!(postgres, sqlx::PgPool, "PostgreSQL");
sqlx_fetcher!(sqlite, sqlx::SqlitePool, "SQLite");
