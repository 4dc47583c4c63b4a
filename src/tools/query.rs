//! Query execution, export and connection-test handlers.
//!
//! SQL is sanitized and validated before an adapter is even created, so a
//! rejected statement never opens a connection. MongoDB queries are JSON and
//! are checked by the adapter instead.

use crate::db::AdapterRegistry;
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionConfig, ConnectionInfo, ExecuteRequest, QueryParam, QueryResult};
use crate::tools::flow::with_adapter;
use crate::tools::format::{self, ExportFormat, ExportOutput};
use crate::tools::sql_validator;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, info};

/// Input for the export endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ExportRequest {
    pub sql: String,
    #[serde(default)]
    pub params: Vec<QueryParam>,
    #[serde(default)]
    pub format: ExportFormat,
}

/// Handler for query execution.
#[derive(Debug, Clone)]
pub struct QueryToolHandler {
    registry: Arc<AdapterRegistry>,
}

impl QueryToolHandler {
    pub fn new(registry: Arc<AdapterRegistry>) -> Self {
        Self { registry }
    }

    /// Normalize and gate the query text for the target backend.
    pub fn prepare_query(config: &ConnectionConfig, text: &str) -> DbResult<String> {
        if config.db_type.is_document() {
            let trimmed = text.trim();
            if trimmed.is_empty() {
                return Err(DbError::invalid_input("Query cannot be empty"));
            }
            return Ok(trimmed.to_string());
        }
        sql_validator::prepare(text)
    }

    /// Run a validated read query and return its rows.
    pub async fn execute(
        &self,
        config: &ConnectionConfig,
        request: ExecuteRequest,
    ) -> DbResult<QueryResult> {
        let sql = Self::prepare_query(config, &request.sql)?;
        debug!(sql = %sql, params = request.params.len(), "Executing query");

        let params = request.params;
        let result = with_adapter(&self.registry, config, move |adapter| {
            Box::pin(async move { adapter.execute_query(&sql, &params).await })
        })
        .await?;

        info!(
            db_type = %config.db_type,
            row_count = result.row_count,
            truncated = result.truncated,
            execution_time_ms = result.execution_time_ms,
            "Query executed"
        );
        Ok(result)
    }

    /// Run a query and render the rows in the requested format.
    pub async fn export(
        &self,
        config: &ConnectionConfig,
        request: ExportRequest,
    ) -> DbResult<ExportOutput> {
        let format = request.format;
        let execute = ExecuteRequest {
            sql: request.sql,
            params: request.params,
        };
        let result = self.execute(config, execute).await?;
        Ok(format::export(&result, format))
    }

    /// Connect, round-trip and disconnect. Fails if the round trip fails.
    pub async fn test_connection(&self, config: &ConnectionConfig) -> DbResult<ConnectionInfo> {
        let healthy = with_adapter(&self.registry, config, |adapter| {
            Box::pin(async move { Ok::<_, DbError>(adapter.test_connection().await) })
        })
        .await?;

        if !healthy {
            return Err(DbError::connection_failed(
                format!("{} did not answer a test query", config.db_type),
                "Check that the user can read from the database",
            ));
        }

        info!(db_type = %config.db_type, database = %config.database, "Connection test passed");
        Ok(ConnectionInfo::from(config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DatabaseType;

    fn empty_handler() -> QueryToolHandler {
        QueryToolHandler::new(Arc::new(AdapterRegistry::empty()))
    }

    #[test]
    fn test_export_request_deserialization() {
        let json = r#"{"sql": "SELECT * FROM users WHERE id = $1", "params": [42]}"#;
        let request: ExportRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.params.len(), 1);
        assert_eq!(request.format, ExportFormat::Csv);

        let json = r#"{"sql": "SELECT 1", "format": "table"}"#;
        let request: ExportRequest = serde_json::from_str(json).unwrap();
        assert_eq!(request.format, ExportFormat::Table);
    }

    #[test]
    fn test_prepare_query_per_backend() {
        let sqlite = ConnectionConfig::sqlite("/tmp/x.db");
        assert_eq!(
            QueryToolHandler::prepare_query(&sqlite, "SELECT 1 ;").unwrap(),
            "SELECT 1"
        );

        let mongo =
            ConnectionConfig::network(DatabaseType::MongoDB, "h", 27017, "d", "u", "p");
        let text = r#" {"collection": "users", "operation": "find"} "#;
        assert_eq!(
            QueryToolHandler::prepare_query(&mongo, text).unwrap(),
            text.trim()
        );
    }

    #[tokio::test]
    async fn test_rejected_sql_never_reaches_registry() {
        // An empty registry would fail with ConnectionFailed if asked for an adapter
        let handler = empty_handler();
        let config = ConnectionConfig::sqlite("/tmp/x.db");
        let err = handler
            .execute(&config, ExecuteRequest::new("DROP TABLE employees"))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::DangerousQuery { .. }));
    }

    #[tokio::test]
    async fn test_unregistered_backend() {
        let handler = empty_handler();
        let config = ConnectionConfig::sqlite("/tmp/x.db");
        let err = handler
            .execute(&config, ExecuteRequest::new("SELECT 1"))
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::ConnectionFailed { .. }));
    }
}
