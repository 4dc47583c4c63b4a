//! The uniform contract every database backend implements.

use crate::db::context::render_schema_context;
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionConfig, DatabaseType, QueryParam, QueryResult, Schema};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Maximum connections per adapter pool.
pub const POOL_MAX_CONNECTIONS: u32 = 5;

/// Timeout for establishing a connection.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Timeout for a single statement, including row streaming.
pub const QUERY_TIMEOUT: Duration = Duration::from_secs(10);

/// A connection to one database for the lifetime of one request.
///
/// Instances start disconnected. `connect` is called once, followed by any
/// number of schema and query calls, followed by `disconnect`. Calls that
/// need a live connection return `DbError::NoConnection` otherwise.
#[async_trait]
pub trait DatabaseAdapter: Send {
    fn db_type(&self) -> DatabaseType;

    fn is_connected(&self) -> bool;

    /// Open the pool or client. A no-op if already connected.
    async fn connect(&mut self, config: &ConnectionConfig) -> DbResult<()>;

    /// Close the pool or client and drop the schema cache.
    async fn disconnect(&mut self);

    /// Run a trivial round trip. Never errors.
    async fn test_connection(&mut self) -> bool;

    /// Fetch the schema, cached for the lifetime of this instance.
    async fn get_schema(&mut self) -> DbResult<Arc<Schema>>;

    /// Run a read query, capped at `MAX_ROW_LIMIT` rows.
    async fn execute_query(&mut self, query: &str, params: &[QueryParam])
    -> DbResult<QueryResult>;

    /// Schema rendered as plain text for prompting.
    async fn get_schema_context(&mut self) -> DbResult<String> {
        let schema = self.get_schema().await?;
        Ok(render_schema_context(&schema, self.db_type()))
    }
}

/// Turn a driver connect error into a user-facing failure with a hint.
pub(crate) fn connect_error(db_type: DatabaseType, err: impl std::fmt::Display) -> DbError {
    let message = err.to_string();
    let lower = message.to_lowercase();
    let suggestion = if lower.contains("password")
        || lower.contains("authentication")
        || lower.contains("login")
    {
        "Check username and password"
    } else if lower.contains("timed out") || lower.contains("timeout") {
        "Check that the host is reachable and the port is open"
    } else if lower.contains("refused") {
        "Check that the database server is running and listening on the given port"
    } else if lower.contains("tls") || lower.contains("ssl") || lower.contains("certificate") {
        "Check the TLS setting for this server"
    } else if lower.contains("does not exist") || lower.contains("unknown database") {
        "Check that the database name is correct"
    } else if lower.contains("unable to open") || lower.contains("no such file") {
        "Check that the database file exists and is readable"
    } else {
        "Check the connection settings"
    };
    DbError::connection_failed(
        format!("{} connection failed: {}", db_type.display_name(), message),
        suggestion,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_error_suggestions() {
        let err = connect_error(DatabaseType::PostgreSQL, "password authentication failed");
        assert_eq!(err.suggestion(), Some("Check username and password"));
        assert!(err.to_string().contains("PostgreSQL"));

        let err = connect_error(DatabaseType::MySQL, "Connection refused (os error 111)");
        assert!(matches!(err, DbError::ConnectionFailed { .. }));
        assert!(err.suggestion().unwrap().contains("running"));
    }
}
