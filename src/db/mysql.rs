//! MySQL / MariaDB adapter.

use crate::db::adapter::{
    CONNECT_TIMEOUT, DatabaseAdapter, POOL_MAX_CONNECTIONS, connect_error,
};
use crate::db::executor;
use crate::db::limit::{apply_row_limit, mark_cap_reached};
use crate::db::schema::SchemaBuilder;
use crate::error::{DbError, DbResult};
use crate::models::{
    Column, ConnectionConfig, DatabaseType, MAX_ROW_LIMIT, QueryParam, QueryResult, Schema,
};
use async_trait::async_trait;
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions, MySqlSslMode};
use sqlx::{MySqlPool, Row};
use std::sync::Arc;
use tracing::{debug, info};

mod queries {
    // Server-internal databases are excluded. CONVERT avoids VARBINARY
    // results from information_schema on some server versions.

    pub const TABLES: &str = r#"
        SELECT
            CONVERT(TABLE_SCHEMA USING utf8mb4) AS table_schema,
            CONVERT(TABLE_NAME USING utf8mb4) AS table_name,
            TABLE_ROWS AS row_count
        FROM information_schema.TABLES
        WHERE TABLE_SCHEMA NOT IN ('mysql', 'information_schema', 'performance_schema', 'sys')
        AND TABLE_SCHEMA = COALESCE(DATABASE(), TABLE_SCHEMA)
        AND TABLE_TYPE IN ('BASE TABLE', 'VIEW')
        ORDER BY TABLE_SCHEMA, TABLE_NAME
        "#;

    pub const COLUMNS: &str = r#"
        SELECT
            CONVERT(TABLE_SCHEMA USING utf8mb4) AS table_schema,
            CONVERT(TABLE_NAME USING utf8mb4) AS table_name,
            CONVERT(COLUMN_NAME USING utf8mb4) AS column_name,
            CONVERT(COLUMN_TYPE USING utf8mb4) AS column_type,
            CONVERT(IS_NULLABLE USING utf8mb4) AS is_nullable,
            CONVERT(COLUMN_DEFAULT USING utf8mb4) AS column_default
        FROM information_schema.COLUMNS
        WHERE TABLE_SCHEMA NOT IN ('mysql', 'information_schema', 'performance_schema', 'sys')
        AND TABLE_SCHEMA = COALESCE(DATABASE(), TABLE_SCHEMA)
        ORDER BY TABLE_SCHEMA, TABLE_NAME, ORDINAL_POSITION
        "#;

    pub const PRIMARY_KEYS: &str = r#"
        SELECT
            CONVERT(TABLE_SCHEMA USING utf8mb4) AS table_schema,
            CONVERT(TABLE_NAME USING utf8mb4) AS table_name,
            CONVERT(COLUMN_NAME USING utf8mb4) AS column_name
        FROM information_schema.KEY_COLUMN_USAGE
        WHERE CONSTRAINT_NAME = 'PRIMARY'
        AND TABLE_SCHEMA NOT IN ('mysql', 'information_schema', 'performance_schema', 'sys')
        AND TABLE_SCHEMA = COALESCE(DATABASE(), TABLE_SCHEMA)
        "#;
}

#[derive(Debug, Default)]
pub struct MySqlAdapter {
    pool: Option<MySqlPool>,
    /// Database the pool is bound to; tables in it are shown unqualified
    database: String,
    schema_cache: Option<Arc<Schema>>,
}

impl MySqlAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn pool(&self) -> DbResult<&MySqlPool> {
        self.pool
            .as_ref()
            .ok_or_else(|| DbError::no_connection("MySQL adapter is not connected"))
    }

    fn connect_options(config: &ConnectionConfig) -> MySqlConnectOptions {
        let port = if config.port == 0 {
            DatabaseType::MySQL.default_port().unwrap_or(3306)
        } else {
            config.port
        };
        let mut options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(port)
            .username(&config.username)
            .charset("utf8mb4")
            .ssl_mode(if config.use_tls {
                MySqlSslMode::Required
            } else {
                MySqlSslMode::Preferred
            });
        if !config.password.is_empty() {
            options = options.password(&config.password);
        }
        if !config.database.is_empty() {
            options = options.database(&config.database);
        }
        options
    }

    /// The connected database is the implied namespace.
    fn namespace_for(&self, schema: String) -> Option<String> {
        if schema.eq_ignore_ascii_case(&self.database) {
            None
        } else {
            Some(schema)
        }
    }

    async fn fetch_schema(&self) -> DbResult<Schema> {
        let pool = self.pool()?;
        let mut builder = SchemaBuilder::new();

        let tables = sqlx::query(queries::TABLES).fetch_all(pool).await?;
        for row in &tables {
            let row_count: Option<u64> = row.try_get("row_count")?;
            builder.table(
                self.namespace_for(row.try_get("table_schema")?),
                row.try_get("table_name")?,
                row_count,
            );
        }

        let columns = sqlx::query(queries::COLUMNS).fetch_all(pool).await?;
        for row in &columns {
            let is_nullable: String = row.try_get("is_nullable")?;
            let column = Column::new(
                row.try_get::<String, _>("column_name")?,
                row.try_get::<String, _>("column_type")?,
                is_nullable.eq_ignore_ascii_case("YES"),
            )
            .with_default(row.try_get("column_default")?);
            builder.column(
                self.namespace_for(row.try_get("table_schema")?),
                row.try_get("table_name")?,
                column,
            );
        }

        let keys = sqlx::query(queries::PRIMARY_KEYS).fetch_all(pool).await?;
        for row in &keys {
            builder.primary_key(
                self.namespace_for(row.try_get("table_schema")?),
                row.try_get("table_name")?,
                row.try_get("column_name")?,
            );
        }

        Ok(builder.build())
    }
}

#[async_trait]
impl DatabaseAdapter for MySqlAdapter {
    fn db_type(&self) -> DatabaseType {
        DatabaseType::MySQL
    }

    fn is_connected(&self) -> bool {
        self.pool.is_some()
    }

    async fn connect(&mut self, config: &ConnectionConfig) -> DbResult<()> {
        if self.pool.is_some() {
            return Ok(());
        }

        let pool = MySqlPoolOptions::new()
            .max_connections(POOL_MAX_CONNECTIONS)
            .acquire_timeout(CONNECT_TIMEOUT)
            .connect_with(Self::connect_options(config))
            .await
            .map_err(|e| connect_error(DatabaseType::MySQL, e))?;

        info!(host = %config.host, database = %config.database, "Connected to MySQL");
        self.database = config.database.clone();
        self.pool = Some(pool);
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.schema_cache = None;
        if let Some(pool) = self.pool.take() {
            pool.close().await;
            debug!("MySQL pool closed");
        }
    }

    async fn test_connection(&mut self) -> bool {
        match &self.pool {
            Some(pool) => sqlx::query("SELECT 1").execute(pool).await.is_ok(),
            None => false,
        }
    }

    async fn get_schema(&mut self) -> DbResult<Arc<Schema>> {
        if let Some(schema) = &self.schema_cache {
            return Ok(Arc::clone(schema));
        }
        let schema = Arc::new(self.fetch_schema().await?);
        debug!(tables = schema.table_count(), "Fetched MySQL schema");
        self.schema_cache = Some(Arc::clone(&schema));
        Ok(schema)
    }

    async fn execute_query(
        &mut self,
        query: &str,
        params: &[QueryParam],
    ) -> DbResult<QueryResult> {
        let pool = self.pool()?;
        let sql = apply_row_limit(query, DatabaseType::MySQL, MAX_ROW_LIMIT);
        let result = executor::mysql::fetch(pool, &sql, params, MAX_ROW_LIMIT).await?;
        Ok(mark_cap_reached(result, sql != query, MAX_ROW_LIMIT))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_for_connected_database() {
        let adapter = MySqlAdapter {
            database: "shop".to_string(),
            ..Default::default()
        };
        assert_eq!(adapter.namespace_for("shop".into()), None);
        assert_eq!(
            adapter.namespace_for("analytics".into()),
            Some("analytics".to_string())
        );
    }

    #[tokio::test]
    async fn test_operations_require_connection() {
        let mut adapter = MySqlAdapter::new();
        assert!(!adapter.test_connection().await);
        assert!(matches!(
            adapter.execute_query("SELECT 1", &[]).await,
            Err(DbError::NoConnection { .. })
        ));
        assert!(matches!(
            adapter.get_schema_context().await,
            Err(DbError::NoConnection { .. })
        ));
    }
}
