//! PostgreSQL adapter.

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
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgSslMode};
use sqlx::{PgPool, Row};
use std::sync::Arc;
use tracing::{debug, info};

/// Schemas that belong to the server or to hosting platforms (Supabase and
/// friends) rather than to the application.
pub const EXCLUDED_SCHEMAS: &[&str] = &[
    "information_schema",
    "pg_catalog",
    "pg_toast",
    "auth",
    "storage",
    "extensions",
    "graphql",
    "graphql_public",
    "realtime",
    "supabase_functions",
    "supabase_migrations",
    "vault",
    "pgsodium",
    "pgsodium_masks",
    "net",
    "cron",
    "pgbouncer",
];

mod queries {
    // information_schema columns are domain types; cast to text for decoding

    pub const TABLES: &str = r#"
        SELECT
            t.table_schema::text AS table_schema,
            t.table_name::text AS table_name,
            s.n_live_tup AS row_count
        FROM information_schema.tables t
        LEFT JOIN pg_stat_user_tables s
            ON s.schemaname = t.table_schema AND s.relname = t.table_name
        WHERE t.table_type IN ('BASE TABLE', 'VIEW')
        AND t.table_schema <> ALL($1)
        AND t.table_schema NOT LIKE 'pg_temp%'
        AND t.table_schema NOT LIKE 'pg_toast%'
        ORDER BY t.table_schema, t.table_name
        "#;

    pub const COLUMNS: &str = r#"
        SELECT
            c.table_schema::text AS table_schema,
            c.table_name::text AS table_name,
            c.column_name::text AS column_name,
            c.data_type::text AS data_type,
            c.is_nullable::text AS is_nullable,
            c.column_default::text AS column_default
        FROM information_schema.columns c
        WHERE c.table_schema <> ALL($1)
        AND c.table_schema NOT LIKE 'pg_temp%'
        AND c.table_schema NOT LIKE 'pg_toast%'
        ORDER BY c.table_schema, c.table_name, c.ordinal_position
        "#;

    pub const PRIMARY_KEYS: &str = r#"
        SELECT
            kcu.table_schema::text AS table_schema,
            kcu.table_name::text AS table_name,
            kcu.column_name::text AS column_name
        FROM information_schema.table_constraints tc
        JOIN information_schema.key_column_usage kcu
            ON tc.constraint_name = kcu.constraint_name
            AND tc.table_schema = kcu.table_schema
            AND tc.table_name = kcu.table_name
        WHERE tc.constraint_type = 'PRIMARY KEY'
        AND tc.table_schema <> ALL($1)
        "#;
}

#[derive(Debug, Default)]
pub struct PostgresAdapter {
    pool: Option<PgPool>,
    schema_cache: Option<Arc<Schema>>,
}

impl PostgresAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn pool(&self) -> DbResult<&PgPool> {
        self.pool
            .as_ref()
            .ok_or_else(|| DbError::no_connection("PostgreSQL adapter is not connected"))
    }

    fn connect_options(config: &ConnectionConfig) -> PgConnectOptions {
        let port = if config.port == 0 {
            DatabaseType::PostgreSQL.default_port().unwrap_or(5432)
        } else {
            config.port
        };
        PgConnectOptions::new()
            .host(&config.host)
            .port(port)
            .username(&config.username)
            .password(&config.password)
            .database(&config.database)
            .application_name("sql-copilot")
            .ssl_mode(if config.use_tls {
                PgSslMode::Require
            } else {
                PgSslMode::Prefer
            })
    }

    async fn fetch_schema(pool: &PgPool) -> DbResult<Schema> {
        let mut builder = SchemaBuilder::new();

        let tables = sqlx::query(queries::TABLES)
            .bind(EXCLUDED_SCHEMAS)
            .fetch_all(pool)
            .await?;
        for row in &tables {
            let row_count: Option<i64> = row.try_get("row_count")?;
            builder.table(
                Some(row.try_get("table_schema")?),
                row.try_get("table_name")?,
                row_count.map(|n| n.max(0) as u64),
            );
        }

        let columns = sqlx::query(queries::COLUMNS)
            .bind(EXCLUDED_SCHEMAS)
            .fetch_all(pool)
            .await?;
        for row in &columns {
            let is_nullable: String = row.try_get("is_nullable")?;
            let column = Column::new(
                row.try_get::<String, _>("column_name")?,
                row.try_get::<String, _>("data_type")?,
                is_nullable.eq_ignore_ascii_case("YES"),
            )
            .with_default(row.try_get("column_default")?);
            builder.column(
                Some(row.try_get("table_schema")?),
                row.try_get("table_name")?,
                column,
            );
        }

        let keys = sqlx::query(queries::PRIMARY_KEYS)
            .bind(EXCLUDED_SCHEMAS)
            .fetch_all(pool)
            .await?;
        for row in &keys {
            builder.primary_key(
                Some(row.try_get("table_schema")?),
                row.try_get("table_name")?,
                row.try_get("column_name")?,
            );
        }

        Ok(builder.build())
    }
}

#[async_trait]
impl DatabaseAdapter for PostgresAdapter {
    fn db_type(&self) -> DatabaseType {
        DatabaseType::PostgreSQL
    }

    fn is_connected(&self) -> bool {
        self.pool.is_some()
    }

    async fn connect(&mut self, config: &ConnectionConfig) -> DbResult<()> {
        if self.pool.is_some() {
            return Ok(());
        }

        let pool = PgPoolOptions::new()
            .max_connections(POOL_MAX_CONNECTIONS)
            .acquire_timeout(CONNECT_TIMEOUT)
            .connect_with(Self::connect_options(config))
            .await
            .map_err(|e| connect_error(DatabaseType::PostgreSQL, e))?;

        info!(host = %config.host, database = %config.database, "Connected to PostgreSQL");
        self.pool = Some(pool);
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.schema_cache = None;
        if let Some(pool) = self.pool.take() {
            pool.close().await;
            debug!("PostgreSQL pool closed");
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
        let schema = Arc::new(Self::fetch_schema(self.pool()?).await?);
        debug!(tables = schema.table_count(), "Fetched PostgreSQL schema");
        self.schema_cache = Some(Arc::clone(&schema));
        Ok(schema)
    }

    async fn execute_query(
        &mut self,
        query: &str,
        params: &[QueryParam],
    ) -> DbResult<QueryResult> {
        let pool = self.pool()?;
        let sql = apply_row_limit(query, DatabaseType::PostgreSQL, MAX_ROW_LIMIT);
        let result = executor::postgres::fetch(pool, &sql, params, MAX_ROW_LIMIT).await?;
        Ok(mark_cap_reached(result, sql != query, MAX_ROW_LIMIT))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_excluded_schemas_cover_platform_schemas() {
        for schema in ["pg_catalog", "information_schema", "auth", "storage", "realtime"] {
            assert!(EXCLUDED_SCHEMAS.contains(&schema));
        }
        assert!(!EXCLUDED_SCHEMAS.contains(&"public"));
    }

    #[tokio::test]
    async fn test_operations_require_connection() {
        let mut adapter = PostgresAdapter::new();
        assert!(!adapter.is_connected());
        assert!(!adapter.test_connection().await);
        assert!(matches!(
            adapter.get_schema().await,
            Err(DbError::NoConnection { .. })
        ));
        assert!(matches!(
            adapter.execute_query("SELECT 1", &[]).await,
            Err(DbError::NoConnection { .. })
        ));
        // Safe when never connected
        adapter.disconnect().await;
    }
}
