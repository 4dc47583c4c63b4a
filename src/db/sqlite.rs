//! SQLite adapter.
//!
//! Databases are opened read-only and never created; a missing file is a
//! connection failure.

use crate::db::adapter::{
    CONNECT_TIMEOUT, DatabaseAdapter, POOL_MAX_CONNECTIONS, connect_error,
};
use crate::db::executor;
use crate::db::limit::{apply_row_limit, mark_cap_reached};
use crate::db::schema::{SchemaBuilder, quote_ident};
use crate::error::{DbError, DbResult};
use crate::models::{
    Column, ConnectionConfig, DatabaseType, MAX_ROW_LIMIT, QueryParam, QueryResult, Schema,
};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::sync::Arc;
use tracing::{debug, info, warn};

mod queries {
    pub const TABLE_COLUMNS: &str = r#"
        SELECT
            m.name AS table_name,
            m.type AS table_type,
            p.name AS column_name,
            p.type AS data_type,
            p."notnull" AS not_null,
            p.dflt_value AS default_value,
            p.pk AS pk
        FROM sqlite_master m
        JOIN pragma_table_info(m.name) p
        WHERE m.type IN ('table', 'view')
        AND m.name NOT LIKE 'sqlite_%'
        ORDER BY m.name, p.cid
        "#;
}

#[derive(Debug, Default)]
pub struct SqliteAdapter {
    pool: Option<SqlitePool>,
    schema_cache: Option<Arc<Schema>>,
}

impl SqliteAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn pool(&self) -> DbResult<&SqlitePool> {
        self.pool
            .as_ref()
            .ok_or_else(|| DbError::no_connection("SQLite adapter is not connected"))
    }

    async fn fetch_schema(pool: &SqlitePool) -> DbResult<Schema> {
        let rows = sqlx::query(queries::TABLE_COLUMNS).fetch_all(pool).await?;

        let mut builder = SchemaBuilder::new();
        let mut current: Option<String> = None;
        for row in &rows {
            let table: String = row.try_get("table_name")?;
            if current.as_deref() != Some(table.as_str()) {
                let table_type: String = row.try_get("table_type")?;
                let row_count = if table_type == "table" {
                    Self::count_rows(pool, &table).await
                } else {
                    None
                };
                builder.table(None, table.clone(), row_count);
                current = Some(table.clone());
            }

            let column_name: String = row.try_get("column_name")?;
            let not_null: i64 = row.try_get("not_null")?;
            let pk: i64 = row.try_get("pk")?;
            let column = Column::new(
                column_name.clone(),
                row.try_get::<String, _>("data_type")?,
                not_null == 0 && pk == 0,
            )
            .with_default(row.try_get("default_value")?);

            if pk > 0 {
                builder.primary_key(None, table.clone(), column_name);
            }
            builder.column(None, table, column);
        }

        Ok(builder.build())
    }

    /// Exact row count; a failure only loses the count.
    async fn count_rows(pool: &SqlitePool, table: &str) -> Option<u64> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table));
        match sqlx::query_scalar::<_, i64>(&sql).fetch_one(pool).await {
            Ok(n) => Some(n.max(0) as u64),
            Err(e) => {
                warn!(table = %table, error = %e, "Failed to count rows");
                None
            }
        }
    }
}

#[async_trait]
impl DatabaseAdapter for SqliteAdapter {
    fn db_type(&self) -> DatabaseType {
        DatabaseType::SQLite
    }

    fn is_connected(&self) -> bool {
        self.pool.is_some()
    }

    async fn connect(&mut self, config: &ConnectionConfig) -> DbResult<()> {
        if self.pool.is_some() {
            return Ok(());
        }

        let options = SqliteConnectOptions::new()
            .filename(&config.database)
            .read_only(true)
            .create_if_missing(false);

        let pool = SqlitePoolOptions::new()
            .max_connections(POOL_MAX_CONNECTIONS)
            .acquire_timeout(CONNECT_TIMEOUT)
            .connect_with(options)
            .await
            .map_err(|e| connect_error(DatabaseType::SQLite, e))?;

        info!(path = %config.database, "Opened SQLite database");
        self.pool = Some(pool);
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.schema_cache = None;
        if let Some(pool) = self.pool.take() {
            pool.close().await;
            debug!("SQLite pool closed");
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
        debug!(tables = schema.table_count(), "Fetched SQLite schema");
        self.schema_cache = Some(Arc::clone(&schema));
        Ok(schema)
    }

    async fn execute_query(
        &mut self,
        query: &str,
        params: &[QueryParam],
    ) -> DbResult<QueryResult> {
        let pool = self.pool()?;
        let sql = apply_row_limit(query, DatabaseType::SQLite, MAX_ROW_LIMIT);
        let result = executor::sqlite::fetch(pool, &sql, params, MAX_ROW_LIMIT).await?;
        Ok(mark_cap_reached(result, sql != query, MAX_ROW_LIMIT))
    }
}
