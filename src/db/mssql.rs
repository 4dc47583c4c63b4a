//! Microsoft SQL Server adapter (tiberius).
//!
//! tiberius has no pool; the adapter holds a single client for the lifetime of
//! the request, which is all a request ever uses.

use crate::db::adapter::{CONNECT_TIMEOUT, DatabaseAdapter, QUERY_TIMEOUT, connect_error};
use crate::db::limit::{apply_row_limit, mark_cap_reached};
use crate::db::params::bind_mssql_params;
use crate::db::schema::SchemaBuilder;
use crate::db::types::encode_binary_value;
use crate::error::{DbError, DbResult};
use crate::models::{
    Column, ColumnMetadata, ConnectionConfig, DatabaseType, MAX_ROW_LIMIT, QueryParam,
    QueryResult, Schema,
};
use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tiberius::{
    AuthMethod, Client, ColumnData, ColumnType, Config, EncryptionLevel, FromSql, Query, Row,
};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{debug, info, warn};

type MssqlClient = Client<Compat<TcpStream>>;

mod queries {
    pub const TABLES: &str = r#"
        SELECT TABLE_SCHEMA, TABLE_NAME
        FROM INFORMATION_SCHEMA.TABLES
        WHERE TABLE_TYPE IN ('BASE TABLE', 'VIEW')
        AND TABLE_SCHEMA NOT IN ('sys', 'INFORMATION_SCHEMA')
        ORDER BY TABLE_SCHEMA, TABLE_NAME
        "#;

    pub const COLUMNS: &str = r#"
        SELECT TABLE_SCHEMA, TABLE_NAME, COLUMN_NAME, DATA_TYPE, IS_NULLABLE, COLUMN_DEFAULT
        FROM INFORMATION_SCHEMA.COLUMNS
        WHERE TABLE_SCHEMA NOT IN ('sys', 'INFORMATION_SCHEMA')
        ORDER BY TABLE_SCHEMA, TABLE_NAME, ORDINAL_POSITION
        "#;

    pub const PRIMARY_KEYS: &str = r#"
        SELECT kcu.TABLE_SCHEMA, kcu.TABLE_NAME, kcu.COLUMN_NAME
        FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc
        JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE kcu
            ON tc.CONSTRAINT_NAME = kcu.CONSTRAINT_NAME
            AND tc.TABLE_SCHEMA = kcu.TABLE_SCHEMA
            AND tc.TABLE_NAME = kcu.TABLE_NAME
        WHERE tc.CONSTRAINT_TYPE = 'PRIMARY KEY'
        "#;

    pub const ROW_COUNTS: &str = r#"
        SELECT s.name, t.name, CAST(SUM(p.rows) AS BIGINT)
        FROM sys.tables t
        JOIN sys.schemas s ON s.schema_id = t.schema_id
        JOIN sys.partitions p ON p.object_id = t.object_id AND p.index_id IN (0, 1)
        GROUP BY s.name, t.name
        "#;
}

#[derive(Default)]
pub struct MssqlAdapter {
    client: Option<MssqlClient>,
    schema_cache: Option<Arc<Schema>>,
}

impl std::fmt::Debug for MssqlAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MssqlAdapter")
            .field("connected", &self.client.is_some())
            .finish()
    }
}

impl MssqlAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    fn client(&mut self) -> DbResult<&mut MssqlClient> {
        self.client
            .as_mut()
            .ok_or_else(|| DbError::no_connection("SQL Server adapter is not connected"))
    }

    fn tiberius_config(config: &ConnectionConfig) -> Config {
        let mut tds = Config::new();
        tds.host(&config.host);
        tds.port(if config.port == 0 {
            DatabaseType::SqlServer.default_port().unwrap_or(1433)
        } else {
            config.port
        });
        if !config.database.is_empty() {
            tds.database(&config.database);
        }
        tds.application_name("sql-copilot");
        tds.authentication(AuthMethod::sql_server(&config.username, &config.password));
        tds.encryption(if config.use_tls {
            EncryptionLevel::Required
        } else {
            EncryptionLevel::Off
        });
        // Self-signed certificates are the norm for SQL Server installs
        tds.trust_cert();
        tds
    }

    async fn open(mut tds: Config) -> Result<MssqlClient, tiberius::error::Error> {
        let tcp = TcpStream::connect(tds.get_addr()).await?;
        tcp.set_nodelay(true)?;

        match Client::connect(tds.clone(), tcp.compat_write()).await {
            Ok(client) => Ok(client),
            // Azure SQL redirects to the node that owns the database
            Err(tiberius::error::Error::Routing { host, port }) => {
                tds.host(&host);
                tds.port(port);
                let tcp = TcpStream::connect(tds.get_addr()).await?;
                tcp.set_nodelay(true)?;
                Client::connect(tds, tcp.compat_write()).await
            }
            Err(e) => Err(e),
        }
    }

    async fn fetch_schema(client: &mut MssqlClient) -> DbResult<Schema> {
        let row_counts = match Self::fetch_row_counts(client).await {
            Ok(counts) => counts,
            Err(e) => {
                warn!(error = %e, "Failed to read SQL Server row counts");
                HashMap::new()
            }
        };

        let mut builder = SchemaBuilder::new();

        let tables = client
            .simple_query(queries::TABLES)
            .await?
            .into_first_result()
            .await?;
        for row in &tables {
            let schema = text(row, 0)?;
            let name = text(row, 1)?;
            let count = row_counts.get(&(schema.clone(), name.clone())).copied();
            builder.table(Some(schema), name, count);
        }

        let columns = client
            .simple_query(queries::COLUMNS)
            .await?
            .into_first_result()
            .await?;
        for row in &columns {
            let column = Column::new(
                text(row, 2)?,
                text(row, 3)?,
                text(row, 4)?.eq_ignore_ascii_case("YES"),
            )
            .with_default(row.try_get::<&str, _>(5)?.map(str::to_string));
            builder.column(Some(text(row, 0)?), text(row, 1)?, column);
        }

        let keys = client
            .simple_query(queries::PRIMARY_KEYS)
            .await?
            .into_first_result()
            .await?;
        for row in &keys {
            builder.primary_key(Some(text(row, 0)?), text(row, 1)?, text(row, 2)?);
        }

        Ok(builder.build())
    }

    async fn fetch_row_counts(
        client: &mut MssqlClient,
    ) -> DbResult<HashMap<(String, String), u64>> {
        let rows = client
            .simple_query(queries::ROW_COUNTS)
            .await?
            .into_first_result()
            .await?;
        let mut counts = HashMap::with_capacity(rows.len());
        for row in &rows {
            let count = row.try_get::<i64, _>(2)?.unwrap_or(0).max(0) as u64;
            counts.insert((text(row, 0)?, text(row, 1)?), count);
        }
        Ok(counts)
    }

    async fn run_query(
        client: &mut MssqlClient,
        sql: &str,
        params: &[QueryParam],
        row_cap: usize,
    ) -> DbResult<QueryResult> {
        let start = Instant::now();

        let mut query = Query::new(sql);
        bind_mssql_params(&mut query, params);

        let mut stream = query.query(client).await?;
        let columns: Vec<ColumnMetadata> = stream
            .columns()
            .await?
            .map(|cols| {
                cols.iter()
                    .map(|c| ColumnMetadata::new(c.name(), sql_type_name(c.column_type())))
                    .collect()
            })
            .unwrap_or_default();

        let fetched: Vec<Result<Row, tiberius::error::Error>> = stream
            .into_row_stream()
            .take(row_cap + 1)
            .collect()
            .await;

        let truncated = fetched.len() > row_cap;
        let mut rows = Vec::with_capacity(fetched.len().min(row_cap));
        for row in fetched.into_iter().take(row_cap) {
            let row = row?;
            rows.push(
                row.cells()
                    .map(|(col, data)| (col.name().to_string(), column_data_to_json(data)))
                    .collect(),
            );
        }

        if truncated {
            warn!(row_cap, "Query result truncated");
        }

        Ok(QueryResult::new(
            columns,
            rows,
            start.elapsed().as_millis() as u64,
            truncated,
        ))
    }
}

/// Read a non-null text cell from a catalog row.
fn text(row: &Row, idx: usize) -> DbResult<String> {
    row.try_get::<&str, _>(idx)?
        .map(str::to_string)
        .ok_or_else(|| DbError::invalid_sql(format!("Unexpected NULL in catalog column {}", idx)))
}

fn from_sql_string<'a, T>(data: &'a ColumnData<'static>) -> JsonValue
where
    T: FromSql<'a> + ToString,
{
    T::from_sql(data)
        .ok()
        .flatten()
        .map(|v| JsonValue::String(v.to_string()))
        .unwrap_or(JsonValue::Null)
}

fn float_value(v: f64) -> JsonValue {
    serde_json::Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(v.to_string()))
}

/// Convert one SQL Server cell to JSON.
fn column_data_to_json(data: &ColumnData<'static>) -> JsonValue {
    match data {
        ColumnData::U8(v) => v.map(JsonValue::from).unwrap_or(JsonValue::Null),
        ColumnData::I16(v) => v.map(JsonValue::from).unwrap_or(JsonValue::Null),
        ColumnData::I32(v) => v.map(JsonValue::from).unwrap_or(JsonValue::Null),
        ColumnData::I64(v) => v.map(JsonValue::from).unwrap_or(JsonValue::Null),
        ColumnData::F32(v) => v.map(|f| float_value(f as f64)).unwrap_or(JsonValue::Null),
        ColumnData::F64(v) => v.map(float_value).unwrap_or(JsonValue::Null),
        ColumnData::Bit(v) => v.map(JsonValue::Bool).unwrap_or(JsonValue::Null),
        ColumnData::String(v) => v
            .as_ref()
            .map(|s| JsonValue::String(s.to_string()))
            .unwrap_or(JsonValue::Null),
        ColumnData::Guid(v) => v
            .map(|g| JsonValue::String(g.to_string()))
            .unwrap_or(JsonValue::Null),
        ColumnData::Binary(v) => v
            .as_ref()
            .map(|b| encode_binary_value(b))
            .unwrap_or(JsonValue::Null),
        // Exact decimal text, like the other backends
        ColumnData::Numeric(v) => v
            .as_ref()
            .map(|n| JsonValue::String(n.to_string()))
            .unwrap_or(JsonValue::Null),
        ColumnData::Xml(v) => v
            .as_ref()
            .map(|x| JsonValue::String(x.to_string()))
            .unwrap_or(JsonValue::Null),
        ColumnData::DateTime(_) | ColumnData::SmallDateTime(_) | ColumnData::DateTime2(_) => {
            from_sql_string::<chrono::NaiveDateTime>(data)
        }
        ColumnData::Date(_) => from_sql_string::<chrono::NaiveDate>(data),
        ColumnData::Time(_) => from_sql_string::<chrono::NaiveTime>(data),
        ColumnData::DateTimeOffset(_) => {
            match chrono::DateTime::<chrono::Utc>::from_sql(data) {
                Ok(Some(dt)) => JsonValue::String(dt.to_rfc3339()),
                _ => JsonValue::Null,
            }
        }
        #[allow(unreachable_patterns)]
        _ => JsonValue::Null,
    }
}

#[async_trait]
impl DatabaseAdapter for MssqlAdapter {
    fn db_type(&self) -> DatabaseType {
        DatabaseType::SqlServer
    }

    fn is_connected(&self) -> bool {
        self.client.is_some()
    }

    async fn connect(&mut self, config: &ConnectionConfig) -> DbResult<()> {
        if self.client.is_some() {
            return Ok(());
        }

        let tds = Self::tiberius_config(config);
        let client = match timeout(CONNECT_TIMEOUT, Self::open(tds)).await {
            Ok(Ok(client)) => client,
            Ok(Err(e)) => return Err(connect_error(DatabaseType::SqlServer, e)),
            Err(_) => {
                return Err(connect_error(
                    DatabaseType::SqlServer,
                    format!("timed out after {} seconds", CONNECT_TIMEOUT.as_secs()),
                ));
            }
        };

        info!(host = %config.host, database = %config.database, "Connected to SQL Server");
        self.client = Some(client);
        Ok(())
    }

    async fn disconnect(&mut self) {
        self.schema_cache = None;
        if let Some(client) = self.client.take() {
            if let Err(e) = client.close().await {
                debug!(error = %e, "SQL Server client close failed");
            }
        }
    }

    async fn test_connection(&mut self) -> bool {
        let Some(client) = self.client.as_mut() else {
            return false;
        };
        match client.simple_query("SELECT 1").await {
            Ok(stream) => stream.into_results().await.is_ok(),
            Err(_) => false,
        }
    }

    async fn get_schema(&mut self) -> DbResult<Arc<Schema>> {
        if let Some(schema) = &self.schema_cache {
            return Ok(Arc::clone(schema));
        }
        let schema = Arc::new(Self::fetch_schema(self.client()?).await?);
        debug!(tables = schema.table_count(), "Fetched SQL Server schema");
        self.schema_cache = Some(Arc::clone(&schema));
        Ok(schema)
    }

    async fn execute_query(
        &mut self,
        query: &str,
        params: &[QueryParam],
    ) -> DbResult<QueryResult> {
        let client = self.client()?;
        let sql = apply_row_limit(query, DatabaseType::SqlServer, MAX_ROW_LIMIT);
        debug!(sql = %sql, params = params.len(), "Executing SQL Server query");

        match timeout(QUERY_TIMEOUT, Self::run_query(client, &sql, params, MAX_ROW_LIMIT)).await {
            Ok(result) => Ok(mark_cap_reached(result?, sql != query, MAX_ROW_LIMIT)),
            Err(_) => Err(DbError::invalid_sql(format!(
                "Query timed out after {} seconds",
                QUERY_TIMEOUT.as_secs()
            ))),
        }
    }
}

/// SQL Server's name for a result column type. Nullable fixed-width types
/// (`Intn`, `Floatn`, ...) carry no width, so they map to the common name.
fn sql_type_name(column_type: ColumnType) -> &'static str {
    match column_type {
        ColumnType::Null => "null",
        ColumnType::Bit | ColumnType::Bitn => "bit",
        ColumnType::Int1 => "tinyint",
        ColumnType::Int2 => "smallint",
        ColumnType::Int4 | ColumnType::Intn => "int",
        ColumnType::Int8 => "bigint",
        ColumnType::Float4 => "real",
        ColumnType::Float8 | ColumnType::Floatn => "float",
        ColumnType::Money => "money",
        ColumnType::Money4 => "smallmoney",
        ColumnType::Decimaln => "decimal",
        ColumnType::Numericn => "numeric",
        ColumnType::Guid => "uniqueidentifier",
        ColumnType::Datetime | ColumnType::Datetimen => "datetime",
        ColumnType::Datetime4 => "smalldatetime",
        ColumnType::Datetime2 => "datetime2",
        ColumnType::DatetimeOffsetn => "datetimeoffset",
        ColumnType::Daten => "date",
        ColumnType::Timen => "time",
        ColumnType::BigVarChar => "varchar",
        ColumnType::BigChar => "char",
        ColumnType::NVarchar => "nvarchar",
        ColumnType::NChar => "nchar",
        ColumnType::Text => "text",
        ColumnType::NText => "ntext",
        ColumnType::BigVarBin => "varbinary",
        ColumnType::BigBinary => "binary",
        ColumnType::Image => "image",
        ColumnType::Xml => "xml",
        ColumnType::Udt => "udt",
        ColumnType::SSVariant => "sql_variant",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;

    #[test]
    fn test_sql_type_names() {
        assert_eq!(sql_type_name(ColumnType::Intn), "int");
        assert_eq!(sql_type_name(ColumnType::NVarchar), "nvarchar");
        assert_eq!(sql_type_name(ColumnType::Decimaln), "decimal");
        assert_eq!(sql_type_name(ColumnType::Datetime2), "datetime2");
        assert_eq!(sql_type_name(ColumnType::Guid), "uniqueidentifier");
    }

    #[test]
    fn test_column_data_scalars() {
        assert_eq!(column_data_to_json(&ColumnData::I32(Some(7))), JsonValue::from(7));
        assert_eq!(column_data_to_json(&ColumnData::I64(None)), JsonValue::Null);
        assert_eq!(
            column_data_to_json(&ColumnData::Bit(Some(true))),
            JsonValue::Bool(true)
        );
        assert_eq!(
            column_data_to_json(&ColumnData::String(Some(Cow::Borrowed("abc")))),
            JsonValue::String("abc".into())
        );
        assert_eq!(
            column_data_to_json(&ColumnData::Binary(Some(Cow::Borrowed(b"hi")))),
            JsonValue::String("aGk=".into())
        );
    }

    #[test]
    fn test_tiberius_config_uses_default_port() {
        let mut config = ConnectionConfig::network(
            DatabaseType::SqlServer,
            "db.local",
            0,
            "app",
            "sa",
            "pw",
        );
        config.use_tls = true;
        let tds = MssqlAdapter::tiberius_config(&config);
        assert_eq!(tds.get_addr(), "db.local:1433");
    }

    #[tokio::test]
    async fn test_operations_require_connection() {
        let mut adapter = MssqlAdapter::new();
        assert!(!adapter.test_connection().await);
        assert!(matches!(
            adapter.get_schema().await,
            Err(DbError::NoConnection { .. })
        ));
        adapter.disconnect().await;
    }
}
