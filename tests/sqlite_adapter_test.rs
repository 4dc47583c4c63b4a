//! End-to-end tests against a SQLite copy of the demo dataset.
//!
//! Each test seeds a fresh database file from `demos/demo_seed.sql` and talks
//! to it through the adapter layer exactly as the HTTP handlers do.

use sql_copilot::DbError;
use sql_copilot::db::{AdapterRegistry, DatabaseAdapter, SqliteAdapter};
use sql_copilot::models::{ConnectionConfig, ExecuteRequest, MAX_ROW_LIMIT, QueryParam};
use sql_copilot::tools::{ExportFormat, ExportRequest, QueryToolHandler, SchemaToolHandler};
use sqlx::SqlitePool;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode};
use std::sync::Arc;
use tempfile::TempDir;

const DEMO_SEED: &str = include_str!("../demos/demo_seed.sql");

const BIG_TABLE_ROWS: usize = 1500;

/// Seed a temporary database; the `TempDir` must outlive the config.
async fn seeded_database() -> (TempDir, ConnectionConfig) {
    let dir = tempfile::tempdir().expect("Failed to create temp dir");
    let path = dir.path().join("demo.db");

    let options = SqliteConnectOptions::new()
        .filename(&path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Delete);
    let pool = SqlitePool::connect_with(options)
        .await
        .expect("Failed to create database");

    sqlx::raw_sql(DEMO_SEED)
        .execute(&pool)
        .await
        .expect("Failed to seed demo data");
    sqlx::query("CREATE TABLE big (n INTEGER NOT NULL)")
        .execute(&pool)
        .await
        .expect("Failed to create big table");
    sqlx::query(&format!(
        "INSERT INTO big (n) WITH RECURSIVE seq(n) AS \
         (SELECT 1 UNION ALL SELECT n + 1 FROM seq WHERE n < {}) SELECT n FROM seq",
        BIG_TABLE_ROWS
    ))
    .execute(&pool)
    .await
    .expect("Failed to fill big table");
    pool.close().await;

    let config = ConnectionConfig::sqlite(path.to_string_lossy())
        .validate()
        .expect("valid sqlite config");
    (dir, config)
}

async fn connected_adapter(config: &ConnectionConfig) -> SqliteAdapter {
    let mut adapter = SqliteAdapter::new();
    adapter.connect(config).await.expect("Failed to connect");
    adapter
}

fn handler() -> QueryToolHandler {
    QueryToolHandler::new(Arc::new(AdapterRegistry::with_defaults()))
}

// =========================================================================
// Schema
// =========================================================================

#[tokio::test]
async fn test_demo_schema_tables_and_row_counts() {
    let (_dir, config) = seeded_database().await;
    let mut adapter = connected_adapter(&config).await;

    let schema = adapter.get_schema().await.unwrap();
    let expected = [
        ("employees", 10),
        ("products", 8),
        ("customers", 6),
        ("orders", 8),
        ("order_items", 12),
    ];
    for (name, rows) in expected {
        let table = schema
            .find_table(name)
            .unwrap_or_else(|| panic!("missing table {}", name));
        assert_eq!(table.row_count, Some(rows), "row count of {}", name);
    }

    let employees = schema.find_table("employees").unwrap();
    assert_eq!(employees.columns.len(), 7);
    let keys: Vec<_> = employees.primary_keys().map(|c| c.name.as_str()).collect();
    assert_eq!(keys, vec!["id"]);

    adapter.disconnect().await;
}

#[tokio::test]
async fn test_schema_is_cached_per_instance() {
    let (_dir, config) = seeded_database().await;
    let mut adapter = connected_adapter(&config).await;

    let first = adapter.get_schema().await.unwrap();
    let second = adapter.get_schema().await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    adapter.disconnect().await;
    assert!(!adapter.is_connected());
    assert!(matches!(
        adapter.get_schema().await,
        Err(DbError::NoConnection { .. })
    ));
}

#[tokio::test]
async fn test_schema_context_is_deterministic() {
    let (_dir, config) = seeded_database().await;

    let mut first = connected_adapter(&config).await;
    let mut second = connected_adapter(&config).await;
    let a = first.get_schema_context().await.unwrap();
    let b = second.get_schema_context().await.unwrap();
    assert_eq!(a, b);
    assert!(a.contains("Table: employees"));
    assert!(a.contains("id INTEGER PRIMARY KEY"));

    first.disconnect().await;
    second.disconnect().await;
}

#[tokio::test]
async fn test_schema_handler_summary() {
    let (_dir, config) = seeded_database().await;
    let handler = SchemaToolHandler::new(Arc::new(AdapterRegistry::with_defaults()));

    let output = handler.schema(&config).await.unwrap();
    assert_eq!(output.summary.table_count, 6);
    assert_eq!(output.summary.column_count, output.schema.column_count());
}

// =========================================================================
// Execution
// =========================================================================

#[tokio::test]
async fn test_select_all_employees() {
    let (_dir, config) = seeded_database().await;

    let result = handler()
        .execute(&config, ExecuteRequest::new("SELECT * FROM employees"))
        .await
        .unwrap();
    assert_eq!(result.row_count, 10);
    assert_eq!(result.rows.len(), 10);
    assert_eq!(result.columns.len(), 7);
    assert_eq!(result.columns[0].name, "id");
    assert!(!result.truncated);
    assert_eq!(result.rows[0]["first_name"], "Alice");
}

#[tokio::test]
async fn test_row_cap() {
    let (_dir, config) = seeded_database().await;
    let mut adapter = connected_adapter(&config).await;

    let result = adapter.execute_query("SELECT n FROM big", &[]).await.unwrap();
    assert_eq!(result.row_count, MAX_ROW_LIMIT);
    assert_eq!(result.rows.len(), MAX_ROW_LIMIT);
    assert!(result.truncated);

    // A caller-supplied LIMIT above the cap is cut while streaming
    let result = adapter
        .execute_query("SELECT n FROM big LIMIT 1200", &[])
        .await
        .unwrap();
    assert_eq!(result.row_count, MAX_ROW_LIMIT);
    assert!(result.truncated);

    adapter.disconnect().await;
}

#[tokio::test]
async fn test_existing_limit_respected() {
    let (_dir, config) = seeded_database().await;
    let mut adapter = connected_adapter(&config).await;

    let result = adapter
        .execute_query("SELECT n FROM big ORDER BY n LIMIT 5", &[])
        .await
        .unwrap();
    assert_eq!(result.row_count, 5);
    assert!(!result.truncated);
    assert_eq!(result.rows[4]["n"], 5);

    adapter.disconnect().await;
}

#[tokio::test]
async fn test_parameterised_limit_respected() {
    let (_dir, config) = seeded_database().await;
    let mut adapter = connected_adapter(&config).await;

    let result = adapter
        .execute_query("SELECT n FROM big ORDER BY n LIMIT ?", &[QueryParam::Int(3)])
        .await
        .unwrap();
    assert_eq!(result.row_count, 3);
    assert!(!result.truncated);
    assert_eq!(result.rows[2]["n"], 3);

    adapter.disconnect().await;
}

#[tokio::test]
async fn test_empty_result_keeps_columns() {
    let (_dir, config) = seeded_database().await;
    let mut adapter = connected_adapter(&config).await;

    let result = adapter
        .execute_query("SELECT * FROM employees WHERE 1 = 0", &[])
        .await
        .unwrap();
    assert_eq!(result.row_count, 0);
    assert!(!result.truncated);
    let names = result.column_names();
    assert_eq!(names.len(), 7);
    assert_eq!(names[0], "id");
    assert_eq!(names[1], "first_name");

    adapter.disconnect().await;
}

#[tokio::test]
async fn test_positional_params() {
    let (_dir, config) = seeded_database().await;

    let request = ExecuteRequest::new(
        "SELECT first_name FROM employees WHERE department = ? AND salary > ? ORDER BY id",
    )
    .with_param(QueryParam::String("Engineering".into()))
    .with_param(QueryParam::Int(120_000));
    let result = handler().execute(&config, request).await.unwrap();

    let names: Vec<_> = result
        .rows
        .iter()
        .map(|r| r["first_name"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(names, vec!["Alice", "Chen"]);
}

#[tokio::test]
async fn test_join_with_cte() {
    let (_dir, config) = seeded_database().await;

    let sql = "WITH spend AS ( \
                 SELECT customer_id, SUM(total) AS total FROM orders GROUP BY customer_id \
               ) \
               SELECT c.name, s.total FROM customers c JOIN spend s ON s.customer_id = c.id \
               ORDER BY c.id";
    let result = handler()
        .execute(&config, ExecuteRequest::new(sql))
        .await
        .unwrap();
    assert_eq!(result.row_count, 6);
    assert_eq!(result.columns.len(), 2);
}

#[tokio::test]
async fn test_dangerous_query_rejected() {
    let (_dir, config) = seeded_database().await;

    let err = handler()
        .execute(&config, ExecuteRequest::new("DROP TABLE employees"))
        .await
        .unwrap_err();
    match err {
        DbError::DangerousQuery { pattern, .. } => assert_eq!(pattern, "DROP"),
        other => panic!("expected DangerousQuery, got {:?}", other),
    }

    // Table survives
    let result = handler()
        .execute(&config, ExecuteRequest::new("SELECT COUNT(*) AS n FROM employees"))
        .await
        .unwrap();
    assert_eq!(result.rows[0]["n"], 10);
}

#[tokio::test]
async fn test_driver_error_is_invalid_sql() {
    let (_dir, config) = seeded_database().await;

    let err = handler()
        .execute(&config, ExecuteRequest::new("SELECT nope FROM employees"))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::InvalidSql { .. }), "got {:?}", err);
}

#[tokio::test]
async fn test_export_csv() {
    let (_dir, config) = seeded_database().await;

    let output = handler()
        .export(
            &config,
            ExportRequest {
                sql: "SELECT id, first_name FROM employees ORDER BY id".to_string(),
                params: Vec::new(),
                format: ExportFormat::Csv,
            },
        )
        .await
        .unwrap();
    assert_eq!(output.row_count, 10);
    assert_eq!(output.file_name(), "query-results.csv");
    assert!(output.body.starts_with("id,first_name\r\n1,Alice\r\n"));
}

// =========================================================================
// Connection
// =========================================================================

#[tokio::test]
async fn test_connection_test_passes() {
    let (_dir, config) = seeded_database().await;

    let info = handler().test_connection(&config).await.unwrap();
    assert_eq!(info.db_type, config.db_type);
}

#[tokio::test]
async fn test_missing_file_is_connection_failure() {
    let dir = tempfile::tempdir().unwrap();
    let config = ConnectionConfig::sqlite(dir.path().join("absent.db").to_string_lossy())
        .validate()
        .unwrap();

    let err = handler().test_connection(&config).await.unwrap_err();
    assert!(matches!(err, DbError::ConnectionFailed { .. }), "got {:?}", err);
    assert!(!dir.path().join("absent.db").exists());
}

#[tokio::test]
async fn test_database_opened_read_only() {
    let (_dir, config) = seeded_database().await;
    let mut adapter = connected_adapter(&config).await;

    // Bypasses the validator on purpose; the driver must still refuse
    let err = adapter
        .execute_query("DELETE FROM employees", &[])
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::InvalidSql { .. }), "got {:?}", err);

    adapter.disconnect().await;
}
