//! Database abstraction layer.
//!
//! One adapter per backend behind the `DatabaseAdapter` trait, plus the
//! shared pieces they are built from:
//! - Row decoding and parameter binding for the sqlx backends
//! - Catalog assembly and schema-context rendering
//! - Row-limit injection
//! - The registry that maps a database type to a fresh adapter

pub mod adapter;
pub mod context;
pub mod executor;
pub mod limit;
pub mod mongodb;
pub mod mssql;
pub mod mysql;
pub mod params;
pub mod postgres;
pub mod registry;
pub mod schema;
pub mod sqlite;
pub mod types;

pub use adapter::{CONNECT_TIMEOUT, DatabaseAdapter, POOL_MAX_CONNECTIONS, QUERY_TIMEOUT};
pub use context::render_schema_context;
pub use limit::apply_row_limit;
pub use mongodb::MongoAdapter;
pub use mssql::MssqlAdapter;
pub use mysql::MySqlAdapter;
pub use postgres::PostgresAdapter;
pub use registry::{AdapterConstructor, AdapterRegistry};
pub use sqlite::SqliteAdapter;
