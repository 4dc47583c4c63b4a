//! SQL Copilot library.
//!
//! Turns plain-language questions into read-only queries against PostgreSQL,
//! MySQL, SQLite, SQL Server or MongoDB, and serves the workflow over HTTP.

pub mod config;
pub mod db;
pub mod error;
pub mod llm;
pub mod models;
pub mod rate_limit;
pub mod server;
pub mod session;
pub mod tools;

pub use config::Config;
pub use error::DbError;
pub use server::AppState;
