//! Data models for SQL Copilot.
//!
//! This module re-exports all model types used throughout the application.

pub mod connection;
pub mod query;
pub mod schema;

// Re-export commonly used types
pub use connection::{ConnectionConfig, ConnectionInfo, DatabaseType};
pub use query::{
    ChartRequest, ColumnMetadata, DocumentOperation, DocumentQuery, ExecuteRequest,
    ExplainRequest, FixRequest, GenerateRequest, MAX_ROW_LIMIT, QueryParam, QueryResult,
};
pub use schema::{Column, Schema, SchemaSummary, Table, is_default_namespace};
