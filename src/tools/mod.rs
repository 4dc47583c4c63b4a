//! Request handlers behind the HTTP API.
//!
//! - `sql_validator`: sanitize and gate SQL before it reaches a database
//! - `flow`: connect, act, disconnect around one adapter
//! - `query`: execute, export and connection tests
//! - `schema`: schema introspection
//! - `assistant`: generate, fix, explain and chart suggestions
//! - `format`: export rendering

pub mod assistant;
pub mod flow;
pub mod format;
pub mod query;
pub mod schema;
pub mod sql_validator;

pub use assistant::{AssistantToolHandler, ExplainOutput};
pub use flow::with_adapter;
pub use format::{ExportFormat, ExportOutput};
pub use query::{ExportRequest, QueryToolHandler};
pub use schema::{SchemaOutput, SchemaToolHandler};
