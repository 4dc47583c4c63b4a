//! Query-related data models.
//!
//! This module defines types for query requests, parameters and results, plus
//! the JSON query shape accepted by document stores.

use crate::error::{DbError, DbResult};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Hard maximum of rows returned by a single execute call.
pub const MAX_ROW_LIMIT: usize = 1000;

/// A parameter value for parameterized queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryParam {
    /// NULL value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    String(String),
    /// Arrays and objects, bound as JSON
    Json(JsonValue),
}

impl QueryParam {
    /// Check if this parameter is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this parameter for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Json(_) => "json",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub name: String,
    /// Database-specific type (e.g., "int8", "varchar", "TEXT")
    pub data_type: String,
}

impl ColumnMetadata {
    /// Create new column metadata.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }
}

/// Rows and columns returned by one execute call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    pub columns: Vec<ColumnMetadata>,
    pub rows: Vec<serde_json::Map<String, JsonValue>>,
    /// Always equal to `rows.len()`
    pub row_count: usize,
    pub execution_time_ms: u64,
    /// Set when the row cap cut the result short
    pub truncated: bool,
}

impl QueryResult {
    /// Build a result, deriving `row_count` from the rows.
    pub fn new(
        columns: Vec<ColumnMetadata>,
        rows: Vec<serde_json::Map<String, JsonValue>>,
        execution_time_ms: u64,
        truncated: bool,
    ) -> Self {
        Self {
            row_count: rows.len(),
            columns,
            rows,
            execution_time_ms,
            truncated,
        }
    }

    /// Create an empty result.
    pub fn empty(execution_time_ms: u64) -> Self {
        Self::new(Vec::new(), Vec::new(), execution_time_ms, false)
    }

    /// Check if the result is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Column names in result order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

// =============================================================================
// Document Queries
// =============================================================================

/// Operations a document query may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentOperation {
    Find,
    Aggregate,
}

/// JSON query text accepted by the MongoDB adapter.
///
/// ```json
/// {"collection": "orders", "operation": "find", "filter": {"status": "paid"}}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentQuery {
    pub collection: String,
    pub operation: DocumentOperation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projection: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort: Option<JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pipeline: Option<Vec<JsonValue>>,
}

impl DocumentQuery {
    /// Parse query text, rejecting malformed JSON and unknown operations.
    pub fn parse(text: &str) -> DbResult<Self> {
        let value: JsonValue = serde_json::from_str(text.trim()).map_err(|e| {
            DbError::invalid_sql(format!("Invalid MongoDB query JSON: {}", e))
        })?;

        let operation = value
            .get("operation")
            .and_then(JsonValue::as_str)
            .ok_or_else(|| DbError::invalid_sql("MongoDB query is missing 'operation'"))?;
        if !matches!(operation, "find" | "aggregate") {
            return Err(DbError::invalid_sql(format!(
                "Unsupported MongoDB operation '{}', expected 'find' or 'aggregate'",
                operation
            )));
        }

        let query: DocumentQuery = serde_json::from_value(value)
            .map_err(|e| DbError::invalid_sql(format!("Invalid MongoDB query: {}", e)))?;
        if query.collection.trim().is_empty() {
            return Err(DbError::invalid_sql("MongoDB query is missing 'collection'"));
        }
        Ok(query)
    }

    /// Row cap for this query: the requested limit, never above the maximum.
    pub fn effective_limit(&self) -> u64 {
        self.limit
            .map(|l| l.clamp(1, MAX_ROW_LIMIT as u64))
            .unwrap_or(MAX_ROW_LIMIT as u64)
    }
}

// =============================================================================
// Request Bodies
// =============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct GenerateRequest {
    pub question: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub sql: String,
    #[serde(default)]
    pub params: Vec<QueryParam>,
}

impl ExecuteRequest {
    /// Create a new execute request.
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Add a parameter.
    pub fn with_param(mut self, param: QueryParam) -> Self {
        self.params.push(param);
        self
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExplainRequest {
    pub sql: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FixRequest {
    pub sql: String,
    pub error: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChartRequest {
    pub columns: Vec<String>,
    #[serde(default)]
    pub rows: Vec<serde_json::Map<String, JsonValue>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_param_types() {
        assert!(QueryParam::Null.is_null());
        assert!(!QueryParam::Bool(true).is_null());
        assert_eq!(QueryParam::Int(42).type_name(), "int");
        assert_eq!(
            QueryParam::String("hello".to_string()).type_name(),
            "string"
        );
    }

    #[test]
    fn test_query_param_untagged_json() {
        let params: Vec<QueryParam> =
            serde_json::from_str(r#"[null, true, 7, 1.5, "x", [1, 2]]"#).unwrap();
        assert_eq!(params[0], QueryParam::Null);
        assert_eq!(params[1], QueryParam::Bool(true));
        assert_eq!(params[2], QueryParam::Int(7));
        assert_eq!(params[3], QueryParam::Float(1.5));
        assert_eq!(params[4], QueryParam::String("x".into()));
        assert_eq!(params[5].type_name(), "json");
    }

    #[test]
    fn test_row_count_matches_rows() {
        let mut row = serde_json::Map::new();
        row.insert("id".into(), JsonValue::from(1));
        let result = QueryResult::new(
            vec![ColumnMetadata::new("id", "INTEGER")],
            vec![row.clone(), row],
            3,
            false,
        );
        assert_eq!(result.row_count, 2);
        assert_eq!(result.column_names(), vec!["id"]);
    }

    #[test]
    fn test_document_query_parse_find() {
        let q = DocumentQuery::parse(
            r#"{"collection":"orders","operation":"find","filter":{"status":"paid"}}"#,
        )
        .unwrap();
        assert_eq!(q.operation, DocumentOperation::Find);
        assert_eq!(q.effective_limit(), MAX_ROW_LIMIT as u64);
    }

    #[test]
    fn test_document_query_limit_capped() {
        let q = DocumentQuery::parse(r#"{"collection":"c","operation":"find","limit":50000}"#)
            .unwrap();
        assert_eq!(q.effective_limit(), MAX_ROW_LIMIT as u64);
    }

    #[test]
    fn test_document_query_rejects_bad_input() {
        assert!(matches!(
            DocumentQuery::parse("not json"),
            Err(DbError::InvalidSql { .. })
        ));
        assert!(matches!(
            DocumentQuery::parse(r#"{"collection":"c","operation":"deleteMany"}"#),
            Err(DbError::InvalidSql { .. })
        ));
        assert!(matches!(
            DocumentQuery::parse(r#"{"collection":"","operation":"find"}"#),
            Err(DbError::InvalidSql { .. })
        ));
    }
}
