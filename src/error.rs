//! Error types for SQL Copilot.
//!
//! This module defines all error types using `thiserror` for ergonomic error handling.
//! Each variant carries a message meant to be shown to the end user as-is, so
//! that validator rejections and driver errors stay transparent.

use axum::Json;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

type BoxedSource = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String, suggestion: String },

    #[error("No active connection: {message}")]
    NoConnection { message: String },

    #[error("Dangerous query rejected: {reason}")]
    DangerousQuery { pattern: String, reason: String },

    #[error("Query failed: {message}")]
    InvalidSql {
        message: String,
        /// Original driver error, kept for diagnostics
        #[source]
        source: Option<BoxedSource>,
    },

    #[error("AI request failed: {message}")]
    LlmError { message: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Rate limit exceeded, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("Internal error: {message}")]
    Unknown { message: String },
}

impl DbError {
    /// Create a connection error with a helpful suggestion.
    pub fn connection_failed(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a no-connection error.
    pub fn no_connection(message: impl Into<String>) -> Self {
        Self::NoConnection {
            message: message.into(),
        }
    }

    /// Create a validator rejection naming the offending pattern.
    pub fn dangerous_query(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DangerousQuery {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }

    /// Create an execution error without an underlying driver error.
    pub fn invalid_sql(message: impl Into<String>) -> Self {
        Self::InvalidSql {
            message: message.into(),
            source: None,
        }
    }

    /// Create an execution error that keeps the driver error as its source.
    pub fn invalid_sql_from<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::InvalidSql {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }

    /// Create a completion API error.
    pub fn llm(message: impl Into<String>) -> Self {
        Self::LlmError {
            message: message.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a rate limit error.
    pub fn rate_limited(retry_after_secs: u64) -> Self {
        Self::RateLimited { retry_after_secs }
    }

    /// Create a catch-all error.
    pub fn unknown(message: impl Into<String>) -> Self {
        Self::Unknown {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::ConnectionFailed { suggestion, .. } => Some(suggestion),
            Self::NoConnection { .. } => Some("Please connect to a database first"),
            Self::InvalidSql { .. } => Some("Check the SQL syntax or ask the assistant to fix it"),
            Self::LlmError { .. } => Some("Failed to reach the AI service, try again"),
            _ => None,
        }
    }

    /// Stable machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConnectionFailed { .. } => "connection_failed",
            Self::NoConnection { .. } => "no_connection",
            Self::DangerousQuery { .. } => "dangerous_query",
            Self::InvalidSql { .. } => "invalid_sql",
            Self::LlmError { .. } => "llm_error",
            Self::InvalidInput { .. } => "invalid_input",
            Self::RateLimited { .. } => "rate_limited",
            Self::Unknown { .. } => "unknown",
        }
    }

    /// HTTP status used when this error reaches the API boundary.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NoConnection { .. } => StatusCode::UNAUTHORIZED,
            Self::DangerousQuery { .. } => StatusCode::FORBIDDEN,
            Self::InvalidSql { .. } | Self::InvalidInput { .. } => StatusCode::BAD_REQUEST,
            Self::ConnectionFailed { .. } | Self::LlmError { .. } => StatusCode::BAD_GATEWAY,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Unknown { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Connect-time sqlx errors are mapped explicitly by the adapters; anything
/// reaching this conversion happened while running a statement.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolClosed => DbError::no_connection("Connection pool is closed"),
            sqlx::Error::PoolTimedOut => DbError::connection_failed(
                "Timed out waiting for a database connection",
                "Check database server load and network connectivity",
            ),
            other => DbError::invalid_sql_from(other),
        }
    }
}

impl From<tiberius::error::Error> for DbError {
    fn from(err: tiberius::error::Error) -> Self {
        DbError::invalid_sql_from(err)
    }
}

impl From<mongodb::error::Error> for DbError {
    fn from(err: mongodb::error::Error) -> Self {
        DbError::invalid_sql_from(err)
    }
}

/// Result type alias for all fallible operations.
pub type DbResult<T> = Result<T, DbError>;

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: ErrorDetail<'a>,
}

#[derive(Serialize)]
struct ErrorDetail<'a> {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pattern: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    suggestion: Option<&'a str>,
}

impl IntoResponse for DbError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let pattern = match &self {
            DbError::DangerousQuery { pattern, .. } => Some(pattern.as_str()),
            _ => None,
        };
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code(),
                message: self.to_string(),
                pattern,
                suggestion: self.suggestion(),
            },
        };
        let mut response = (status, Json(body)).into_response();

        if let DbError::RateLimited { retry_after_secs } = &self {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}
