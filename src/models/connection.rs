//! Connection-related data models.
//!
//! This module defines the database type tags and the credentials a session
//! carries between requests.

use crate::error::{DbError, DbResult};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Supported database types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", try_from = "String")]
pub enum DatabaseType {
    PostgreSQL,
    /// Includes MariaDB
    MySQL,
    SQLite,
    /// Microsoft SQL Server
    #[serde(rename = "mssql")]
    SqlServer,
    MongoDB,
}

impl DatabaseType {
    /// Every supported type, in registration order.
    pub const ALL: [DatabaseType; 5] = [
        Self::PostgreSQL,
        Self::MySQL,
        Self::SQLite,
        Self::SqlServer,
        Self::MongoDB,
    ];

    /// Type tag used on the wire and in configuration.
    pub fn tag(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "postgresql",
            Self::MySQL => "mysql",
            Self::SQLite => "sqlite",
            Self::SqlServer => "mssql",
            Self::MongoDB => "mongodb",
        }
    }

    /// Get the display name for this database type.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "PostgreSQL",
            Self::MySQL => "MySQL",
            Self::SQLite => "SQLite",
            Self::SqlServer => "SQL Server",
            Self::MongoDB => "MongoDB",
        }
    }

    /// Get the default port for this database type.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Self::PostgreSQL => Some(5432),
            Self::MySQL => Some(3306),
            Self::SQLite => None,
            Self::SqlServer => Some(1433),
            Self::MongoDB => Some(27017),
        }
    }

    /// File-backed databases have no host, port or credentials.
    pub fn is_embedded(&self) -> bool {
        matches!(self, Self::SQLite)
    }

    /// Document stores take JSON queries instead of SQL.
    pub fn is_document(&self) -> bool {
        matches!(self, Self::MongoDB)
    }

    /// Comma-separated list of supported tags, for error messages.
    pub fn supported_tags() -> String {
        Self::ALL
            .iter()
            .map(|t| t.tag())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl FromStr for DatabaseType {
    type Err = DbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "postgresql" | "postgres" => Ok(Self::PostgreSQL),
            "mysql" | "mariadb" => Ok(Self::MySQL),
            "sqlite" => Ok(Self::SQLite),
            "mssql" | "sqlserver" => Ok(Self::SqlServer),
            "mongodb" | "mongo" => Ok(Self::MongoDB),
            other => Err(DbError::connection_failed(
                format!("Unsupported database type '{}'", other),
                format!("Supported types: {}", Self::supported_tags()),
            )),
        }
    }
}

impl TryFrom<String> for DatabaseType {
    type Error = DbError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Credentials for one database connection.
///
/// Lives only inside the encrypted session token; never written to disk and
/// never logged (the `Debug` impl redacts the password).
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(rename = "type")]
    pub db_type: DatabaseType,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: u16,
    /// Database name, or file path for SQLite
    pub database: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub use_tls: bool,
}

impl ConnectionConfig {
    /// Create a config for a network database.
    pub fn network(
        db_type: DatabaseType,
        host: impl Into<String>,
        port: u16,
        database: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            db_type,
            host: host.into(),
            port,
            database: database.into(),
            username: username.into(),
            password: password.into(),
            use_tls: false,
        }
    }

    /// Parse a connect request body. The type tag is resolved first, so an
    /// unknown backend reports the supported types.
    pub fn from_json(body: serde_json::Value) -> DbResult<Self> {
        if let Some(tag) = body.get("type").and_then(serde_json::Value::as_str) {
            tag.parse::<DatabaseType>()?;
        }
        serde_json::from_value(body)
            .map_err(|e| DbError::invalid_input(format!("Invalid connection request: {}", e)))
    }

    /// Create a config for a file-backed SQLite database.
    pub fn sqlite(path: impl Into<String>) -> Self {
        Self {
            db_type: DatabaseType::SQLite,
            host: String::new(),
            port: 0,
            database: path.into(),
            username: String::new(),
            password: String::new(),
            use_tls: false,
        }
    }

    /// Enable or disable TLS.
    pub fn with_tls(mut self, use_tls: bool) -> Self {
        self.use_tls = use_tls;
        self
    }

    /// Validate the config and normalize fields that do not apply to its type.
    ///
    /// Embedded databases only need a file path; everything else needs
    /// host, port and username.
    pub fn validate(mut self) -> DbResult<Self> {
        if self.db_type.is_embedded() {
            self.host.clear();
            self.port = 0;
            self.username.clear();
            self.password.clear();
            self.use_tls = false;
            if self.database.trim().is_empty() {
                return Err(DbError::invalid_input(
                    "SQLite requires a database file path",
                ));
            }
            return Ok(self);
        }

        if self.host.trim().is_empty() {
            return Err(DbError::invalid_input("Host is required"));
        }
        if self.port == 0 {
            return Err(DbError::invalid_input("Port is required"));
        }
        if self.username.trim().is_empty() {
            return Err(DbError::invalid_input("Username is required"));
        }
        self.host = self.host.trim().to_string();
        Ok(self)
    }
}

impl std::fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("db_type", &self.db_type)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"***")
            .field("use_tls", &self.use_tls)
            .finish()
    }
}

/// Connection details safe to return to a client.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionInfo {
    pub db_type: DatabaseType,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub host: String,
    pub database: String,
}

impl From<&ConnectionConfig> for ConnectionInfo {
    fn from(config: &ConnectionConfig) -> Self {
        Self {
            db_type: config.db_type,
            host: config.host.clone(),
            database: config.database.clone(),
        }
    }
}
