//! Configuration handling for SQL Copilot.
//!
//! All settings come from CLI flags with environment-variable fallbacks.

use crate::error::DbResult;
use crate::llm::client::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use crate::models::{ConnectionConfig, DatabaseType};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use clap::Parser;
use rand::RngCore;
use std::time::Duration;
use tracing::warn;

pub const DEFAULT_HTTP_HOST: &str = "127.0.0.1";
pub const DEFAULT_HTTP_PORT: u16 = 8080;
pub const DEFAULT_SESSION_TTL_SECS: u64 = 14_400;
pub const DEFAULT_RATE_LIMIT_REQUESTS: u32 = 60;
pub const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 60;

/// SQL Copilot configuration.
#[derive(Debug, Clone, Parser)]
#[command(name = "sql-copilot")]
#[command(about = "Ask questions in plain language, get safe read-only SQL")]
#[command(version)]
pub struct Config {
    /// HTTP host to bind to
    #[arg(long, default_value = DEFAULT_HTTP_HOST, env = "SQL_COPILOT_HOST")]
    pub http_host: String,

    /// HTTP port to bind to
    #[arg(long, default_value_t = DEFAULT_HTTP_PORT, env = "SQL_COPILOT_PORT")]
    pub http_port: u16,

    /// Secret for encrypting session tokens. A random per-process secret is
    /// used when unset, which logs everyone out on restart.
    #[arg(long, env = "SQL_COPILOT_SESSION_SECRET", hide_env_values = true)]
    pub session_secret: Option<String>,

    /// Session lifetime in seconds
    #[arg(long, default_value_t = DEFAULT_SESSION_TTL_SECS, env = "SQL_COPILOT_SESSION_TTL")]
    pub session_ttl: u64,

    /// Mark the session cookie `Secure` (serve over HTTPS)
    #[arg(long, env = "SQL_COPILOT_SECURE_COOKIES")]
    pub secure_cookies: bool,

    /// API key for the completion service
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// Base URL of an OpenAI-compatible completion API
    #[arg(long, default_value = DEFAULT_BASE_URL, env = "SQL_COPILOT_LLM_BASE_URL")]
    pub llm_base_url: String,

    /// Completion model name
    #[arg(long, default_value = DEFAULT_MODEL, env = "SQL_COPILOT_LLM_MODEL")]
    pub llm_model: String,

    /// Requests allowed per client per window
    #[arg(long, default_value_t = DEFAULT_RATE_LIMIT_REQUESTS, env = "SQL_COPILOT_RATE_LIMIT")]
    pub rate_limit_requests: u32,

    /// Rate limit window in seconds
    #[arg(
        long,
        default_value_t = DEFAULT_RATE_LIMIT_WINDOW_SECS,
        env = "SQL_COPILOT_RATE_LIMIT_WINDOW"
    )]
    pub rate_limit_window: u64,

    /// Rate-limit by the first X-Forwarded-For hop (only behind a trusted proxy)
    #[arg(long, env = "SQL_COPILOT_TRUST_PROXY")]
    pub trust_proxy: bool,

    /// Demo database type (postgresql, mysql, sqlite, mssql, mongodb)
    #[arg(long, env = "SQL_COPILOT_DEMO_DB_TYPE")]
    pub demo_db_type: Option<DatabaseType>,

    /// Demo database host
    #[arg(long, env = "SQL_COPILOT_DEMO_DB_HOST")]
    pub demo_db_host: Option<String>,

    /// Demo database port (defaults to the type's standard port)
    #[arg(long, env = "SQL_COPILOT_DEMO_DB_PORT")]
    pub demo_db_port: Option<u16>,

    /// Demo database name, or file path for SQLite
    #[arg(long, env = "SQL_COPILOT_DEMO_DB_NAME")]
    pub demo_db_name: Option<String>,

    /// Demo database user
    #[arg(long, env = "SQL_COPILOT_DEMO_DB_USER")]
    pub demo_db_user: Option<String>,

    /// Demo database password
    #[arg(long, env = "SQL_COPILOT_DEMO_DB_PASSWORD", hide_env_values = true)]
    pub demo_db_password: Option<String>,

    /// Use TLS for the demo database
    #[arg(long, env = "SQL_COPILOT_DEMO_DB_TLS")]
    pub demo_db_tls: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "SQL_COPILOT_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "SQL_COPILOT_JSON_LOGS")]
    pub json_logs: bool,
}

impl Config {
    /// Create a default configuration (useful for testing).
    pub fn default_config() -> Self {
        Self {
            http_host: DEFAULT_HTTP_HOST.to_string(),
            http_port: DEFAULT_HTTP_PORT,
            session_secret: None,
            session_ttl: DEFAULT_SESSION_TTL_SECS,
            secure_cookies: false,
            openai_api_key: None,
            llm_base_url: DEFAULT_BASE_URL.to_string(),
            llm_model: DEFAULT_MODEL.to_string(),
            rate_limit_requests: DEFAULT_RATE_LIMIT_REQUESTS,
            rate_limit_window: DEFAULT_RATE_LIMIT_WINDOW_SECS,
            trust_proxy: false,
            demo_db_type: None,
            demo_db_host: None,
            demo_db_port: None,
            demo_db_name: None,
            demo_db_user: None,
            demo_db_password: None,
            demo_db_tls: false,
            log_level: "info".to_string(),
            json_logs: false,
        }
    }

    /// Get the HTTP bind address.
    pub fn http_bind_addr(&self) -> String {
        format!("{}:{}", self.http_host, self.http_port)
    }

    pub fn session_ttl_duration(&self) -> Duration {
        Duration::from_secs(self.session_ttl)
    }

    pub fn rate_limit_window_duration(&self) -> Duration {
        Duration::from_secs(self.rate_limit_window.max(1))
    }

    /// Secret bytes for the session cipher.
    pub fn session_secret_bytes(&self) -> Vec<u8> {
        match self.session_secret.as_deref().filter(|s| !s.is_empty()) {
            Some(secret) => secret.as_bytes().to_vec(),
            None => {
                warn!("No session secret configured; sessions will not survive a restart");
                let mut secret = [0u8; 32];
                rand::thread_rng().fill_bytes(&mut secret);
                STANDARD.encode(secret).into_bytes()
            }
        }
    }

    /// The demo connection, if a demo database type is configured.
    pub fn demo_connection(&self) -> DbResult<Option<ConnectionConfig>> {
        let Some(db_type) = self.demo_db_type else {
            return Ok(None);
        };

        let database = self.demo_db_name.clone().unwrap_or_default();
        let config = if db_type.is_embedded() {
            ConnectionConfig::sqlite(database)
        } else {
            ConnectionConfig::network(
                db_type,
                self.demo_db_host.clone().unwrap_or_else(|| "localhost".to_string()),
                self.demo_db_port
                    .or_else(|| db_type.default_port())
                    .unwrap_or_default(),
                database,
                self.demo_db_user.clone().unwrap_or_default(),
                self.demo_db_password.clone().unwrap_or_default(),
            )
            .with_tls(self.demo_db_tls)
        };
        config.validate().map(Some)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}
