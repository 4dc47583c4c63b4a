//! Shared application state.

use crate::db::AdapterRegistry;
use crate::llm::{CompletionClient, SqlAssistant};
use crate::models::ConnectionConfig;
use crate::rate_limit::{RateLimitGate, RateLimiter};
use crate::session::{SessionCipher, TokenSession, token_from_headers};
use crate::tools::{AssistantToolHandler, QueryToolHandler, SchemaToolHandler};
use axum::http::HeaderMap;
use std::sync::Arc;
use std::time::Duration;

/// How session cookies are sealed and issued.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub cipher: Arc<SessionCipher>,
    pub ttl: Duration,
    pub secure_cookie: bool,
}

impl SessionSettings {
    pub fn new(secret: &[u8], ttl: Duration, secure_cookie: bool) -> Self {
        Self {
            cipher: Arc::new(SessionCipher::new(secret)),
            ttl,
            secure_cookie,
        }
    }

    /// Session carried by the request's cookie, or an empty one.
    pub fn load(&self, headers: &HeaderMap) -> TokenSession {
        TokenSession::from_token(self.cipher.clone(), self.ttl, token_from_headers(headers))
    }
}

#[derive(Clone)]
pub struct AppState {
    pub query: QueryToolHandler,
    pub schema: SchemaToolHandler,
    pub assistant: AssistantToolHandler,
    pub sessions: SessionSettings,
    pub rate_limiter: Arc<dyn RateLimiter>,
    pub trust_proxy: bool,
    pub demo: Option<ConnectionConfig>,
}

impl AppState {
    pub fn new(
        registry: Arc<AdapterRegistry>,
        completion: Arc<dyn CompletionClient>,
        sessions: SessionSettings,
        rate_limiter: Arc<dyn RateLimiter>,
    ) -> Self {
        let schema = SchemaToolHandler::new(registry.clone());
        Self {
            query: QueryToolHandler::new(registry),
            assistant: AssistantToolHandler::new(schema.clone(), SqlAssistant::new(completion)),
            schema,
            sessions,
            rate_limiter,
            trust_proxy: false,
            demo: None,
        }
    }

    /// Identify clients by `X-Forwarded-For` instead of the peer address.
    pub fn with_trust_proxy(mut self, trust_proxy: bool) -> Self {
        self.trust_proxy = trust_proxy;
        self
    }

    pub fn with_demo(mut self, demo: Option<ConnectionConfig>) -> Self {
        self.demo = demo;
        self
    }

    pub fn rate_limit_gate(&self) -> RateLimitGate {
        RateLimitGate {
            limiter: self.rate_limiter.clone(),
            trust_proxy: self.trust_proxy,
        }
    }
}
