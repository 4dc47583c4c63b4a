//! Session store contract and the token-backed implementation.

use crate::error::DbResult;
use crate::models::ConnectionConfig;
use crate::session::cipher::SessionCipher;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Default session lifetime: four hours.
pub const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(4 * 60 * 60);

/// Holds the connection credentials for one client.
///
/// Only credentials are stored; schema and results are always fetched fresh.
pub trait SessionStore {
    /// The stored config, if present and not expired.
    fn get(&self) -> Option<ConnectionConfig>;

    fn save(&mut self, config: ConnectionConfig);

    fn clear(&mut self);

    /// True if a config is present and younger than the TTL.
    fn is_valid(&self) -> bool;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionData {
    config: ConnectionConfig,
    saved_at: DateTime<Utc>,
}

/// Session decoded from, and re-encoded into, an encrypted client token.
#[derive(Debug, Clone)]
pub struct TokenSession {
    cipher: Arc<SessionCipher>,
    ttl: Duration,
    data: Option<SessionData>,
}

impl TokenSession {
    pub fn new(cipher: Arc<SessionCipher>, ttl: Duration) -> Self {
        Self {
            cipher,
            ttl,
            data: None,
        }
    }

    /// Decode a client token. Invalid or foreign tokens yield an empty session.
    pub fn from_token(cipher: Arc<SessionCipher>, ttl: Duration, token: Option<&str>) -> Self {
        let data = token.and_then(|t| match cipher.open::<SessionData>(t) {
            Ok(data) => Some(data),
            Err(e) => {
                debug!(error = %e, "Discarding unreadable session token");
                None
            }
        });
        Self { cipher, ttl, data }
    }

    /// Encrypt the current state. `None` when the session is empty.
    pub fn token(&self) -> DbResult<Option<String>> {
        self.data.as_ref().map(|d| self.cipher.seal(d)).transpose()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// When the session was saved, if it holds a config.
    pub fn saved_at(&self) -> Option<DateTime<Utc>> {
        self.data.as_ref().map(|d| d.saved_at)
    }

    fn is_fresh(&self, data: &SessionData) -> bool {
        let age = Utc::now().signed_duration_since(data.saved_at);
        match age.to_std() {
            Ok(age) => age < self.ttl,
            // saved_at in the future: clock skew, treat as fresh
            Err(_) => true,
        }
    }
}

impl SessionStore for TokenSession {
    fn get(&self) -> Option<ConnectionConfig> {
        self.data
            .as_ref()
            .filter(|d| self.is_fresh(d))
            .map(|d| d.config.clone())
    }

    fn save(&mut self, config: ConnectionConfig) {
        self.data = Some(SessionData {
            config,
            saved_at: Utc::now(),
        });
    }

    fn clear(&mut self) {
        self.data = None;
    }

    fn is_valid(&self) -> bool {
        self.data.as_ref().is_some_and(|d| self.is_fresh(d))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DatabaseType;

    fn cipher() -> Arc<SessionCipher> {
        Arc::new(SessionCipher::new(b"test-secret"))
    }

    fn config() -> ConnectionConfig {
        ConnectionConfig::network(DatabaseType::PostgreSQL, "db", 5432, "app", "u", "pw")
    }

    #[test]
    fn test_save_token_roundtrip() {
        let mut session = TokenSession::new(cipher(), DEFAULT_SESSION_TTL);
        assert!(!session.is_valid());
        assert_eq!(session.token().unwrap(), None);

        session.save(config());
        assert!(session.is_valid());
        let token = session.token().unwrap().unwrap();

        let restored = TokenSession::from_token(cipher(), DEFAULT_SESSION_TTL, Some(&token));
        assert_eq!(restored.get(), Some(config()));
        assert_eq!(restored.get().unwrap().password, "pw");
    }

    #[test]
    fn test_expired_session() {
        let mut session = TokenSession::new(cipher(), Duration::from_secs(60));
        session.data = Some(SessionData {
            config: config(),
            saved_at: Utc::now() - chrono::Duration::seconds(61),
        });
        assert!(!session.is_valid());
        assert_eq!(session.get(), None);
    }

    #[test]
    fn test_clear() {
        let mut session = TokenSession::new(cipher(), DEFAULT_SESSION_TTL);
        session.save(config());
        session.clear();
        assert!(!session.is_valid());
        assert_eq!(session.token().unwrap(), None);
    }

    #[test]
    fn test_foreign_token_is_empty_session() {
        let other = Arc::new(SessionCipher::new(b"other"));
        let mut session = TokenSession::new(other, DEFAULT_SESSION_TTL);
        session.save(config());
        let token = session.token().unwrap().unwrap();

        let restored = TokenSession::from_token(cipher(), DEFAULT_SESSION_TTL, Some(&token));
        assert!(!restored.is_valid());
        let missing = TokenSession::from_token(cipher(), DEFAULT_SESSION_TTL, None);
        assert!(!missing.is_valid());
    }
}
