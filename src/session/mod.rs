//! Client-held, encrypted connection sessions.
//!
//! The server keeps no session state. Credentials travel in an
//! `HttpOnly; SameSite=Strict` cookie whose value is a sealed token.

pub mod cipher;
pub mod store;

pub use cipher::SessionCipher;
pub use store::{DEFAULT_SESSION_TTL, SessionStore, TokenSession};

use axum::http::{HeaderMap, header};
use std::time::Duration;

pub const SESSION_COOKIE: &str = "sql_copilot_session";

/// Read the session token from the `Cookie` headers.
pub fn token_from_headers(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value)
        .filter(|value| !value.is_empty())
}

/// `Set-Cookie` value carrying a token.
pub fn session_cookie(token: &str, ttl: Duration, secure: bool) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Strict; Max-Age={}{}",
        SESSION_COOKIE,
        token,
        ttl.as_secs(),
        if secure { "; Secure" } else { "" }
    )
}

/// `Set-Cookie` value that removes the session.
pub fn clear_session_cookie(secure: bool) -> String {
    session_cookie("", Duration::ZERO, secure)
}
