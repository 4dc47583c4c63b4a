//! Request extractors that keep rejections in the API's error format.

use crate::error::DbError;
use crate::models::ConnectionConfig;
use crate::server::state::AppState;
use crate::session::{SessionStore, TokenSession};
use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, FromRequestParts, Request};
use axum::http::request::Parts;
use std::convert::Infallible;

/// `Json<T>` whose rejection is a `DbError::InvalidInput`.
#[derive(Debug, Clone)]
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    Json<T>: FromRequest<S, Rejection = JsonRejection>,
    S: Send + Sync,
{
    type Rejection = DbError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| DbError::invalid_input(e.body_text()))?;
        Ok(Self(value))
    }
}

impl FromRequestParts<AppState> for TokenSession {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(state.sessions.load(&parts.headers))
    }
}

/// The unexpired connection config from the session cookie.
#[derive(Debug, Clone)]
pub struct ActiveConnection(pub ConnectionConfig);

impl FromRequestParts<AppState> for ActiveConnection {
    type Rejection = DbError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        state
            .sessions
            .load(&parts.headers)
            .get()
            .map(Self)
            .ok_or_else(|| DbError::no_connection("No database connection in this session"))
    }
}
