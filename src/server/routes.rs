//! HTTP handlers for the `/api` routes.

use crate::error::{DbError, DbResult};
use crate::llm::{ChartSuggestion, GeneratedSql};
use crate::models::{
    ChartRequest, ConnectionConfig, ConnectionInfo, ExecuteRequest, ExplainRequest, FixRequest,
    GenerateRequest, QueryResult,
};
use crate::server::extract::{ActiveConnection, ApiJson};
use crate::server::state::AppState;
use crate::session::{SessionStore, TokenSession, clear_session_cookie, session_cookie};
use crate::tools::{ExplainOutput, ExportRequest, SchemaOutput};
use axum::Json;
use axum::extract::State;
use axum::http::{HeaderValue, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::info;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    #[serde(flatten)]
    pub connection: Option<ConnectionInfo>,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Test the connection, then seal it into a fresh session cookie.
async fn open_session(
    state: &AppState,
    mut session: TokenSession,
    config: ConnectionConfig,
) -> DbResult<Response> {
    let config = config.validate()?;
    let info = state.query.test_connection(&config).await?;

    session.save(config);
    let token = session
        .token()?
        .ok_or_else(|| DbError::unknown("Session was not saved"))?;
    let cookie = session_cookie(&token, session.ttl(), state.sessions.secure_cookie);

    let mut response = Json(ConnectionStatus {
        connected: true,
        connection: Some(info),
    })
    .into_response();
    insert_cookie(&mut response, &cookie)?;
    Ok(response)
}

fn insert_cookie(response: &mut Response, cookie: &str) -> DbResult<()> {
    let value = HeaderValue::from_str(cookie)
        .map_err(|e| DbError::unknown(format!("Invalid cookie value: {}", e)))?;
    response.headers_mut().insert(header::SET_COOKIE, value);
    Ok(())
}

pub async fn connect(
    State(state): State<AppState>,
    session: TokenSession,
    ApiJson(body): ApiJson<serde_json::Value>,
) -> DbResult<Response> {
    open_session(&state, session, ConnectionConfig::from_json(body)?).await
}

pub async fn connect_demo(
    State(state): State<AppState>,
    session: TokenSession,
) -> DbResult<Response> {
    let config = state
        .demo
        .clone()
        .ok_or_else(|| DbError::invalid_input("Demo database is not configured"))?;
    open_session(&state, session, config).await
}

pub async fn connection_status(session: TokenSession) -> Json<ConnectionStatus> {
    let connection = session.get().as_ref().map(ConnectionInfo::from);
    Json(ConnectionStatus {
        connected: connection.is_some(),
        connection,
    })
}

pub async fn disconnect(
    State(state): State<AppState>,
    mut session: TokenSession,
) -> DbResult<Response> {
    session.clear();
    let mut response = Json(ConnectionStatus {
        connected: false,
        connection: None,
    })
    .into_response();
    insert_cookie(
        &mut response,
        &clear_session_cookie(state.sessions.secure_cookie),
    )?;
    info!("Session cleared");
    Ok(response)
}

pub async fn schema(
    State(state): State<AppState>,
    ActiveConnection(config): ActiveConnection,
) -> DbResult<Json<SchemaOutput>> {
    state.schema.schema(&config).await.map(Json)
}

pub async fn generate(
    State(state): State<AppState>,
    ActiveConnection(config): ActiveConnection,
    ApiJson(request): ApiJson<GenerateRequest>,
) -> DbResult<Json<GeneratedSql>> {
    state.assistant.generate(&config, request).await.map(Json)
}

pub async fn execute(
    State(state): State<AppState>,
    ActiveConnection(config): ActiveConnection,
    ApiJson(request): ApiJson<ExecuteRequest>,
) -> DbResult<Json<QueryResult>> {
    state.query.execute(&config, request).await.map(Json)
}

pub async fn explain(
    State(state): State<AppState>,
    ActiveConnection(config): ActiveConnection,
    ApiJson(request): ApiJson<ExplainRequest>,
) -> DbResult<Json<ExplainOutput>> {
    state.assistant.explain(&config, request).await.map(Json)
}

pub async fn fix(
    State(state): State<AppState>,
    ActiveConnection(config): ActiveConnection,
    ApiJson(request): ApiJson<FixRequest>,
) -> DbResult<Json<GeneratedSql>> {
    state.assistant.fix(&config, request).await.map(Json)
}

pub async fn chart(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<ChartRequest>,
) -> DbResult<Json<ChartSuggestion>> {
    state.assistant.chart(request).await.map(Json)
}

pub async fn export(
    State(state): State<AppState>,
    ActiveConnection(config): ActiveConnection,
    ApiJson(request): ApiJson<ExportRequest>,
) -> DbResult<Response> {
    let output = state.query.export(&config, request).await?;
    let disposition = format!("attachment; filename=\"{}\"", output.file_name());
    Ok((
        [
            (header::CONTENT_TYPE, output.format.content_type().to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        output.body,
    )
        .into_response())
}
