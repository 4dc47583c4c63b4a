//! HTTP server: router, middleware and graceful shutdown.

pub mod extract;
pub mod routes;
pub mod state;

pub use state::{AppState, SessionSettings};

use crate::error::{DbError, DbResult};
use crate::rate_limit::rate_limit_middleware;
use axum::Router;
use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

/// Time allowed for in-flight requests after a shutdown signal.
const GRACEFUL_TIMEOUT: Duration = Duration::from_secs(30);

/// Build the application router.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/health", get(routes::health))
        .route(
            "/connection",
            post(routes::connect)
                .get(routes::connection_status)
                .delete(routes::disconnect),
        )
        .route("/connection/demo", post(routes::connect_demo))
        .route("/schema", get(routes::schema))
        .route("/query/generate", post(routes::generate))
        .route("/query/execute", post(routes::execute))
        .route("/query/explain", post(routes::explain))
        .route("/query/fix", post(routes::fix))
        .route("/query/chart", post(routes::chart))
        .route("/query/export", post(routes::export))
        .layer(middleware::from_fn_with_state(
            state.rate_limit_gate(),
            rate_limit_middleware,
        ));

    Router::new()
        .nest("/api", api)
        .layer(middleware::from_fn(request_span))
        .with_state(state)
}

/// Run every request inside a span carrying a fresh request id.
async fn request_span(request: Request, next: Next) -> Response {
    let request_id = Uuid::new_v4();
    let span = info_span!(
        "request",
        request_id = %request_id,
        method = %request.method(),
        path = %request.uri().path(),
    );
    let start = Instant::now();

    let mut response = next.run(request).instrument(span.clone()).await;

    span.in_scope(|| {
        info!(
            status = response.status().as_u16(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Request completed"
        );
    });
    if let Ok(value) = HeaderValue::from_str(&request_id.to_string()) {
        response.headers_mut().insert("x-request-id", value);
    }
    response
}

/// Serve until SIGINT/SIGTERM, then drain for up to `GRACEFUL_TIMEOUT`.
pub async fn serve(state: AppState, bind_addr: &str) -> DbResult<()> {
    let app = router(state);

    let listener = TcpListener::bind(bind_addr).await.map_err(|e| {
        DbError::connection_failed(
            format!("Failed to bind to {}: {}", bind_addr, e),
            "Check that the port is available",
        )
    })?;
    info!(addr = %bind_addr, "HTTP server listening");

    let shutdown_notify = Arc::new(tokio::sync::Notify::new());
    let notify = shutdown_notify.clone();
    let shutdown_signal = async move {
        wait_for_signal().await;
        notify.notify_one();
    };

    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal);

    tokio::select! {
        result = server => {
            match result {
                Ok(()) => info!("HTTP server stopped"),
                Err(e) => {
                    error!(error = %e, "HTTP server error");
                    return Err(DbError::unknown(format!("HTTP server error: {}", e)));
                }
            }
        }
        _ = async {
            shutdown_notify.notified().await;
            info!(
                timeout_secs = GRACEFUL_TIMEOUT.as_secs(),
                "Waiting for requests to finish (send signal again to force exit)..."
            );
            tokio::select! {
                _ = tokio::time::sleep(GRACEFUL_TIMEOUT) => {
                    warn!("Graceful shutdown timeout, forcing exit");
                }
                _ = wait_for_signal() => {
                    warn!("Received second signal, forcing immediate exit");
                }
            }
        } => {}
    }

    Ok(())
}

/// Wait for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_signal() {
    let ctrl_c = signal::ctrl_c();

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
