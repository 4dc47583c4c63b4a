//! SQL Copilot - Main entry point.

use clap::Parser;
use sql_copilot::config::Config;
use sql_copilot::db::AdapterRegistry;
use sql_copilot::llm::OpenAiCompletionClient;
use sql_copilot::rate_limit::InMemoryRateLimiter;
use sql_copilot::server::{self, AppState, SessionSettings};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber.with(fmt::layer().json()).init();
    } else {
        subscriber
            .with(fmt::layer().with_target(true).with_thread_ids(false))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::parse();

    init_tracing(&config);

    info!("Starting SQL Copilot v{}", env!("CARGO_PKG_VERSION"));

    let registry = Arc::new(AdapterRegistry::with_defaults());
    info!(
        backends = ?registry.supported_types(),
        "Database adapters registered"
    );

    let completion = OpenAiCompletionClient::new(config.openai_api_key.clone(), &config.llm_model)?
        .with_base_url(&config.llm_base_url);
    if !completion.is_configured() {
        warn!("No completion API key configured; generate, explain, fix and chart will fail");
    }

    let sessions = SessionSettings::new(
        &config.session_secret_bytes(),
        config.session_ttl_duration(),
        config.secure_cookies,
    );
    let rate_limiter = Arc::new(InMemoryRateLimiter::new(
        config.rate_limit_requests,
        config.rate_limit_window_duration(),
    ));

    let demo = config.demo_connection()?;
    if let Some(demo) = &demo {
        info!(db_type = %demo.db_type, "Demo database configured");
    }

    let state = AppState::new(registry, Arc::new(completion), sessions, rate_limiter)
        .with_trust_proxy(config.trust_proxy)
        .with_demo(demo);

    if let Err(e) = server::serve(state, &config.http_bind_addr()).await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}
