//! Multi-user chatbot projects API
//!
//! (c) Softlandia 2025

use chatbot_projects_api::config::Settings;
use chatbot_projects_api::infrastructure::database::DatabaseConnection;
use chatbot_projects_api::{app, service_provider};

use anyhow::Context;
use log::{info, warn};
use tokio::runtime::{Builder, Runtime};
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    // initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::from_env().context("invalid configuration")?;

    let runtime: Runtime = Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(web_server_task(settings))
}

async fn web_server_task(settings: Settings) -> anyhow::Result<()> {
    let pool = DatabaseConnection::connect(&settings.database_url)
        .await
        .with_context(|| format!("failed to open database {}", settings.database_url))?;

    if settings.anthropic.api_key.is_none() && settings.openai.api_key.is_none() {
        warn!("no LLM API key configured, chat replies will use the offline fallback");
    }

    let provider = service_provider(settings.clone(), pool)
        .context("failed to build service provider")?;
    let app = app(provider, &settings);

    let listener = tokio::net::TcpListener::bind(settings.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", settings.bind_addr))?;
    info!("listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Shutting down...");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
}
