//! Standalone REST API server binary.
//!
//! ## Purpose
//! Runs both services on a single address, with one merged OpenAPI document.
//!
//! ## Intended use
//! Useful for development when one port is more convenient. The workspace's main `medsim-run`
//! binary serves the analyst and evaluation services on separate addresses.

use api_rest::env::{config_from_env, llm_settings_from_env, log_startup_summary};
use medsim_core::AppContext;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// # Environment Variables
/// - `MEDSIM_REST_ADDR`: Server address (default: "0.0.0.0:3000")
/// - `CONVERSATIONS_DIR`, `EVALUATORS_DIR`: storage roots
/// - `OPENAI_MODEL`, `OPENAI_BASE_URL`, `OPENAI_API_KEY`: chat service settings
///
/// # Errors
/// Returns an error if:
/// - the logging/tracing configuration cannot be initialised,
/// - the server address cannot be bound, or
/// - the HTTP server fails while running.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("api_rest=info".parse()?)
                .add_directive("medsim_core=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let addr = std::env::var("MEDSIM_REST_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());

    let cfg = config_from_env();
    let llm = llm_settings_from_env();
    log_startup_summary(&cfg, &llm);
    if let Err(e) = cfg.ensure_directories() {
        tracing::error!("cannot prepare storage directories: {e}");
    }

    let ctx = Arc::new(AppContext::new(
        Arc::new(cfg),
        medsim_llm::reply_generator(&llm),
    ));

    tracing::info!("-- Starting MedSim REST API on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, api_rest::combined_app(ctx.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    ctx.shutdown();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("cannot listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown signal received");
}
