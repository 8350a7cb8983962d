use std::net::SocketAddr;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api_rest::env::{config_from_env, llm_settings_from_env, log_startup_summary};
use api_rest::{analyst_app, evaluation_app};
use medsim_core::AppContext;

/// Main entry point for MedSim
///
/// Starts both services concurrently over one shared context:
/// - analyst service on port 5000 (configurable via MEDSIM_ANALYST_ADDR)
/// - evaluation service on port 5001 (configurable via MEDSIM_EVALUATOR_ADDR)
///
/// Missing chat settings are logged and the process keeps running; chat replies are then
/// placeholders.
///
/// # Environment Variables
/// - `MEDSIM_ANALYST_ADDR`: analyst server address (default: "0.0.0.0:5000")
/// - `MEDSIM_EVALUATOR_ADDR`: evaluation server address (default: "0.0.0.0:5001")
/// - `CONVERSATIONS_DIR`: case folders root (default: "conversations")
/// - `EVALUATORS_DIR`: evaluator records root (default: "evaluators")
/// - `OPENAI_MODEL`, `OPENAI_BASE_URL`, `OPENAI_API_KEY`: chat service settings
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("medsim_run=info".parse()?)
                .add_directive("medsim_core=info".parse()?)
                .add_directive("api_rest=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let analyst_addr: SocketAddr = std::env::var("MEDSIM_ANALYST_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:5000".into())
        .parse()?;
    let evaluator_addr: SocketAddr = std::env::var("MEDSIM_EVALUATOR_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:5001".into())
        .parse()?;

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
    tracing::info!("{} cases in catalog", ctx.catalog().len());

    tracing::info!("++ Starting MedSim analyst service on {}", analyst_addr);
    tracing::info!("++ Starting MedSim evaluation service on {}", evaluator_addr);

    let analyst_listener = tokio::net::TcpListener::bind(analyst_addr).await?;
    let evaluator_listener = tokio::net::TcpListener::bind(evaluator_addr).await?;

    let analyst_server = axum::serve(analyst_listener, analyst_app(ctx.clone()))
        .with_graceful_shutdown(shutdown_signal());
    let evaluator_server = axum::serve(evaluator_listener, evaluation_app(ctx.clone()))
        .with_graceful_shutdown(shutdown_signal());

    // Run both
    let (analyst_result, evaluator_result) = tokio::join!(analyst_server, evaluator_server);
    analyst_result?;
    evaluator_result?;

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
