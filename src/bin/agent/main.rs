use std::sync::Arc;

use anyhow::{Context, Result};
use browser_control_agent::face::{self, AppState};
use browser_control_agent::{AgentConfig, ChromeLauncher, brain};
use clap::Parser;
use dotenvy::dotenv;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("browser_control_agent=info,agent=info")),
        )
        .init();

    let config = AgentConfig::parse();
    info!(provider = ?config.provider, model = config.model_name(), "starting browser control agent");

    let brain = brain::from_config(&config)?;
    let state = Arc::new(AppState {
        brain,
        launcher: Arc::new(ChromeLauncher::new(config.launch())),
        settings: config.session(),
    });

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("could not bind to {addr}"))?;
    info!("Web UI running at http://{addr}");

    // Each connection closes its own browser when it ends.
    axum::serve(listener, face::router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutting down");
        })
        .await?;

    Ok(())
}
