//! QuickDocker server.
//!
//! Run with: cargo run -p quickdocker-server -- --port 18093
//!
//! Then open http://127.0.0.1:18093 in your browser.

mod config;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use quickdocker_core::RuntimeClient;
use quickdocker_runtime::{DockerCompose, DockerRuntime};
use quickdocker_transport::{AppState, create_router};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.log_level.as_str().into()),
        )
        .init();

    let runtime = DockerRuntime::connect(config.docker_host.as_deref())
        .context("Failed to configure Docker client")?;
    match runtime.health().await {
        Ok(health) => tracing::info!(
            server_version = %health.server_version,
            containers = health.containers,
            "Connected to Docker"
        ),
        Err(e) => tracing::warn!(error = %e, "Docker not reachable yet"),
    }

    let state = AppState::new(
        Arc::new(runtime),
        Arc::new(DockerCompose::new(config.compose())),
        config.exec(),
        config.broadcast(),
    );
    let frontend = config.frontend();
    match &frontend {
        Some(dir) => tracing::info!(dir = %dir.display(), "Serving frontend"),
        None => tracing::info!("No frontend directory, serving API only"),
    }
    let app = create_router(state, frontend.as_deref());

    let addr = config.addr();
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("Server listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}
