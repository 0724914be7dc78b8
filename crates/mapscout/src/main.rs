mod config;
mod error;
mod extractor;
mod model;
mod search;
mod server;

use std::sync::Arc;

use rmcp::{ServiceExt, transport::stdio};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::Config;
use mapscout_common::gemini::GeminiClient;
use search::SearchOrchestrator;
use server::MapScoutServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout is reserved for MCP JSON-RPC
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    info!("starting mapscout MCP server");

    let config = Config::from_env()?;
    info!(
        model = %config.model,
        session_location = config.default_location.is_some(),
        "configuration loaded"
    );

    info!(
        base_url = %config.gemini.base_url,
        timeout_ms = config.gemini.timeout.as_millis(),
        "gemini client configured"
    );
    let gemini = Arc::new(GeminiClient::new(config.gemini.clone())?);

    let orchestrator = Arc::new(SearchOrchestrator::new(gemini, config.model.clone()));
    let server = MapScoutServer::new(orchestrator, config.default_location);

    if let Ok(addr) = std::env::var("MCP_TCP_LISTEN_ADDR") {
        let listener = TcpListener::bind(&addr).await?;
        info!(listen_addr = %addr, "MCP server ready, serving on TCP");
        loop {
            let (stream, peer) = listener.accept().await?;
            let server = server.clone();
            tokio::spawn(async move {
                tracing::info!(peer = %peer, "MCP client connected");
                let service = server.serve(stream).await.inspect_err(|e| {
                    tracing::error!(error = %e, "MCP server error");
                })?;
                service.waiting().await?;
                tracing::info!(peer = %peer, "MCP client disconnected");
                Ok::<(), anyhow::Error>(())
            });
        }
    } else {
        info!("MCP server ready, serving on stdio");
        let service = server.serve(stdio()).await.inspect_err(|e| {
            tracing::error!(error = %e, "MCP server error");
        })?;
        service.waiting().await?;
        info!("MCP server shut down");
    }
    Ok(())
}
