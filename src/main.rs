mod auth;
mod azure_error;
mod cache;
mod config;
mod context;
mod error;
mod registry;
mod server;
mod service;
mod tool;
mod tools;

use anyhow::Context;
use rmcp::transport::stdio;
use rmcp::ServiceExt;
use tracing_subscriber::EnvFilter;

use crate::context::AzureContext;
use crate::registry::ToolRegistry;
use crate::server::AzureMcpServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Write structured logs to stderr so stdout stays clean for MCP JSON-RPC.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("azure_mcp_server=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting azure-mcp-server v{}", env!("CARGO_PKG_VERSION"));

    let config = config::Config::from_env().context("Failed to read configuration")?;
    tracing::info!(
        credentials = ?config.credentials.mode,
        cosmos = config.cosmos.is_some(),
        "configuration loaded"
    );

    let mut registry = ToolRegistry::new();
    tools::register_all(&mut registry);
    registry.retain_groups(|group| config.group_enabled(group));
    tracing::info!(
        tools = registry.len(),
        groups = ?registry.list_groups(),
        "tools registered"
    );

    let server = AzureMcpServer::new(AzureContext::new(config), registry);

    tracing::info!("MCP server listening on stdio");

    let running = server
        .serve(stdio())
        .await
        .context("Failed to start MCP transport")?;
    running.waiting().await?;

    Ok(())
}
