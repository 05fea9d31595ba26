//! agor — entry point for the standalone HTTP server.

use agor::config::{RuntimeConfig, ServiceRegistry};
use agor::domain_types::LlmServiceId;
use agor::llm_client::{HttpLlmClient, LlmClient};
use agor::observability::init_tracing;
use agor::server::{AppState, create_router, shutdown_all};
use agor::time_provider::RealTimeProvider;
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
const DEFAULT_SERVICES_PATH: &str = "llmservices.json";
const BASE_PROMPT: &str = "You are part of a society of cooperating agents. \
Use tools when they help you make progress; reply directly once you have a final answer.";
const TOOL_RULES: &str = "Only call tools your role's tool groups grant you. \
Prefer the narrowest tool that accomplishes the task.";

#[tokio::main]
async fn main() -> Result<()> {
    let env = std::env::var("AGOR_ENV").unwrap_or_else(|_| "development".to_string());
    let config = if env == "production" {
        RuntimeConfig::production()
    } else {
        RuntimeConfig::development()
    };
    config.validate().context("invalid runtime configuration")?;
    init_tracing(config.json_logs).context("failed to initialize tracing")?;

    info!(env, "starting agor runtime server");

    let services_path =
        std::env::var("AGOR_SERVICES_PATH").unwrap_or_else(|_| DEFAULT_SERVICES_PATH.to_string());
    let services = ServiceRegistry::load(&services_path)
        .with_context(|| format!("loading service registry from {services_path}"))?;

    let mut clients: HashMap<LlmServiceId, Arc<dyn LlmClient>> = HashMap::new();
    for entry in services.entries() {
        let client: Arc<dyn LlmClient> = Arc::new(HttpLlmClient::new(
            entry.base_url.clone(),
            entry.api_key.clone(),
            std::time::Duration::from_secs(60),
        ));
        clients.insert(entry.id.clone(), client);
    }
    info!(services = clients.len(), "loaded LLM service registry");

    let state = Arc::new(AppState::new(
        config.clone(),
        services,
        clients,
        BASE_PROMPT.to_string(),
        TOOL_RULES.to_string(),
        Arc::new(RealTimeProvider::new()),
    ));

    let bind_addr =
        std::env::var("AGOR_BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.to_string());
    let listener = TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "listening for HTTP requests");

    let router = create_router(state.clone());
    let shutdown_state = state.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received, draining active tasks");
            shutdown_all(&shutdown_state).await;
        })
        .await?;

    info!("agor server shut down gracefully");
    Ok(())
}
