//! `workagent serve`: the agent behind the HTTP API.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use workagent_config::AppConfig;
use workagent_server::ServerState;
use workagent_telemetry::TelemetryEngine;

use super::build_agent;

pub async fn run(
    config: &AppConfig,
    host: Option<String>,
    port: Option<u16>,
) -> anyhow::Result<ExitCode> {
    let telemetry = Arc::new(TelemetryEngine::new());
    let agent = build_agent(config, false, telemetry)?;
    let state = Arc::new(ServerState::new(Arc::new(agent)));

    let host = host.unwrap_or_else(|| config.server.host.clone());
    let port = port.unwrap_or(config.server.port);
    let addr = format!("{host}:{port}");

    workagent_server::serve(state, &addr, async {
        let _ = tokio::signal::ctrl_c().await;
    })
    .await
    .with_context(|| format!("HTTP API on {addr} failed"))?;

    Ok(ExitCode::SUCCESS)
}
