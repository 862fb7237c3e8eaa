//! Subcommand implementations and the wiring they share.

pub mod list_tools;
pub mod repl;
pub mod run;
pub mod serve;

use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::UnboundedReceiverStream;
use workagent_agent::{AgentLoop, AgentStreamEvent, LoopConfig};
use workagent_config::AppConfig;
use workagent_core::event::EventSink;
use workagent_core::registry::ToolRegistry;
use workagent_telemetry::{FanoutSink, TelemetryEngine, TracingSink};
use workagent_tools::OpenWeatherClient;

/// Discover the built-in tools; weather goes live when a key is configured.
pub fn build_registry(config: &AppConfig) -> anyhow::Result<Arc<ToolRegistry>> {
    let weather = match config.weather_api_key() {
        Some(key) => Some(
            OpenWeatherClient::new(&config.weather_base_url, key, config.weather_timeout())
                .context("weather client unavailable")?,
        ),
        None => {
            tracing::info!("No weather API key configured, weather tool runs offline");
            None
        }
    };
    let source = workagent_tools::builtin_source_with(weather);
    let registry = ToolRegistry::discover(&[&source]).context("tool discovery failed")?;
    Ok(Arc::new(registry))
}

/// Provider, tools and sinks wired into one loop.
pub fn build_agent(
    config: &AppConfig,
    stream: bool,
    telemetry: Arc<TelemetryEngine>,
) -> anyhow::Result<AgentLoop> {
    let registry = build_registry(config)?;
    let provider =
        workagent_providers::build_from_config(config).context("model provider unavailable")?;

    let mut loop_config = LoopConfig::from_settings(&config.agent);
    loop_config.streaming |= stream;

    let sink: Arc<dyn EventSink> = Arc::new(
        FanoutSink::new()
            .with(Arc::new(TracingSink))
            .with(telemetry),
    );

    Ok(AgentLoop::from_config(provider, registry, config)
        .with_config(loop_config)
        .with_sink(sink))
}

/// Print streamed text to stdout and tool activity to stderr until the run ends.
pub fn spawn_printer(rx: mpsc::UnboundedReceiver<AgentStreamEvent>) -> JoinHandle<()> {
    let mut events = UnboundedReceiverStream::new(rx);
    tokio::spawn(async move {
        let mut stdout = std::io::stdout();
        while let Some(event) = events.next().await {
            match event {
                AgentStreamEvent::Chunk { content } => {
                    print!("{content}");
                    let _ = stdout.flush();
                }
                AgentStreamEvent::ToolCall { name, .. } => eprintln!("  -> {name}"),
                AgentStreamEvent::ToolResult {
                    name,
                    success,
                    failure,
                    ..
                } => match failure {
                    Some(kind) if !success => eprintln!("  <- {name} ({kind})"),
                    _ => eprintln!("  <- {name}"),
                },
                AgentStreamEvent::Retry { attempt, reason } => {
                    eprintln!("  retrying model call (attempt {attempt} failed: {reason})")
                }
            }
        }
    })
}
