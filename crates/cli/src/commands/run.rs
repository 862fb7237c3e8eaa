//! `workagent run`: one prompt, one trace, one answer.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use workagent_agent::{AgentRun, RunOutcome};
use workagent_config::AppConfig;
use workagent_core::trace::TraceContext;
use workagent_telemetry::TelemetryEngine;

use super::{build_agent, spawn_printer};

pub async fn run(
    config: &AppConfig,
    input: String,
    trace_id: Option<String>,
    timeout: Option<u64>,
    stream: bool,
) -> anyhow::Result<ExitCode> {
    let telemetry = Arc::new(TelemetryEngine::new());
    let agent = build_agent(config, stream, telemetry.clone())?;
    let trace = trace_id.map(TraceContext::with_id).unwrap_or_default();

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });
    if let Some(secs) = timeout {
        let on_deadline = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            on_deadline.cancel();
        });
    }

    let streamed = agent.config().streaming;
    let run = if streamed {
        let (tx, rx) = mpsc::unbounded_channel();
        let printer = spawn_printer(rx);
        let run = agent
            .run_with_events(
                new_transcript(&input)?,
                &trace,
                &cancel,
                tx,
            )
            .await;
        let _ = printer.await;
        println!();
        run
    } else {
        agent.run(new_transcript(&input)?, &trace, &cancel).await
    };

    if let Some(t) = telemetry.get_trace(trace.id().as_str()) {
        tracing::debug!(
            trace_id = %t.id,
            model_calls = t.model_call_count(),
            tool_calls = t.tool_call_count(),
            tool_failures = t.failed_tool_calls(),
            tokens = t.total_tokens(),
            duration_ms = t.duration_ms().unwrap_or(0),
            "Trace summary"
        );
    }

    Ok(render(&run, streamed))
}

fn new_transcript(input: &str) -> anyhow::Result<workagent_core::message::Transcript> {
    let mut transcript = workagent_core::message::Transcript::new();
    transcript.push_user(input)?;
    Ok(transcript)
}

/// Answer on stdout; abort reason on stderr with a failing exit code.
pub fn render(run: &AgentRun, already_printed: bool) -> ExitCode {
    match &run.outcome {
        RunOutcome::Completed { content } => {
            if !already_printed {
                println!("{content}");
            }
            ExitCode::SUCCESS
        }
        RunOutcome::Aborted { reason, partial } => {
            if !already_printed && !partial.is_empty() {
                println!("{partial}");
            }
            eprintln!(
                "run aborted ({}): {reason} [trace {}]",
                reason.kind(),
                run.trace_id
            );
            ExitCode::FAILURE
        }
    }
}
