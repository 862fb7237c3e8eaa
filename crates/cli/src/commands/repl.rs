//! `workagent repl`: a conversation that survives across turns.
//!
//! The session has one trace; each turn runs under a child of it. A turn
//! that aborts leaves the conversation as it was before that turn.

use std::io::Write;
use std::process::ExitCode;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use workagent_agent::RunOutcome;
use workagent_config::AppConfig;
use workagent_core::message::Transcript;
use workagent_core::trace::TraceContext;
use workagent_telemetry::TelemetryEngine;

use super::{build_agent, spawn_printer};

pub async fn run(config: &AppConfig, stream: bool) -> anyhow::Result<ExitCode> {
    let telemetry = Arc::new(TelemetryEngine::new());
    let agent = build_agent(config, stream, telemetry.clone())?;
    let session = TraceContext::new();
    let streamed = agent.config().streaming;

    println!();
    println!("  workagent: interactive mode");
    println!();
    println!("  Provider:  {}", config.provider);
    println!("  Model:     {}", config.model);
    println!("  Tools:     {}", agent.registry().names().join(", "));
    println!("  Session:   {}", session.id());
    println!();
    println!("  Type 'exit' or 'quit' to leave. Ctrl+C cancels a running turn.");
    println!();

    let mut transcript = Transcript::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if matches!(input, "exit" | "quit" | "q") {
            break;
        }

        let mut turn = transcript.clone();
        turn.push_user(input)?;
        let trace = session.child();
        let cancel = CancellationToken::new();

        // Without --stream the events are dropped and the answer printed at the end
        let (tx, rx) = mpsc::unbounded_channel();
        let printer = streamed.then(|| spawn_printer(rx));
        let run = agent.run_with_events(turn, &trace, &cancel, tx);
        tokio::pin!(run);

        let run = tokio::select! {
            run = &mut run => run,
            _ = tokio::signal::ctrl_c() => {
                cancel.cancel();
                run.await
            }
        };
        if let Some(printer) = printer {
            let _ = printer.await;
            println!();
        }

        match &run.outcome {
            RunOutcome::Completed { content } => {
                if !streamed {
                    println!();
                    for line in content.lines() {
                        println!("  Assistant > {line}");
                    }
                }
                println!();
                transcript = run.transcript;
            }
            RunOutcome::Aborted { reason, partial } => {
                if !streamed && !partial.is_empty() {
                    println!("  Assistant (partial) > {partial}");
                }
                eprintln!("  [{}] {reason}", reason.kind());
                println!();
            }
        }
    }

    let usage = telemetry.usage_snapshot();
    println!();
    println!(
        "  Session {}: {} turns, {} tool calls, {} tokens",
        session.id(),
        usage.completed_runs + usage.aborted_runs,
        usage.tool_calls,
        usage.input_tokens + usage.output_tokens
    );
    println!();
    Ok(ExitCode::SUCCESS)
}
