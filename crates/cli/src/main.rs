//! workagent CLI: the main entry point.
//!
//! Commands:
//! - `run`        : Run one prompt through the agent loop
//! - `repl`       : Interactive session; each turn is a child trace
//! - `list-tools` : Show the discovered tools in registry order
//! - `serve`      : Expose the agent over HTTP

use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use workagent_config::{AppConfig, LogFormat, LoggingConfig};

mod commands;

#[derive(Parser)]
#[command(
    name = "workagent",
    about = "workagent: a tool-calling agent runtime",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a single prompt and print the answer
    Run {
        /// The user prompt
        input: String,

        /// Use this trace id instead of generating one
        #[arg(long)]
        trace_id: Option<String>,

        /// Cancel the run after this many seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Stream the model's response as it arrives
        #[arg(long)]
        stream: bool,
    },

    /// Start an interactive session
    Repl {
        /// Stream the model's response as it arrives
        #[arg(long)]
        stream: bool,
    },

    /// List the available tools
    ListTools,

    /// Serve the HTTP API
    Serve {
        /// Address to bind (overrides server.host)
        #[arg(long)]
        host: Option<String>,

        /// Port to bind (overrides server.port)
        #[arg(long)]
        port: Option<u16>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let config = AppConfig::load().context("failed to load configuration")?;
    init_tracing(&config.logging, cli.verbose);

    match cli.command {
        Commands::Run {
            input,
            trace_id,
            timeout,
            stream,
        } => commands::run::run(&config, input, trace_id, timeout, stream).await,
        Commands::Repl { stream } => commands::repl::run(&config, stream).await,
        Commands::ListTools => commands::list_tools::run(&config),
        Commands::Serve { host, port } => commands::serve::run(&config, host, port).await,
    }
}

/// Logs go to stderr so stdout carries only the answer.
fn init_tracing(logging: &LoggingConfig, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level))
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}
