//! Fleetscan Engine
//!
//! `fleetscan run` performs one discovery pass and prints the result;
//! `fleetscan serve` exposes discovery over HTTP.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use fleetscan_engine::discovery::{DiscoveryResult, ErrorScope};
use fleetscan_engine::providers::{HttpResultSink, OutputFormat, ResultSink, StdoutSink};
use fleetscan_engine::server::{self, AppState};
use fleetscan_engine::{run_from_path, DiscoveryConfig, Engine};

/// Fleetscan - multi-account database discovery
#[derive(Parser, Debug)]
#[command(name = "fleetscan", version, about)]
struct Cli {
    /// Path to the discovery config (JSON)
    #[arg(long, env = "FLEETSCAN_CONFIG", default_value = "fleetscan.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run discovery once and print the result
    Run {
        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        output: OutputFormat,

        /// Also POST the result to this URL
        #[arg(long, env = "FLEETSCAN_SINK_URL")]
        sink_url: Option<String>,
    },

    /// Serve discovery over HTTP
    Serve {
        /// Address to listen on
        #[arg(long, env = "FLEETSCAN_LISTEN", default_value = "0.0.0.0:8080")]
        listen: SocketAddr,

        /// POST every result to this URL
        #[arg(long, env = "FLEETSCAN_SINK_URL")]
        sink_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Logs go to stderr so JSON output on stdout stays parseable
    FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .json()
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run { output, sink_url } => {
            let mut sinks: Vec<Box<dyn ResultSink>> = vec![Box::new(StdoutSink::new(output))];
            if let Some(url) = sink_url {
                sinks.push(Box::new(HttpResultSink::new(url)?));
            }

            let result = run_from_path(&cli.config).await;
            server::publish(&sinks, &result).await;
            Ok(exit_code(&result))
        }
        Command::Serve { listen, sink_url } => {
            let config = DiscoveryConfig::load(&cli.config)
                .with_context(|| format!("Failed to load config {}", cli.config.display()))?;
            let engine = Engine::from_config(config).context("Failed to build discovery engine")?;

            let mut sinks: Vec<Box<dyn ResultSink>> = Vec::new();
            if let Some(url) = sink_url {
                sinks.push(Box::new(HttpResultSink::new(url)?));
            } else {
                warn!("No result sink configured; results are only kept in memory");
            }

            let app = server::router(AppState::new(engine, sinks));
            info!("Fleetscan listening on {}", listen);

            let listener = tokio::net::TcpListener::bind(listen)
                .await
                .with_context(|| format!("Failed to bind {}", listen))?;
            axum::serve(listener, app).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// 2 for a configuration failure, 1 when any account was skipped
fn exit_code(result: &DiscoveryResult) -> ExitCode {
    let scope_failed = |scope: ErrorScope| result.errors.iter().any(|e| e.scope == scope);
    if scope_failed(ErrorScope::Configuration) {
        ExitCode::from(2)
    } else if scope_failed(ErrorScope::Account) {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    }
}
