//! Spamblock - spam decision service entry point

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use spamblock_common::config::{Config, LoggingConfig};
use spamblock_common::types::TicketVars;
use spamblock_core::{SpamChecker, SpfEvaluator, TrustDnsLookup};
use spamblock_storage::{create_repository, MemoryTicketSpamMetaRepository};
use std::io::Read;
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Parser)]
#[command(name = "spamblock", version, about = "Spam decisions for inbound mail")]
struct Cli {
    /// Configuration file (defaults to ./spamblock.toml, then /etc/spamblock/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP API (default)
    Serve,
    /// Check one message given as ticket vars JSON and print the decision
    Check {
        /// JSON file with mid, email, subject, header, message; `-` for stdin
        file: PathBuf,
    },
    /// Evaluate SPF for a domain and sending IP and print the trace
    Spf { domain: String, ip: IpAddr },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::load_layered(Some(path.as_path()))?,
        None => Config::load()?,
    };

    init_logging(&config.logging);

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(config).await,
        Command::Check { file } => check(config, file).await,
        Command::Spf { domain, ip } => spf(config, &domain, ip).await,
    }
}

async fn serve(config: Config) -> Result<()> {
    info!("Starting Spamblock...");

    let repository = create_repository(&config.database).await?;
    info!(backend = %config.database.backend, "Storage initialized");

    let checker = Arc::new(SpamChecker::from_config(&config, repository)?);
    let app = spamblock_api::create_router(checker);

    let listener = tokio::net::TcpListener::bind(&config.server.bind_address)
        .await
        .with_context(|| format!("Failed to bind API server to {}", config.server.bind_address))?;
    info!("Starting API server on {}", config.server.bind_address);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Spamblock shutdown complete");
    Ok(())
}

async fn check(config: Config, file: PathBuf) -> Result<()> {
    let mut input = String::new();
    if file.as_os_str() == "-" {
        std::io::stdin().read_to_string(&mut input)?;
    } else {
        input = std::fs::read_to_string(&file)
            .with_context(|| format!("Failed to read {}", file.display()))?;
    }

    let vars: TicketVars = serde_json::from_str(&input).context("Input is not a JSON object")?;

    let checker = SpamChecker::from_config(&config, Arc::new(MemoryTicketSpamMetaRepository::new()))?;
    match checker.check_ticket_vars(&vars).await {
        Some(outcome) => println!("{}", serde_json::to_string_pretty(&outcome)?),
        None => info!("Message has no header block, nothing to check"),
    }

    Ok(())
}

async fn spf(config: Config, domain: &str, ip: IpAddr) -> Result<()> {
    let evaluator = SpfEvaluator::new(Arc::new(TrustDnsLookup::new(&config.dns)));
    let evaluation = evaluator.evaluate(domain, ip).await;
    println!("{}", serde_json::to_string_pretty(&evaluation)?);
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    info!("Shutdown signal received");
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.level));

    let registry = tracing_subscriber::registry().with(filter);

    if config.format == "json" {
        registry
            .with(fmt::layer().json().with_target(true).with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_level(true)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}
