use anyhow::Result;
use chargelog::config::Config;
use chargelog::events::{EventBus, log_events};
use chargelog::ingest::ingest_file;
use chargelog::logging::{get_logger, init_logging};
use chargelog::session::SessionManager;
use chargelog::web::{self, AppState};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "chargelog", version = chargelog::VERSION)]
#[command(about = "EV charging telemetry ingestion and session logging", long_about = None)]
struct Cli {
    /// Configuration file; the default locations are probed when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the HTTP API (default)
    Serve {
        /// Bind address, overrides the configuration
        #[arg(long)]
        host: Option<String>,

        /// TCP port, overrides the configuration
        #[arg(long)]
        port: Option<u16>,
    },

    /// Feed a charging profile into a session and exit
    Ingest {
        /// Vehicle the profile belongs to
        #[arg(long)]
        vehicle: String,

        /// Path to the delimited profile
        #[arg(long)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load()?,
    };
    init_logging(&config.logging)?;
    info!("{} {} starting up", chargelog::NAME, chargelog::VERSION);

    let events = EventBus::new(config.events.capacity);
    let observer = tokio::spawn(log_events(events.subscribe()));
    let sessions = Arc::new(SessionManager::new(&config, events));

    let outcome = match cli.command.unwrap_or(Commands::Serve {
        host: None,
        port: None,
    }) {
        Commands::Serve { host, port } => {
            let host = host.unwrap_or_else(|| config.web.host.clone());
            let port = port.unwrap_or(config.web.port);
            serve(Arc::clone(&sessions), &host, port).await
        }
        Commands::Ingest { vehicle, file } => ingest(Arc::clone(&sessions), vehicle, file).await,
    };

    // Close whatever is still open so both logs are flushed
    let closed = tokio::task::spawn_blocking({
        let sessions = Arc::clone(&sessions);
        move || sessions.shutdown()
    })
    .await?;
    if !closed.is_empty() {
        info!("Closed {} session(s) during shutdown", closed.len());
    }

    drop(sessions);
    observer.abort();

    if let Err(e) = &outcome {
        error!("Chargelog failed: {e}");
    }
    outcome
}

async fn serve(sessions: Arc<SessionManager>, host: &str, port: u16) -> Result<()> {
    let state = AppState::new(sessions);
    web::serve(state, host, port, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for shutdown signal: {e}");
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
    })
    .await
}

async fn ingest(sessions: Arc<SessionManager>, vehicle: String, file: PathBuf) -> Result<()> {
    let logger = get_logger("cli");
    logger.info(&format!(
        "Ingesting {} for vehicle {vehicle}",
        file.display()
    ));

    let report =
        tokio::task::spawn_blocking(move || ingest_file(sessions.as_ref(), &file, &vehicle))
            .await??;

    println!("Status: Transfer completed!");
    println!("Total samples sent: {}", report.accepted);
    println!("Total errors: {}", report.errors());
    if let Some(summary) = &report.summary {
        println!("Accepted log: {}", summary.accepted_log.display());
        println!("Rejects log:  {}", summary.rejected_log.display());
    }
    Ok(())
}
