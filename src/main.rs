use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

mod api;
mod config;
mod live_scores;
mod notifier;
mod poller;
mod store;

use api::AppState;
use config::Config;
use live_scores::{MatchProvider, OpenLigaDb};
use notifier::{LogSink, NotificationSink};
use poller::{Command, Orchestrator, SystemClock, TokioTimer};
use store::{Database, Store};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    // Open database
    let store: Arc<dyn Store> = Arc::new(Database::open(&config.database_path)?);
    info!("Database opened: {}", config.database_path);

    let provider: Arc<dyn MatchProvider> =
        Arc::new(OpenLigaDb::new(&config.openligadb_url, config.http_timeout())?);
    info!("Match provider: {} ({})", provider.name(), config.openligadb_url);

    let sink: Arc<dyn NotificationSink> = Arc::new(LogSink::new(store.clone()));

    // Timer fires come back through the same channel as every other command.
    let (tx, mut rx) = mpsc::channel::<Command>(16);
    let timer = Arc::new(TokioTimer::new(tx));

    let orchestrator = Arc::new(Orchestrator::new(
        provider,
        store.clone(),
        sink,
        timer,
        Arc::new(SystemClock),
        config.poll_settings(),
    ));

    // Resume from persisted state: badge first, then the next poll.
    for command in [Command::UpdateBadge, Command::Reschedule] {
        let reply = orchestrator.dispatch(command).await;
        if !reply.success {
            warn!("Startup {:?} failed: {:?}", command, reply.error);
        }
    }

    let driver = orchestrator.clone();
    tokio::spawn(async move {
        while let Some(command) = rx.recv().await {
            driver.dispatch(command).await;
        }
    });

    // Start the command API
    let app = api::router(AppState {
        orchestrator,
        store,
    });
    let addr: SocketAddr = config.api_addr.parse()?;
    info!("Command API listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
