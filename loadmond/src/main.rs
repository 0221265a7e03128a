use anyhow::Context;
use clap::Parser;
use loadmond::api::{self, AppState};
use loadmond::collectors::SystemCollector;
use loadmond::monitor::{RetentionSweeper, Sampler};
use loadmond::store::LoadStore;
use loadmond::thresholds::ThresholdStore;
use loadmond::Config;
use log::info;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Parser, Debug)]
#[clap(version, about = "Host load monitoring daemon")]
struct Args {
    /// Path to the TOML config file (defaults apply if omitted)
    #[clap(long)]
    config: Option<PathBuf>,

    /// Override the listen address from the config
    #[clap(long)]
    listen: Option<String>,

    /// Override the SQLite database path from the config
    #[clap(long)]
    db: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(listen) = args.listen {
        config.server.listen = listen;
    }
    if let Some(db) = args.db {
        config.storage.db_path = db;
    }

    let store = Arc::new(LoadStore::new(&config.storage.db_path).await?);
    let thresholds = Arc::new(ThresholdStore::new(config.thresholds));

    let sampler = Sampler::new(
        Box::new(SystemCollector::new()),
        Arc::clone(&store),
        Arc::clone(&thresholds),
        Duration::from_secs(config.sampling.interval_secs),
    );
    let sweeper = RetentionSweeper::new(
        Arc::clone(&store),
        Duration::from_secs(config.retention_window_secs()),
        Duration::from_secs(config.retention.sweep_interval_secs),
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let sampler_task = tokio::spawn(sampler.run(shutdown_rx.clone()));
    let sweeper_task = tokio::spawn(sweeper.run(shutdown_rx.clone()));

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("[main] shutdown signal received");
            let _ = shutdown_tx.send(true);
        }
    });

    let app = api::router(AppState { store, thresholds });
    let listener = tokio::net::TcpListener::bind(&config.server.listen)
        .await
        .with_context(|| format!("binding {}", config.server.listen))?;
    info!("[main] listening on {}", config.server.listen);

    let mut serve_shutdown = shutdown_rx;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = serve_shutdown.changed().await;
        })
        .await?;

    // Let in-flight ticks finish before exiting; neither loop is ever
    // interrupted mid-transaction.
    sampler_task.await?;
    sweeper_task.await?;
    info!("[main] stopped");
    Ok(())
}
