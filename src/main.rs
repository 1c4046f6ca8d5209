use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use media_storage_ledger::{config::Config, database::Database, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("Failed to load configuration")?;

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let database = Database::new(&config.database_url, config.database_max_connections)
        .await
        .context("Failed to connect to database")?;
    database.migrate().await.context("Failed to run migrations")?;
    tracing::info!("Database ready");

    let state = AppState::from_database(config.clone(), &database)?;

    // `reconcile-once` runs a single pass and exits; otherwise loop until Ctrl-C.
    if std::env::args().nth(1).as_deref() == Some("reconcile-once") {
        let report = state.reconciler.reconcile_all().await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let shutdown = CancellationToken::new();
    let runner = {
        let reconciler = state.reconciler.clone();
        let shutdown = shutdown.clone();
        let interval = config.reconcile_interval();
        tokio::spawn(async move { reconciler.run_periodic(interval, shutdown).await })
    };

    tracing::info!(
        interval_secs = config.reconcile_interval_secs,
        concurrency = config.reconcile_concurrency,
        "Storage reconciliation running"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutdown requested");
    shutdown.cancel();
    runner.await?;

    tracing::debug!("{}", state.metrics.render()?);
    Ok(())
}
