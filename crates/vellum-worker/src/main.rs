//! Vellum worker: runs the periodic trash purge against the shared metadata
//! store and blob store.

use anyhow::Context;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use vellum_core::Config;
use vellum_db::{create_pool, run_migrations, Stores};
use vellum_infra::{init_telemetry, shutdown_telemetry, GuardedCache, LruMediaCache, TelemetryOptions};
use vellum_services::{LifecycleSettings, TrashPurgeService, TrashService};
use vellum_storage::create_storage;

#[derive(Parser)]
#[command(name = "vellum-worker", about = "Vellum background maintenance worker")]
struct Cli {
    /// Run a single purge sweep and exit
    #[arg(long)]
    once: bool,
    /// Do not apply pending database migrations on startup
    #[arg(long)]
    skip_migrations: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = Config::from_env().context("Failed to load configuration")?;
    init_telemetry(&TelemetryOptions::from_config("vellum-worker", &config))
        .map_err(|e| anyhow::anyhow!("Failed to initialize telemetry: {}", e))?;

    let pool = create_pool(&config).await?;
    if !cli.skip_migrations {
        run_migrations(&pool).await?;
    }

    let stores = Stores::postgres(pool.clone());
    let storage = create_storage(&config)
        .await
        .context("Failed to initialize blob storage")?;
    let cache = GuardedCache::new(
        Arc::new(LruMediaCache::new(config.cache_capacity())),
        Duration::from_millis(config.cache_op_timeout_ms()),
    );
    let settings = LifecycleSettings::from_config(&config);

    let trash = TrashService::new(&stores, storage, cache, settings.clone());
    let sweeper = Arc::new(TrashPurgeService::new(
        trash,
        settings.purge_interval,
        settings.purge_batch_size,
    ));

    if cli.once {
        let outcome = sweeper.run_once().await?;
        tracing::info!(
            purged = outcome.succeeded_count(),
            failed = outcome.failed_count(),
            "Single purge sweep finished"
        );
    } else if settings.purge_interval.is_zero() {
        tracing::warn!("TRASH_PURGE_INTERVAL_SECS is 0, purge loop disabled");
    } else {
        let shutdown = CancellationToken::new();
        let handle = sweeper.start(shutdown.clone());
        tracing::info!(
            interval_secs = settings.purge_interval.as_secs(),
            batch_size = settings.purge_batch_size,
            "Trash purge loop started"
        );

        tokio::signal::ctrl_c()
            .await
            .context("Failed to listen for shutdown signal")?;
        tracing::info!("Shutdown signal received");
        shutdown.cancel();
        handle.await.context("Purge loop panicked")?;
    }

    pool.close().await;
    shutdown_telemetry().await;
    Ok(())
}
