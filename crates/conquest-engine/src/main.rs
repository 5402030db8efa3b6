//! Host binary for the Conquest warfare core.
//!
//! Wires the managers to a store and a nation directory, restores live
//! state, and runs the tick loop until Ctrl-C.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `conquest-config.yaml` (or `CONQUEST_CONFIG`)
//! 2. Initialize structured logging (tracing)
//! 3. Open the store: `PostgreSQL` when a URL is configured, memory otherwise
//! 4. Seed the demo nation directory
//! 5. Build the managers and restore their caches
//! 6. Run the tick loop until Ctrl-C
//! 7. Close the database pool

mod error;
mod seed;

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use conquest_core::config::{InfrastructureConfig, LoggingConfig};
use conquest_core::{Conquest, ConquestConfig, DriverControl, TickDriver, run_driver};
use conquest_store::{MemoryStore, PgStore, PostgresConfig, PostgresPool, Store};
use conquest_warfare::SystemClock;

use crate::error::EngineError;

/// Default configuration file, relative to the working directory.
const DEFAULT_CONFIG_PATH: &str = "conquest-config.yaml";

/// Environment variable naming an alternative configuration file.
const CONFIG_PATH_ENV: &str = "CONQUEST_CONFIG";

/// Application entry point.
///
/// # Errors
///
/// Returns an error if configuration, logging, the store, or the tick loop
/// fails to start.
#[tokio::main]
async fn main() -> Result<(), EngineError> {
    // 1. Load configuration.
    let config_path = std::env::var(CONFIG_PATH_ENV)
        .map_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from);
    let config = ConquestConfig::load_or_default(&config_path)?;

    // 2. Initialize structured logging.
    init_logging(&config.logging)?;
    info!(
        config = %config_path.display(),
        tick_interval_secs = config.tick.interval_secs,
        nations = config.nations.len(),
        "conquest-engine starting"
    );

    // 3. Open the store.
    let (store, pool) = open_store(&config.infrastructure).await?;

    // 4. Seed the nation directory.
    let (directory, nation_ids) = seed::seed_directory(&config.nations);
    info!(nations = nation_ids.len(), "nation directory seeded");

    // 5. Build managers and restore live state.
    let conquest = Arc::new(Conquest::new(
        store,
        Arc::new(directory),
        Arc::new(SystemClock),
        &config.warfare,
    ));
    conquest.restore().await?;

    // 6. Run the tick loop until Ctrl-C.
    let control = Arc::new(DriverControl::new());
    let stopper = Arc::clone(&control);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("shutdown requested"),
            Err(err) => error!(error = %err, "failed to listen for Ctrl-C, stopping"),
        }
        stopper.request_stop();
    });

    let driver = TickDriver::new(Arc::clone(&conquest));
    let report = run_driver(&driver, &control, config.tick.interval()).await?;
    let pending = conquest.scheduler.pending_count();

    // 7. Close the database pool.
    if let Some(pool) = pool {
        pool.close().await;
    }

    info!(
        ticks = report.ticks,
        ticks_with_failures = report.ticks_with_failures,
        pending_timers = pending,
        "conquest-engine shutdown complete"
    );
    Ok(())
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured level.
fn init_logging(config: &LoggingConfig) -> Result<(), EngineError> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    let installed = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| EngineError::Logging {
        message: e.to_string(),
    })
}

/// Connect and migrate `PostgreSQL` when configured; otherwise keep state
/// in memory.
async fn open_store(
    config: &InfrastructureConfig,
) -> Result<(Arc<dyn Store>, Option<PostgresPool>), EngineError> {
    let Some(url) = config.postgres_url.as_deref() else {
        warn!("no database configured, state will not survive a restart");
        return Ok((Arc::new(MemoryStore::new()), None));
    };

    let mut pg_config = PostgresConfig::new(url);
    if let Some(max) = config.max_connections {
        pg_config = pg_config.with_max_connections(max);
    }
    let pool = PostgresPool::connect(&pg_config).await?;
    pool.run_migrations().await?;
    info!("PostgreSQL store ready");
    Ok((Arc::new(PgStore::new(&pool)), Some(pool)))
}
