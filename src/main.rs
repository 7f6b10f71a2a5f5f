//! Power meter - Main entry point
//!
//! Samples the meter once per second and rolls the samples up into
//! minute, hour, day, week, month and year series on a calendar schedule.

use anyhow::Context;
use power_meter_lib::core::Config;
use power_meter_lib::db::Database;
use power_meter_lib::meter::{EstimationSource, SecondSampler};
use power_meter_lib::rollup::{RollupPipeline, Updater};
use power_meter_lib::schedule::Scheduler;
use std::sync::Arc;
use tokio::sync::Mutex;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("Starting power meter v{}", env!("CARGO_PKG_VERSION"));

    // Load or create configuration; a broken file is fatal
    let config = Config::load().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;
    let retention = config.retention_policy()?;

    // Initialize database
    let db = match config.storage.db_path() {
        Some(path) => Database::open(&path),
        None => Database::new(),
    }
    .context("Failed to initialize database")?;
    let store = Arc::new(Mutex::new(db));

    // Virtual clock, optionally pinned by POWER_SET_TIME or start_time
    let mut scheduler = Scheduler::new();
    if let Some(start) = config.updater.start_clock()? {
        log::info!("Setting virtual clock to {}", start);
        scheduler.set_clock(start);
    }

    let sampler = if config.meter.enabled {
        let source = EstimationSource::new(config.meter.idle_watts, config.meter.max_load_watts);
        let sampler = SecondSampler::new(Box::new(source), store.clone(), retention.clone());
        Some(tokio::spawn(sampler.run()))
    } else {
        log::info!("Sampler disabled, only rolling up existing samples");
        None
    };

    let updater = Updater::new(
        RollupPipeline::new(store, retention),
        config.updater.failure_policy,
    );

    let result = tokio::select! {
        result = updater.run(scheduler) => result.context("Rollup updater stopped"),
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for shutdown signal")?;
            log::info!("Shutting down");
            Ok(())
        }
    };

    if let Some(sampler) = sampler {
        sampler.abort();
    }

    result
}
