//! Power meter - Demo CLI
//!
//! Replays two simulated days across a month boundary in memory, with
//! a synthetic meter, and prints what each series holds afterwards.

use chrono::{TimeZone, Timelike, Utc};
use power_meter_lib::core::{AggregateRecord, FailurePolicy, Result};
use power_meter_lib::db::{MemoryStore, SeriesStore};
use power_meter_lib::meter::{PulseSource, SecondSampler};
use power_meter_lib::rollup::{RetentionPolicy, RollupPipeline, Tier};
use power_meter_lib::schedule::Scheduler;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Simulated meter: a little busier during the day
struct SyntheticMeter {
    hour: AtomicU32,
}

impl PulseSource for SyntheticMeter {
    fn take_pulses(&self) -> Result<u32> {
        let hour = self.hour.load(Ordering::Relaxed);
        Ok(if (8..20).contains(&hour) { 2 } else { 1 })
    }

    fn name(&self) -> &str {
        "Synthetic day/night meter"
    }

    fn is_estimated(&self) -> bool {
        true
    }
}

const DAYS: usize = 2;

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    println!("==============================================");
    println!("   Power Meter - Rollup Replay Demo");
    println!("==============================================\n");

    let store = Arc::new(Mutex::new(MemoryStore::new()));
    let retention = RetentionPolicy::new();

    let meter = Arc::new(SyntheticMeter {
        hour: AtomicU32::new(0),
    });
    let mut sampler = SecondSampler::new(
        Box::new(SharedMeter(meter.clone())),
        store.clone(),
        retention.clone(),
    );
    let pipeline = RollupPipeline::new(store.clone(), retention);

    let start = Utc.with_ymd_and_hms(2016, 1, 31, 0, 0, 0).single();
    let Some(start) = start else {
        anyhow::bail!("invalid replay start");
    };
    let mut scheduler = Scheduler::starting_at(start);

    println!("Replaying {} days from {}\n", DAYS, scheduler.clock());

    for _ in 0..DAYS * 24 * 60 {
        meter.hour.store(scheduler.clock().hour(), Ordering::Relaxed);

        let minute_start = scheduler.clock().timestamp_millis();
        for second in 0..60 {
            sampler.sample_once(minute_start + second * 1000).await?;
        }

        scheduler.advance();
        pipeline
            .run_tick(&scheduler.tick(), FailurePolicy::FailFast)
            .await?;
    }

    println!("----------------------------------------------");
    println!("  Series        | Records");
    println!("----------------------------------------------");

    let store = store.lock().await;
    for tier in Tier::ALL {
        println!("  {:<13} | {:>7}", tier.name(), store.len(tier.name())?);
    }
    println!("----------------------------------------------\n");

    println!("  Meter total:  {:.4} kWh", sampler.meter_total_kwh());

    for payload in store.range(Tier::Months.name(), -1, -1)? {
        let record: AggregateRecord = serde_json::from_str(&payload)?;
        println!("  Last month:   {:.4} kWh ({} pulses)", record.kwh(), record.total());
    }
    for payload in store.range(Tier::Days.name(), 0, -1)? {
        let record: AggregateRecord = serde_json::from_str(&payload)?;
        println!("  Day ending {}: {:.4} kWh", record.timestamp(), record.kwh());
    }

    println!();
    Ok(())
}

/// Hands the sampler a view of the meter whose hour the replay updates
struct SharedMeter(Arc<SyntheticMeter>);

impl PulseSource for SharedMeter {
    fn take_pulses(&self) -> Result<u32> {
        self.0.take_pulses()
    }

    fn name(&self) -> &str {
        self.0.name()
    }

    fn is_estimated(&self) -> bool {
        self.0.is_estimated()
    }
}
