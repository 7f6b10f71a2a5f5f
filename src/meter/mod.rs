//! Per-second meter sampling
//!
//! A `PulseSource` reports how many meter pulses were counted since the
//! previous read. The `SecondSampler` turns each read into a `Sample` on
//! the `seconds` series, which the minute rollup consumes.

mod estimator;

pub use estimator::{pulses_for, EstimationSource};

use crate::core::{round_to, Error, Result, Sample};
use crate::db::SeriesStore;
use crate::rollup::{RetentionPolicy, Tier};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::time::{Duration, MissedTickBehavior};

/// Single-element series holding the running meter reading in kWh
pub const METER_TOTAL_SERIES: &str = "meterTotal";

/// Trait for pulse counting sources
pub trait PulseSource {
    /// Pulses counted since the previous call
    fn take_pulses(&self) -> Result<u32>;

    /// Name of this source
    fn name(&self) -> &str;

    /// Whether pulses are derived from an estimate rather than a meter
    fn is_estimated(&self) -> bool;
}

/// Writes one sample per second to the `seconds` series
pub struct SecondSampler<S> {
    source: Box<dyn PulseSource + Send + Sync>,
    store: Arc<Mutex<S>>,
    retention: RetentionPolicy,
    /// Loaded from the store on the first sample
    meter_total_kwh: Option<f64>,
}

impl<S: SeriesStore> SecondSampler<S> {
    pub fn new(
        source: Box<dyn PulseSource + Send + Sync>,
        store: Arc<Mutex<S>>,
        retention: RetentionPolicy,
    ) -> Self {
        Self {
            source,
            store,
            retention,
            meter_total_kwh: None,
        }
    }

    /// Meter reading as of the last sample, carried across restarts
    pub fn meter_total_kwh(&self) -> f64 {
        self.meter_total_kwh.unwrap_or(0.0)
    }

    /// Read the source once and append the resulting sample
    pub async fn sample_once(&mut self, timestamp_ms: i64) -> Result<Sample> {
        let pulses = self.source.take_pulses()?;
        let sample = Sample::from_pulses(pulses, timestamp_ms);
        let payload =
            serde_json::to_string(&sample).map_err(|e| Error::Serialization(e.to_string()))?;

        let mut store = self.store.lock().await;
        store.push(Tier::Seconds.name(), &payload)?;
        self.retention.enforce(&mut *store, Tier::Seconds)?;

        let previous = match self.meter_total_kwh {
            Some(total) => total,
            None => stored_meter_total(&*store)?,
        };
        let total = round_to(previous + sample.kwh, 4);
        store.push(METER_TOTAL_SERIES, &total.to_string())?;
        store.trim(METER_TOTAL_SERIES, -1, -1)?;
        drop(store);

        self.meter_total_kwh = Some(total);
        Ok(sample)
    }

    /// Sample every second until the task is dropped
    pub async fn run(mut self) {
        log::info!(
            "Sampling {} ({})",
            self.source.name(),
            if self.source.is_estimated() { "estimated" } else { "metered" }
        );

        let mut interval = tokio::time::interval(Duration::from_secs(1));
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;

            let now = chrono::Utc::now().timestamp_millis();
            match self.sample_once(now).await {
                Ok(sample) => log::trace!(
                    "{} pulses, {} W, meter total {} kWh",
                    sample.pulse_count,
                    sample.watt,
                    self.meter_total_kwh()
                ),
                Err(e) => log::warn!("Failed to record sample: {}", e),
            }
        }
    }
}

/// Last persisted meter reading, zero for a fresh store
fn stored_meter_total<S: SeriesStore + ?Sized>(store: &S) -> Result<f64> {
    let Some(raw) = store.range(METER_TOTAL_SERIES, -1, -1)?.pop() else {
        return Ok(0.0);
    };

    match raw.trim().parse::<f64>() {
        Ok(total) if total.is_finite() => {
            log::info!("Resuming meter total at {} kWh", total);
            Ok(total)
        }
        _ => {
            log::warn!("Ignoring unreadable meter total {:?}, starting from zero", raw);
            Ok(0.0)
        }
    }
}
