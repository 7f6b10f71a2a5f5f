//! Rollup pipeline
//!
//! Each triggered tier reads the most recent window of its source tier,
//! sums it into one record, appends that record to its own series and
//! trims the series back to its retention limit. Tiers of one tick run
//! strictly in trigger order, so a coarser tier always sees the record a
//! finer tier appended for the same tick.

mod retention;
mod tier;
mod updater;

pub use retention::RetentionPolicy;
pub use tier::{Tier, Window};
pub use updater::Updater;

use crate::core::{
    iso_time, round_to, AggregateRecord, Error, FailurePolicy, MinuteRecord, Result,
    RollupRecord, Sample, PULSES_PER_KWH,
};
use crate::db::SeriesStore;
use crate::schedule::Tick;
use chrono::{DateTime, FixedOffset};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// The only field a rollup needs from its source records
#[derive(Deserialize)]
struct RecordTotal {
    total: f64,
}

/// Aggregates tiers against a shared series store
pub struct RollupPipeline<S> {
    store: Arc<Mutex<S>>,
    retention: RetentionPolicy,
}

impl<S: SeriesStore> RollupPipeline<S> {
    pub fn new(store: Arc<Mutex<S>>, retention: RetentionPolicy) -> Self {
        Self { store, retention }
    }

    pub fn store(&self) -> &Arc<Mutex<S>> {
        &self.store
    }

    pub fn retention(&self) -> &RetentionPolicy {
        &self.retention
    }

    /// Run every tier due at `tick`, finest first.
    ///
    /// With `FailurePolicy::Degrade` a failing tier is logged and skipped
    /// for this tick; with `FailurePolicy::FailFast` the first failure is
    /// returned and the remaining tiers are not run.
    pub async fn run_tick(&self, tick: &Tick, policy: FailurePolicy) -> Result<Vec<AggregateRecord>> {
        let mut written = Vec::with_capacity(tick.tiers.len());

        for &tier in &tick.tiers {
            match self.aggregate(tier, &tick.at).await {
                Ok(record) => written.push(record),
                Err(e) if policy == FailurePolicy::FailFast => return Err(e),
                Err(e) => {
                    log::error!("Abandoning {} rollup for {}: {}", tier, tick.at, e);
                }
            }
        }

        Ok(written)
    }

    /// Aggregate a single tier as of virtual time `at`
    pub async fn aggregate(&self, tier: Tier, at: &DateTime<FixedOffset>) -> Result<AggregateRecord> {
        let source = tier
            .source()
            .ok_or_else(|| Error::Config(format!("{} is not a rollup tier", tier)))?;
        let window = tier.window_len(at);
        let timestamp = at.timestamp_millis();

        let mut store = self.store.lock().await;
        let raw = store.range(source.name(), -(window as i64), -1)?;

        let record = match tier {
            Tier::Minutes => {
                let samples: Vec<Sample> = decode_window(source, &raw);
                AggregateRecord::Minute(summarize_seconds(&samples, timestamp))
            }
            _ => {
                let totals = decode_window::<RecordTotal>(source, &raw)
                    .into_iter()
                    .map(|r| r.total)
                    .collect();
                AggregateRecord::Rollup(summarize_totals(source, totals, timestamp))
            }
        };

        let payload =
            serde_json::to_string(&record).map_err(|e| Error::Serialization(e.to_string()))?;
        store.push(tier.name(), &payload)?;
        self.retention.enforce(&mut *store, tier)?;
        drop(store);

        log::info!(
            "{}: total={} kwh={:.4} from {} {} records",
            tier,
            record.total(),
            record.kwh(),
            raw.len(),
            source
        );

        Ok(record)
    }
}

/// Minute statistics over a window of per-second samples
pub fn summarize_seconds(samples: &[Sample], timestamp: i64) -> MinuteRecord {
    let count: u64 = samples.iter().map(|s| u64::from(s.pulse_count)).sum();
    let kwh: f64 = samples.iter().map(|s| s.kwh).sum();
    let max = samples.iter().map(|s| s.pulse_count).max().unwrap_or(0);
    let min = samples.iter().map(|s| s.pulse_count).min().unwrap_or(0);

    let average = if samples.is_empty() {
        0.0
    } else {
        count as f64 / samples.len() as f64
    };
    let watts = average / PULSES_PER_KWH * 3600.0 * 1000.0;

    MinuteRecord {
        timestamp,
        time: iso_time(timestamp),
        count,
        kwh: round_to(kwh, 4),
        max,
        min,
        average: round_to(average, 4),
        watts: watts.round(),
        total: count as f64,
    }
}

/// Sum of source totals, keeping the individual totals under the
/// source's breakdown name
pub fn summarize_totals(source: Tier, totals: Vec<f64>, timestamp: i64) -> RollupRecord {
    let total: f64 = totals.iter().sum();

    let mut breakdown = BTreeMap::new();
    breakdown.insert(source.breakdown_name(), totals);

    RollupRecord {
        timestamp,
        time: iso_time(timestamp),
        total,
        kwh: round_to(total / PULSES_PER_KWH, 4),
        breakdown,
    }
}

/// Parse one stored record of `series`
pub fn decode_record<T: DeserializeOwned>(series: Tier, payload: &str) -> Result<T> {
    serde_json::from_str(payload).map_err(|e| Error::MalformedRecord {
        series: series.name().to_string(),
        reason: e.to_string(),
    })
}

/// Parse a window, skipping records that do not decode
fn decode_window<T: DeserializeOwned>(series: Tier, raw: &[String]) -> Vec<T> {
    raw.iter()
        .filter_map(|payload| match decode_record(series, payload) {
            Ok(record) => Some(record),
            Err(e) => {
                log::warn!("Skipping record: {}", e);
                None
            }
        })
        .collect()
}
