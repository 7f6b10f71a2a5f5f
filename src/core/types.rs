//! Record types stored in the time-series lists

use chrono::{SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Meter constant: pulses emitted per kWh consumed
pub const PULSES_PER_KWH: f64 = 10000.0;

/// A single per-second reading pushed on the `seconds` series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    /// Unix timestamp in milliseconds
    pub timestamp: i64,
    /// ISO 8601 rendering of `timestamp`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    /// Pulses counted during this second
    pub pulse_count: u32,
    /// Energy consumed during this second
    #[serde(rename = "kWh", alias = "kWhs")]
    pub kwh: f64,
    /// Instantaneous power derived from the pulse count
    pub watt: f64,
}

impl Sample {
    /// Build a sample from a raw pulse count
    pub fn from_pulses(pulse_count: u32, timestamp: i64) -> Self {
        let kwh = pulse_count as f64 / PULSES_PER_KWH;

        Self {
            timestamp,
            time: Some(iso_time(timestamp)),
            pulse_count,
            kwh: round_to(kwh, 4),
            watt: round_to(kwh * 3600.0 * 1000.0, 4),
        }
    }
}

/// Aggregate of the last 60 samples, stored on the `minutes` series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinuteRecord {
    pub timestamp: i64,
    pub time: String,
    /// Sum of pulse counts in the window
    pub count: u64,
    pub kwh: f64,
    pub max: u32,
    pub min: u32,
    /// Mean pulses per second
    pub average: f64,
    pub watts: f64,
    pub total: f64,
}

/// Aggregate of a coarser tier, summing the totals of its source tier
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollupRecord {
    pub timestamp: i64,
    pub time: String,
    pub total: f64,
    pub kwh: f64,
    /// Per-source totals, keyed by a name such as `perMinute`
    #[serde(flatten)]
    pub breakdown: BTreeMap<String, Vec<f64>>,
}

impl RollupRecord {
    /// Per-source totals stored under `name`
    pub fn series(&self, name: &str) -> Option<&[f64]> {
        self.breakdown.get(name).map(Vec::as_slice)
    }
}

/// Any record produced by the rollup pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AggregateRecord {
    Minute(MinuteRecord),
    Rollup(RollupRecord),
}

impl AggregateRecord {
    pub fn timestamp(&self) -> i64 {
        match self {
            Self::Minute(r) => r.timestamp,
            Self::Rollup(r) => r.timestamp,
        }
    }

    pub fn total(&self) -> f64 {
        match self {
            Self::Minute(r) => r.total,
            Self::Rollup(r) => r.total,
        }
    }

    pub fn kwh(&self) -> f64 {
        match self {
            Self::Minute(r) => r.kwh,
            Self::Rollup(r) => r.kwh,
        }
    }
}

/// Round to a fixed number of decimals
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// ISO 8601 (UTC, millisecond precision) rendering of a millisecond timestamp
pub fn iso_time(timestamp_ms: i64) -> String {
    Utc.timestamp_millis_opt(timestamp_ms)
        .single()
        .map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_default()
}
