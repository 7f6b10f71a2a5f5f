//! Core module - configuration, errors and record types

mod config;
mod error;
mod types;

pub use config::{Config, FailurePolicy, MeterConfig, StorageConfig, UpdaterConfig};
pub use error::{Error, Result};
pub use types::{
    iso_time, round_to, AggregateRecord, MinuteRecord, RollupRecord, Sample, PULSES_PER_KWH,
};
