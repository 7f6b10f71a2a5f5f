//! Background worker that applies scheduler ticks to the store

use super::RollupPipeline;
use crate::core::{FailurePolicy, Result};
use crate::db::SeriesStore;
use crate::schedule::{Scheduler, Tick};
use chrono::TimeZone;
use std::fmt::Display;
use tokio::sync::mpsc::{self, UnboundedReceiver};

/// Consumes ticks one at a time and runs their rollups
pub struct Updater<S> {
    pipeline: RollupPipeline<S>,
    policy: FailurePolicy,
}

impl<S: SeriesStore> Updater<S> {
    pub fn new(pipeline: RollupPipeline<S>, policy: FailurePolicy) -> Self {
        Self { pipeline, policy }
    }

    pub fn pipeline(&self) -> &RollupPipeline<S> {
        &self.pipeline
    }

    /// Process ticks until the sender side closes.
    ///
    /// Only returns an error under `FailurePolicy::FailFast`.
    pub async fn consume(&self, mut ticks: UnboundedReceiver<Tick>) -> Result<()> {
        while let Some(tick) = ticks.recv().await {
            let written = self.pipeline.run_tick(&tick, self.policy).await?;
            log::debug!(
                "Tick {} wrote {} of {} tiers",
                tick.at,
                written.len(),
                tick.tiers.len()
            );
        }

        Ok(())
    }

    /// Drive the pipeline from `scheduler` until a fail-fast error.
    ///
    /// The scheduler runs as its own task so a slow store never delays
    /// the next tick; ticks queue up and are processed in order.
    pub async fn run<Tz>(self, scheduler: Scheduler<Tz>) -> Result<()>
    where
        Tz: TimeZone + Send + 'static,
        Tz::Offset: Display + Send + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let timer = tokio::spawn(scheduler.run(tx));

        log::info!("Rollup updater started ({:?} on failure)", self.policy);
        let result = self.consume(rx).await;

        timer.abort();
        result
    }
}
