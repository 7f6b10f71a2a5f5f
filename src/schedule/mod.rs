//! Minute scheduler driving the rollup tiers
//!
//! The scheduler owns a virtual clock that advances in exact one-minute
//! steps. Each step is aligned to a wall-clock minute by sleeping for the
//! remaining distance, which keeps the loop from drifting the way a plain
//! interval would.

pub mod calendar;

use crate::rollup::Tier;
use calendar::Boundary;
use chrono::{DateTime, FixedOffset, Local, Offset, TimeZone, Utc};
use std::fmt::Display;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

/// Length of one scheduler step in milliseconds
pub const TICK_MILLIS: i64 = 60_000;

/// Boundaries and the tier each one triggers, in dispatch order
pub const TRIGGERS: [(Boundary, Tier); 9] = [
    (Boundary::Minute, Tier::Minutes),
    (Boundary::FiveMinutes, Tier::FiveMinutes),
    (Boundary::HalfHour, Tier::HalfHours),
    (Boundary::Hour, Tier::Hours),
    (Boundary::SixHours, Tier::SixHours),
    (Boundary::Midnight, Tier::Days),
    (Boundary::Week, Tier::Weeks),
    (Boundary::Month, Tier::Months),
    (Boundary::Year, Tier::Years),
];

/// One scheduler step: the virtual time and the tiers due at it
#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    pub at: DateTime<FixedOffset>,
    pub tiers: Vec<Tier>,
}

/// Self-correcting minute scheduler
pub struct Scheduler<Tz: TimeZone = Local> {
    clock: DateTime<Tz>,
}

impl Scheduler<Local> {
    /// Scheduler whose clock starts at the current local minute
    pub fn new() -> Self {
        Self::starting_at(Local::now())
    }
}

impl Default for Scheduler<Local> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Tz: TimeZone> Scheduler<Tz> {
    pub fn starting_at(clock: DateTime<Tz>) -> Self {
        Self {
            clock: floor_to_minute(&clock),
        }
    }

    /// Override the virtual clock, for replays and testing
    pub fn set_clock(&mut self, clock: DateTime<Tz>) {
        self.clock = floor_to_minute(&clock);
    }

    pub fn clock(&self) -> &DateTime<Tz> {
        &self.clock
    }

    /// Move the virtual clock forward by exactly one minute
    pub fn advance(&mut self) {
        self.clock = floor_to_minute(&self.clock) + chrono::Duration::milliseconds(TICK_MILLIS);
    }

    /// Advance the clock and return how long to sleep until it is reached
    pub fn timeout_length(&mut self) -> Duration {
        self.timeout_length_at(Utc::now().timestamp_millis())
    }

    /// `timeout_length` against an explicit wall-clock reading in milliseconds
    pub fn timeout_length_at(&mut self, now_ms: i64) -> Duration {
        self.advance();

        let mut timeout = self.clock.timestamp_millis() - now_ms;
        if timeout < 0 {
            // Woke up late: fire at the following wall-clock minute instead
            timeout += TICK_MILLIS;
        }

        // Beyond a full minute late the tick is lost
        Duration::from_millis(timeout.max(0) as u64)
    }

    /// Names of the boundaries the current clock sits on
    pub fn crossed(&self) -> Vec<&'static str> {
        TRIGGERS
            .iter()
            .filter(|(boundary, _)| boundary.is_crossed(&self.clock))
            .map(|(boundary, _)| boundary.name())
            .collect()
    }

    /// Tiers due at the current clock, finest first
    pub fn triggered(&self) -> Vec<Tier> {
        TRIGGERS
            .iter()
            .filter(|(boundary, _)| boundary.is_crossed(&self.clock))
            .map(|&(_, tier)| tier)
            .collect()
    }

    pub fn tick(&self) -> Tick {
        Tick {
            at: self.clock.with_timezone(&self.clock.offset().fix()),
            tiers: self.triggered(),
        }
    }
}

impl<Tz> Scheduler<Tz>
where
    Tz: TimeZone + Send + 'static,
    Tz::Offset: Display + Send + 'static,
{
    /// Run forever, sending one `Tick` per minute.
    ///
    /// Returns only when the receiving side is dropped. The timer is
    /// re-armed right after each send and never waits on rollup work.
    pub async fn run(mut self, ticks: UnboundedSender<Tick>) {
        let mut wait = self.timeout_length();
        log::info!("Scheduler started, first tick at {} in {:?}", self.clock, wait);

        loop {
            tokio::time::sleep(wait).await;

            let tick = self.tick();
            log::debug!("Tick at {}: {}", tick.at, self.crossed().join(", "));

            if ticks.send(tick).is_err() {
                log::info!("Rollup worker has stopped, ending scheduler");
                return;
            }

            wait = self.timeout_length();
        }
    }
}

/// Drop seconds and sub-second precision
fn floor_to_minute<Tz: TimeZone>(clock: &DateTime<Tz>) -> DateTime<Tz> {
    let millis = clock.timestamp_millis();
    let floored = millis - millis.rem_euclid(TICK_MILLIS);

    clock
        .timezone()
        .timestamp_millis_opt(floored)
        .single()
        .unwrap_or_else(|| clock.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    fn utc(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_clock_is_normalized() {
        let start = utc(2016, 3, 9, 13, 7, 42) + chrono::Duration::milliseconds(123);
        let scheduler = Scheduler::starting_at(start);

        assert_eq!(*scheduler.clock(), utc(2016, 3, 9, 13, 7, 0));
        assert_eq!(scheduler.clock().nanosecond(), 0);
    }

    #[test]
    fn test_advance_adds_one_minute() {
        let mut scheduler = Scheduler::starting_at(utc(2016, 2, 29, 23, 59, 0));
        scheduler.advance();
        assert_eq!(*scheduler.clock(), utc(2016, 3, 1, 0, 0, 0));
    }

    #[test]
    fn test_timeout_on_time() {
        let mut scheduler = Scheduler::starting_at(utc(2016, 3, 9, 13, 7, 0));
        let now = utc(2016, 3, 9, 13, 7, 20).timestamp_millis();

        assert_eq!(scheduler.timeout_length_at(now), Duration::from_millis(40_000));
        assert_eq!(*scheduler.clock(), utc(2016, 3, 9, 13, 8, 0));
    }

    #[test]
    fn test_timeout_never_negative() {
        let mut scheduler = Scheduler::starting_at(utc(2016, 3, 9, 13, 7, 0));
        let now = utc(2016, 3, 9, 13, 30, 0).timestamp_millis();

        assert_eq!(scheduler.timeout_length_at(now), Duration::ZERO);
    }

    #[test]
    fn test_timeout_when_woken_late() {
        let mut scheduler = Scheduler::starting_at(utc(2016, 3, 9, 13, 7, 0));
        // Target after advancing is 13:08:00, wall clock is 13:08:00.500
        let now = utc(2016, 3, 9, 13, 8, 0).timestamp_millis() + 500;

        assert_eq!(scheduler.timeout_length_at(now), Duration::from_millis(59_500));
    }

    #[test]
    fn test_set_clock_floors_and_resumes() {
        let mut scheduler = Scheduler::starting_at(utc(2016, 3, 9, 13, 7, 0));
        scheduler.set_clock(utc(2016, 2, 1, 0, 0, 37) + chrono::Duration::milliseconds(250));
        assert_eq!(*scheduler.clock(), utc(2016, 2, 1, 0, 0, 0));

        let now = utc(2016, 2, 1, 0, 0, 45).timestamp_millis();
        assert_eq!(scheduler.timeout_length_at(now), Duration::from_millis(15_000));
        assert_eq!(*scheduler.clock(), utc(2016, 2, 1, 0, 1, 0));
    }

    #[test]
    fn test_crossed_boundary_names() {
        let scheduler = Scheduler::starting_at(utc(2017, 1, 3, 6, 0, 0));
        assert_eq!(
            scheduler.crossed(),
            vec![
                "every_minute",
                "every_five_minutes",
                "every_half_hour",
                "every_hour",
                "every_six_hours",
            ]
        );

        let scheduler = Scheduler::starting_at(utc(2017, 1, 3, 6, 7, 0));
        assert_eq!(scheduler.crossed(), vec!["every_minute"]);
    }

    #[test]
    fn test_triggered_tiers_in_order() {
        let scheduler = Scheduler::starting_at(utc(2017, 1, 1, 0, 0, 0));
        assert_eq!(
            scheduler.triggered(),
            vec![
                Tier::Minutes,
                Tier::FiveMinutes,
                Tier::HalfHours,
                Tier::Hours,
                Tier::SixHours,
                Tier::Days,
                Tier::Weeks,
                Tier::Months,
                Tier::Years,
            ]
        );

        let scheduler = Scheduler::starting_at(utc(2017, 1, 3, 6, 0, 0));
        assert_eq!(
            scheduler.triggered(),
            vec![
                Tier::Minutes,
                Tier::FiveMinutes,
                Tier::HalfHours,
                Tier::Hours,
                Tier::SixHours,
            ]
        );
    }

    #[test]
    fn test_tick_keeps_local_components() {
        let offset = FixedOffset::east_opt(2 * 3600).unwrap();
        let start = offset.with_ymd_and_hms(2016, 2, 1, 0, 0, 0).unwrap();
        let tick = Scheduler::starting_at(start).tick();

        assert_eq!(tick.at, start);
        assert!(tick.tiers.contains(&Tier::Months));
    }

    #[tokio::test]
    async fn test_run_stops_when_receiver_dropped() {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        drop(rx);

        // Clock far in the past: first sleep is zero, send fails, run returns
        let scheduler = Scheduler::starting_at(utc(2000, 1, 1, 0, 0, 0));
        scheduler.run(tx).await;
    }
}
