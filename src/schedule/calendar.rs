//! Calendar boundaries and month-length math
//!
//! Boundary predicates are pure functions of a clock's calendar
//! components. Each coarser predicate requires its finer prerequisite,
//! so `Year` implies `Month` implies `Midnight` implies `SixHours`.

use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike, Weekday};

/// A calendar boundary the virtual clock can cross
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Boundary {
    Minute,
    FiveMinutes,
    HalfHour,
    Hour,
    SixHours,
    Midnight,
    Week,
    Month,
    Year,
}

impl Boundary {
    /// All boundaries, finest first
    pub const ALL: [Boundary; 9] = [
        Boundary::Minute,
        Boundary::FiveMinutes,
        Boundary::HalfHour,
        Boundary::Hour,
        Boundary::SixHours,
        Boundary::Midnight,
        Boundary::Week,
        Boundary::Month,
        Boundary::Year,
    ];

    /// Event-style name used in logs
    pub fn name(self) -> &'static str {
        match self {
            Boundary::Minute => "every_minute",
            Boundary::FiveMinutes => "every_five_minutes",
            Boundary::HalfHour => "every_half_hour",
            Boundary::Hour => "every_hour",
            Boundary::SixHours => "every_six_hours",
            Boundary::Midnight => "every_midnight",
            Boundary::Week => "every_week",
            Boundary::Month => "every_month",
            Boundary::Year => "every_year",
        }
    }

    /// Whether a clock reading sits on this boundary
    pub fn is_crossed<T: Datelike + Timelike>(self, clock: &T) -> bool {
        match self {
            Boundary::Minute => true,
            Boundary::FiveMinutes => clock.minute() % 5 == 0,
            Boundary::HalfHour => clock.minute() % 30 == 0,
            Boundary::Hour => clock.minute() == 0,
            Boundary::SixHours => Boundary::Hour.is_crossed(clock) && clock.hour() % 6 == 0,
            Boundary::Midnight => Boundary::SixHours.is_crossed(clock) && clock.hour() == 0,
            Boundary::Week => {
                Boundary::Midnight.is_crossed(clock) && clock.weekday() == Weekday::Sun
            }
            Boundary::Month => Boundary::Midnight.is_crossed(clock) && clock.day() == 1,
            Boundary::Year => Boundary::Month.is_crossed(clock) && clock.month() == 1,
        }
    }
}

/// Gregorian leap year rule
pub fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

/// Number of days in `month` (1-12) of `year`
pub fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        _ if is_leap_year(year) => 29,
        _ => 28,
    }
}

/// Length of the month that just ended at `clock`.
///
/// The month boundary fires at midnight with the clock already inside the
/// new month, so the month is read one second earlier.
pub fn elapsed_month_days<Tz: TimeZone>(clock: &DateTime<Tz>) -> u32 {
    let previous = clock.clone() - Duration::seconds(1);
    days_in_month(previous.year(), previous.month())
}
