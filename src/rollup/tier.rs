//! Tier table: series names, sources, windows and retention limits

use crate::core::Error;
use crate::schedule::calendar;
use chrono::{DateTime, TimeZone};
use std::fmt;
use std::str::FromStr;

/// One rollup granularity, each stored in its own series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Tier {
    Seconds,
    Minutes,
    FiveMinutes,
    HalfHours,
    Hours,
    SixHours,
    Days,
    Weeks,
    Months,
    Years,
}

/// How many source records a tier consumes per rollup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Window {
    Fixed(usize),
    /// Days in the month that just elapsed
    CalendarMonth,
}

impl Tier {
    /// All tiers in dependency order
    pub const ALL: [Tier; 10] = [
        Tier::Seconds,
        Tier::Minutes,
        Tier::FiveMinutes,
        Tier::HalfHours,
        Tier::Hours,
        Tier::SixHours,
        Tier::Days,
        Tier::Weeks,
        Tier::Months,
        Tier::Years,
    ];

    /// Series name in the store
    pub fn name(self) -> &'static str {
        match self {
            Tier::Seconds => "seconds",
            Tier::Minutes => "minutes",
            Tier::FiveMinutes => "fiveMinutes",
            Tier::HalfHours => "halfHours",
            Tier::Hours => "hours",
            Tier::SixHours => "sixHours",
            Tier::Days => "days",
            Tier::Weeks => "weeks",
            Tier::Months => "months",
            Tier::Years => "years",
        }
    }

    /// Tier this one is aggregated from; `None` for raw samples
    pub fn source(self) -> Option<Tier> {
        match self {
            Tier::Seconds => None,
            Tier::Minutes => Some(Tier::Seconds),
            Tier::FiveMinutes | Tier::HalfHours | Tier::Hours => Some(Tier::Minutes),
            Tier::SixHours | Tier::Days => Some(Tier::Hours),
            Tier::Weeks | Tier::Months => Some(Tier::Days),
            Tier::Years => Some(Tier::Months),
        }
    }

    pub fn window(self) -> Option<Window> {
        let window = match self {
            Tier::Seconds => return None,
            Tier::Minutes => Window::Fixed(60),
            Tier::FiveMinutes => Window::Fixed(5),
            Tier::HalfHours => Window::Fixed(30),
            Tier::Hours => Window::Fixed(60),
            Tier::SixHours => Window::Fixed(6),
            Tier::Days => Window::Fixed(24),
            Tier::Weeks => Window::Fixed(7),
            Tier::Months => Window::CalendarMonth,
            Tier::Years => Window::Fixed(12),
        };
        Some(window)
    }

    /// Number of source records consumed by a rollup fired at `at`
    pub fn window_len<Tz: TimeZone>(self, at: &DateTime<Tz>) -> usize {
        match self.window() {
            Some(Window::Fixed(n)) => n,
            Some(Window::CalendarMonth) => calendar::elapsed_month_days(at) as usize,
            None => 0,
        }
    }

    /// Default maximum series length.
    ///
    /// Each tier keeps a little more than one full cycle of its consumer
    /// so a late rollup still finds its whole window.
    pub fn default_retention(self) -> usize {
        match self {
            Tier::Seconds => 90_000,   // 25 hours
            Tier::Minutes => 1_560,    // 26 hours
            Tier::FiveMinutes => 2_304, // 8 days
            Tier::HalfHours => 1_536,  // 32 days
            Tier::Hours => 768,        // 32 days
            Tier::SixHours => 2_200,   // 550 days
            Tier::Days => 800,
            Tier::Weeks => 530,
            Tier::Months => 240,
            Tier::Years => 100,
        }
    }

    /// Field name for the per-record totals this tier contributes to a
    /// coarser record, e.g. `minutes` -> `perMinute`
    pub fn breakdown_name(self) -> String {
        let name = self.name();
        let singular = name.strip_suffix('s').unwrap_or(name);
        let mut chars = singular.chars();

        match chars.next() {
            Some(first) => format!("per{}{}", first.to_ascii_uppercase(), chars.as_str()),
            None => "per".to_string(),
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Tier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Tier::ALL
            .iter()
            .copied()
            .find(|tier| tier.name() == s)
            .ok_or_else(|| Error::UnknownTier(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_sources_follow_dependency_order() {
        for tier in Tier::ALL {
            if let Some(source) = tier.source() {
                assert!(source < tier, "{} must come after {}", tier, source);
            }
        }
        assert_eq!(Tier::Seconds.source(), None);
        assert_eq!(Tier::Years.source(), Some(Tier::Months));
    }

    #[test]
    fn test_breakdown_names() {
        assert_eq!(Tier::Minutes.breakdown_name(), "perMinute");
        assert_eq!(Tier::FiveMinutes.breakdown_name(), "perFiveMinute");
        assert_eq!(Tier::Hours.breakdown_name(), "perHour");
        assert_eq!(Tier::Days.breakdown_name(), "perDay");
        assert_eq!(Tier::Months.breakdown_name(), "perMonth");
    }

    #[test]
    fn test_month_window_follows_calendar() {
        let feb = Utc.with_ymd_and_hms(2016, 2, 1, 0, 0, 0).unwrap();
        let mar = Utc.with_ymd_and_hms(2016, 3, 1, 0, 0, 0).unwrap();
        assert_eq!(Tier::Months.window_len(&feb), 31);
        assert_eq!(Tier::Months.window_len(&mar), 29);
        assert_eq!(Tier::Weeks.window_len(&mar), 7);
    }

    #[test]
    fn test_parse_names() {
        for tier in Tier::ALL {
            assert_eq!(tier.name().parse::<Tier>().unwrap(), tier);
        }
        assert!(matches!(
            "fortnights".parse::<Tier>(),
            Err(Error::UnknownTier(name)) if name == "fortnights"
        ));
    }

    #[test]
    fn test_retention_covers_consumer_windows() {
        let longest_month = 31;
        for tier in Tier::ALL {
            if let Some(source) = tier.source() {
                let window = match tier.window() {
                    Some(Window::Fixed(n)) => n,
                    _ => longest_month,
                };
                assert!(source.default_retention() > window);
            }
        }
    }
}
