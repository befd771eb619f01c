//! Time sources and rotation-interval truncation.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Datelike, FixedOffset, Local, NaiveDateTime, TimeDelta, Timelike, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

const NANOS_PER_SEC: i128 = 1_000_000_000;
const SECS_PER_DAY: i128 = 86_400;

/// Source of the current instant for a writer.
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current instant, carrying the offset the writer should name files in.
    fn now(&self) -> DateTime<FixedOffset>;
}

/// Current time in UTC.
#[derive(Debug, Clone, Copy, Default)]
pub struct UtcClock;

impl Clock for UtcClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().fixed_offset()
    }
}

/// Current time in the process-local timezone.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalClock;

impl Clock for LocalClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Local::now().fixed_offset()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<FixedOffset>>,
}

impl ManualClock {
    pub fn new(start: DateTime<FixedOffset>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn set(&self, now: DateTime<FixedOffset>) {
        *self.now.lock() = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        if let Ok(delta) = TimeDelta::from_std(by) {
            *now += delta;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<FixedOffset> {
        *self.now.lock()
    }
}

/// Clock selection for configuration files.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClockKind {
    /// Coordinated universal time.
    Utc,
    /// Process-local timezone.
    #[default]
    Local,
}

impl ClockKind {
    pub fn clock(self) -> Arc<dyn Clock> {
        match self {
            Self::Utc => Arc::new(UtcClock),
            Self::Local => Arc::new(LocalClock),
        }
    }
}

impl std::str::FromStr for ClockKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "utc" => Ok(Self::Utc),
            "local" => Ok(Self::Local),
            _ => Err(format!("Unknown clock: {s}")),
        }
    }
}

/// Truncate `now` down to the start of its rotation bucket.
///
/// A zero interval disables truncation. Instants in a non-UTC offset are
/// truncated on their wall-clock fields: the local fields are read as if they
/// were UTC, truncated, and the result is given back the original offset, so
/// daily buckets start at local midnight rather than at UTC midnight.
pub fn truncate(now: DateTime<FixedOffset>, interval: Duration) -> DateTime<FixedOffset> {
    if interval.is_zero() {
        return now;
    }

    let offset = *now.offset();
    if offset.local_minus_utc() == 0 {
        return truncate_naive(now.naive_utc(), interval)
            .and_utc()
            .fixed_offset();
    }

    let pseudo_utc = now.naive_local();
    let truncated = truncate_naive(pseudo_utc, interval);
    truncated.and_local_timezone(offset).single().unwrap_or(now)
}

/// Floor `at` to a multiple of `interval` counted from 0001-01-01T00:00:00.
fn truncate_naive(at: NaiveDateTime, interval: Duration) -> NaiveDateTime {
    let step = i128::try_from(interval.as_nanos()).unwrap_or(i128::MAX);
    let days = i128::from(at.num_days_from_ce()) - 1;
    let secs = days * SECS_PER_DAY + i128::from(at.num_seconds_from_midnight());
    let nanos = secs * NANOS_PER_SEC + i128::from(at.nanosecond());

    let rem = nanos.rem_euclid(step);
    let back = TimeDelta::try_seconds((rem / NANOS_PER_SEC) as i64)
        .map(|d| d + TimeDelta::nanoseconds((rem % NANOS_PER_SEC) as i64));
    back.and_then(|d| at.checked_sub_signed(d)).unwrap_or(at)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const HOUR: Duration = Duration::from_secs(3600);
    const DAY: Duration = Duration::from_secs(86_400);

    fn parse(s: &str) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(s).unwrap()
    }

    #[test]
    fn test_truncate_utc_daily() {
        assert_eq!(
            truncate(parse("2023-01-01T13:45:12.5Z"), DAY),
            parse("2023-01-01T00:00:00Z")
        );
    }

    #[test]
    fn test_truncate_local_keeps_local_midnight() {
        // Truncating the absolute instant would land on 2018-05-31T09:00+09:00.
        let truncated = truncate(parse("2018-06-01T03:18:00+09:00"), DAY);
        assert_eq!(truncated, parse("2018-06-01T00:00:00+09:00"));
        assert_eq!(truncated.offset().local_minus_utc(), 9 * 3600);
    }

    #[test]
    fn test_truncate_local_negative_offset() {
        assert_eq!(
            truncate(parse("2023-03-10T23:59:59-05:00"), DAY),
            parse("2023-03-10T00:00:00-05:00")
        );
    }

    #[test]
    fn test_truncate_hourly_and_zero() {
        let now = parse("2023-07-04T10:59:59+02:00");
        assert_eq!(truncate(now, HOUR), parse("2023-07-04T10:00:00+02:00"));
        assert_eq!(truncate(now, Duration::ZERO), now);
    }

    #[test]
    fn test_truncate_weekly_starts_on_monday() {
        // 0001-01-01 is a Monday, so weekly buckets begin on Mondays.
        assert_eq!(
            truncate(parse("2023-01-05T08:00:00Z"), 7 * DAY),
            parse("2023-01-02T00:00:00Z")
        );
    }

    #[test]
    fn test_manual_clock_advance() {
        let clock = ManualClock::new(parse("2023-01-01T00:00:00Z"));
        clock.advance(DAY + Duration::from_secs(1));
        assert_eq!(clock.now(), parse("2023-01-02T00:00:01Z"));
        clock.set(parse("2023-01-10T00:00:01Z"));
        assert_eq!(clock.now(), parse("2023-01-10T00:00:01Z"));
    }

    #[test]
    fn test_clock_kind_from_str() {
        assert_eq!("UTC".parse::<ClockKind>().unwrap(), ClockKind::Utc);
        assert_eq!("local".parse::<ClockKind>().unwrap(), ClockKind::Local);
        assert!("mars".parse::<ClockKind>().is_err());
    }
}
