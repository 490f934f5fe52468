//! Wall clock and exchange-local (US Eastern) time.
//!
//! The scheduler never reads the system time directly; it goes through a
//! [`Clock`] so tests can pin "now" to any instant.

use chrono::{
    DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc, Weekday,
};
use std::sync::Mutex;

use screenwatch_common::DstRule;

// ============================================================================
// Clock
// ============================================================================

/// Source of the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// System wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock pinned to a settable instant.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        if let Ok(mut current) = self.now.lock() {
            *current = now;
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut current) = self.now.lock() {
            *current += by;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.lock().map(|now| *now).unwrap_or_else(|_| Utc::now())
    }
}

// ============================================================================
// Exchange Calendar
// ============================================================================

const EST_OFFSET_SECS: i32 = 5 * 3600;
const EDT_OFFSET_SECS: i32 = 4 * 3600;

/// Display format for exchange-local timestamps.
pub const ET_DATETIME_FORMAT: &str = "%Y-%m-%d %I:%M %p ET";

/// Display format for the configured trigger time.
pub const ET_TIME_FORMAT: &str = "%I:%M %p ET";

fn eastern(offset_secs: i32) -> FixedOffset {
    FixedOffset::west_opt(offset_secs).expect("US Eastern offset is within a day")
}

/// `n`-th Sunday (1-based) of a month.
fn nth_sunday(year: i32, month: u32, n: u32) -> Option<NaiveDate> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?;
    let to_sunday = (7 - first.weekday().num_days_from_sunday()) % 7;
    NaiveDate::from_ymd_opt(year, month, 1 + to_sunday + 7 * (n - 1))
}

/// Daylight time under the fixed US rule: from the second Sunday of March
/// 02:00 EST (07:00 UTC) until the first Sunday of November 02:00 EDT
/// (06:00 UTC).
pub fn is_daylight_simplified(utc: DateTime<Utc>) -> bool {
    let year = utc.year();
    let start = nth_sunday(year, 3, 2).and_then(|d| d.and_hms_opt(7, 0, 0));
    let end = nth_sunday(year, 11, 1).and_then(|d| d.and_hms_opt(6, 0, 0));

    match (start, end) {
        (Some(start), Some(end)) => {
            let t = utc.naive_utc();
            start <= t && t < end
        }
        _ => false,
    }
}

/// Monday through Friday.
pub fn is_weekday(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Converts instants to exchange-local time.
#[derive(Debug, Clone, Copy)]
pub struct ExchangeCalendar {
    rule: DstRule,
}

impl ExchangeCalendar {
    pub fn new(rule: DstRule) -> Self {
        Self { rule }
    }

    pub fn rule(&self) -> DstRule {
        self.rule
    }

    /// Exchange-local time for a UTC instant.
    pub fn to_exchange(&self, utc: DateTime<Utc>) -> DateTime<FixedOffset> {
        match self.rule {
            DstRule::TzDatabase => utc.with_timezone(&chrono_tz::America::New_York).fixed_offset(),
            DstRule::Simplified => {
                let offset = if is_daylight_simplified(utc) {
                    EDT_OFFSET_SECS
                } else {
                    EST_OFFSET_SECS
                };
                utc.with_timezone(&eastern(offset))
            }
        }
    }

    /// Next scheduled trigger in exchange-local time.
    ///
    /// Today at `at` when today is a weekday and `at` has not passed yet,
    /// otherwise the next weekday at `at`.
    pub fn next_run(&self, now: DateTime<FixedOffset>, at: NaiveTime) -> NaiveDateTime {
        let today = now.date_naive();
        if is_weekday(today) && now.time() < at {
            return today.and_time(at);
        }

        let mut day = today + Duration::days(1);
        while !is_weekday(day) {
            day += Duration::days(1);
        }
        day.and_time(at)
    }
}

impl Default for ExchangeCalendar {
    fn default() -> Self {
        Self::new(DstRule::default())
    }
}
