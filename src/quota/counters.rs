//! Persisted usage counters and their calendar rollover rules.

use std::time::Duration;

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::MINUTE_WINDOW;

/// Calls counted in the current rolling minute window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MinuteWindow {
    pub count: u32,
    /// Window start, epoch milliseconds.
    pub start_time: i64,
}

/// Calls counted on the current UTC calendar day.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DailyWindow {
    pub count: u32,
    /// `YYYY-MM-DD`
    pub date: String,
}

/// Calls counted in the current UTC calendar month.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonthlyWindow {
    pub count: u32,
    /// `YYYY-MM`
    pub month: String,
}

/// Usage counters for one metered API.
///
/// Serialized as `{minute:{count,startTime}, daily:{count,date},
/// monthly:{count,month}, lastRequestTime, lastUpdated, revision}`.
///
/// `revision` grows by one on every conditional write; documents written
/// before it existed read as revision 0.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageCounters {
    #[serde(default)]
    pub minute: MinuteWindow,
    #[serde(default)]
    pub daily: DailyWindow,
    #[serde(default)]
    pub monthly: MonthlyWindow,
    /// Start of the most recently reserved call slot, epoch milliseconds.
    #[serde(default)]
    pub last_request_time: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    pub revision: u64,
}

/// Which calendar boundary was crossed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rollover {
    Day,
    Month,
}

pub(crate) fn day_key(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d").to_string()
}

pub(crate) fn month_key(now: DateTime<Utc>) -> String {
    now.format("%Y-%m").to_string()
}

/// Time left until the next UTC midnight.
pub(crate) fn until_next_day(now: DateTime<Utc>) -> Duration {
    let next = now
        .date_naive()
        .succ_opt()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| Utc.from_utc_datetime(&dt));
    remaining(now, next)
}

/// Time left until the first instant of next UTC month.
pub(crate) fn until_next_month(now: DateTime<Utc>) -> Duration {
    let (year, month) = if now.month() == 12 {
        (now.year() + 1, 1)
    } else {
        (now.year(), now.month() + 1)
    };
    let next = NaiveDate::from_ymd_opt(year, month, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| Utc.from_utc_datetime(&dt));
    remaining(now, next)
}

fn remaining(now: DateTime<Utc>, until: Option<DateTime<Utc>>) -> Duration {
    until
        .and_then(|t| (t - now).to_std().ok())
        .unwrap_or(Duration::ZERO)
}

impl UsageCounters {
    /// Apply day/month rollover for `now`.
    ///
    /// A new month zeroes month, day and minute counts. A new day zeroes day
    /// and minute counts. Returns which boundary was crossed, if any.
    pub fn roll_calendar(&mut self, now: DateTime<Utc>) -> Option<Rollover> {
        let month = month_key(now);
        let day = day_key(now);
        if self.monthly.month != month {
            self.monthly = MonthlyWindow { count: 0, month };
            self.daily = DailyWindow { count: 0, date: day };
            self.minute.count = 0;
            Some(Rollover::Month)
        } else if self.daily.date != day {
            self.daily = DailyWindow { count: 0, date: day };
            self.minute.count = 0;
            Some(Rollover::Day)
        } else {
            None
        }
    }

    /// Restart the minute window if more than a minute has passed since it
    /// opened. Returns whether it was restarted.
    pub fn roll_minute(&mut self, now: DateTime<Utc>) -> bool {
        let elapsed = now.timestamp_millis() - self.minute.start_time;
        if elapsed > MINUTE_WINDOW.as_millis() as i64 {
            self.minute = MinuteWindow {
                count: 0,
                start_time: now.timestamp_millis(),
            };
            true
        } else {
            false
        }
    }

    /// Time left in the current minute window.
    pub(crate) fn minute_remaining(&self, now: DateTime<Utc>) -> Duration {
        let end = self.minute.start_time + MINUTE_WINDOW.as_millis() as i64;
        Duration::from_millis(end.saturating_sub(now.timestamp_millis()).max(0) as u64)
    }

    /// Count one call whose slot starts at `slot_ms`.
    pub(crate) fn record(&mut self, slot_ms: i64) {
        self.last_request_time = slot_ms;
        self.minute.count = self.minute.count.saturating_add(1);
        self.daily.count = self.daily.count.saturating_add(1);
        self.monthly.count = self.monthly.count.saturating_add(1);
    }
}
