//! Budget enforcement for metered upstream APIs.
//!
//! Each metered API gets one [`QuotaTracker`] holding [`UsageCounters`] for
//! three nested scopes (minute, day, month) plus a minimum spacing between
//! requests. Checks run month → day → minute → interval, so when several
//! budgets are exhausted at once the caller sees the longest wait.
//!
//! Counters are loaded lazily from a [`CounterStore`](crate::store::CounterStore)
//! on first use and written back after every permitted call with a
//! revision check, so trackers in several processes sharing one store
//! draw from a single budget.

mod counters;
mod tracker;

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use counters::{DailyWindow, MinuteWindow, MonthlyWindow, Rollover, UsageCounters};
pub use tracker::QuotaTracker;

/// Length of the rolling minute window.
pub const MINUTE_WINDOW: Duration = Duration::from_secs(60);

/// Time-window tier at which a usage ceiling is enforced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuotaScope {
    Minute,
    Day,
    Month,
}

impl QuotaScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuotaScope::Minute => "minute",
            QuotaScope::Day => "day",
            QuotaScope::Month => "month",
        }
    }
}

impl fmt::Display for QuotaScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Static budget for one metered API.
///
/// ```rust
/// # use itinera::QuotaPolicy;
/// # use std::time::Duration;
/// let policy = QuotaPolicy::new()
///     .max_per_minute(10)
///     .max_per_day(100)
///     .max_per_month(2_500)
///     .min_interval(Duration::from_secs(1));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct QuotaPolicy {
    /// Calls allowed per rolling minute window. Default: 60.
    pub max_per_minute: u32,
    /// Calls allowed per UTC calendar day. Default: 1,000.
    pub max_per_day: u32,
    /// Calls allowed per UTC calendar month. Default: 10,000.
    pub max_per_month: u32,
    /// Minimum spacing between consecutive calls. Default: none.
    pub min_interval: Duration,
    /// Estimated cost of a single call, for budget reports. Default: 0.
    pub cost_per_call: f64,
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        Self {
            max_per_minute: 60,
            max_per_day: 1_000,
            max_per_month: 10_000,
            min_interval: Duration::ZERO,
            cost_per_call: 0.0,
        }
    }
}

impl QuotaPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_per_minute(mut self, n: u32) -> Self {
        self.max_per_minute = n;
        self
    }

    pub fn max_per_day(mut self, n: u32) -> Self {
        self.max_per_day = n;
        self
    }

    pub fn max_per_month(mut self, n: u32) -> Self {
        self.max_per_month = n;
        self
    }

    pub fn min_interval(mut self, interval: Duration) -> Self {
        self.min_interval = interval;
        self
    }

    pub fn cost_per_call(mut self, cost: f64) -> Self {
        self.cost_per_call = cost;
        self
    }

    /// Limit for a given scope.
    pub fn limit(&self, scope: QuotaScope) -> u32 {
        match scope {
            QuotaScope::Minute => self.max_per_minute,
            QuotaScope::Day => self.max_per_day,
            QuotaScope::Month => self.max_per_month,
        }
    }
}

/// A granted call slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    /// How long the caller must wait before issuing the upstream call.
    pub wait: Duration,
    /// Minute count after this reservation.
    pub minute_count: u32,
    /// Day count after this reservation.
    pub day_count: u32,
    /// Month count after this reservation.
    pub month_count: u32,
}

/// Point-in-time view of a tracker's usage, used for budget reports.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageSnapshot {
    pub api: String,
    pub minute_used: u32,
    pub minute_limit: u32,
    pub daily_used: u32,
    pub daily_limit: u32,
    pub monthly_used: u32,
    pub monthly_limit: u32,
    /// `monthly_used * cost_per_call`.
    pub estimated_cost: f64,
    /// Share of the monthly budget consumed, 0–100.
    pub percentage_used: f64,
}
