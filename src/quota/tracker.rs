//! Quota tracker: check-and-reserve over persisted usage counters.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use super::counters::{until_next_day, until_next_month};
use super::{QuotaPolicy, QuotaScope, Reservation, UsageCounters, UsageSnapshot};
use crate::clock::{Clock, SystemClock};
use crate::store::CounterStore;
use crate::telemetry;
use crate::{ItineraError, Result};

struct TrackerState {
    counters: UsageCounters,
    loaded: bool,
}

/// Conditional writes attempted before a contended reservation gives up.
const MAX_WRITE_ATTEMPTS: u32 = 8;

enum Verdict {
    Grant(Reservation),
    Reject(QuotaScope, Duration),
}

/// Enforces a [`QuotaPolicy`] for one metered API.
///
/// Check and increment happen under a single lock with no suspension point
/// in between, so concurrent callers in this process can never both pass
/// the same check. Every change is written back with
/// [`CounterStore::save_if`]; when another tracker sharing the store wrote
/// first, the counters are reloaded and the decision is made again, so
/// trackers in different processes draw from one budget.
///
/// The minimum-interval wait is *reserved* rather than slept under the
/// lock: each caller is handed the next free slot and sleeps on its own.
pub struct QuotaTracker {
    api: String,
    policy: QuotaPolicy,
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
    state: Mutex<TrackerState>,
}

impl QuotaTracker {
    pub fn new(api: impl Into<String>, policy: QuotaPolicy, store: Arc<dyn CounterStore>) -> Self {
        Self {
            api: api.into(),
            policy,
            store,
            clock: Arc::new(SystemClock),
            state: Mutex::new(TrackerState {
                counters: UsageCounters::default(),
                loaded: false,
            }),
        }
    }

    /// Use a custom clock (tests use [`ManualClock`](crate::clock::ManualClock)).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn api(&self) -> &str {
        &self.api
    }

    pub fn policy(&self) -> &QuotaPolicy {
        &self.policy
    }

    pub(crate) fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Check every budget and, if all pass, count one call.
    ///
    /// Returns how long the caller must wait before issuing the call to
    /// honour the minimum interval. Fails with
    /// [`ItineraError::QuotaExceeded`] without counting anything when a
    /// budget is exhausted, or with [`ItineraError::CounterConflict`] when
    /// the shared store stayed contended for every write attempt.
    #[instrument(skip(self), fields(api = %self.api))]
    pub async fn check_and_reserve(&self) -> Result<Reservation> {
        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state).await;

        for attempt in 1..=MAX_WRITE_ATTEMPTS {
            let now = self.clock.now();
            let mut next = state.counters.clone();
            let rollover = next.roll_calendar(now);
            let verdict = self.evaluate(&mut next, now);

            if next == state.counters {
                return self.finish(verdict);
            }

            let expected = state.counters.revision;
            next.revision = expected + 1;
            match self.store.save_if(&self.api, expected, &next).await {
                Ok(()) => {}
                Err(ItineraError::CounterConflict { .. }) => {
                    if self.reload(&mut state).await {
                        debug!(api = %self.api, attempt, "counters changed elsewhere, deciding again");
                        continue;
                    }
                }
                Err(e) => {
                    self.record_persistence_error();
                    warn!(api = %self.api, store = self.store.name(), error = %e, "failed to persist counters");
                }
            }

            if let Some(rollover) = rollover {
                info!(api = %self.api, ?rollover, "quota period rolled over");
            }
            state.counters = next;
            return self.finish(verdict);
        }

        warn!(api = %self.api, attempts = MAX_WRITE_ATTEMPTS, "counter store stayed contended");
        Err(ItineraError::CounterConflict {
            api: self.api.clone(),
            expected: state.counters.revision,
        })
    }

    /// [`check_and_reserve`](Self::check_and_reserve), then sleep out the
    /// minimum-interval wait.
    pub async fn acquire(&self) -> Result<Reservation> {
        let reservation = self.check_and_reserve().await?;
        if !reservation.wait.is_zero() {
            debug!(api = %self.api, wait_ms = reservation.wait.as_millis() as u64, "spacing request");
            tokio::time::sleep(reservation.wait).await;
        }
        Ok(reservation)
    }

    /// Current usage without consuming quota.
    ///
    /// Reads the store first so the report includes calls counted by other
    /// trackers. Pending rollovers are applied to the reported view only.
    pub async fn usage(&self) -> UsageSnapshot {
        let mut state = self.state.lock().await;
        match self.store.load(&self.api).await {
            Ok(Some(stored)) if stored.revision >= state.counters.revision => {
                state.counters = stored;
                state.loaded = true;
            }
            Ok(_) => state.loaded = true,
            Err(e) => {
                self.record_persistence_error();
                debug!(api = %self.api, error = %e, "reporting cached counters");
            }
        }

        let now = self.clock.now();
        let mut view = state.counters.clone();
        view.roll_calendar(now);
        view.roll_minute(now);

        let monthly_limit = self.policy.max_per_month;
        let percentage_used = if monthly_limit == 0 {
            100.0
        } else {
            f64::from(view.monthly.count) / f64::from(monthly_limit) * 100.0
        };

        UsageSnapshot {
            api: self.api.clone(),
            minute_used: view.minute.count,
            minute_limit: self.policy.max_per_minute,
            daily_used: view.daily.count,
            daily_limit: self.policy.max_per_day,
            monthly_used: view.monthly.count,
            monthly_limit,
            estimated_cost: f64::from(view.monthly.count) * self.policy.cost_per_call,
            percentage_used,
        }
    }

    /// Copy of the raw counters.
    pub async fn counters(&self) -> UsageCounters {
        let mut state = self.state.lock().await;
        self.ensure_loaded(&mut state).await;
        state.counters.clone()
    }

    /// Month, day and minute checks, then the interval slot. Mutates
    /// `counters` only when the call is granted.
    fn evaluate(&self, counters: &mut UsageCounters, now: DateTime<Utc>) -> Verdict {
        if counters.monthly.count >= self.policy.max_per_month {
            return Verdict::Reject(QuotaScope::Month, until_next_month(now));
        }
        if counters.daily.count >= self.policy.max_per_day {
            return Verdict::Reject(QuotaScope::Day, until_next_day(now));
        }

        counters.roll_minute(now);
        if counters.minute.count >= self.policy.max_per_minute {
            return Verdict::Reject(QuotaScope::Minute, counters.minute_remaining(now));
        }

        let now_ms = now.timestamp_millis();
        let interval_ms = self.policy.min_interval.as_millis() as i64;
        let slot_ms = if counters.last_request_time > 0 {
            now_ms.max(counters.last_request_time + interval_ms)
        } else {
            now_ms
        };

        counters.record(slot_ms);
        counters.last_updated = Some(now);

        Verdict::Grant(Reservation {
            wait: Duration::from_millis((slot_ms - now_ms) as u64),
            minute_count: counters.minute.count,
            day_count: counters.daily.count,
            month_count: counters.monthly.count,
        })
    }

    fn finish(&self, verdict: Verdict) -> Result<Reservation> {
        match verdict {
            Verdict::Reject(scope, retry_after) => Err(self.reject(scope, retry_after)),
            Verdict::Grant(reservation) => {
                metrics::counter!(telemetry::QUOTA_GRANTS_TOTAL, "api" => self.api.clone())
                    .increment(1);
                debug!(
                    api = %self.api,
                    minute = reservation.minute_count,
                    day = reservation.day_count,
                    month = reservation.month_count,
                    wait_ms = reservation.wait.as_millis() as u64,
                    "quota reserved"
                );
                Ok(reservation)
            }
        }
    }

    async fn ensure_loaded(&self, state: &mut TrackerState) {
        if !state.loaded && !self.reload(state).await {
            warn!(api = %self.api, store = self.store.name(), "continuing with in-process counters");
        }
    }

    /// Replace the in-process counters with the stored ones. A failed read
    /// leaves `loaded` unset so the next call tries again.
    async fn reload(&self, state: &mut TrackerState) -> bool {
        match self.store.load(&self.api).await {
            Ok(stored) => {
                debug!(api = %self.api, store = self.store.name(), found = stored.is_some(), "counters loaded");
                state.counters = stored.unwrap_or_default();
                state.loaded = true;
                true
            }
            Err(e) => {
                self.record_persistence_error();
                warn!(api = %self.api, store = self.store.name(), error = %e, "failed to load counters");
                false
            }
        }
    }

    fn record_persistence_error(&self) {
        metrics::counter!(telemetry::PERSISTENCE_ERRORS_TOTAL,
            "api" => self.api.clone(),
            "store" => self.store.name().to_owned(),
        )
        .increment(1);
    }

    fn reject(&self, scope: QuotaScope, retry_after: Duration) -> ItineraError {
        let limit = self.policy.limit(scope);
        metrics::counter!(telemetry::QUOTA_REJECTIONS_TOTAL,
            "api" => self.api.clone(),
            "scope" => scope.as_str(),
        )
        .increment(1);
        warn!(
            api = %self.api,
            %scope,
            limit,
            retry_after_secs = retry_after.as_secs(),
            "quota exceeded"
        );
        ItineraError::QuotaExceeded {
            api: self.api.clone(),
            scope,
            limit,
            retry_after,
        }
    }
}
