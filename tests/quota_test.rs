//! Integration tests for quota enforcement across minute, day and month
//! windows.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use itinera::{
    CounterStore, ItineraError, ManualClock, MemoryStore, QuotaPolicy, QuotaScope, QuotaTracker,
    Result, UsageCounters,
};

// ============================================================================
// Helpers
// ============================================================================

fn at(y: i32, m: u32, d: u32, h: u32, min: u32, s: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, s).unwrap()
}

fn policy() -> QuotaPolicy {
    QuotaPolicy::new()
        .max_per_minute(100)
        .max_per_day(1_000)
        .max_per_month(10_000)
}

fn tracker_with(
    policy: QuotaPolicy,
    store: Arc<dyn CounterStore>,
    start: DateTime<Utc>,
) -> (QuotaTracker, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(start));
    let tracker = QuotaTracker::new("llm", policy, store).with_clock(clock.clone());
    (tracker, clock)
}

fn tracker(policy: QuotaPolicy, start: DateTime<Utc>) -> (QuotaTracker, Arc<ManualClock>) {
    tracker_with(policy, Arc::new(MemoryStore::new()), start)
}

fn scope_of(err: &ItineraError) -> Option<QuotaScope> {
    match err {
        ItineraError::QuotaExceeded { scope, .. } => Some(*scope),
        _ => None,
    }
}

/// Store whose reads and writes always fail.
struct BrokenStore {
    saves: AtomicU32,
}

#[async_trait]
impl CounterStore for BrokenStore {
    fn name(&self) -> &str {
        "broken"
    }

    async fn load(&self, _api: &str) -> Result<Option<UsageCounters>> {
        Err(ItineraError::Persistence("disk on fire".into()))
    }

    async fn save(&self, _api: &str, _counters: &UsageCounters) -> Result<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        Err(ItineraError::Persistence("disk on fire".into()))
    }

    async fn save_if(&self, api: &str, _expected: u64, counters: &UsageCounters) -> Result<()> {
        self.save(api, counters).await
    }
}

/// Memory store that can be switched off to simulate an unreachable owner.
#[derive(Default)]
struct SwitchableStore {
    inner: MemoryStore,
    down: AtomicBool,
}

impl SwitchableStore {
    fn check(&self) -> Result<()> {
        if self.down.load(Ordering::SeqCst) {
            Err(ItineraError::Persistence("connection refused".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl CounterStore for SwitchableStore {
    fn name(&self) -> &str {
        "switchable"
    }

    async fn load(&self, api: &str) -> Result<Option<UsageCounters>> {
        self.check()?;
        self.inner.load(api).await
    }

    async fn save(&self, api: &str, counters: &UsageCounters) -> Result<()> {
        self.check()?;
        self.inner.save(api, counters).await
    }

    async fn save_if(&self, api: &str, expected: u64, counters: &UsageCounters) -> Result<()> {
        self.check()?;
        self.inner.save_if(api, expected, counters).await
    }
}

// ============================================================================
// Minute window
// ============================================================================

#[tokio::test]
async fn minute_limit_rejects_without_incrementing() {
    let (tracker, clock) = tracker(policy().max_per_minute(3), at(2026, 5, 10, 12, 0, 0));

    for expected in 1..=3 {
        let reservation = tracker.check_and_reserve().await.unwrap();
        assert_eq!(reservation.minute_count, expected);
    }

    clock.advance(Duration::from_secs(20));
    let err = tracker.check_and_reserve().await.unwrap_err();
    assert_eq!(scope_of(&err), Some(QuotaScope::Minute));
    assert_eq!(err.retry_after(), Some(Duration::from_secs(40)));

    let counters = tracker.counters().await;
    assert_eq!(counters.minute.count, 3);
    assert_eq!(counters.daily.count, 3);
    assert_eq!(counters.monthly.count, 3);
}

#[tokio::test]
async fn minute_window_restarts_after_sixty_seconds() {
    let (tracker, clock) = tracker(policy().max_per_minute(2), at(2026, 5, 10, 12, 0, 0));
    tracker.check_and_reserve().await.unwrap();
    tracker.check_and_reserve().await.unwrap();

    // exactly one minute later the window is still open
    clock.advance(Duration::from_secs(60));
    assert!(tracker.check_and_reserve().await.is_err());

    clock.advance(Duration::from_secs(1));
    let reservation = tracker.check_and_reserve().await.unwrap();
    assert_eq!(reservation.minute_count, 1);
    assert_eq!(reservation.day_count, 3);
}

#[tokio::test]
async fn minute_window_start_is_monotonic() {
    let (tracker, clock) = tracker(policy(), at(2026, 5, 10, 12, 0, 0));
    let mut last_start = 0;
    for _ in 0..5 {
        tracker.check_and_reserve().await.unwrap();
        let start = tracker.counters().await.minute.start_time;
        assert!(start >= last_start);
        last_start = start;
        clock.advance(Duration::from_secs(45));
    }
}

// ============================================================================
// Calendar rollover
// ============================================================================

#[tokio::test]
async fn day_rollover_resets_day_but_keeps_month() {
    let (tracker, clock) = tracker(policy().max_per_day(2), at(2026, 5, 10, 23, 58, 0));
    tracker.check_and_reserve().await.unwrap();
    tracker.check_and_reserve().await.unwrap();

    let err = tracker.check_and_reserve().await.unwrap_err();
    assert_eq!(scope_of(&err), Some(QuotaScope::Day));
    assert_eq!(err.retry_after(), Some(Duration::from_secs(120)));

    clock.set(at(2026, 5, 11, 0, 0, 30));
    let reservation = tracker.check_and_reserve().await.unwrap();
    assert_eq!(reservation.day_count, 1);
    assert_eq!(reservation.month_count, 3);
    assert_eq!(tracker.counters().await.daily.date, "2026-05-11");
}

#[tokio::test]
async fn month_rollover_resets_day_and_month() {
    let (tracker, clock) = tracker(policy(), at(2026, 5, 31, 23, 0, 0));
    tracker.check_and_reserve().await.unwrap();
    tracker.check_and_reserve().await.unwrap();

    clock.set(at(2026, 6, 1, 0, 0, 5));
    let reservation = tracker.check_and_reserve().await.unwrap();
    assert_eq!(reservation.day_count, 1);
    assert_eq!(reservation.month_count, 1);

    let counters = tracker.counters().await;
    assert_eq!(counters.monthly.month, "2026-06");
    assert_eq!(counters.daily.date, "2026-06-01");
}

#[tokio::test]
async fn monthly_budget_of_three() {
    let (tracker, clock) = tracker(policy().max_per_month(3), at(2026, 5, 31, 23, 0, 0));

    for _ in 0..3 {
        tracker.check_and_reserve().await.unwrap();
    }
    let err = tracker.check_and_reserve().await.unwrap_err();
    assert_eq!(scope_of(&err), Some(QuotaScope::Month));
    assert_eq!(err.retry_after(), Some(Duration::from_secs(3600)));
    assert!(err.to_string().contains("month"));
    assert_eq!(tracker.counters().await.monthly.count, 3);

    clock.set(at(2026, 6, 1, 0, 0, 0));
    let reservation = tracker.check_and_reserve().await.unwrap();
    assert_eq!(reservation.month_count, 1);
}

#[tokio::test]
async fn longest_scope_is_reported_first() {
    let (tracker, _clock) = tracker(
        policy().max_per_minute(2).max_per_day(2).max_per_month(2),
        at(2026, 5, 10, 12, 0, 0),
    );
    tracker.check_and_reserve().await.unwrap();
    tracker.check_and_reserve().await.unwrap();

    let err = tracker.check_and_reserve().await.unwrap_err();
    assert_eq!(scope_of(&err), Some(QuotaScope::Month));
}

// ============================================================================
// Minimum interval
// ============================================================================

#[tokio::test]
async fn minimum_interval_reserves_spaced_slots() {
    let (tracker, clock) = tracker(
        policy().min_interval(Duration::from_secs(1)),
        at(2026, 5, 10, 12, 0, 0),
    );

    assert_eq!(tracker.check_and_reserve().await.unwrap().wait, Duration::ZERO);
    assert_eq!(
        tracker.check_and_reserve().await.unwrap().wait,
        Duration::from_secs(1)
    );

    clock.advance(Duration::from_millis(400));
    assert_eq!(
        tracker.check_and_reserve().await.unwrap().wait,
        Duration::from_millis(1600)
    );

    clock.advance(Duration::from_secs(10));
    assert_eq!(tracker.check_and_reserve().await.unwrap().wait, Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn acquire_sleeps_out_the_interval() {
    let (tracker, _clock) = tracker(
        policy().min_interval(Duration::from_secs(4)),
        at(2026, 5, 10, 12, 0, 0),
    );

    let start = tokio::time::Instant::now();
    tracker.acquire().await.unwrap();
    assert_eq!(start.elapsed(), Duration::ZERO);

    tracker.acquire().await.unwrap();
    assert!(start.elapsed() >= Duration::from_secs(4));
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_never_exceed_limit() {
    let (tracker, _clock) = tracker(policy().max_per_minute(5), at(2026, 5, 10, 12, 0, 0));
    let tracker = Arc::new(tracker);

    let mut handles = Vec::new();
    for _ in 0..20 {
        let tracker = Arc::clone(&tracker);
        handles.push(tokio::spawn(
            async move { tracker.check_and_reserve().await },
        ));
    }

    let mut granted = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => granted += 1,
            Err(e) => {
                assert_eq!(scope_of(&e), Some(QuotaScope::Minute));
                rejected += 1;
            }
        }
    }
    assert_eq!(granted, 5);
    assert_eq!(rejected, 15);
    assert_eq!(tracker.counters().await.minute.count, 5);
}

// ============================================================================
// Persistence
// ============================================================================

#[tokio::test]
async fn counters_survive_a_new_tracker() {
    let store: Arc<dyn CounterStore> = Arc::new(MemoryStore::new());
    let start = at(2026, 5, 10, 12, 0, 0);

    let (first, _) = tracker_with(policy(), Arc::clone(&store), start);
    first.check_and_reserve().await.unwrap();
    first.check_and_reserve().await.unwrap();

    let (second, _) = tracker_with(policy(), Arc::clone(&store), start);
    let reservation = second.check_and_reserve().await.unwrap();
    assert_eq!(reservation.month_count, 3);
}

#[tokio::test]
async fn interleaved_trackers_share_one_monthly_budget() {
    let store: Arc<dyn CounterStore> = Arc::new(MemoryStore::new());
    let start = at(2026, 5, 10, 12, 0, 0);
    let limited = policy().max_per_month(2);
    let (a, _) = tracker_with(limited.clone(), Arc::clone(&store), start);
    let (b, _) = tracker_with(limited, Arc::clone(&store), start);

    let mut granted = 0;
    for tracker in [&a, &b, &a, &b, &a] {
        match tracker.check_and_reserve().await {
            Ok(_) => granted += 1,
            Err(e) => assert_eq!(scope_of(&e), Some(QuotaScope::Month)),
        }
    }

    assert_eq!(granted, 2);
    let stored = store.load("llm").await.unwrap().unwrap();
    assert_eq!(stored.monthly.count, 2);
}

#[tokio::test]
async fn concurrent_trackers_on_one_store_never_exceed_limit() {
    let store: Arc<dyn CounterStore> = Arc::new(MemoryStore::new());
    let start = at(2026, 5, 10, 12, 0, 0);
    let trackers: Vec<_> = (0..4)
        .map(|_| Arc::new(tracker_with(policy().max_per_day(5), Arc::clone(&store), start).0))
        .collect();

    let mut handles = Vec::new();
    for tracker in &trackers {
        for _ in 0..3 {
            let tracker = Arc::clone(tracker);
            handles.push(tokio::spawn(async move { tracker.check_and_reserve().await }));
        }
    }

    let mut granted = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            granted += 1;
        }
    }
    assert_eq!(granted, 5);
    assert_eq!(store.load("llm").await.unwrap().unwrap().daily.count, 5);
}

#[tokio::test]
async fn failed_load_is_retried_on_the_next_call() {
    let store = Arc::new(SwitchableStore::default());
    let start = at(2026, 5, 10, 12, 0, 0);

    let mut seeded = UsageCounters::default();
    seeded.daily.count = 5;
    seeded.daily.date = "2026-05-10".into();
    seeded.monthly.count = 5;
    seeded.monthly.month = "2026-05".into();
    seeded.revision = 1;
    store.inner.save("llm", &seeded).await.unwrap();

    let (tracker, _) = tracker_with(policy(), store.clone(), start);
    store.down.store(true, Ordering::SeqCst);
    let offline = tracker.check_and_reserve().await.unwrap();
    assert_eq!(offline.month_count, 1);

    store.down.store(false, Ordering::SeqCst);
    let online = tracker.check_and_reserve().await.unwrap();
    assert_eq!(online.month_count, 6);

    let stored = store.inner.load("llm").await.unwrap().unwrap();
    assert_eq!(stored.monthly.count, 6);
    assert_eq!(stored.daily.count, 6);
}

#[tokio::test]
async fn persistence_failure_does_not_block() {
    let store = Arc::new(BrokenStore {
        saves: AtomicU32::new(0),
    });
    let (tracker, _clock) = tracker_with(
        policy().max_per_minute(2),
        store.clone(),
        at(2026, 5, 10, 12, 0, 0),
    );

    tracker.check_and_reserve().await.unwrap();
    tracker.check_and_reserve().await.unwrap();
    assert!(tracker.check_and_reserve().await.is_err());

    assert!(store.saves.load(Ordering::SeqCst) >= 2);
    assert_eq!(tracker.counters().await.minute.count, 2);
}

// ============================================================================
// Usage reports
// ============================================================================

#[tokio::test]
async fn usage_reports_cost_and_percentage() {
    let (tracker, clock) = tracker(
        policy().max_per_month(200).cost_per_call(0.5),
        at(2026, 5, 10, 12, 0, 0),
    );
    for _ in 0..4 {
        tracker.check_and_reserve().await.unwrap();
    }

    let usage = tracker.usage().await;
    assert_eq!(usage.api, "llm");
    assert_eq!(usage.monthly_used, 4);
    assert_eq!(usage.monthly_limit, 200);
    assert!((usage.estimated_cost - 2.0).abs() < 1e-9);
    assert!((usage.percentage_used - 2.0).abs() < 1e-9);

    // a pending day rollover shows in the report without consuming quota
    clock.set(at(2026, 5, 11, 8, 0, 0));
    let usage = tracker.usage().await;
    assert_eq!(usage.daily_used, 0);
    assert_eq!(usage.monthly_used, 4);
    assert_eq!(usage.minute_used, 0);
}
