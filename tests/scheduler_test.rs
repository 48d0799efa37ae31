//! Scheduling: isolation between definitions, periods and concurrency.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::{Value, json};

use huginn::{
    CycleState, DefinitionSet, HuginnError, MetricDefinition, MetricRegistry, Result, RunSummary,
    Scheduler, ServiceClient,
};
use huginn::scheduler::MIN_PERIOD;

// ============================================================================
// Fake remote
// ============================================================================

/// Fails every call to the `broken` service, answers the rest after an
/// optional delay and tracks how many calls overlap.
#[derive(Default)]
struct CountingRemote {
    delay: Duration,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl CountingRemote {
    fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ServiceClient for CountingRemote {
    fn name(&self) -> &str {
        "counting"
    }

    async fn call(&self, service: &str, _operation: &str, _args: &Value) -> Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if service == "broken" {
            return Err(HuginnError::Api {
                status: 503,
                message: "unavailable".into(),
            });
        }
        Ok(json!({"Items": [{"value": 1}]}))
    }
}

fn definition(name: &str, service: &str) -> MetricDefinition {
    MetricDefinition::builder(name)
        .service(service)
        .operation("list")
        .search("Items")
        .build()
        .unwrap()
}

fn registry(defs: Vec<MetricDefinition>) -> MetricRegistry {
    MetricRegistry::new(DefinitionSet::new(defs).unwrap()).unwrap()
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn failing_definition_does_not_affect_others() {
    let registry = registry(vec![
        definition("healthy", "ok"),
        definition("unhealthy", "broken"),
    ]);
    let remote = Arc::new(CountingRemote::default());
    let scheduler = Scheduler::new(registry.clone(), remote);

    let summary = scheduler.run_once().await;

    assert_eq!(
        summary,
        RunSummary {
            published: 1,
            failed: 1
        }
    );
    assert_eq!(registry.slot("healthy").unwrap().status().state, CycleState::Published);
    assert_eq!(registry.slot("unhealthy").unwrap().status().state, CycleState::Failed);
    assert!(registry.slot("unhealthy").unwrap().snapshot().is_none());

    let text = registry.render().unwrap();
    assert!(text.contains("healthy 1"), "{text}");
    assert!(!text.contains("unhealthy"), "{text}");
}

#[tokio::test]
async fn clock_supplies_the_cycle_instant() {
    let fixed = Utc.with_ymd_and_hms(2020, 5, 17, 8, 0, 0).unwrap();
    let registry = registry(vec![definition("healthy", "ok")]);
    let scheduler =
        Scheduler::new(registry.clone(), Arc::new(CountingRemote::default())).clock(move || fixed);

    scheduler.run_once().await;

    let snapshot = registry.slot("healthy").unwrap().snapshot().unwrap();
    assert_eq!(snapshot.collected_at(), fixed);
}

#[tokio::test(start_paused = true)]
async fn concurrency_limit_bounds_in_flight_cycles() {
    let registry = registry(vec![
        definition("a", "ok"),
        definition("b", "ok"),
        definition("c", "ok"),
    ]);
    let remote = Arc::new(CountingRemote::with_delay(Duration::from_secs(1)));
    let scheduler = Scheduler::new(registry, remote.clone()).concurrency(1);

    let summary = scheduler.run_once().await;

    assert_eq!(summary.published, 3);
    assert_eq!(remote.max_in_flight(), 1);
}

#[tokio::test(start_paused = true)]
async fn unbounded_cycles_overlap() {
    let registry = registry(vec![
        definition("a", "ok"),
        definition("b", "ok"),
        definition("c", "ok"),
    ]);
    let remote = Arc::new(CountingRemote::with_delay(Duration::from_secs(1)));
    let scheduler = Scheduler::new(registry, remote.clone());

    scheduler.run_once().await;

    assert_eq!(remote.max_in_flight(), 3);
}

#[tokio::test(start_paused = true)]
async fn spawned_tasks_run_every_period() {
    let registry = registry(vec![definition("a", "ok"), definition("b", "broken")]);
    let remote = Arc::new(CountingRemote::default());
    let scheduler = Scheduler::new(registry.clone(), remote.clone()).period(Duration::from_secs(60));

    let handle = scheduler.spawn();
    assert_eq!(handle.len(), 2);

    // Cycles at t=0, 60 and 120 for each definition.
    tokio::time::sleep(Duration::from_secs(130)).await;
    handle.shutdown().await;

    assert_eq!(remote.calls(), 6);
    assert_eq!(registry.slot("a").unwrap().status().state, CycleState::Published);
    assert_eq!(
        registry.slot("b").unwrap().status().consecutive_failures,
        3
    );
}

#[tokio::test(start_paused = true)]
async fn zero_period_is_raised_to_the_minimum() {
    let registry = registry(vec![definition("a", "ok")]);
    let remote = Arc::new(CountingRemote::default());
    let scheduler = Scheduler::new(registry.clone(), remote.clone()).period(Duration::ZERO);

    let handle = scheduler.spawn();
    // Cycles at t=0, 1 and 2.
    tokio::time::sleep(MIN_PERIOD * 2 + Duration::from_millis(500)).await;
    handle.shutdown().await;

    assert_eq!(remote.calls(), 3);
    assert_eq!(registry.slot("a").unwrap().status().state, CycleState::Published);
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_collection() {
    let registry = registry(vec![definition("a", "ok")]);
    let remote = Arc::new(CountingRemote::default());
    let scheduler = Scheduler::new(registry, remote.clone()).period(Duration::from_secs(10));

    let handle = scheduler.spawn();
    tokio::time::sleep(Duration::from_secs(5)).await;
    handle.shutdown().await;
    let after_shutdown = remote.calls();

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(remote.calls(), after_shutdown);
    assert_eq!(after_shutdown, 1);
}

#[tokio::test]
async fn empty_registry_runs_nothing() {
    let scheduler = Scheduler::new(registry(vec![]), Arc::new(CountingRemote::default()));
    assert_eq!(scheduler.run_once().await, RunSummary::default());
    assert!(scheduler.spawn().is_empty());
}
