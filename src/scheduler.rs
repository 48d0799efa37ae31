//! Periodic collection driver.
//!
//! Each definition runs on its own fixed-period timer in its own task, so a
//! slow or failing definition never delays another. An optional semaphore
//! bounds how many cycles talk to the remote at once.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use crate::client::ServiceClient;
use crate::registry::{MetricRegistry, MetricSlot};

/// Default collection period.
pub const DEFAULT_PERIOD: Duration = Duration::from_secs(300);

/// Shortest accepted collection period; shorter ones are raised to it.
pub const MIN_PERIOD: Duration = Duration::from_secs(1);

type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Outcome counts of one [`Scheduler::run_once`] pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub published: usize,
    pub failed: usize,
}

/// Drives collection cycles for every slot of a [`MetricRegistry`].
#[derive(Clone)]
pub struct Scheduler {
    registry: MetricRegistry,
    client: Arc<dyn ServiceClient>,
    period: Duration,
    limit: Option<Arc<Semaphore>>,
    clock: Clock,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("registry", &self.registry)
            .field("client", &self.client.name())
            .field("period", &self.period)
            .field("concurrency", &self.limit.as_ref().map(|s| s.available_permits()))
            .finish()
    }
}

impl Scheduler {
    pub fn new(registry: MetricRegistry, client: Arc<dyn ServiceClient>) -> Self {
        Self {
            registry,
            client,
            period: DEFAULT_PERIOD,
            limit: None,
            clock: Arc::new(Utc::now),
        }
    }

    /// Time between the starts of consecutive cycles of one definition.
    /// Clamped to at least [`MIN_PERIOD`].
    pub fn period(mut self, period: Duration) -> Self {
        if period < MIN_PERIOD {
            warn!(?period, minimum = ?MIN_PERIOD, "collection period too short, using minimum");
        }
        self.period = period.max(MIN_PERIOD);
        self
    }

    /// At most `n` cycles in flight at once; 0 means unbounded.
    pub fn concurrency(mut self, n: usize) -> Self {
        self.limit = (n > 0).then(|| Arc::new(Semaphore::new(n)));
        self
    }

    /// Source of the cycle instant handed to argument resolution.
    pub fn clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn registry(&self) -> &MetricRegistry {
        &self.registry
    }

    /// Collect every definition once, concurrently, and wait for all of them.
    pub async fn run_once(&self) -> RunSummary {
        let outcomes = join_all(self.registry.slots().iter().map(|slot| self.cycle(slot))).await;
        let published = outcomes.iter().filter(|ok| **ok).count();
        RunSummary {
            published,
            failed: outcomes.len() - published,
        }
    }

    /// Start one periodic task per definition. The first cycle starts
    /// immediately.
    pub fn spawn(&self) -> SchedulerHandle {
        let mut tasks = JoinSet::new();
        for slot in self.registry.slots() {
            let scheduler = self.clone();
            let slot = Arc::clone(slot);
            tasks.spawn(async move {
                let mut ticker = interval(scheduler.period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                loop {
                    ticker.tick().await;
                    scheduler.cycle(&slot).await;
                }
            });
        }
        info!(
            definitions = self.registry.slots().len(),
            period_secs = self.period.as_secs(),
            "scheduler started"
        );
        SchedulerHandle { tasks }
    }

    /// Run until the process exits.
    pub async fn run(self) {
        let _handle = self.spawn();
        std::future::pending::<()>().await;
    }

    async fn cycle(&self, slot: &MetricSlot) -> bool {
        let _permit = match &self.limit {
            // The semaphore is never closed.
            Some(limit) => limit.acquire().await.ok(),
            None => None,
        };
        let now = (self.clock)();
        debug!(metric = slot.name(), %now, "collection cycle starting");
        slot.refresh(self.client.as_ref(), now).await.is_ok()
    }
}

/// Owns the scheduler's tasks; dropping it stops collection.
#[derive(Debug)]
pub struct SchedulerHandle {
    tasks: JoinSet<()>,
}

impl SchedulerHandle {
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Abort every task and wait for them to finish.
    pub async fn shutdown(mut self) {
        self.tasks.shutdown().await;
    }
}
