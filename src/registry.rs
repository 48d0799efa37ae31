//! Per-definition slots and the Prometheus view over them.
//!
//! Every definition owns a [`MetricSlot`] holding its latest published
//! [`Snapshot`] and the status of its most recent cycle. Publishing swaps
//! one `Arc` under a short write lock, so readers always see either the
//! previous snapshot or the new one, never a mix. A failed cycle leaves the
//! previous snapshot in place.
//!
//! [`MetricRegistry`] implements [`prometheus::core::Collector`]: each
//! scrape builds one gauge family per published snapshot. Scraping never
//! triggers or waits for collection.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use prometheus::core::{Collector, Desc};
use prometheus::proto::MetricFamily;
use prometheus::{Encoder, GaugeVec, Opts, TextEncoder};
use tracing::{info, warn};

use crate::client::ServiceClient;
use crate::collector::{Snapshot, collect};
use crate::definition::{DefinitionSet, MetricDefinition, is_valid_label_name};
use crate::{HuginnError, Result, telemetry};

/// Where a definition is in its collection cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleState {
    /// No cycle has run yet.
    Idle,
    Collecting,
    /// The last cycle produced a snapshot.
    Published,
    /// The last cycle failed; any earlier snapshot is still served.
    Failed,
}

/// Outcome bookkeeping for one definition.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleStatus {
    pub state: CycleState,
    pub last_error: Option<String>,
    pub last_success: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
}

impl Default for CycleStatus {
    fn default() -> Self {
        Self {
            state: CycleState::Idle,
            last_error: None,
            last_success: None,
            consecutive_failures: 0,
        }
    }
}

/// The latest snapshot and cycle status of one definition.
#[derive(Debug)]
pub struct MetricSlot {
    definition: MetricDefinition,
    snapshot: RwLock<Option<Arc<Snapshot>>>,
    status: Mutex<CycleStatus>,
}

impl MetricSlot {
    pub fn new(definition: MetricDefinition) -> Self {
        Self {
            definition,
            snapshot: RwLock::new(None),
            status: Mutex::new(CycleStatus::default()),
        }
    }

    pub fn definition(&self) -> &MetricDefinition {
        &self.definition
    }

    pub fn name(&self) -> &str {
        self.definition.name()
    }

    /// The latest published snapshot, if any cycle has succeeded.
    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn status(&self) -> CycleStatus {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn update_status(&self, f: impl FnOnce(&mut CycleStatus)) {
        f(&mut self.status.lock().unwrap_or_else(PoisonError::into_inner));
    }

    /// Replace the published snapshot.
    pub fn publish(&self, snapshot: Snapshot) -> Arc<Snapshot> {
        let snapshot = Arc::new(snapshot);
        let collected_at = snapshot.collected_at();
        *self.snapshot.write().unwrap_or_else(PoisonError::into_inner) = Some(Arc::clone(&snapshot));
        self.update_status(|status| {
            status.state = CycleState::Published;
            status.last_error = None;
            status.last_success = Some(collected_at);
            status.consecutive_failures = 0;
        });
        snapshot
    }

    /// Record a failed cycle. The published snapshot is left untouched.
    pub fn fail(&self, error: &HuginnError) {
        self.update_status(|status| {
            status.state = CycleState::Failed;
            status.last_error = Some(error.to_string());
            status.consecutive_failures = status.consecutive_failures.saturating_add(1);
        });
    }

    /// Run one collection cycle and publish its result.
    ///
    /// Errors are recorded on the slot and returned; they never affect any
    /// other slot.
    pub async fn refresh(&self, client: &dyn ServiceClient, now: DateTime<Utc>) -> Result<Arc<Snapshot>> {
        self.update_status(|status| status.state = CycleState::Collecting);

        match collect(client, &self.definition, now).await {
            Ok(snapshot) => {
                let samples = snapshot.len();
                let snapshot = self.publish(snapshot);
                metrics::gauge!(telemetry::SAMPLES, "metric" => self.name().to_owned())
                    .set(samples as f64);
                info!(metric = self.name(), samples, "published snapshot");
                Ok(snapshot)
            }
            Err(e) => {
                self.fail(&e);
                warn!(
                    metric = self.name(),
                    kind = e.kind(),
                    consecutive_failures = self.status().consecutive_failures,
                    error = %e,
                    "collection cycle failed"
                );
                Err(e)
            }
        }
    }
}

struct Inner {
    slots: Vec<Arc<MetricSlot>>,
    const_labels: BTreeMap<String, String>,
    descs: Vec<Desc>,
}

/// All slots, in definition order, plus process-wide constant labels.
///
/// Cloning is cheap and clones share the same slots.
#[derive(Clone)]
pub struct MetricRegistry {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for MetricRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricRegistry")
            .field("slots", &self.inner.slots.len())
            .field("const_labels", &self.inner.const_labels)
            .finish()
    }
}

impl MetricRegistry {
    /// Build a registry with no constant labels.
    pub fn new(definitions: DefinitionSet) -> Result<Self> {
        Self::with_const_labels(definitions, BTreeMap::new())
    }

    /// Build a registry whose every series carries `const_labels`.
    ///
    /// Fails if a constant label name is invalid or collides with a
    /// definition's label, or if a definition cannot be exported under
    /// Prometheus naming rules.
    pub fn with_const_labels(
        definitions: DefinitionSet,
        const_labels: BTreeMap<String, String>,
    ) -> Result<Self> {
        for name in const_labels.keys() {
            if !is_valid_label_name(name) {
                return Err(HuginnError::Configuration(format!(
                    "invalid constant label name '{name}'"
                )));
            }
        }

        let mut slots = Vec::with_capacity(definitions.len());
        let mut descs = Vec::with_capacity(definitions.len());
        for definition in definitions {
            if let Some(clash) = definition
                .label_names()
                .iter()
                .find(|label| const_labels.contains_key(label.as_str()))
            {
                return Err(HuginnError::Configuration(format!(
                    "metric '{}': label '{clash}' collides with a constant label",
                    definition.name()
                )));
            }
            let opts = opts(&definition, &const_labels);
            let desc = Desc::new(
                opts.name.clone(),
                opts.help.clone(),
                definition.label_names().to_vec(),
                opts.const_labels.clone(),
            )
            .map_err(|e| export_error(&definition, e))?;
            descs.push(desc);
            slots.push(Arc::new(MetricSlot::new(definition)));
        }

        Ok(Self {
            inner: Arc::new(Inner {
                slots,
                const_labels,
                descs,
            }),
        })
    }

    pub fn slots(&self) -> &[Arc<MetricSlot>] {
        &self.inner.slots
    }

    pub fn slot(&self, name: &str) -> Option<&Arc<MetricSlot>> {
        self.inner.slots.iter().find(|slot| slot.name() == name)
    }

    pub fn const_labels(&self) -> &BTreeMap<String, String> {
        &self.inner.const_labels
    }

    /// Render all published snapshots in the Prometheus text format.
    ///
    /// Definitions without a snapshot, or whose snapshot is empty, are
    /// omitted.
    pub fn render(&self) -> Result<String> {
        if self.inner.slots.is_empty() {
            return Ok(String::new());
        }
        let registry = prometheus::Registry::new();
        registry
            .register(Box::new(self.clone()))
            .map_err(|e| HuginnError::Configuration(format!("failed to register metrics: {e}")))?;

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&registry.gather(), &mut buffer)
            .map_err(|e| HuginnError::Io(std::io::Error::other(e.to_string())))?;
        String::from_utf8(buffer).map_err(|e| HuginnError::Io(std::io::Error::other(e)))
    }

    fn family(&self, slot: &MetricSlot, snapshot: &Snapshot) -> Option<Vec<MetricFamily>> {
        let definition = slot.definition();
        let label_names: Vec<&str> = definition.label_names().iter().map(String::as_str).collect();
        let gauges = match GaugeVec::new(opts(definition, &self.inner.const_labels), &label_names) {
            Ok(gauges) => gauges,
            Err(e) => {
                warn!(metric = definition.name(), error = %e, "cannot export metric");
                return None;
            }
        };

        // Duplicate label tuples share one series; the last sample wins.
        for sample in snapshot.samples() {
            let values: Vec<&str> = sample.labels.iter().map(String::as_str).collect();
            match gauges.get_metric_with_label_values(values.as_slice()) {
                Ok(gauge) => gauge.set(sample.value),
                Err(e) => warn!(metric = definition.name(), error = %e, "dropping sample"),
            }
        }
        Some(gauges.collect())
    }
}

fn opts(definition: &MetricDefinition, const_labels: &BTreeMap<String, String>) -> Opts {
    let help = if definition.description().is_empty() {
        definition.name()
    } else {
        definition.description()
    };
    let const_labels: HashMap<String, String> = const_labels
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    Opts::new(definition.name(), help).const_labels(const_labels)
}

fn export_error(definition: &MetricDefinition, error: prometheus::Error) -> HuginnError {
    HuginnError::Configuration(format!(
        "metric '{}' cannot be exported: {error}",
        definition.name()
    ))
}

impl Collector for MetricRegistry {
    fn desc(&self) -> Vec<&Desc> {
        self.inner.descs.iter().collect()
    }

    fn collect(&self) -> Vec<MetricFamily> {
        self.inner
            .slots
            .iter()
            .filter_map(|slot| {
                let snapshot = slot.snapshot()?;
                self.family(slot, &snapshot)
            })
            .flatten()
            .collect()
    }
}
