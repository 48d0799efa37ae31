//! Telemetry metric name constants.
//!
//! Centralised names for huginn's own metrics, emitted through the
//! `metrics` facade. `huginnd` installs a Prometheus recorder and appends
//! its output to `/metrics`; library users install their own recorder,
//! and without one all calls are no-ops.
//!
//! # Metric naming conventions
//!
//! All metrics are prefixed with `huginn_`. Counters end in `_total`,
//! histograms use meaningful units (e.g. `_seconds`).
//!
//! # Common labels
//!
//! - `metric`: name of the metric definition being collected
//! - `service` / `operation`: remote API surface
//! - `status`: outcome: "ok" or "error"

/// Total collection cycles.
///
/// Labels: `metric`, `status` ("ok" | "error").
pub const COLLECTIONS_TOTAL: &str = "huginn_collections_total";

/// Collection cycle duration in seconds.
///
/// Labels: `metric`.
pub const COLLECTION_DURATION_SECONDS: &str = "huginn_collection_duration_seconds";

/// Total response pages fetched.
///
/// Labels: `metric`.
pub const PAGES_TOTAL: &str = "huginn_pages_total";

/// Number of samples in the latest published snapshot.
///
/// Labels: `metric`.
pub const SAMPLES: &str = "huginn_samples";

/// Total remote calls issued by clients.
///
/// Labels: `service`, `operation`, `status` ("ok" | "error").
pub const REMOTE_CALLS_TOTAL: &str = "huginn_remote_calls_total";

/// Total retry attempts (not counting the initial call).
///
/// Labels: `service`, `operation`.
pub const RETRIES_TOTAL: &str = "huginn_retries_total";
