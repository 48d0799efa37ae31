//! One collection cycle for one metric definition.
//!
//! [`collect`] resolves the call arguments, streams every response page,
//! runs the definition's search over each page and turns the resulting
//! records into a [`Snapshot`]. Any failure abandons the whole cycle, so a
//! snapshot is either complete or never produced.

use std::time::Instant;

use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use serde_json::{Map, Value};
use tracing::debug;

use crate::client::ServiceClient;
use crate::definition::MetricDefinition;
use crate::pages::pages;
use crate::{HuginnError, Result, telemetry};

/// Record key holding the observation.
pub const VALUE_KEY: &str = "value";

/// How a JSON `null` label value is rendered.
pub const NULL_LABEL: &str = "<null>";

/// One labeled observation.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    /// Label values, in the definition's `label_names` order.
    pub labels: Vec<String>,
    pub value: f64,
}

/// The complete result of one successful cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    samples: Vec<Sample>,
    collected_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn new(samples: Vec<Sample>, collected_at: DateTime<Utc>) -> Self {
        Self {
            samples,
            collected_at,
        }
    }

    /// Samples in retrieval order.
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// The cycle instant the arguments were resolved against.
    pub fn collected_at(&self) -> DateTime<Utc> {
        self.collected_at
    }
}

/// Run one cycle of `definition` against `client`, with `now` as the cycle
/// instant.
pub async fn collect(
    client: &dyn ServiceClient,
    definition: &MetricDefinition,
    now: DateTime<Utc>,
) -> Result<Snapshot> {
    let started = Instant::now();
    let result = run_cycle(client, definition, now).await;

    let status = if result.is_ok() { "ok" } else { "error" };
    metrics::counter!(telemetry::COLLECTIONS_TOTAL,
        "metric" => definition.name().to_owned(),
        "status" => status,
    )
    .increment(1);
    metrics::histogram!(telemetry::COLLECTION_DURATION_SECONDS,
        "metric" => definition.name().to_owned(),
    )
    .record(started.elapsed().as_secs_f64());

    result
}

async fn run_cycle(
    client: &dyn ServiceClient,
    definition: &MetricDefinition,
    now: DateTime<Utc>,
) -> Result<Snapshot> {
    let args = definition.arguments().resolve(now)?;
    let mut stream = pages(client, definition.call(), args);

    let mut samples = Vec::new();
    let mut page_count = 0_u64;
    while let Some(page) = stream.try_next().await? {
        page_count += 1;
        let records = definition.search().extract(&page)?;
        debug!(
            metric = definition.name(),
            page = page_count,
            records = records.len(),
            "extracted records"
        );
        for record in records {
            samples.push(to_sample(definition, record)?);
        }
    }

    metrics::counter!(telemetry::PAGES_TOTAL, "metric" => definition.name().to_owned())
        .increment(page_count);

    Ok(Snapshot::new(samples, now))
}

/// Validate one extracted record and convert it to a [`Sample`].
///
/// The record must be an object whose keys are exactly the definition's
/// label names plus `value`, and `value` must be a number.
pub fn to_sample(definition: &MetricDefinition, record: Value) -> Result<Sample> {
    let shape_error = |reason: String| HuginnError::RecordShape {
        metric: definition.name().to_string(),
        reason,
    };

    let mut fields = match record {
        Value::Object(fields) => fields,
        other => return Err(shape_error(format!("expected an object, got {other}"))),
    };

    let value = match fields.remove(VALUE_KEY) {
        None => return Err(shape_error(format!("missing '{VALUE_KEY}' key"))),
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| shape_error(format!("'{VALUE_KEY}' {n} is not representable")))?,
        Some(other) => {
            return Err(shape_error(format!("'{VALUE_KEY}' must be a number, got {other}")));
        }
    };

    let mut labels = Vec::with_capacity(definition.label_names().len());
    for name in definition.label_names() {
        let label = fields
            .remove(name)
            .ok_or_else(|| shape_error(format!("missing label '{name}'")))?;
        labels.push(render_label(&label));
    }

    if !fields.is_empty() {
        return Err(shape_error(format!(
            "unexpected keys: {}",
            sorted_keys(&fields).join(", ")
        )));
    }

    Ok(Sample { labels, value })
}

fn sorted_keys(fields: &Map<String, Value>) -> Vec<&str> {
    let mut keys: Vec<&str> = fields.keys().map(String::as_str).collect();
    keys.sort_unstable();
    keys
}

/// Render a record field as a label value.
///
/// Strings are taken verbatim, `null` becomes [`NULL_LABEL`] and anything
/// else uses its compact JSON text.
pub fn render_label(value: &Value) -> String {
    match value {
        Value::Null => NULL_LABEL.to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn definition(labels: &[&str]) -> MetricDefinition {
        MetricDefinition::builder("m")
            .service("s")
            .operation("o")
            .label_names(labels.iter().copied())
            .search("items")
            .build()
            .unwrap()
    }

    #[test]
    fn labels_follow_definition_order() {
        let def = definition(&["b", "a"]);
        let sample = to_sample(&def, json!({"a": "1", "value": 2, "b": "x"})).unwrap();
        assert_eq!(sample.labels, ["x", "1"]);
        assert_eq!(sample.value, 2.0);
    }

    #[test]
    fn label_rendering() {
        assert_eq!(render_label(&json!(null)), "<null>");
        assert_eq!(render_label(&json!("")), "");
        assert_eq!(render_label(&json!(true)), "true");
        assert_eq!(render_label(&json!(1.5)), "1.5");
        assert_eq!(render_label(&json!(["a", 1])), r#"["a",1]"#);
    }

    #[test]
    fn booleans_are_not_values() {
        let err = to_sample(&definition(&[]), json!({"value": true})).unwrap_err();
        assert!(matches!(err, HuginnError::RecordShape { .. }));
    }

    #[test]
    fn extra_keys_are_rejected() {
        let err = to_sample(&definition(&["a"]), json!({"a": "x", "z": 1, "value": 1})).unwrap_err();
        assert!(err.to_string().contains("unexpected keys: z"));
    }

    #[test]
    fn non_objects_are_rejected() {
        let err = to_sample(&definition(&[]), json!(3)).unwrap_err();
        assert!(err.to_string().contains("expected an object"));
    }

    #[test]
    fn missing_label() {
        let err = to_sample(&definition(&["a"]), json!({"value": 1})).unwrap_err();
        assert!(err.to_string().contains("missing label 'a'"));
    }
}
