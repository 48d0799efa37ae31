//! Metric definitions.
//!
//! A [`MetricDefinition`] is everything needed to produce one metric: which
//! remote operation to call and how, which arguments to pass, how to pull
//! records out of each response page, and which labels those records carry.
//! Definitions are validated once when built and never change afterwards.

use std::collections::HashSet;

use crate::arguments::ArgumentSpec;
use crate::query::Query;
use crate::{HuginnError, Result};

/// Continuation-token field used when none is configured.
pub const DEFAULT_TOKEN_FIELD: &str = "NextToken";

/// How the remote operation is invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallMode {
    /// Follow continuation tokens until the result set is exhausted.
    Paginated,
    /// One call, one page.
    SingleCall,
}

/// Names of the continuation-token fields for manual pagination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pagination {
    /// Request argument carrying the token back to the remote.
    pub input_token: String,
    /// Response field holding the next token.
    pub output_token: String,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            input_token: DEFAULT_TOKEN_FIELD.to_string(),
            output_token: DEFAULT_TOKEN_FIELD.to_string(),
        }
    }
}

/// One remote call as the page driver sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct CallSpec {
    pub service: String,
    pub operation: String,
    pub mode: CallMode,
    pub pagination: Pagination,
}

/// The immutable description of one metric.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricDefinition {
    name: String,
    description: String,
    call: CallSpec,
    arguments: ArgumentSpec,
    label_names: Vec<String>,
    search: Query,
}

/// Whether `name` is usable as a metric name: `^[a-z_0-9]+$`.
pub fn is_valid_metric_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
}

/// Whether `name` is usable as a Prometheus label name.
pub fn is_valid_label_name(name: &str) -> bool {
    let mut bytes = name.bytes();
    matches!(bytes.next(), Some(b) if b.is_ascii_alphabetic() || b == b'_')
        && bytes.all(|b| b.is_ascii_alphanumeric() || b == b'_')
        && !name.starts_with("__")
}

impl MetricDefinition {
    pub fn builder(name: impl Into<String>) -> MetricDefinitionBuilder {
        MetricDefinitionBuilder {
            name: name.into(),
            description: String::new(),
            service: String::new(),
            operation: String::new(),
            mode: CallMode::Paginated,
            pagination: Pagination::default(),
            arguments: ArgumentSpec::default(),
            label_names: Vec::new(),
            search: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn service(&self) -> &str {
        &self.call.service
    }

    pub fn operation(&self) -> &str {
        &self.call.operation
    }

    pub fn call_mode(&self) -> CallMode {
        self.call.mode
    }

    pub fn call(&self) -> &CallSpec {
        &self.call
    }

    pub fn arguments(&self) -> &ArgumentSpec {
        &self.arguments
    }

    pub fn label_names(&self) -> &[String] {
        &self.label_names
    }

    pub fn search(&self) -> &Query {
        &self.search
    }
}

/// Builder for [`MetricDefinition`].
///
/// ```rust
/// use huginn::{CallMode, MetricDefinition};
///
/// let definition = MetricDefinition::builder("ec2_instances")
///     .description("Running EC2 instances")
///     .service("ec2")
///     .operation("DescribeInstances")
///     .mode(CallMode::Paginated)
///     .label_names(["instance_type"])
///     .search("Reservations[].Instances[].{instance_type: InstanceType, value: `1`}[]")
///     .build()?;
/// assert_eq!(definition.label_names(), ["instance_type"]);
/// # Ok::<(), huginn::HuginnError>(())
/// ```
#[derive(Debug, Clone)]
pub struct MetricDefinitionBuilder {
    name: String,
    description: String,
    service: String,
    operation: String,
    mode: CallMode,
    pagination: Pagination,
    arguments: ArgumentSpec,
    label_names: Vec<String>,
    search: Option<String>,
}

impl MetricDefinitionBuilder {
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }

    pub fn operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = operation.into();
        self
    }

    /// Defaults to [`CallMode::Paginated`].
    pub fn mode(mut self, mode: CallMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn pagination(mut self, pagination: Pagination) -> Self {
        self.pagination = pagination;
        self
    }

    pub fn arguments(mut self, arguments: ArgumentSpec) -> Self {
        self.arguments = arguments;
        self
    }

    pub fn label_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.label_names = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn search(mut self, expression: impl Into<String>) -> Self {
        self.search = Some(expression.into());
        self
    }

    /// Validate and build. All failures are configuration errors.
    pub fn build(self) -> Result<MetricDefinition> {
        let name = self.name.trim().to_string();
        let invalid = |reason: String| HuginnError::Configuration(format!("metric '{name}': {reason}"));

        if !is_valid_metric_name(&name) {
            return Err(invalid("name must match ^[a-z_0-9]+$".into()));
        }
        let service = self.service.trim().to_string();
        if service.is_empty() {
            return Err(invalid("service is required".into()));
        }
        let operation = self.operation.trim().to_string();
        if operation.is_empty() {
            return Err(invalid("operation is required".into()));
        }

        let label_names: Vec<String> = self.label_names.iter().map(|l| l.trim().to_string()).collect();
        let mut seen = HashSet::new();
        for label in &label_names {
            if !is_valid_label_name(label) {
                return Err(invalid(format!("invalid label name '{label}'")));
            }
            if label == "value" {
                return Err(invalid("'value' is reserved and cannot be a label".into()));
            }
            if !seen.insert(label.as_str()) {
                return Err(invalid(format!("duplicate label '{label}'")));
            }
        }

        let Some(expression) = self.search else {
            return Err(invalid("search is required".into()));
        };
        let search = Query::compile(&expression).map_err(|e| invalid(format!("search: {e}")))?;

        let pagination = Pagination {
            input_token: self.pagination.input_token.trim().to_string(),
            output_token: self.pagination.output_token.trim().to_string(),
        };
        if pagination.input_token.is_empty() || pagination.output_token.is_empty() {
            return Err(invalid("pagination token fields must not be empty".into()));
        }

        Ok(MetricDefinition {
            name: name.clone(),
            description: self.description.trim().to_string(),
            call: CallSpec {
                service,
                operation,
                mode: self.mode,
                pagination,
            },
            arguments: self.arguments,
            label_names,
            search,
        })
    }
}

/// An ordered collection of definitions with unique names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DefinitionSet {
    definitions: Vec<MetricDefinition>,
}

impl DefinitionSet {
    /// Rejects duplicate names with a configuration error.
    pub fn new(definitions: Vec<MetricDefinition>) -> Result<Self> {
        let mut seen = HashSet::new();
        for definition in &definitions {
            if !seen.insert(definition.name()) {
                return Err(HuginnError::Configuration(format!(
                    "duplicate metric name '{}'",
                    definition.name()
                )));
            }
        }
        Ok(Self { definitions })
    }

    pub fn get(&self, name: &str) -> Option<&MetricDefinition> {
        self.definitions.iter().find(|d| d.name() == name)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MetricDefinition> {
        self.definitions.iter()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }

    pub fn into_vec(self) -> Vec<MetricDefinition> {
        self.definitions
    }
}

impl<'a> IntoIterator for &'a DefinitionSet {
    type Item = &'a MetricDefinition;
    type IntoIter = std::slice::Iter<'a, MetricDefinition>;

    fn into_iter(self) -> Self::IntoIter {
        self.definitions.iter()
    }
}

impl IntoIterator for DefinitionSet {
    type Item = MetricDefinition;
    type IntoIter = std::vec::IntoIter<MetricDefinition>;

    fn into_iter(self) -> Self::IntoIter {
        self.definitions.into_iter()
    }
}
