//! Loading metric definitions from YAML.
//!
//! The file is a mapping from metric name to definition, in declaration
//! order:
//!
//! ```yaml
//! ec2_instance_ids:
//!   description: EC2 instance ids
//!   service: ec2
//!   paginator: describe_instances
//!   paginator_args:
//!     Filters:
//!       - Name: instance-state-name
//!         Values: [ "Running" ]
//!   label_names:
//!     - id
//!   search: |
//!     Reservations[].Instances[].{id: InstanceId, value: `1`}[]
//! ```
//!
//! `paginator` selects a paginated call and `method` a single call; exactly
//! one must be present. Their arguments (`paginator_args` / `method_args`)
//! are either a mapping or a deferred expression string.

use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;

use crate::arguments::ArgumentSpec;
use crate::definition::{CallMode, DefinitionSet, MetricDefinition, Pagination, is_valid_metric_name};
use crate::{HuginnError, Result};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDefinition {
    description: String,
    service: String,
    #[serde(default)]
    paginator: Option<String>,
    #[serde(default)]
    paginator_args: Option<Value>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    method_args: Option<Value>,
    #[serde(default)]
    label_names: Vec<String>,
    search: String,
    #[serde(default)]
    pagination: Option<RawPagination>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPagination {
    #[serde(default)]
    input_token: Option<String>,
    #[serde(default)]
    output_token: Option<String>,
}

/// Load definitions from a YAML file.
pub fn load_file(path: &Path) -> Result<DefinitionSet> {
    let content = fs::read_to_string(path).map_err(|e| {
        HuginnError::Configuration(format!("Failed to read metrics file {path:?}: {e}"))
    })?;
    parse_definitions(&content)
}

/// Parse definitions from a YAML document.
pub fn parse_definitions(yaml: &str) -> Result<DefinitionSet> {
    let document: serde_yaml::Value = serde_yaml::from_str(yaml)
        .map_err(|e| HuginnError::Configuration(format!("Failed to parse metrics file: {e}")))?;

    let entries = match document {
        serde_yaml::Value::Mapping(entries) => entries,
        serde_yaml::Value::Null => return DefinitionSet::new(Vec::new()),
        _ => {
            return Err(HuginnError::Configuration(
                "metrics file must be a mapping of metric names to definitions".into(),
            ));
        }
    };

    let mut definitions = Vec::with_capacity(entries.len());
    for (key, entry) in entries {
        let serde_yaml::Value::String(name) = key else {
            return Err(HuginnError::Configuration(format!(
                "metric names must be strings, got {key:?}"
            )));
        };
        definitions.push(parse_entry(&name, entry)?);
    }
    DefinitionSet::new(definitions)
}

fn parse_entry(name: &str, entry: serde_yaml::Value) -> Result<MetricDefinition> {
    let invalid = |reason: String| HuginnError::Configuration(format!("metric '{name}': {reason}"));

    if !is_valid_metric_name(name) {
        return Err(HuginnError::Configuration(format!(
            "metric name '{name}' does not match ^[a-z_0-9]+$"
        )));
    }
    let raw: RawDefinition = serde_yaml::from_value(entry).map_err(|e| invalid(e.to_string()))?;

    let (mode, operation, args, args_field) = match (raw.paginator, raw.method) {
        (Some(paginator), None) => {
            if raw.method_args.is_some() {
                return Err(invalid("'method_args' given with 'paginator'".into()));
            }
            (CallMode::Paginated, paginator, raw.paginator_args, "paginator_args")
        }
        (None, Some(method)) => {
            if raw.paginator_args.is_some() {
                return Err(invalid("'paginator_args' given with 'method'".into()));
            }
            (CallMode::SingleCall, method, raw.method_args, "method_args")
        }
        (Some(_), Some(_)) => {
            return Err(invalid("only one of 'paginator' or 'method' may be given".into()));
        }
        (None, None) => {
            return Err(invalid("does not have a 'paginator' or 'method' property".into()));
        }
    };

    let arguments = ArgumentSpec::from_raw(args.unwrap_or(Value::Null))
        .map_err(|e| invalid(format!("{args_field}: {e}")))?;

    let pagination = raw.pagination.map_or_else(Pagination::default, |p| {
        let defaults = Pagination::default();
        Pagination {
            input_token: p.input_token.unwrap_or(defaults.input_token),
            output_token: p.output_token.unwrap_or(defaults.output_token),
        }
    });

    MetricDefinition::builder(name)
        .description(raw.description)
        .service(raw.service)
        .operation(operation)
        .mode(mode)
        .pagination(pagination)
        .arguments(arguments)
        .label_names(raw.label_names)
        .search(raw.search)
        .build()
}
