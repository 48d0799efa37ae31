//! Loading metric definition files.

use std::io::Write;

use chrono::{TimeZone, Utc};
use serde_json::json;

use huginn::{ArgumentSpec, CallMode, HuginnError, config};

const PAGINATED_YAML: &str = r#"
ec2_instance_ids:
  description: EC2 instance ids
  service: ec2
  paginator: describe_instances
  paginator_args:
    Filters:
      - Name: instance-state-name
        Values: [ "Running" ]
  label_names:
    - id
  search: |
    Reservations[].Instances[].{id: InstanceId, value: `1`}[]
"#;

const METHOD_YAML: &str = r#"
ec2_instance_ids:
  description: EC2 instance ids
  service: ec2
  method: describe_instances
  method_args:
    Filters:
      - Name: instance-state-name
        Values: [ "Running" ]
  label_names:
    - id
  search: |
    Reservations[].Instances[].{id: InstanceId, value: `1`}[]
"#;

const DEFERRED_ARGS_YAML: &str = r#"
recent_emr_cluster_ids:
  description: Recent EMR cluster ids
  service: emr
  paginator: list_clusters
  paginator_args: |
    {
        "CreatedAfter": datetime(2018,1,1) - timedelta(weeks=4)
    }
  label_names:
    - id
  search: |
    Clusters[].{id: Id, value: `1`}
"#;

const MULTIPLE_YAML: &str = r#"
public_ec2_instance_ids:
  description: EC2 instance ids of instances with a public IP
  service: ec2
  paginator: describe_instances
  paginator_args:
    Filters:
      - Name: instance-state-name
        Values: [ "Running" ]
  label_names:
    - id
  search: |
    Reservations[].Instances[?PublicIpAddress].{id: InstanceId, value: `1`}[]

ssm_agents_ec2_instance_ids:
  description: EC2 instance ids of instances with SSM agent
  service: ssm
  paginator: describe_instance_information
  paginator_args:
    Filters:
      - Key: ResourceType
        Values: [ "EC2Instance" ]
      - Key: PingStatus
        Values: [ "Online" ]
  label_names:
    - id
  search: |
    InstanceInformationList[].{id: InstanceId, value: `1`}[]
"#;

fn config_error(yaml: &str) -> String {
    match config::parse_definitions(yaml) {
        Err(HuginnError::Configuration(message)) => message,
        Err(other) => panic!("expected a configuration error, got {other:?}"),
        Ok(set) => panic!("expected an error, got {} definitions", set.len()),
    }
}

// ============================================================================
// Well-formed files
// ============================================================================

#[test]
fn loads_single_paginated_metric() {
    let set = config::parse_definitions(PAGINATED_YAML).unwrap();
    assert_eq!(set.len(), 1);

    let def = set.get("ec2_instance_ids").unwrap();
    assert_eq!(def.description(), "EC2 instance ids");
    assert_eq!(def.service(), "ec2");
    assert_eq!(def.operation(), "describe_instances");
    assert_eq!(def.call_mode(), CallMode::Paginated);
    assert_eq!(def.label_names(), ["id"]);
    assert_eq!(
        def.search().expression().trim(),
        "Reservations[].Instances[].{id: InstanceId, value: `1`}[]"
    );

    let ArgumentSpec::Literal(args) = def.arguments() else {
        panic!("expected literal arguments");
    };
    assert_eq!(
        serde_json::Value::Object(args.clone()),
        json!({"Filters": [{"Name": "instance-state-name", "Values": ["Running"]}]})
    );
}

#[test]
fn method_selects_single_call() {
    let set = config::parse_definitions(METHOD_YAML).unwrap();
    let def = set.get("ec2_instance_ids").unwrap();
    assert_eq!(def.call_mode(), CallMode::SingleCall);
    assert_eq!(def.operation(), "describe_instances");
    assert!(matches!(def.arguments(), ArgumentSpec::Literal(_)));
}

#[test]
fn deferred_arguments_resolve_per_cycle() {
    let set = config::parse_definitions(DEFERRED_ARGS_YAML).unwrap();
    let def = set.get("recent_emr_cluster_ids").unwrap();
    assert!(matches!(def.arguments(), ArgumentSpec::Deferred(_)));

    let now = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
    let args = def.arguments().resolve(now).unwrap();
    assert_eq!(args["CreatedAfter"], json!("2017-12-04T00:00:00Z"));
}

#[test]
fn multiple_metrics_keep_declaration_order() {
    let set = config::parse_definitions(MULTIPLE_YAML).unwrap();
    let names: Vec<&str> = set.iter().map(|d| d.name()).collect();
    assert_eq!(names, ["public_ec2_instance_ids", "ssm_agents_ec2_instance_ids"]);

    let ssm = set.get("ssm_agents_ec2_instance_ids").unwrap();
    assert_eq!(ssm.service(), "ssm");
    assert_eq!(ssm.operation(), "describe_instance_information");
}

#[test]
fn omitted_arguments_and_labels_default_to_empty() {
    let yaml = "queue_depth:\n  description: d\n  service: sqs\n  method: get_depth\n  search: Depth\n";
    let set = config::parse_definitions(yaml).unwrap();
    let def = set.get("queue_depth").unwrap();
    assert!(def.label_names().is_empty());
    assert!(def.arguments().resolve(Utc::now()).unwrap().is_empty());
}

#[test]
fn custom_pagination_fields() {
    let yaml = r#"
buckets:
  description: buckets
  service: s3
  paginator: list_buckets
  pagination:
    input_token: Marker
  search: |
    Buckets[].{value: `1`}
"#;
    let set = config::parse_definitions(yaml).unwrap();
    let pagination = &set.get("buckets").unwrap().call().pagination;
    assert_eq!(pagination.input_token, "Marker");
    assert_eq!(pagination.output_token, "NextToken");
}

#[test]
fn repeated_metric_name_is_rejected() {
    let yaml = r#"
queue_depth:
  description: first
  service: sqs
  method: get_depth
  search: Depth
queue_depth:
  description: second
  service: sqs
  method: get_depth
  search: Depth
"#;
    let err = config::parse_definitions(yaml).unwrap_err();
    assert!(matches!(err, HuginnError::Configuration(_)), "{err}");
    assert!(err.to_string().contains("duplicate"), "{err}");
}

#[test]
fn load_file_reads_from_disk() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(MULTIPLE_YAML.as_bytes()).unwrap();
    let set = config::load_file(file.path()).unwrap();
    assert_eq!(set.len(), 2);
}

#[test]
fn load_file_reports_missing_file() {
    let err = config::load_file(std::path::Path::new("/nonexistent/metrics.yaml")).unwrap_err();
    assert!(err.to_string().contains("Failed to read metrics file"));
}

// ============================================================================
// Rejected files
// ============================================================================

#[test]
fn rejects_definition_without_call() {
    let message = config_error("m:\n  description: d\n  service: s\n  search: a\n");
    assert!(message.contains("does not have a 'paginator' or 'method'"), "{message}");
}

#[test]
fn rejects_definition_with_both_calls() {
    let message = config_error(
        "m:\n  description: d\n  service: s\n  paginator: p\n  method: o\n  search: a\n",
    );
    assert!(message.contains("only one of"), "{message}");
}

#[test]
fn rejects_mismatched_argument_field() {
    let message = config_error(
        "m:\n  description: d\n  service: s\n  paginator: p\n  method_args: {}\n  search: a\n",
    );
    assert!(message.contains("'method_args' given with 'paginator'"), "{message}");
}

#[test]
fn rejects_invalid_metric_name() {
    let message = config_error("Bad-Name:\n  description: d\n  service: s\n  method: o\n  search: a\n");
    assert!(message.contains("Bad-Name"), "{message}");
}

#[test]
fn rejects_missing_required_fields() {
    let message = config_error("m:\n  service: s\n  method: o\n  search: a\n");
    assert!(message.contains("description"), "{message}");
}

#[test]
fn rejects_invalid_search_expression() {
    let message =
        config_error("m:\n  description: d\n  service: s\n  method: o\n  search: 'a[?'\n");
    assert!(message.contains("search"), "{message}");
}

#[test]
fn rejects_unparseable_deferred_arguments() {
    let message = config_error(
        "m:\n  description: d\n  service: s\n  method: o\n  method_args: '{\"a\": eval(1)}'\n  search: a\n",
    );
    assert!(message.contains("method_args"), "{message}");
}

#[test]
fn rejects_non_mapping_arguments() {
    let message = config_error(
        "m:\n  description: d\n  service: s\n  method: o\n  method_args: [1, 2]\n  search: a\n",
    );
    assert!(message.contains("method_args"), "{message}");
}

#[test]
fn rejects_value_as_label_name() {
    let message = config_error(
        "m:\n  description: d\n  service: s\n  method: o\n  label_names: [value]\n  search: a\n",
    );
    assert!(message.contains("value"), "{message}");
}

#[test]
fn rejects_duplicate_labels() {
    let message = config_error(
        "m:\n  description: d\n  service: s\n  method: o\n  label_names: [id, id]\n  search: a\n",
    );
    assert!(message.contains("id"), "{message}");
}

#[test]
fn rejects_malformed_yaml() {
    let message = config_error("m: [unclosed\n");
    assert!(message.contains("Failed to parse metrics file"), "{message}");
}
