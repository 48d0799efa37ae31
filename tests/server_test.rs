//! Scrape endpoint tests against a real listener.

#![cfg(feature = "server")]

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::net::TcpListener;

use huginn::server::{Exporter, serve_listener};
use huginn::{DefinitionSet, MetricDefinition, MetricRegistry, Result, Scheduler, ServiceClient};

struct Instances;

#[async_trait]
impl ServiceClient for Instances {
    fn name(&self) -> &str {
        "instances"
    }

    async fn call(&self, _service: &str, _operation: &str, _args: &Value) -> Result<Value> {
        Ok(json!({"Reservations": [{"Instances": [
            {"InstanceId": "i-1"},
            {"InstanceId": "i-2"}
        ]}]}))
    }
}

fn registry() -> MetricRegistry {
    let definition = MetricDefinition::builder("ec2_instance_ids")
        .description("EC2 instance ids")
        .service("ec2")
        .operation("describe_instances")
        .label_names(["id"])
        .search("Reservations[].Instances[].{id: InstanceId, value: `1`}[]")
        .build()
        .unwrap();
    MetricRegistry::new(DefinitionSet::new(vec![definition]).unwrap()).unwrap()
}

/// Serve `exporter` on an ephemeral port and return its base URL.
async fn start(exporter: Exporter) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve_listener(listener, exporter));
    format!("http://{addr}")
}

#[tokio::test]
async fn metrics_endpoint_serves_published_snapshots() {
    let registry = registry();
    Scheduler::new(registry.clone(), Arc::new(Instances))
        .run_once()
        .await;
    let base = start(Exporter::new(registry)).await;

    let response = reqwest::get(format!("{base}/metrics")).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["content-type"],
        "text/plain; version=0.0.4; charset=utf-8"
    );
    let body = response.text().await.unwrap();
    assert!(body.contains(r#"ec2_instance_ids{id="i-1"} 1"#), "{body}");
    assert!(body.contains(r#"ec2_instance_ids{id="i-2"} 1"#), "{body}");
}

#[tokio::test]
async fn metrics_endpoint_is_empty_before_first_cycle() {
    let base = start(Exporter::new(registry())).await;
    let response = reqwest::get(format!("{base}/metrics")).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "");
}

#[tokio::test]
async fn scrape_sees_latest_cycle() {
    let registry = registry();
    let base = start(Exporter::new(registry.clone())).await;

    Scheduler::new(registry, Arc::new(Instances)).run_once().await;

    let body = reqwest::get(format!("{base}/metrics"))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert!(body.contains("ec2_instance_ids"), "{body}");
}

#[tokio::test]
async fn health_endpoint() {
    let base = start(Exporter::new(registry())).await;
    let response = reqwest::get(format!("{base}/health")).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "ok\n");
}

#[tokio::test]
async fn unknown_path_is_not_found() {
    let base = start(Exporter::new(registry())).await;
    let response = reqwest::get(format!("{base}/nope")).await.unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn non_get_is_rejected() {
    let base = start(Exporter::new(registry())).await;
    let response = reqwest::Client::new()
        .post(format!("{base}/metrics"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 405);
}
