//! Huginn - declarative cloud API calls republished as Prometheus metrics
//!
//! A metric is described once, declaratively: which remote operation to
//! call, with which arguments, how to pull labeled numeric records out of
//! each response page, and which labels those records carry. Huginn runs
//! every definition on a fixed period and serves the latest complete result
//! of each on a Prometheus scrape endpoint.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use huginn::{HttpServiceClient, MetricRegistry, Scheduler, config};
//!
//! #[tokio::main]
//! async fn main() -> huginn::Result<()> {
//!     let definitions = config::parse_definitions(r#"
//! ec2_instances:
//!   description: Running EC2 instances by type
//!   service: ec2
//!   paginator: DescribeInstances
//!   label_names: [instance_type]
//!   search: |
//!     Reservations[].Instances[].{instance_type: InstanceType, value: `1`}[]
//! "#)?;
//!
//!     let registry = MetricRegistry::new(definitions)?;
//!     let client = Arc::new(HttpServiceClient::new("http://127.0.0.1:8080")?);
//!     let scheduler = Scheduler::new(registry.clone(), client).period(Duration::from_secs(60));
//!
//!     scheduler.run_once().await;
//!     println!("{}", registry.render()?);
//!     Ok(())
//! }
//! ```

pub mod arguments;
pub mod client;
pub mod collector;
pub mod config;
pub mod definition;
pub mod error;
pub mod pages;
pub mod query;
pub mod registry;
pub mod scheduler;
#[cfg(feature = "server")]
pub mod server;
pub mod telemetry;

// Re-export main types at crate root
pub use arguments::ArgumentSpec;
pub use client::{
    HttpServiceClient, HttpServiceClientBuilder, PageStream, RetryConfig, RetryingServiceClient,
    ServiceClient,
};
pub use collector::{Sample, Snapshot, collect};
pub use definition::{CallMode, CallSpec, DefinitionSet, MetricDefinition, Pagination};
pub use error::{HuginnError, Result};
pub use pages::pages;
pub use query::{Query, QueryError};
pub use registry::{CycleState, CycleStatus, MetricRegistry, MetricSlot};
pub use scheduler::{RunSummary, Scheduler, SchedulerHandle};

/// Package version.
pub const PKG_VERSION: &str = env!("CARGO_PKG_VERSION");
