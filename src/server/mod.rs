//! Serving layer for huginnd.
//!
//! This module provides:
//! - Process configuration (`config`): TOML file, remote client, retry
//! - The scrape endpoint (`http`): a small hyper server rendering the
//!   [`MetricRegistry`](crate::MetricRegistry)

pub mod config;
pub mod http;

pub use config::ExporterConfig;
pub use http::{Exporter, serve, serve_listener};
