//! Minimal HTTP/1 endpoint for Prometheus scrapes.
//!
//! - `GET /metrics`: published definition gauges, then huginn's own
//!   telemetry when a recorder handle is attached
//! - `GET /health`: `ok`
//! - anything else: 404

use std::net::SocketAddr;
use std::sync::Arc;

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use crate::registry::MetricRegistry;
use crate::Result;

const TEXT_FORMAT: &str = "text/plain; version=0.0.4; charset=utf-8";

/// What the `/metrics` endpoint renders.
#[derive(Clone)]
pub struct Exporter {
    registry: MetricRegistry,
    telemetry: Option<PrometheusHandle>,
}

impl std::fmt::Debug for Exporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exporter")
            .field("registry", &self.registry)
            .field("telemetry", &self.telemetry.is_some())
            .finish()
    }
}

impl Exporter {
    pub fn new(registry: MetricRegistry) -> Self {
        Self {
            registry,
            telemetry: None,
        }
    }

    /// Append the output of an installed `metrics` recorder to every scrape.
    pub fn with_telemetry(mut self, handle: PrometheusHandle) -> Self {
        self.telemetry = Some(handle);
        self
    }

    pub fn registry(&self) -> &MetricRegistry {
        &self.registry
    }

    /// The full exposition text.
    pub fn render(&self) -> Result<String> {
        let mut body = self.registry.render()?;
        if let Some(handle) = &self.telemetry {
            body.push_str(&handle.render());
        }
        Ok(body)
    }
}

/// Bind `addr` and serve until the process exits.
pub async fn serve(addr: SocketAddr, exporter: Exporter) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "serving metrics");
    serve_listener(listener, exporter).await
}

/// Serve on an already bound listener.
pub async fn serve_listener(listener: TcpListener, exporter: Exporter) -> Result<()> {
    let exporter = Arc::new(exporter);
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!(error = %e, "accept failed");
                continue;
            }
        };
        let exporter = Arc::clone(&exporter);
        tokio::spawn(async move {
            let service = service_fn(move |req: Request<Incoming>| {
                let exporter = Arc::clone(&exporter);
                async move { Ok::<_, hyper::Error>(handle_request(&req, &exporter)) }
            });
            if let Err(e) = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                debug!(%peer, error = %e, "connection error");
            }
        });
    }
}

fn handle_request(req: &Request<Incoming>, exporter: &Exporter) -> Response<Full<Bytes>> {
    if req.method() != Method::GET {
        return text(StatusCode::METHOD_NOT_ALLOWED, "method not allowed\n".into());
    }
    match req.uri().path() {
        "/metrics" => match exporter.render() {
            Ok(body) => Response::builder()
                .status(StatusCode::OK)
                .header("content-type", TEXT_FORMAT)
                .body(Full::new(Bytes::from(body)))
                .unwrap_or_else(|_| Response::new(Full::new(Bytes::new()))),
            Err(e) => {
                warn!(error = %e, "failed to render metrics");
                text(StatusCode::INTERNAL_SERVER_ERROR, format!("{e}\n"))
            }
        },
        "/health" => text(StatusCode::OK, "ok\n".into()),
        _ => text(StatusCode::NOT_FOUND, "not found\n".into()),
    }
}

fn text(status: StatusCode, body: String) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("content-type", "text/plain; charset=utf-8")
        .body(Full::new(Bytes::from(body)))
        .unwrap_or_else(|_| Response::new(Full::new(Bytes::new())))
}
