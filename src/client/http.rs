//! JSON-over-HTTP client.
//!
//! Every operation is a `POST {endpoint}/{operation}` with the call
//! arguments as the JSON body and the response page as the JSON reply.
//! The endpoint for a service is either configured explicitly or derived
//! as `{base_url}/{service}`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use super::ServiceClient;
use crate::{HuginnError, Result, telemetry};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for JSON APIs reachable over HTTP.
#[derive(Clone)]
pub struct HttpServiceClient {
    http: Client,
    base_url: String,
    endpoints: HashMap<String, String>,
    token: Option<String>,
}

impl std::fmt::Debug for HttpServiceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpServiceClient")
            .field("base_url", &self.base_url)
            .field("endpoints", &self.endpoints)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl HttpServiceClient {
    /// Client rooted at `base_url` with default settings.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::builder(base_url).build()
    }

    pub fn builder(base_url: impl Into<String>) -> HttpServiceClientBuilder {
        HttpServiceClientBuilder {
            base_url: base_url.into(),
            endpoints: HashMap::new(),
            token: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// URL that `service.operation` is posted to.
    pub fn url(&self, service: &str, operation: &str) -> String {
        match self.endpoints.get(service) {
            Some(endpoint) => format!("{}/{operation}", endpoint.trim_end_matches('/')),
            None => format!("{}/{service}/{operation}", self.base_url.trim_end_matches('/')),
        }
    }

    async fn send(&self, service: &str, operation: &str, args: &Value) -> Result<Value> {
        let url = self.url(service, operation);
        debug!(%url, "calling remote operation");

        let mut request = self.http.post(&url).json(args);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request
            .send()
            .await
            .map_err(|e| HuginnError::Http(e.to_string()))?;

        let response = handle_response_errors(response, service, operation).await?;
        let body = response
            .bytes()
            .await
            .map_err(|e| HuginnError::Http(e.to_string()))?;
        // A malformed 2xx body is permanent; it must not be retried.
        Ok(serde_json::from_slice(&body)?)
    }
}

async fn handle_response_errors(
    response: reqwest::Response,
    service: &str,
    operation: &str,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match status.as_u16() {
        401 | 403 => Err(HuginnError::AuthenticationFailed),
        404 => Err(HuginnError::UnknownOperation(format!("{service}.{operation}"))),
        429 => {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            Err(HuginnError::RateLimited { retry_after })
        }
        code => {
            let body = response.text().await.unwrap_or_default();
            let message = if body.trim().is_empty() {
                status.to_string()
            } else {
                body.trim().to_string()
            };
            Err(HuginnError::Api {
                status: code,
                message,
            })
        }
    }
}

#[async_trait]
impl ServiceClient for HttpServiceClient {
    fn name(&self) -> &str {
        "http"
    }

    async fn call(&self, service: &str, operation: &str, args: &Value) -> Result<Value> {
        let result = self.send(service, operation, args).await;
        let status = if result.is_ok() { "ok" } else { "error" };
        metrics::counter!(telemetry::REMOTE_CALLS_TOTAL,
            "service" => service.to_owned(),
            "operation" => operation.to_owned(),
            "status" => status,
        )
        .increment(1);
        result
    }
}

/// Builder for [`HttpServiceClient`].
#[derive(Debug, Clone)]
pub struct HttpServiceClientBuilder {
    base_url: String,
    endpoints: HashMap<String, String>,
    token: Option<String>,
    timeout: Duration,
}

impl HttpServiceClientBuilder {
    /// Route `service` to a specific endpoint instead of `{base_url}/{service}`.
    pub fn endpoint(mut self, service: impl Into<String>, url: impl Into<String>) -> Self {
        self.endpoints.insert(service.into(), url.into());
        self
    }

    /// Send `Authorization: Bearer <token>` with every request.
    pub fn bearer_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Per-request timeout (default: 30s).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> Result<HttpServiceClient> {
        let http = Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| HuginnError::Configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(HttpServiceClient {
            http,
            base_url: self.base_url,
            endpoints: self.endpoints,
            token: self.token,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_derives_from_base() {
        let client = HttpServiceClient::new("http://localhost:8080/").unwrap();
        assert_eq!(
            client.url("ec2", "DescribeInstances"),
            "http://localhost:8080/ec2/DescribeInstances"
        );
    }

    #[test]
    fn explicit_endpoint_wins() {
        let client = HttpServiceClient::builder("http://localhost:8080")
            .endpoint("s3", "https://s3.internal/api/")
            .build()
            .unwrap();
        assert_eq!(client.url("s3", "ListBuckets"), "https://s3.internal/api/ListBuckets");
        assert_eq!(client.url("ec2", "X"), "http://localhost:8080/ec2/X");
    }

    #[test]
    fn debug_redacts_token() {
        let client = HttpServiceClient::builder("http://localhost")
            .bearer_token("secret")
            .build()
            .unwrap();
        let debug = format!("{client:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("<redacted>"));
    }
}
