//! Remote API clients.
//!
//! [`ServiceClient`] is the only way the engine reaches a cloud API. It
//! knows how to invoke one operation of one service with JSON arguments,
//! and optionally how to paginate it natively. Authentication, signing and
//! transport details stay behind the trait.

mod http;
mod retry;

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use serde_json::Value;

use crate::Result;

pub use http::{HttpServiceClient, HttpServiceClientBuilder};
pub use retry::{RetryConfig, RetryingServiceClient};

/// A lazy, finite sequence of response pages. Consumed once.
pub type PageStream<'a> = Pin<Box<dyn Stream<Item = Result<Value>> + Send + 'a>>;

/// A client able to invoke remote operations.
#[async_trait]
pub trait ServiceClient: Send + Sync {
    /// Name for logging and telemetry.
    fn name(&self) -> &str;

    /// Invoke `service.operation` once and return the decoded response.
    async fn call(&self, service: &str, operation: &str, args: &Value) -> Result<Value>;

    /// Native pagination for `service.operation`, if the client has one.
    ///
    /// Returning `None` makes the caller fall back to a continuation-token
    /// loop over [`call`](Self::call).
    fn paginate<'a>(
        &'a self,
        _service: &'a str,
        _operation: &'a str,
        _args: Value,
    ) -> Option<PageStream<'a>> {
        None
    }
}
