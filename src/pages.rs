//! Remote call driver.
//!
//! [`pages`] hides the difference between single-shot operations,
//! operations the client can paginate natively and operations that need a
//! manual continuation-token loop. Callers always get one lazy stream of
//! response pages.

use std::collections::HashSet;

use futures_util::stream::{self, StreamExt, TryStreamExt};
use serde_json::{Map, Value};
use tracing::debug;

use crate::client::{PageStream, ServiceClient};
use crate::definition::{CallMode, CallSpec};
use crate::{HuginnError, Result};

/// Stream the response pages for `call` with the given arguments.
///
/// Nothing is requested until the stream is polled. Any call failure is
/// yielded as a [`HuginnError::RemoteCall`] and ends the stream.
pub fn pages<'a>(
    client: &'a dyn ServiceClient,
    call: &'a CallSpec,
    args: Map<String, Value>,
) -> PageStream<'a> {
    let args = Value::Object(args);
    let pages = match call.mode {
        CallMode::SingleCall => stream::once(async move {
            client.call(&call.service, &call.operation, &args).await
        })
        .boxed(),
        CallMode::Paginated => client
            .paginate(&call.service, &call.operation, args.clone())
            .unwrap_or_else(|| manual(client, call, args)),
    };

    // Stop at the first error so a failed cycle never sees later pages.
    let mut failed = false;
    pages
        .map_err(move |e| remote_call_error(call, e))
        .take_while(move |page| {
            let keep = !failed;
            failed |= page.is_err();
            futures_util::future::ready(keep)
        })
        .boxed()
}

struct Cursor {
    args: Value,
    sent: Option<String>,
    seen: HashSet<String>,
    done: bool,
}

/// Continuation-token loop over [`ServiceClient::call`].
fn manual<'a>(client: &'a dyn ServiceClient, call: &'a CallSpec, args: Value) -> PageStream<'a> {
    let cursor = Cursor {
        args,
        sent: None,
        seen: HashSet::new(),
        done: false,
    };

    stream::try_unfold(cursor, move |mut cursor| async move {
        if cursor.done {
            return Ok(None);
        }
        let mut args = cursor.args.clone();
        if let (Some(token), Value::Object(map)) = (&cursor.sent, &mut args) {
            map.insert(call.pagination.input_token.clone(), Value::String(token.clone()));
        }

        let page = client.call(&call.service, &call.operation, &args).await?;
        let next = next_token(&page, &call.pagination.output_token);
        debug!(
            service = %call.service,
            operation = %call.operation,
            has_more = next.is_some(),
            "fetched page"
        );

        match next {
            // Any repeat means the remote is cycling.
            Some(token) if !cursor.seen.insert(token.clone()) => {
                return Err(HuginnError::RemoteCall {
                    service: call.service.clone(),
                    operation: call.operation.clone(),
                    reason: format!("continuation token '{token}' was already followed"),
                });
            }
            Some(token) => cursor.sent = Some(token),
            None => cursor.done = true,
        }
        Ok::<_, HuginnError>(Some((page, cursor)))
    })
    .boxed()
}

/// The continuation token in `page`, if pagination should continue.
///
/// Absent, `null` and empty-string tokens all end pagination. Non-string
/// tokens are passed back in their JSON text form.
pub fn next_token(page: &Value, field: &str) -> Option<String> {
    match page.get(field)? {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn remote_call_error(call: &CallSpec, error: HuginnError) -> HuginnError {
    match error {
        already @ HuginnError::RemoteCall { .. } => already,
        other => HuginnError::RemoteCall {
            service: call.service.clone(),
            operation: call.operation.clone(),
            reason: other.to_string(),
        },
    }
}

/// Drain a page stream into memory.
pub async fn collect_pages(pages: PageStream<'_>) -> Result<Vec<Value>> {
    pages.try_collect().await
}
