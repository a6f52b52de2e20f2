//! Resource endpoints served next to the query path.
//!
//! A resource call returns an initial response plus a stream of further body
//! chunks, which may be empty (`/echo`) or endless (`/count`).

use futures_util::{stream, Stream, StreamExt};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::wrappers::IntervalStream;
use tracing::debug;

use crate::error::ResourceError;

/// Body chunks following the initial response.
pub type ResourceStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, ResourceError>> + Send>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRequest {
    pub method: String,
    pub path: String,
    pub body: Vec<u8>,
}

impl ResourceRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            body,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl ResourceResponse {
    pub fn ok(body: Vec<u8>) -> Self {
        Self {
            status: 200,
            content_type: "text/plain",
            body,
        }
    }
}

impl From<ResourceError> for ResourceResponse {
    fn from(e: ResourceError) -> Self {
        Self {
            status: e.status_code(),
            content_type: "text/plain",
            body: e.to_string().into_bytes(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ResourceService {
    count: Arc<AtomicUsize>,
    interval: Duration,
}

impl ResourceService {
    /// `interval` paces the values streamed by `/count`.
    pub fn new(interval: Duration) -> Self {
        Self {
            count: Arc::new(AtomicUsize::new(0)),
            interval,
        }
    }

    pub fn call_resource(
        &self,
        request: ResourceRequest,
    ) -> Result<(ResourceResponse, ResourceStream), ResourceError> {
        debug!(method = %request.method, path = %request.path, "resource call");
        match request.path.as_str() {
            "/echo" => Ok((
                ResourceResponse::ok(request.body),
                Box::pin(stream::empty()) as ResourceStream,
            )),
            "/count" => {
                if request.method != "GET" {
                    return Err(ResourceError::MethodNotAllowed {
                        method: request.method,
                        path: request.path,
                    });
                }
                let initial = self.count.fetch_add(1, Ordering::SeqCst);
                let count = Arc::clone(&self.count);
                let mut ticks = tokio::time::interval(self.interval);
                // The initial response already covers the first tick.
                ticks.reset();
                let rest = IntervalStream::new(ticks).map(move |_| {
                    Ok::<_, ResourceError>(count.fetch_add(1, Ordering::SeqCst).to_string().into_bytes())
                });
                Ok((
                    ResourceResponse::ok(initial.to_string().into_bytes()),
                    Box::pin(rest) as ResourceStream,
                ))
            }
            _ => Err(ResourceError::NotFound(request.path)),
        }
    }
}
