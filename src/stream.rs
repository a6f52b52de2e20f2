//! Stream service: produces the frames behind this data source's live channels.
//!
//! Only the `stream` path is served. Running it yields a single-field frame
//! whose `x` column advances by `batch_size` consecutive integers per tick.

use futures_util::{future, Stream, StreamExt};
use std::ops::Range;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio_stream::wrappers::IntervalStream;
use tracing::{debug, info};

use crate::data::{Field, FieldValues, Frame};
use crate::datasource::STREAM_PATH;
use crate::error::PluginError;

/// Name of the frame emitted on the live channel.
pub const STREAM_FRAME_NAME: &str = "stream";

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_BATCH_SIZE: u32 = 3;

/// Frames produced by a running channel.
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<Frame, PluginError>> + Send>>;

/// Answer to a subscription request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscribeStatus {
    Ok,
    NotFound,
    PermissionDenied,
}

#[derive(Debug, Clone)]
pub struct StreamService {
    namespace: String,
    interval: Duration,
    batch_size: u32,
}

impl StreamService {
    pub fn new(namespace: impl Into<String>, interval: Duration, batch_size: u32) -> Self {
        Self {
            namespace: namespace.into(),
            interval,
            batch_size,
        }
    }

    /// Channels under another data source's namespace are refused outright.
    pub fn subscribe_stream(&self, namespace: &str, path: &str) -> SubscribeStatus {
        info!(namespace, path, "Subscribing to stream");
        if namespace != self.namespace {
            SubscribeStatus::PermissionDenied
        } else if path == STREAM_PATH {
            SubscribeStatus::Ok
        } else {
            SubscribeStatus::NotFound
        }
    }

    /// Start producing frames for `path`. The first frame is ready immediately,
    /// later ones follow at the configured interval.
    pub fn run_stream(&self, path: &str) -> Result<FrameStream, PluginError> {
        if path != STREAM_PATH {
            return Err(PluginError::ChannelNotFound(format!(
                "ds/{}/{}",
                self.namespace, path
            )));
        }
        info!(path, namespace = %self.namespace, "Running stream");

        let n = self.batch_size;
        let channel = format!("ds/{}/{}", self.namespace, path);
        let mut frame =
            Frame::new(STREAM_FRAME_NAME).with_field(Field::new("x", FieldValues::UInt32(vec![])));
        let ticks = IntervalStream::new(tokio::time::interval(self.interval));
        let frames = ticks.enumerate().map(move |(tick, _)| -> Result<Frame, PluginError> {
            let window =
                batch_window(tick, n).ok_or_else(|| PluginError::StreamExhausted(channel.clone()))?;
            debug!("Yielding frame from {} to {}", window.start, window.end);
            frame.fields_mut()[0].set_values(FieldValues::UInt32(window.collect()))?;
            Ok(frame.clone().check()?)
        });

        Ok(Box::pin(ClientDisconnect::new(
            end_on_error(frames),
            self.namespace.clone(),
            path.to_string(),
        )))
    }

    /// Clients may not push data into plugin channels.
    pub fn publish_stream(&self, path: &str) -> Result<(), PluginError> {
        info!(path, "Publishing to stream");
        Err(PluginError::PublishDenied(format!(
            "ds/{}/{}",
            self.namespace, path
        )))
    }
}

/// Values carried by the frame for `tick`: `n` integers starting at `tick * n`.
/// `None` once they no longer fit in a `u32`.
fn batch_window(tick: usize, n: u32) -> Option<Range<u32>> {
    let start = u32::try_from(tick).ok()?.checked_mul(n)?;
    let end = start.checked_add(n)?;
    Some(start..end)
}

/// Ends `inner` right after the first error it yields.
fn end_on_error<S, T>(inner: S) -> impl Stream<Item = Result<T, PluginError>> + Unpin
where
    S: Stream<Item = Result<T, PluginError>> + Unpin,
{
    inner.scan(false, |failed, item| {
        if *failed {
            return future::ready(None);
        }
        *failed = item.is_err();
        future::ready(Some(item))
    })
}

impl Default for StreamService {
    fn default() -> Self {
        Self::new(String::new(), DEFAULT_INTERVAL, DEFAULT_BATCH_SIZE)
    }
}

// ---------------------------------------------------------------------------
// Disconnect notification
// ---------------------------------------------------------------------------

/// Passes items through and logs once the consumer drops the stream.
pub struct ClientDisconnect<S> {
    inner: S,
    namespace: String,
    path: String,
}

impl<S> ClientDisconnect<S> {
    pub fn new(inner: S, namespace: String, path: String) -> Self {
        Self {
            inner,
            namespace,
            path,
        }
    }
}

impl<S> Stream for ClientDisconnect<S>
where
    S: Stream + Unpin,
{
    type Item = S::Item;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

impl<S> Drop for ClientDisconnect<S> {
    fn drop(&mut self) {
        info!(
            namespace = %self.namespace,
            path = %self.path,
            "client disconnected"
        );
    }
}
