//! # Live hub
//!
//! In-process [`LiveStreamService`] backed by a [`StreamService`]. Every
//! subscription runs its own copy of the channel; nothing is shared between
//! subscribers.
//!
//! The returned stream is lazy: the channel is only checked and started when
//! the caller first polls it, so `subscribe` itself never blocks and never
//! needs a running timer.

use futures_util::{stream, StreamExt};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::data::Frame;
use crate::error::PluginError;
use crate::live::{
    LiveBufferOptions, LiveChannelAddress, LiveChannelScope, LiveStreamService, ResponseStream,
    StreamingFrameAction,
};
use crate::query::DataQueryResponse;
use crate::stream::{StreamService, SubscribeStatus};

/// Merge `incoming` into the client-visible `buffer` according to `action`.
pub fn apply_frame(action: StreamingFrameAction, buffer: &mut Vec<Frame>, incoming: Frame) {
    match action {
        StreamingFrameAction::Replace => {
            buffer.clear();
            buffer.push(incoming);
        }
    }
}

#[derive(Debug, Clone)]
pub struct LiveHub {
    streams: Arc<StreamService>,
}

impl LiveHub {
    pub fn new(streams: Arc<StreamService>) -> Self {
        Self { streams }
    }

    fn open(
        streams: &StreamService,
        addr: &LiveChannelAddress,
        buffer: LiveBufferOptions,
        subscription: Uuid,
    ) -> Result<ResponseStream, PluginError> {
        if addr.scope != LiveChannelScope::DataSource {
            return Err(PluginError::ChannelNotFound(addr.to_string()));
        }
        match streams.subscribe_stream(&addr.namespace, &addr.path) {
            SubscribeStatus::Ok => {}
            SubscribeStatus::NotFound => {
                return Err(PluginError::ChannelNotFound(addr.to_string()));
            }
            SubscribeStatus::PermissionDenied => {
                return Err(PluginError::SubscriptionRejected {
                    channel: addr.to_string(),
                    reason: "permission denied".to_string(),
                });
            }
        }

        let frames = streams.run_stream(&addr.path)?;
        info!(%subscription, channel = %addr, "subscription started");

        let key = addr.to_string();
        let mut visible: Vec<Frame> = Vec::new();
        let responses = frames.map(move |frame| -> Result<DataQueryResponse, PluginError> {
            let frame = frame?;
            apply_frame(buffer.action, &mut visible, frame);
            Ok(DataQueryResponse::streaming(key.clone(), visible.clone()))
        });
        Ok(Box::pin(responses))
    }
}

impl LiveStreamService for LiveHub {
    fn subscribe(&self, addr: LiveChannelAddress, buffer: LiveBufferOptions) -> ResponseStream {
        let streams = Arc::clone(&self.streams);
        let subscription = Uuid::new_v4();
        let opened = stream::once(async move {
            match Self::open(&streams, &addr, buffer, subscription) {
                Ok(s) => s,
                Err(e) => {
                    warn!(%subscription, channel = %addr, error = %e, "subscription failed");
                    Box::pin(stream::iter([Err(e)])) as ResponseStream
                }
            }
        });
        Box::pin(opened.flatten())
    }
}
