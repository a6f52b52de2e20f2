//! # Query dispatch
//!
//! [`DataSource`] is the entry point the host calls once per user-issued
//! query. It forks on [`QueryRequest::live_streaming`]:
//!
//! - live requests become a subscription to this instance's `stream` channel
//!   through the injected [`LiveStreamService`], with a `replace` buffer;
//! - everything else goes to the injected [`QueryExecutor`].
//!
//! Both branches hand back the collaborator's stream untouched. The
//! dispatcher keeps no state between calls and never polls the stream itself.

use std::sync::Arc;
use tracing::debug;

use crate::live::{
    LiveBufferOptions, LiveChannelAddress, LiveChannelScope, LiveStreamService, ResponseStream,
};
use crate::query::QueryRequest;

/// Channel path every live request is routed to.
pub const STREAM_PATH: &str = "stream";

/// The standard request/response query path.
pub trait QueryExecutor: Send + Sync {
    fn execute(&self, request: &QueryRequest) -> ResponseStream;
}

/// Identity of one provisioned data-source instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataSourceSettings {
    /// Stable identifier assigned at provisioning time. Used as the live
    /// channel namespace.
    pub uid: String,
    pub name: String,
}

impl DataSourceSettings {
    pub fn new(uid: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            uid: uid.into(),
            name: name.into(),
        }
    }
}

pub struct DataSource {
    settings: DataSourceSettings,
    executor: Arc<dyn QueryExecutor>,
    live: Arc<dyn LiveStreamService>,
}

impl DataSource {
    pub fn new(
        settings: DataSourceSettings,
        executor: Arc<dyn QueryExecutor>,
        live: Arc<dyn LiveStreamService>,
    ) -> Self {
        Self {
            settings,
            executor,
            live,
        }
    }

    pub fn settings(&self) -> &DataSourceSettings {
        &self.settings
    }

    /// Address of this instance's live channel.
    pub fn stream_address(&self) -> LiveChannelAddress {
        LiveChannelAddress::new(
            LiveChannelScope::DataSource,
            self.settings.uid.clone(),
            STREAM_PATH,
        )
    }

    /// Route `request` to exactly one collaborator and return its stream.
    pub fn query(&self, request: &QueryRequest) -> ResponseStream {
        if request.live_streaming {
            let addr = self.stream_address();
            debug!(channel = %addr, queries = request.queries.len(), "routing query to live channel");
            return self.live.subscribe(addr, LiveBufferOptions::replace());
        }
        debug!(
            datasource = %self.settings.uid,
            queries = request.queries.len(),
            "routing query to backend"
        );
        self.executor.execute(request)
    }
}

impl std::fmt::Debug for DataSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DataSource")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}
