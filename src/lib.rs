//! Query dispatch for a streaming data source.
//!
//! [`DataSource::query`] looks at one flag on the incoming request: live
//! requests become a subscription to the instance's `ds/<uid>/stream` channel,
//! everything else goes to the backend executor. The rest of the crate is the
//! demo backend behind those two paths and a small HTTP host around them.

pub mod backend;
pub mod cli;
pub mod config;
pub mod data;
pub mod datasource;
pub mod error;
pub mod hub;
pub mod live;
pub mod logging;
pub mod query;
pub mod resources;
pub mod stream;
pub mod web;

pub use backend::DemoDataService;
pub use config::PluginConfig;
pub use data::{Field, FieldValues, Frame, FrameMeta};
pub use datasource::{DataSource, DataSourceSettings, QueryExecutor, STREAM_PATH};
pub use error::{ConfigError, FrameError, PluginError, ResourceError, ServeError};
pub use hub::LiveHub;
pub use live::{
    LiveBufferOptions, LiveChannelAddress, LiveChannelScope, LiveStreamService, ResponseStream,
    StreamingFrameAction,
};
pub use query::{DataQuery, DataQueryResponse, LoadingState, QueryRequest, TimeRange};
pub use resources::{ResourceRequest, ResourceResponse, ResourceService};
pub use stream::{StreamService, SubscribeStatus};
