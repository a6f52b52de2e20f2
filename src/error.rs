//! Crate-level error types.
//!
//! [`PluginError`] is the single error type carried by every
//! [`ResponseStream`](crate::live::ResponseStream). Both collaborators of the
//! dispatcher produce it, so a failure travels from the collaborator to the
//! caller without being wrapped. It is `Clone + PartialEq` so tests can assert
//! that exactly the same error came out the other end.

use std::path::PathBuf;
use thiserror::Error;

/// Failures raised by the data service, the stream service or the live hub.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PluginError {
    /// A single query could not be answered.
    #[error("error querying backend for {ref_id}: {reason}")]
    Query { ref_id: String, reason: String },

    /// A frame failed validation.
    #[error("invalid frame: {0}")]
    Frame(#[from] FrameError),

    /// No channel is served at this address.
    #[error("channel not found: {0}")]
    ChannelNotFound(String),

    /// The channel exists but refused the subscriber.
    #[error("subscription to {channel} rejected: {reason}")]
    SubscriptionRejected { channel: String, reason: String },

    /// Clients may not publish into plugin channels.
    #[error("publishing to {0} is not permitted")]
    PublishDenied(String),

    /// A channel address string could not be parsed.
    #[error("invalid channel address '{0}'")]
    InvalidAddress(String),

    /// A live channel ran past the last value it can represent.
    #[error("stream {0} has no values left")]
    StreamExhausted(String),
}

/// Structural problems with a [`Frame`](crate::data::Frame).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    #[error("field '{field}' has {actual} values, expected {expected}")]
    LengthMismatch {
        field: String,
        expected: usize,
        actual: usize,
    },

    #[error("duplicate field name '{0}'")]
    DuplicateField(String),

    #[error("cannot store {actual} values in {expected} field '{field}'")]
    TypeMismatch {
        field: String,
        expected: &'static str,
        actual: &'static str,
    },
}

/// Errors surfaced by the resource endpoints. Each maps onto an HTTP status.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Method {method} not allowed on {path}")]
    MethodNotAllowed { method: String, path: String },
}

impl ResourceError {
    /// HTTP status code returned to the caller for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            ResourceError::NotFound(_) => 404,
            ResourceError::MethodNotAllowed { .. } => 405,
        }
    }
}

/// Problems loading or validating [`PluginConfig`](crate::config::PluginConfig).
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Errors that stop the HTTP host.
#[derive(Debug, Error)]
pub enum ServeError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid log filter: {0}")]
    LogFilter(#[from] tracing_subscriber::filter::ParseError),

    #[error("failed to initialise logging: {0}")]
    Logging(#[from] tracing_subscriber::util::TryInitError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}
