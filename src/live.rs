//! Live channel addressing and the subscription seam.
//!
//! A live channel is identified by a [`LiveChannelAddress`]: a scope, a
//! namespace inside that scope, and a path. Addresses render as
//! `scope/namespace/path`, e.g. `ds/YlAe8PmVk/stream`.

use futures_util::Stream;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::pin::Pin;
use std::str::FromStr;

use crate::error::PluginError;
use crate::query::DataQueryResponse;

/// One item of a [`ResponseStream`].
pub type DataResult = Result<DataQueryResponse, PluginError>;

/// Lazy, possibly endless sequence of response batches.
///
/// Dropping the stream cancels whatever produces it.
pub type ResponseStream = Pin<Box<dyn Stream<Item = DataResult> + Send>>;

// ---------------------------------------------------------------------------
// Channel scope
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LiveChannelScope {
    #[serde(rename = "grafana")]
    Grafana,
    #[serde(rename = "plugin")]
    Plugin,
    /// Channels owned by one data-source instance; the namespace is its uid.
    #[serde(rename = "ds")]
    DataSource,
    #[serde(rename = "stream")]
    Stream,
}

impl LiveChannelScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            LiveChannelScope::Grafana => "grafana",
            LiveChannelScope::Plugin => "plugin",
            LiveChannelScope::DataSource => "ds",
            LiveChannelScope::Stream => "stream",
        }
    }
}

impl fmt::Display for LiveChannelScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LiveChannelScope {
    type Err = PluginError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "grafana" => Ok(LiveChannelScope::Grafana),
            "plugin" => Ok(LiveChannelScope::Plugin),
            "ds" => Ok(LiveChannelScope::DataSource),
            "stream" => Ok(LiveChannelScope::Stream),
            other => Err(PluginError::InvalidAddress(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Channel address
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LiveChannelAddress {
    pub scope: LiveChannelScope,
    pub namespace: String,
    pub path: String,
}

impl LiveChannelAddress {
    pub fn new(
        scope: LiveChannelScope,
        namespace: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            scope,
            namespace: namespace.into(),
            path: path.into(),
        }
    }
}

impl fmt::Display for LiveChannelAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.scope, self.namespace, self.path)
    }
}

impl FromStr for LiveChannelAddress {
    type Err = PluginError;

    /// Parse `scope/namespace/path`. The path may itself contain `/`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PluginError::InvalidAddress(s.to_string());
        let mut parts = s.splitn(3, '/');
        let scope = parts.next().ok_or_else(invalid)?;
        let namespace = parts.next().filter(|n| !n.is_empty()).ok_or_else(invalid)?;
        let path = parts.next().filter(|p| !p.is_empty()).ok_or_else(invalid)?;
        Ok(Self {
            scope: scope.parse().map_err(|_| invalid())?,
            namespace: namespace.to_string(),
            path: path.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Buffer policy
// ---------------------------------------------------------------------------

/// How a newly arrived frame is merged into the client-visible buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamingFrameAction {
    /// The incoming frame replaces everything buffered so far.
    Replace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveBufferOptions {
    pub action: StreamingFrameAction,
}

impl LiveBufferOptions {
    pub fn replace() -> Self {
        Self {
            action: StreamingFrameAction::Replace,
        }
    }
}

// ---------------------------------------------------------------------------
// Service seam
// ---------------------------------------------------------------------------

/// The host's live-data subsystem, as seen by a data source.
pub trait LiveStreamService: Send + Sync {
    /// Subscribe to the channel at `addr`. Returns immediately; failures such as
    /// an unknown channel arrive as the first item of the stream.
    fn subscribe(&self, addr: LiveChannelAddress, buffer: LiveBufferOptions) -> ResponseStream;
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_address_display() {
        let addr = LiveChannelAddress::new(LiveChannelScope::DataSource, "YlAe8PmVk", "stream");
        assert_eq!(addr.to_string(), "ds/YlAe8PmVk/stream");
    }

    #[test]
    fn test_address_parse_keeps_nested_path() {
        let addr: LiveChannelAddress = "plugin/my-plugin/a/b/c".parse().unwrap();
        assert_eq!(addr.scope, LiveChannelScope::Plugin);
        assert_eq!(addr.namespace, "my-plugin");
        assert_eq!(addr.path, "a/b/c");
    }

    #[rstest]
    #[case("")]
    #[case("ds")]
    #[case("ds/uid")]
    #[case("ds//stream")]
    #[case("ds/uid/")]
    #[case("nope/uid/stream")]
    fn test_address_parse_rejects(#[case] input: &str) {
        assert_eq!(
            input.parse::<LiveChannelAddress>(),
            Err(PluginError::InvalidAddress(input.to_string()))
        );
    }

    #[rstest]
    #[case(LiveChannelScope::Grafana, "grafana")]
    #[case(LiveChannelScope::Plugin, "plugin")]
    #[case(LiveChannelScope::DataSource, "ds")]
    #[case(LiveChannelScope::Stream, "stream")]
    fn test_scope_wire_names(#[case] scope: LiveChannelScope, #[case] name: &str) {
        assert_eq!(scope.as_str(), name);
        assert_eq!(serde_json::to_value(scope).unwrap(), name);
    }

    #[test]
    fn test_buffer_options_serialize_lowercase() {
        let json = serde_json::to_string(&LiveBufferOptions::replace()).unwrap();
        assert_eq!(json, r#"{"action":"replace"}"#);
    }
}
