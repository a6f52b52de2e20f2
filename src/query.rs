//! Query requests and responses.
//!
//! JSON field names follow the camelCase wire format used by the front end
//! (`refId`, `liveStreaming`, `withStreaming`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::data::Frame;

/// Absolute time range shared by every query in a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { from, to }
    }

    /// `n` timestamps evenly spaced from `from` towards `to`, starting at `from`.
    ///
    /// An inverted range yields `n` copies of `from`. `None` if `n` does not
    /// fit in an `i32`.
    pub fn spread(&self, n: usize) -> Option<Vec<DateTime<Utc>>> {
        let count = i32::try_from(n).ok()?;
        if count == 0 {
            return Some(Vec::new());
        }
        let span = (self.to - self.from).max(chrono::Duration::zero());
        let step = span / count;
        Some((0..count).map(|i| self.from + step * i).collect())
    }
}

/// The per-query model understood by this data source.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataQuery {
    #[serde(rename = "refId")]
    pub ref_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default)]
    pub constant: f64,
    #[serde(rename = "withStreaming", default)]
    pub with_streaming: bool,
}

impl DataQuery {
    pub fn new(ref_id: impl Into<String>) -> Self {
        Self {
            ref_id: ref_id.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryRequest {
    #[serde(default)]
    pub queries: Vec<DataQuery>,
    pub range: TimeRange,
    /// Caller wants a continuously updated result instead of a one-shot answer.
    #[serde(rename = "liveStreaming", default)]
    pub live_streaming: bool,
    #[serde(rename = "requestId", default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl QueryRequest {
    pub fn new(queries: Vec<DataQuery>, range: TimeRange) -> Self {
        Self {
            queries,
            range,
            live_streaming: false,
            request_id: None,
        }
    }

    pub fn streaming(mut self, live: bool) -> Self {
        self.live_streaming = live;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadingState {
    Done,
    Streaming,
}

/// One batch of frames delivered to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataQueryResponse {
    /// The refId for one-shot answers, the channel address for live updates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub data: Vec<Frame>,
    pub state: LoadingState,
}

impl DataQueryResponse {
    pub fn done(key: impl Into<String>, data: Vec<Frame>) -> Self {
        Self {
            key: Some(key.into()),
            data,
            state: LoadingState::Done,
        }
    }

    pub fn streaming(key: impl Into<String>, data: Vec<Frame>) -> Self {
        Self {
            key: Some(key.into()),
            data,
            state: LoadingState::Streaming,
        }
    }
}
