//! Backend data service: answers one-shot queries with generated frames.
//!
//! Every query in a request gets exactly one response, in request order. A
//! query whose path is `stream` also carries the live channel address in its
//! frame metadata so the caller can switch to the push channel.

use futures_util::stream::FuturesOrdered;
use tracing::info;

use crate::data::{Field, FieldValues, Frame};
use crate::datasource::{QueryExecutor, STREAM_PATH};
use crate::error::PluginError;
use crate::live::{LiveChannelAddress, LiveChannelScope, ResponseStream};
use crate::query::{DataQuery, DataQueryResponse, QueryRequest, TimeRange};

/// Default number of rows in each generated frame.
pub const DEFAULT_ROWS: usize = 3;

/// Upper bound on rows per frame.
pub const MAX_ROWS: usize = 100_000;

#[derive(Debug, Clone)]
pub struct DemoDataService {
    uid: Option<String>,
    rows: usize,
}

impl DemoDataService {
    /// `uid` is the owning data source; without one no channel is advertised.
    pub fn new(uid: Option<String>, rows: usize) -> Self {
        Self { uid, rows }
    }

    /// Build the frame answering a single query.
    pub fn frame_for(&self, query: &DataQuery, range: &TimeRange) -> Result<Frame, PluginError> {
        let rows = self.rows;
        let too_many = || PluginError::Query {
            ref_id: query.ref_id.clone(),
            reason: format!("{rows} rows exceeds the limit of {MAX_ROWS}"),
        };
        if rows > MAX_ROWS {
            return Err(too_many());
        }
        let last = u32::try_from(rows).map_err(|_| too_many())?;
        let times = range.spread(rows).ok_or_else(too_many)?;

        let mut frame = Frame::new(query.ref_id.clone())
            .with_field(Field::new("time", FieldValues::Time(times)))
            .with_field(Field::new("x", FieldValues::UInt32((1..=last).collect())))
            .with_field(Field::new("y", FieldValues::Utf8(row_labels(rows))))
            .with_field(Field::new(
                "value",
                FieldValues::Float64(vec![query.constant; rows]),
            ));

        if let Some(uid) = &self.uid {
            if query.path.as_deref() == Some(STREAM_PATH) {
                frame.set_channel(&LiveChannelAddress::new(
                    LiveChannelScope::DataSource,
                    uid.clone(),
                    STREAM_PATH,
                ));
            }
        }

        frame.check().map_err(|e| PluginError::Query {
            ref_id: query.ref_id.clone(),
            reason: e.to_string(),
        })
    }
}

impl QueryExecutor for DemoDataService {
    fn execute(&self, request: &QueryRequest) -> ResponseStream {
        info!(
            queries = request.queries.len(),
            rows = self.rows,
            "Querying data"
        );
        let range = request.range;
        let responses: FuturesOrdered<_> = request
            .queries
            .iter()
            .cloned()
            .map(|query| {
                let service = self.clone();
                async move {
                    let frame = service.frame_for(&query, &range)?;
                    Ok::<_, PluginError>(DataQueryResponse::done(query.ref_id, vec![frame]))
                }
            })
            .collect();
        Box::pin(responses)
    }
}

/// Spreadsheet-style labels: a, b, …, z, aa, ab, …
fn row_labels(n: usize) -> Vec<String> {
    (0..n)
        .map(|mut i| {
            let mut label = Vec::new();
            loop {
                label.push(b'a' + (i % 26) as u8);
                if i < 26 {
                    break;
                }
                i = i / 26 - 1;
            }
            label.reverse();
            String::from_utf8_lossy(&label).into_owned()
        })
        .collect()
}
