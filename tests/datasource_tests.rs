//! External tests for query dispatch: which collaborator is called, with
//! what, and that its stream reaches the caller untouched.

use chrono::{TimeZone, Utc};
use futures_util::{stream, StreamExt};
use proptest::prelude::*;
use std::sync::{Arc, Mutex};

use livefork::{
    DataQuery, DataQueryResponse, DataSource, DataSourceSettings, LiveBufferOptions,
    LiveChannelAddress, LiveChannelScope, LiveStreamService, PluginError, QueryExecutor,
    QueryRequest, ResponseStream, StreamingFrameAction, TimeRange,
};

// -- Recording collaborators ------------------------------------------------

#[derive(Default)]
struct RecordingExecutor {
    calls: Mutex<Vec<QueryRequest>>,
    reply: Vec<Result<DataQueryResponse, PluginError>>,
}

impl QueryExecutor for RecordingExecutor {
    fn execute(&self, request: &QueryRequest) -> ResponseStream {
        self.calls.lock().unwrap().push(request.clone());
        Box::pin(stream::iter(self.reply.clone()))
    }
}

#[derive(Default)]
struct RecordingLive {
    calls: Mutex<Vec<(LiveChannelAddress, LiveBufferOptions)>>,
    reply: Vec<Result<DataQueryResponse, PluginError>>,
}

impl LiveStreamService for RecordingLive {
    fn subscribe(&self, addr: LiveChannelAddress, buffer: LiveBufferOptions) -> ResponseStream {
        self.calls.lock().unwrap().push((addr, buffer));
        Box::pin(stream::iter(self.reply.clone()))
    }
}

fn range() -> TimeRange {
    TimeRange::new(
        Utc.with_ymd_and_hms(2021, 1, 1, 12, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2021, 1, 1, 13, 0, 0).unwrap(),
    )
}

fn request(live: bool) -> QueryRequest {
    QueryRequest::new(vec![DataQuery::new("A")], range()).streaming(live)
}

fn setup(
    uid: &str,
    executor: RecordingExecutor,
    live: RecordingLive,
) -> (DataSource, Arc<RecordingExecutor>, Arc<RecordingLive>) {
    let executor = Arc::new(executor);
    let live = Arc::new(live);
    let ds = DataSource::new(
        DataSourceSettings::new(uid, "Demo"),
        Arc::clone(&executor) as Arc<dyn QueryExecutor>,
        Arc::clone(&live) as Arc<dyn LiveStreamService>,
    );
    (ds, executor, live)
}

// -- Live branch --------------------------------------------------------------

#[tokio::test]
async fn test_live_request_subscribes_once_with_replace() {
    let update = DataQueryResponse::streaming("ds/abc123/stream", vec![]);
    let live = RecordingLive {
        reply: vec![Ok(update.clone())],
        ..Default::default()
    };
    let (ds, executor, live) = setup("abc123", RecordingExecutor::default(), live);

    let out: Vec<_> = ds.query(&request(true)).collect().await;

    assert_eq!(out, vec![Ok(update)]);
    assert!(executor.calls.lock().unwrap().is_empty());
    let calls = live.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    let (addr, buffer) = &calls[0];
    assert_eq!(addr.scope, LiveChannelScope::DataSource);
    assert_eq!(addr.namespace, "abc123");
    assert_eq!(addr.path, "stream");
    assert_eq!(addr.to_string(), "ds/abc123/stream");
    assert_eq!(buffer.action, StreamingFrameAction::Replace);
}

#[tokio::test]
async fn test_live_address_ignores_query_contents() {
    let (ds, _, live) = setup("xyz", RecordingExecutor::default(), RecordingLive::default());
    let mut req = request(true);
    req.queries = vec![
        DataQuery {
            path: Some("other".into()),
            constant: 9.5,
            ..DataQuery::new("Q")
        },
        DataQuery::new("R"),
    ];

    let _ = ds.query(&req).collect::<Vec<_>>().await;

    let calls = live.calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0.to_string(), "ds/xyz/stream");
}

#[tokio::test]
async fn test_live_subscription_error_is_passed_through() {
    let err = PluginError::SubscriptionRejected {
        channel: "ds/abc123/stream".into(),
        reason: "permission denied".into(),
    };
    let live = RecordingLive {
        reply: vec![Err(err.clone())],
        ..Default::default()
    };
    let (ds, executor, _) = setup("abc123", RecordingExecutor::default(), live);

    let out: Vec<_> = ds.query(&request(true)).collect().await;

    assert_eq!(out, vec![Err(err)]);
    assert!(executor.calls.lock().unwrap().is_empty());
}

// -- Backend branch -----------------------------------------------------------

#[tokio::test]
async fn test_one_shot_request_goes_to_executor_unchanged() {
    let answer = DataQueryResponse::done("A", vec![]);
    let executor = RecordingExecutor {
        reply: vec![Ok(answer.clone())],
        ..Default::default()
    };
    let (ds, executor, live) = setup("abc123", executor, RecordingLive::default());
    let req = request(false);

    let out: Vec<_> = ds.query(&req).collect().await;

    assert_eq!(out, vec![Ok(answer)]);
    assert!(live.calls.lock().unwrap().is_empty());
    assert_eq!(*executor.calls.lock().unwrap(), vec![req]);
}

#[tokio::test]
async fn test_missing_flag_is_one_shot() {
    let body = r#"{"queries":[{"refId":"A"}],"range":{"from":"2021-01-01T12:00:00Z","to":"2021-01-01T13:00:00Z"}}"#;
    let req: QueryRequest = serde_json::from_str(body).unwrap();
    let (ds, executor, live) = setup("abc123", RecordingExecutor::default(), RecordingLive::default());

    let _ = ds.query(&req).collect::<Vec<_>>().await;

    assert_eq!(executor.calls.lock().unwrap().len(), 1);
    assert!(live.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_executor_error_is_passed_through() {
    let err = PluginError::Query {
        ref_id: "A".into(),
        reason: "backend unavailable".into(),
    };
    let executor = RecordingExecutor {
        reply: vec![Err(err.clone())],
        ..Default::default()
    };
    let (ds, _, _) = setup("abc123", executor, RecordingLive::default());

    let out: Vec<_> = ds.query(&request(false)).collect().await;
    assert_eq!(out, vec![Err(err)]);
}

#[test]
fn test_query_does_not_poll_the_stream() {
    let (ds, executor, _) = setup("abc123", RecordingExecutor::default(), RecordingLive::default());
    let s = ds.query(&request(false));
    assert_eq!(executor.calls.lock().unwrap().len(), 1);
    let out: Vec<_> = tokio_test::block_on(s.collect());
    assert!(out.is_empty());
}

#[tokio::test]
async fn test_repeated_queries_route_independently() {
    let (ds, executor, live) = setup("abc123", RecordingExecutor::default(), RecordingLive::default());
    for live_flag in [true, false, true, false, false] {
        let _ = ds.query(&request(live_flag)).collect::<Vec<_>>().await;
    }
    assert_eq!(live.calls.lock().unwrap().len(), 2);
    assert_eq!(executor.calls.lock().unwrap().len(), 3);
}

// -- Properties ---------------------------------------------------------------

proptest! {
    #[test]
    fn prop_live_address_is_own_stream_channel(uid in "[A-Za-z0-9_-]{1,16}", n in 0usize..5) {
        let (ds, executor, live) = setup(&uid, RecordingExecutor::default(), RecordingLive::default());
        let queries = (0..n).map(|i| DataQuery::new(format!("Q{i}"))).collect();
        let req = QueryRequest::new(queries, range()).streaming(true);

        let _stream = ds.query(&req);

        let calls = live.calls.lock().unwrap();
        prop_assert_eq!(calls.len(), 1);
        prop_assert_eq!(&calls[0].0.namespace, &uid);
        prop_assert_eq!(calls[0].0.path.as_str(), "stream");
        prop_assert_eq!(calls[0].1.action, StreamingFrameAction::Replace);
        prop_assert!(executor.calls.lock().unwrap().is_empty());
    }
}
