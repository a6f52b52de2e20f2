//! End-to-end tests: the wired-up data source, the live hub and the HTTP
//! host on an ephemeral port.

use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;

use livefork::web::{self, AppState};
use livefork::{
    DataQuery, FieldValues, LoadingState, PluginConfig, PluginError, QueryRequest, TimeRange,
};

fn config() -> PluginConfig {
    let mut config = PluginConfig::default();
    config.datasource.uid = "abc123".to_string();
    config.stream.interval_ms = 10;
    config
}

fn range() -> TimeRange {
    let from = "2021-01-01T12:00:00Z".parse().unwrap();
    let to = "2021-01-01T12:00:30Z".parse().unwrap();
    TimeRange::new(from, to)
}

// -- In-process -----------------------------------------------------------------

#[tokio::test]
async fn test_live_query_streams_replaced_frames() {
    let state = AppState::from_config(&config());
    let req = QueryRequest::new(vec![DataQuery::new("A")], range()).streaming(true);

    let out: Vec<_> = state.datasource.query(&req).take(3).collect().await;

    assert_eq!(out.len(), 3);
    for (i, item) in out.iter().enumerate() {
        let resp = item.as_ref().unwrap();
        assert_eq!(resp.state, LoadingState::Streaming);
        assert_eq!(resp.key.as_deref(), Some("ds/abc123/stream"));
        assert_eq!(resp.data.len(), 1, "replace keeps a single frame");
        let start = (i as u32) * 3;
        assert_eq!(
            resp.data[0].fields[0].values,
            FieldValues::UInt32(vec![start, start + 1, start + 2])
        );
    }
}

#[tokio::test]
async fn test_one_shot_query_answers_each_ref_in_order() {
    let state = AppState::from_config(&config());
    let req = QueryRequest::new(
        vec![DataQuery::new("A"), DataQuery::new("B"), DataQuery::new("C")],
        range(),
    );

    let out: Vec<_> = state.datasource.query(&req).collect().await;

    let keys: Vec<_> = out
        .iter()
        .map(|r| r.as_ref().unwrap().key.clone().unwrap())
        .collect();
    assert_eq!(keys, vec!["A", "B", "C"]);
    assert!(out
        .iter()
        .all(|r| r.as_ref().unwrap().state == LoadingState::Done));
}

#[tokio::test]
async fn test_foreign_namespace_is_rejected() {
    use livefork::{LiveBufferOptions, LiveChannelAddress, LiveStreamService};

    let state = AppState::from_config(&config());
    let addr: LiveChannelAddress = "ds/someone-else/stream".parse().unwrap();
    let out: Vec<_> = state
        .hub
        .subscribe(addr, LiveBufferOptions::replace())
        .collect()
        .await;
    assert!(matches!(
        out.as_slice(),
        [Err(PluginError::SubscriptionRejected { .. })]
    ));
}

// -- Over TCP -------------------------------------------------------------------

async fn start() -> (String, watch::Sender<bool>, tokio::task::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let state = Arc::new(AppState::from_config(&config()));
    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(async move {
        web::run(listener, state, rx).await.unwrap();
    });
    (addr, tx, handle)
}

async fn read_until(stream: &mut TcpStream, needle: &str, occurrences: usize) -> String {
    let mut out = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        let n = stream.read(&mut buf).await.unwrap();
        assert!(n > 0, "connection closed early");
        out.extend_from_slice(&buf[..n]);
        let text = String::from_utf8_lossy(&out);
        if text.matches(needle).count() >= occurrences {
            return text.into_owned();
        }
    }
}

#[tokio::test]
async fn test_http_live_query_is_server_sent_events() {
    let (addr, tx, handle) = start().await;
    let mut stream = TcpStream::connect(&addr).await.unwrap();
    let body = r#"{"queries":[{"refId":"A"}],"range":{"from":"2021-01-01T12:00:00Z","to":"2021-01-01T12:00:30Z"},"liveStreaming":true}"#;
    let raw = format!(
        "POST /api/ds/query HTTP/1.1\r\nHost: x\r\nContent-Length: {}\r\n\r\n{}",
        body.len(),
        body
    );
    stream.write_all(raw.as_bytes()).await.unwrap();

    let text = tokio::time::timeout(Duration::from_secs(5), read_until(&mut stream, "data: ", 2))
        .await
        .unwrap();
    assert!(text.starts_with("HTTP/1.1 200 OK"));
    assert!(text.contains("text/event-stream"));
    assert!(text.contains(r#""state":"streaming""#));
    assert!(text.contains(r#""key":"ds/abc123/stream""#));

    drop(stream);
    tx.send(true).unwrap();
    handle.await.unwrap();
}

#[tokio::test]
async fn test_http_health_and_shutdown() {
    let (addr, tx, handle) = start().await;
    let mut stream = TcpStream::connect(&addr).await.unwrap();
    stream
        .write_all(b"GET /health HTTP/1.1\r\nHost: x\r\n\r\n")
        .await
        .unwrap();
    let mut out = String::new();
    stream.read_to_string(&mut out).await.unwrap();
    assert!(out.starts_with("HTTP/1.1 200 OK"));

    tx.send(true).unwrap();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
}
