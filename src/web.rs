//! HTTP host for the data source.
//!
//! A small hand-rolled server on a tokio [`TcpListener`]. Requests are parsed
//! with `httparse`; every connection serves one request and is then closed.
//!
//! | Route                                   | Behaviour                                  |
//! |-----------------------------------------|--------------------------------------------|
//! | `GET /health`                           | `200 ok`                                   |
//! | `POST /api/ds/query`                    | dispatch; SSE for live, JSON otherwise     |
//! | `GET /api/live/<scope>/<ns>/<path>`     | subscribe with a `replace` buffer, as SSE  |
//! | `POST /api/live/publish/<scope>/<ns>/…` | always `403`                               |
//! | `* /api/resources/<path>`               | resource call, chunked body                |

use colored::*;
use futures_util::StreamExt;
use serde::Serialize;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::backend::DemoDataService;
use crate::config::PluginConfig;
use crate::datasource::{DataSource, DataSourceSettings};
use crate::error::{PluginError, ServeError};
use crate::hub::LiveHub;
use crate::live::{LiveBufferOptions, LiveChannelAddress, LiveStreamService, ResponseStream};
use crate::query::{DataQueryResponse, QueryRequest};
use crate::resources::{ResourceRequest, ResourceResponse, ResourceService};
use crate::stream::StreamService;

const MAX_HEADERS: usize = 32;
const MAX_HEAD_BYTES: usize = 16 * 1024;
const MAX_BODY_BYTES: usize = 1024 * 1024;

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Everything a connection handler needs, wired from one [`PluginConfig`].
pub struct AppState {
    pub datasource: DataSource,
    pub hub: Arc<LiveHub>,
    pub streams: Arc<StreamService>,
    pub resources: ResourceService,
}

impl AppState {
    pub fn from_config(config: &PluginConfig) -> Self {
        let uid = config.datasource.uid.clone();
        let streams = Arc::new(StreamService::new(
            uid.clone(),
            config.stream.interval(),
            config.stream.batch_size,
        ));
        let hub = Arc::new(LiveHub::new(Arc::clone(&streams)));
        let executor = Arc::new(DemoDataService::new(Some(uid.clone()), config.query.rows));
        let datasource = DataSource::new(
            DataSourceSettings::new(uid, config.datasource.name.clone()),
            executor,
            Arc::clone(&hub) as Arc<dyn LiveStreamService>,
        );
        Self {
            datasource,
            hub,
            streams,
            resources: ResourceService::new(config.stream.interval()),
        }
    }
}

// ---------------------------------------------------------------------------
// Request parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: String,
    /// Request target with any query string removed.
    pub path: String,
    pub body: Vec<u8>,
}

/// Read one request. `Ok(None)` means the peer closed before sending anything.
pub async fn read_request<R>(stream: &mut R) -> Result<Option<HttpRequest>, String>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::with_capacity(4096);
    let mut chunk = [0u8; 4096];
    loop {
        let n = stream.read(&mut chunk).await.map_err(|e| e.to_string())?;
        if n == 0 {
            if buf.is_empty() {
                return Ok(None);
            }
            return Err("connection closed mid-request".to_string());
        }
        buf.extend_from_slice(&chunk[..n]);

        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut req = httparse::Request::new(&mut headers);
        match req.parse(&buf) {
            Ok(httparse::Status::Complete(head_len)) => {
                let method = req.method.unwrap_or("GET").to_string();
                let target = req.path.unwrap_or("/").to_string();
                let content_length = match req
                    .headers
                    .iter()
                    .find(|h| h.name.eq_ignore_ascii_case("content-length"))
                {
                    Some(h) => std::str::from_utf8(h.value)
                        .ok()
                        .and_then(|v| v.trim().parse::<usize>().ok())
                        .ok_or_else(|| "invalid content-length".to_string())?,
                    None => 0,
                };
                if content_length > MAX_BODY_BYTES {
                    return Err(format!("body of {content_length} bytes is too large"));
                }

                let mut body = buf[head_len..].to_vec();
                while body.len() < content_length {
                    let n = stream.read(&mut chunk).await.map_err(|e| e.to_string())?;
                    if n == 0 {
                        return Err("connection closed mid-body".to_string());
                    }
                    body.extend_from_slice(&chunk[..n]);
                }
                body.truncate(content_length);

                let path = match target.split_once('?') {
                    Some((p, _)) => p.to_string(),
                    None => target,
                };
                return Ok(Some(HttpRequest { method, path, body }));
            }
            Ok(httparse::Status::Partial) => {
                if buf.len() > MAX_HEAD_BYTES {
                    return Err("request head too large".to_string());
                }
            }
            Err(e) => return Err(e.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Response writing
// ---------------------------------------------------------------------------

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        _ => "Internal Server Error",
    }
}

async fn write_response<W>(w: &mut W, status: u16, content_type: &str, body: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let head = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status,
        reason(status),
        content_type,
        body.len()
    );
    w.write_all(head.as_bytes()).await?;
    w.write_all(body).await?;
    w.flush().await
}

async fn write_json<W, T>(w: &mut W, status: u16, value: &T) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let body = serde_json::to_vec(value)?;
    write_response(w, status, "application/json", &body).await
}

async fn write_error<W>(w: &mut W, status: u16, message: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    write_json(w, status, &serde_json::json!({ "error": message })).await
}

/// Format one stream item as a server-sent event.
pub fn sse_event(item: &Result<DataQueryResponse, PluginError>) -> Result<String, serde_json::Error> {
    match item {
        Ok(resp) => Ok(format!("data: {}\n\n", serde_json::to_string(resp)?)),
        Err(e) => Ok(format!(
            "event: error\ndata: {}\n\n",
            serde_json::json!({ "error": e.to_string() })
        )),
    }
}

/// Forward a response stream as SSE until it ends or the client goes away.
/// Returning drops the stream, which cancels the producer.
async fn write_sse<W>(w: &mut W, mut responses: ResponseStream) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let headers = "HTTP/1.1 200 OK\r\nContent-Type: text/event-stream\r\nCache-Control: no-cache\r\nConnection: close\r\nAccess-Control-Allow-Origin: *\r\n\r\n";
    w.write_all(headers.as_bytes()).await?;
    w.flush().await?;

    while let Some(item) = responses.next().await {
        let event = sse_event(&item)?;
        if w.write_all(event.as_bytes()).await.is_err() || w.flush().await.is_err() {
            debug!("SSE client went away");
            break;
        }
    }
    Ok(())
}

async fn write_chunk<W>(w: &mut W, data: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    if data.is_empty() {
        return Ok(());
    }
    w.write_all(format!("{:x}\r\n", data.len()).as_bytes()).await?;
    w.write_all(data).await?;
    w.write_all(b"\r\n").await?;
    w.flush().await
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct QueryResults {
    results: Vec<DataQueryResponse>,
    errors: Vec<String>,
}

async fn handle_query<W>(w: &mut W, state: &AppState, body: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let request: QueryRequest = match serde_json::from_slice(body) {
        Ok(r) => r,
        Err(e) => return write_error(w, 400, &format!("invalid query request: {e}")).await,
    };

    let responses = state.datasource.query(&request);
    if request.live_streaming {
        return write_sse(w, responses).await;
    }

    let mut out = QueryResults {
        results: Vec::new(),
        errors: Vec::new(),
    };
    let items: Vec<_> = responses.collect().await;
    for item in items {
        match item {
            Ok(resp) => out.results.push(resp),
            Err(e) => out.errors.push(e.to_string()),
        }
    }
    write_json(w, 200, &out).await
}

async fn handle_live<W>(w: &mut W, state: &AppState, channel: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let addr: LiveChannelAddress = match channel.parse() {
        Ok(a) => a,
        Err(e) => return write_error(w, 400, &e.to_string()).await,
    };
    let responses = state.hub.subscribe(addr, LiveBufferOptions::replace());
    write_sse(w, responses).await
}

async fn handle_publish<W>(w: &mut W, state: &AppState, channel: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let addr: LiveChannelAddress = match channel.parse() {
        Ok(a) => a,
        Err(e) => return write_error(w, 400, &e.to_string()).await,
    };
    match state.streams.publish_stream(&addr.path) {
        Ok(()) => write_json(w, 200, &serde_json::json!({ "ok": true })).await,
        Err(e) => write_error(w, 403, &e.to_string()).await,
    }
}

async fn handle_resource<W>(w: &mut W, state: &AppState, request: ResourceRequest) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let (initial, mut rest) = match state.resources.call_resource(request) {
        Ok(pair) => pair,
        Err(e) => {
            let resp = ResourceResponse::from(e);
            return write_response(w, resp.status, resp.content_type, &resp.body).await;
        }
    };

    let head = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n",
        initial.status,
        reason(initial.status),
        initial.content_type
    );
    w.write_all(head.as_bytes()).await?;
    write_chunk(w, &initial.body).await?;
    while let Some(chunk) = rest.next().await {
        match chunk {
            Ok(data) => {
                if write_chunk(w, &data).await.is_err() {
                    debug!("resource client went away");
                    return Ok(());
                }
            }
            Err(e) => {
                warn!(error = %e, "resource stream failed");
                break;
            }
        }
    }
    w.write_all(b"0\r\n\r\n").await?;
    w.flush().await
}

/// Serve a single request on `stream`.
pub async fn handle_connection<S>(mut stream: S, state: Arc<AppState>) -> io::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request = match read_request(&mut stream).await {
        Ok(Some(r)) => r,
        Ok(None) => return Ok(()),
        Err(e) => return write_error(&mut stream, 400, &e).await,
    };
    debug!(method = %request.method, path = %request.path, "request");

    let method = request.method.as_str();
    let path = request.path.as_str();
    if method == "GET" && path == "/health" {
        return write_response(&mut stream, 200, "text/plain", b"ok").await;
    }
    if path == "/api/ds/query" {
        if method != "POST" {
            return write_error(&mut stream, 405, "use POST").await;
        }
        return handle_query(&mut stream, &state, &request.body).await;
    }
    if let Some(channel) = path.strip_prefix("/api/live/publish/") {
        if method != "POST" {
            return write_error(&mut stream, 405, "use POST").await;
        }
        return handle_publish(&mut stream, &state, channel).await;
    }
    if let Some(channel) = path.strip_prefix("/api/live/") {
        if method != "GET" {
            return write_error(&mut stream, 405, "use GET").await;
        }
        return handle_live(&mut stream, &state, channel).await;
    }
    if let Some(resource) = path.strip_prefix("/api/resources") {
        if resource.starts_with('/') {
            let req = ResourceRequest::new(method, resource, request.body.clone());
            return handle_resource(&mut stream, &state, req).await;
        }
    }
    write_response(&mut stream, 404, "text/plain", b"Not Found").await
}

// ---------------------------------------------------------------------------
// Server loop
// ---------------------------------------------------------------------------

/// Accept connections until `shutdown` flips to `true`.
pub async fn run(
    listener: TcpListener,
    state: Arc<AppState>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), ServeError> {
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = accepted?;
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, state).await {
                        debug!(%peer, error = %e, "connection error");
                    }
                });
            }
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    info!("shutting down HTTP host");
                    return Ok(());
                }
            }
        }
    }
}

/// Bind the configured address and serve until shutdown.
pub async fn serve(config: &PluginConfig, shutdown: watch::Receiver<bool>) -> Result<(), ServeError> {
    let addr = config.server.listen.clone();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| ServeError::Bind {
            addr: addr.clone(),
            source,
        })?;
    let state = Arc::new(AppState::from_config(config));

    eprintln!(
        "{}",
        format!("  livefork listening on http://{}", addr).bright_green()
    );
    let settings = state.datasource.settings();
    eprintln!(
        "{}",
        format!("  data source: {} ({})", settings.name, settings.uid).bright_cyan()
    );
    eprintln!(
        "{}",
        format!("  live channel: {}", state.datasource.stream_address()).bright_cyan()
    );
    eprintln!("{}", "  Press Ctrl+C to stop.".bright_blue());
    info!(%addr, uid = %config.datasource.uid, "HTTP host started");

    run(listener, state, shutdown).await
}
