//! Local HTTP server answering byte-range requests from an in-memory body.

use std::sync::{Arc, Mutex};

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::header::{CONTENT_RANGE, RANGE};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures::StreamExt;

pub const PROBE_RANGE: &str = "bytes=0-0";

/// Bytes the `/stall` route sends before it stops responding.
pub const STALL_CHUNK: usize = 512;

pub struct Fixture {
    pub body: Vec<u8>,
    /// `Range` header of every request, `None` when absent.
    pub ranges: Mutex<Vec<Option<String>>>,
    /// `X-Token` header of every request.
    pub tokens: Mutex<Vec<Option<String>>>,
}

impl Fixture {
    fn record(&self, headers: &HeaderMap) {
        let value = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        self.ranges.lock().unwrap().push(value(RANGE.as_str()));
        self.tokens.lock().unwrap().push(value("x-token"));
    }

    pub fn seen_ranges(&self) -> Vec<Option<String>> {
        self.ranges.lock().unwrap().clone()
    }

    pub fn seen_tokens(&self) -> Vec<Option<String>> {
        self.tokens.lock().unwrap().clone()
    }
}

pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

pub async fn spawn_server(body: Vec<u8>) -> (String, Arc<Fixture>) {
    let fixture = Arc::new(Fixture {
        body,
        ranges: Mutex::new(Vec::new()),
        tokens: Mutex::new(Vec::new()),
    });

    let app = Router::new()
        .route("/file", get(ranged))
        .route("/no-range", get(ignores_range))
        .route("/probe-only", get(probe_only))
        .route("/truncated", get(truncated))
        .route("/stall", get(stall_after_first_chunk))
        .with_state(fixture.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), fixture)
}

/// An address nothing listens on.
pub async fn closed_address() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

/// An address that accepts connections and never answers.
pub async fn silent_address() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    format!("http://{}", addr)
}

async fn ranged(State(fixture): State<Arc<Fixture>>, headers: HeaderMap) -> Response {
    fixture.record(&headers);
    serve_range(&fixture.body, &headers, false)
}

async fn ignores_range(State(fixture): State<Arc<Fixture>>, headers: HeaderMap) -> Response {
    fixture.record(&headers);
    (StatusCode::OK, fixture.body.clone()).into_response()
}

async fn probe_only(State(fixture): State<Arc<Fixture>>, headers: HeaderMap) -> Response {
    fixture.record(&headers);
    if is_probe(&headers) {
        serve_range(&fixture.body, &headers, false)
    } else {
        (StatusCode::OK, fixture.body.clone()).into_response()
    }
}

async fn truncated(State(fixture): State<Arc<Fixture>>, headers: HeaderMap) -> Response {
    fixture.record(&headers);
    let cut = !is_probe(&headers);
    serve_range(&fixture.body, &headers, cut)
}

/// Answers slices with 206, sends `STALL_CHUNK` bytes and then goes quiet.
async fn stall_after_first_chunk(State(fixture): State<Arc<Fixture>>, headers: HeaderMap) -> Response {
    fixture.record(&headers);
    if is_probe(&headers) {
        return serve_range(&fixture.body, &headers, false);
    }
    let Some((start, end)) = requested_range(&headers, fixture.body.len() as u64) else {
        return StatusCode::BAD_REQUEST.into_response();
    };

    let first = Bytes::copy_from_slice(&fixture.body[start as usize..start as usize + STALL_CHUNK]);
    let stream = futures::stream::once(async move { Ok::<_, std::io::Error>(first) })
        .chain(futures::stream::pending());
    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = StatusCode::PARTIAL_CONTENT;
    let content_range = format!("bytes {}-{}/{}", start, end, fixture.body.len());
    response
        .headers_mut()
        .insert(CONTENT_RANGE, HeaderValue::from_str(&content_range).unwrap());
    response
}

fn is_probe(headers: &HeaderMap) -> bool {
    headers.get(RANGE).and_then(|v| v.to_str().ok()) == Some(PROBE_RANGE)
}

fn serve_range(body: &[u8], headers: &HeaderMap, cut_in_half: bool) -> Response {
    let Some((start, end)) = requested_range(headers, body.len() as u64) else {
        return (StatusCode::OK, body.to_vec()).into_response();
    };

    let mut part = body[start as usize..=end as usize].to_vec();
    if cut_in_half {
        part.truncate(part.len() / 2);
    }

    let mut response = (StatusCode::PARTIAL_CONTENT, part).into_response();
    let content_range = format!("bytes {}-{}/{}", start, end, body.len());
    response
        .headers_mut()
        .insert(CONTENT_RANGE, HeaderValue::from_str(&content_range).unwrap());
    response
}

fn requested_range(headers: &HeaderMap, len: u64) -> Option<(u64, u64)> {
    let raw = headers.get(RANGE)?.to_str().ok()?;
    let (start, end) = raw.strip_prefix("bytes=")?.split_once('-')?;
    let start: u64 = start.parse().ok()?;
    let end = if end.is_empty() {
        len.checked_sub(1)?
    } else {
        end.parse::<u64>().ok()?.min(len.checked_sub(1)?)
    };
    (start <= end).then_some((start, end))
}
