//! Access logging middleware.
//!
//! # Responsibilities
//! - Time every request from arrival until its response body is done
//! - Read the final status from the request's [`StatusCapture`]
//! - Emit exactly one [`AccessLogRecord`] per request to an [`AccessLogSink`]
//!
//! # Design Decisions
//! - The record is emitted when the response body ends, fails or is dropped,
//!   so cancelled and truncated responses are logged too
//! - The sink is injected, never global
//! - Sinks cannot fail a request

use std::fmt;
use std::net::SocketAddr;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

use axum::body::{Body, Bytes};
use axum::extract::{ConnectInfo, Request};
use axum::http::{Method, StatusCode};
use axum::response::Response;
use futures_util::future::BoxFuture;
use hyper::body::{Body as HttpBody, Frame, SizeHint};
use tower::{Layer, Service};

use crate::http::capture::StatusCapture;
use crate::http::headers::X_REQUEST_ID;

/// How the response ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The full response was handed to the connection.
    Completed,
    /// The response body failed part way, e.g. the backend went away.
    Truncated,
    /// The caller went away before the response finished.
    Cancelled,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Completed => "completed",
            Outcome::Truncated => "truncated",
            Outcome::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One line of the access log.
#[derive(Debug, Clone)]
pub struct AccessLogRecord {
    /// Request target as received, path plus query.
    pub request: String,
    pub method: Method,
    /// Peer address, when the connection provided one.
    pub remote: Option<SocketAddr>,
    pub status: StatusCode,
    pub latency: Duration,
    /// Inbound `X-Request-Id`, verbatim.
    pub request_id: Option<String>,
    pub outcome: Outcome,
}

impl AccessLogRecord {
    /// Canonical reason phrase of the status, e.g. `Not Found`.
    pub fn status_text(&self) -> &'static str {
        self.status.canonical_reason().unwrap_or("")
    }
}

/// Destination for access log records.
pub trait AccessLogSink: Send + Sync + 'static {
    fn record(&self, record: &AccessLogRecord);
}

/// Writes records as `tracing` events under the `access_log` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl AccessLogSink for TracingSink {
    fn record(&self, record: &AccessLogRecord) {
        let remote = record
            .remote
            .map(|addr| addr.to_string())
            .unwrap_or_default();

        tracing::info!(
            target: "access_log",
            request = %record.request,
            method = %record.method,
            remote = %remote,
            status = record.status.as_u16(),
            text_status = record.status_text(),
            latency = ?record.latency,
            outcome = record.outcome.as_str(),
            request_id = record.request_id.as_deref(),
            "completed handling request"
        );
    }
}

/// Keeps records in memory. Useful when embedding the gateway and in tests.
#[derive(Debug, Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<AccessLogRecord>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything recorded so far.
    pub fn records(&self) -> Vec<AccessLogRecord> {
        match self.records.lock() {
            Ok(records) => records.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Wait until at least `count` records exist or `timeout` passes.
    pub async fn wait_for(&self, count: usize, timeout: Duration) -> Vec<AccessLogRecord> {
        let deadline = Instant::now() + timeout;
        loop {
            let records = self.records();
            if records.len() >= count || Instant::now() >= deadline {
                return records;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

impl AccessLogSink for MemorySink {
    fn record(&self, record: &AccessLogRecord) {
        match self.records.lock() {
            Ok(mut records) => records.push(record.clone()),
            Err(poisoned) => poisoned.into_inner().push(record.clone()),
        }
    }
}

/// Layer producing [`AccessLogService`].
#[derive(Clone)]
pub struct AccessLogLayer {
    sink: Arc<dyn AccessLogSink>,
}

impl AccessLogLayer {
    pub fn new(sink: Arc<dyn AccessLogSink>) -> Self {
        Self { sink }
    }
}

impl Default for AccessLogLayer {
    fn default() -> Self {
        Self::new(Arc::new(TracingSink))
    }
}

impl<S> Layer<S> for AccessLogLayer {
    type Service = AccessLogService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AccessLogService {
            inner,
            sink: self.sink.clone(),
        }
    }
}

/// Installs a [`StatusCapture`] on each request and logs it once done.
#[derive(Clone)]
pub struct AccessLogService<S> {
    inner: S,
    sink: Arc<dyn AccessLogSink>,
}

impl<S> Service<Request> for AccessLogService<S>
where
    S: Service<Request, Response = Response> + Send + 'static,
    S::Future: Send + 'static,
    S::Error: Send + 'static,
{
    type Response = Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Response, S::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request) -> Self::Future {
        let capture = StatusCapture::new();
        request.extensions_mut().insert(capture.clone());

        let guard = RecordGuard::new(PendingRecord {
            sink: self.sink.clone(),
            start: Instant::now(),
            request: request.uri().to_string(),
            method: request.method().clone(),
            remote: request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| *addr),
            request_id: request
                .headers()
                .get(X_REQUEST_ID)
                .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
                .filter(|id| !id.is_empty()),
            capture,
        });

        let future = self.inner.call(request);

        Box::pin(async move {
            // Dropping this future before it resolves drops the guard,
            // which logs the request as cancelled.
            let response = future.await?;
            let (parts, body) = response.into_parts();
            Ok(Response::from_parts(
                parts,
                Body::new(LoggedBody { inner: body, guard }),
            ))
        })
    }
}

struct PendingRecord {
    sink: Arc<dyn AccessLogSink>,
    start: Instant,
    request: String,
    method: Method,
    remote: Option<SocketAddr>,
    request_id: Option<String>,
    capture: StatusCapture,
}

impl PendingRecord {
    fn emit(self, outcome: Outcome) {
        let record = AccessLogRecord {
            request: self.request,
            method: self.method,
            remote: self.remote,
            status: self.capture.status(),
            latency: self.start.elapsed(),
            request_id: self.request_id,
            outcome,
        };
        self.sink.record(&record);
    }
}

/// Emits the pending record exactly once; as cancelled if still pending on drop.
struct RecordGuard(Option<PendingRecord>);

impl RecordGuard {
    fn new(pending: PendingRecord) -> Self {
        Self(Some(pending))
    }

    /// HEAD responses are complete once the headers are out; their body is
    /// dropped unread.
    fn is_head(&self) -> bool {
        self.0
            .as_ref()
            .is_some_and(|pending| pending.method == Method::HEAD)
    }

    fn finish(&mut self, outcome: Outcome) {
        if let Some(pending) = self.0.take() {
            pending.emit(outcome);
        }
    }
}

impl Drop for RecordGuard {
    fn drop(&mut self) {
        self.finish(Outcome::Cancelled);
    }
}

/// Response body that finishes the access record when the stream ends.
struct LoggedBody {
    inner: Body,
    guard: RecordGuard,
}

impl HttpBody for LoggedBody {
    type Data = Bytes;
    type Error = axum::Error;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, axum::Error>>> {
        let this = &mut *self;
        let polled = Pin::new(&mut this.inner).poll_frame(cx);
        match &polled {
            Poll::Ready(None) => this.guard.finish(Outcome::Completed),
            Poll::Ready(Some(Err(_))) => this.guard.finish(Outcome::Truncated),
            _ => {}
        }
        polled
    }

    fn is_end_stream(&self) -> bool {
        self.inner.is_end_stream()
    }

    fn size_hint(&self) -> SizeHint {
        self.inner.size_hint()
    }
}

impl Drop for LoggedBody {
    fn drop(&mut self) {
        let outcome = if self.inner.is_end_stream() || self.guard.is_head() {
            Outcome::Completed
        } else {
            Outcome::Cancelled
        };
        self.guard.finish(outcome);
    }
}
