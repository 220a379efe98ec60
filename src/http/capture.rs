//! Response status capture.
//!
//! [`StatusCaptureLayer`] sits between the access logger and the handler.
//! It copies the status of every response it passes through into the
//! request's [`StatusCapture`] handle and otherwise leaves the response
//! untouched.

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::extract::Request;
use axum::http::StatusCode;
use axum::response::Response;
use futures_util::future::BoxFuture;
use tower::{Layer, Service};

const UNSET: u16 = 0;

/// Request-local slot holding the status the handler produced.
///
/// Reads as `200 OK` until a status is recorded. Only the first recorded
/// status sticks.
#[derive(Debug, Clone, Default)]
pub struct StatusCapture {
    status: Arc<AtomicU16>,
}

impl StatusCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the handler's status. Returns false if one was already recorded.
    pub fn record(&self, status: StatusCode) -> bool {
        self.status
            .compare_exchange(UNSET, status.as_u16(), Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn is_recorded(&self) -> bool {
        self.status.load(Ordering::Acquire) != UNSET
    }

    /// The captured status, or `200 OK` if the handler never set one.
    pub fn status(&self) -> StatusCode {
        match self.status.load(Ordering::Acquire) {
            UNSET => StatusCode::OK,
            code => StatusCode::from_u16(code).unwrap_or(StatusCode::OK),
        }
    }
}

/// Layer producing [`StatusCaptureService`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusCaptureLayer;

impl<S> Layer<S> for StatusCaptureLayer {
    type Service = StatusCaptureService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        StatusCaptureService { inner }
    }
}

/// Records the response status into the request's [`StatusCapture`], if any.
#[derive(Debug, Clone)]
pub struct StatusCaptureService<S> {
    inner: S,
}

impl<S> Service<Request> for StatusCaptureService<S>
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

    fn call(&mut self, request: Request) -> Self::Future {
        let capture = request.extensions().get::<StatusCapture>().cloned();
        let future = self.inner.call(request);

        Box::pin(async move {
            let response = future.await?;
            if let Some(capture) = capture {
                capture.record(response.status());
            }
            Ok(response)
        })
    }
}
