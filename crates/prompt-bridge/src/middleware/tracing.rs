//! Request span middleware.
//!
//! Wraps every HTTP request in a `bridge_request` span and records the
//! response status and latency on it once the handler finishes.

use axum::{body::Body, http::Request, response::Response};
use std::task::{Context, Poll};
use std::time::Instant;
use tower::{Layer, Service};
use tracing::{debug, info_span, warn, Instrument, Span};

/// Header a caller may set to tag the span with its own request id
pub const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Clone, Default)]
pub struct TracingLayer;

impl TracingLayer {
    pub fn new() -> Self {
        Self
    }
}

impl<S> Layer<S> for TracingLayer {
    type Service = TracingService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TracingService { inner }
    }
}

#[derive(Clone)]
pub struct TracingService<S> {
    inner: S,
}

impl<S> Service<Request<Body>> for TracingService<S>
where
    S: Service<Request<Body>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        // Take the service that was driven to readiness, leave a clone behind
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        let span = info_span!(
            "bridge_request",
            http.method = %req.method(),
            http.target = %req.uri().path(),
            request_id = request_id(&req).unwrap_or("-"),
            http.status_code = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
        );

        Box::pin(
            async move {
                let started = Instant::now();
                let result = inner.call(req).await;
                let span = Span::current();
                span.record("latency_ms", started.elapsed().as_millis() as u64);

                match &result {
                    Ok(response) => {
                        let status = response.status();
                        span.record("http.status_code", status.as_u16());
                        if status.is_server_error() {
                            warn!(status = status.as_u16(), "Request failed");
                        } else {
                            debug!(status = status.as_u16(), "Request completed");
                        }
                    }
                    Err(_) => {
                        warn!("Request errored before producing a response");
                    }
                }

                result
            }
            .instrument(span),
        )
    }
}

fn request_id<B>(req: &Request<B>) -> Option<&str> {
    req.headers()
        .get(REQUEST_ID_HEADER)?
        .to_str()
        .ok()
        .filter(|s| !s.is_empty())
}
