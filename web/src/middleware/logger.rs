//! Request-scoped loggers.
//!
//! A [`Logger`] wraps a `tracing` span holding structured fields. The base
//! logger of a component is created once; [`RequestLoggerLayer`] derives a
//! scoped copy for each request, adding the trace id when asked to, and runs
//! the rest of the request inside it so every event carries those fields.

use crate::middleware::trace_id::request_trace_id;
use axum::extract::Request;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use tracing::instrument::{Instrument, Instrumented};
use tracing::Span;

/// A handle to a span carrying structured log fields.
///
/// Cloning is cheap; clones refer to the same span.
#[derive(Debug, Clone)]
pub struct Logger {
    span: Span,
}

impl Logger {
    /// A base logger for `component`.
    #[must_use]
    pub fn new(component: &str) -> Self {
        Self {
            span: tracing::info_span!("service", component = %component),
        }
    }

    /// Wrap an existing span.
    #[must_use]
    pub const fn from_span(span: Span) -> Self {
        Self { span }
    }

    /// The span events should be attached to.
    #[must_use]
    pub const fn span(&self) -> &Span {
        &self.span
    }

    /// A child logger that adds `trace_id` to every event.
    #[must_use]
    pub fn with_trace_id(&self, trace_id: &str) -> Self {
        Self {
            span: tracing::info_span!(parent: &self.span, "request", trace_id = %trace_id),
        }
    }
}

/// Layer attaching a scoped [`Logger`] to each request.
#[derive(Clone, Debug)]
pub struct RequestLoggerLayer {
    base: Option<Logger>,
    include_trace_id: bool,
}

impl RequestLoggerLayer {
    /// Scope `base` to each request, adding the trace id if
    /// `include_trace_id` is set and the request has one.
    ///
    /// Without a base logger the layer passes requests through untouched.
    #[must_use]
    pub const fn new(base: Option<Logger>, include_trace_id: bool) -> Self {
        Self {
            base,
            include_trace_id,
        }
    }
}

impl<S> Layer<S> for RequestLoggerLayer {
    type Service = RequestLogger<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestLogger {
            inner,
            base: self.base.clone(),
            include_trace_id: self.include_trace_id,
        }
    }
}

/// Middleware service attaching a scoped [`Logger`].
#[derive(Clone, Debug)]
pub struct RequestLogger<S> {
    inner: S,
    base: Option<Logger>,
    include_trace_id: bool,
}

impl<S> Service<Request> for RequestLogger<S>
where
    S: Service<Request>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Instrumented<S::Future>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        let Some(base) = &self.base else {
            return self.inner.call(req).instrument(Span::none());
        };

        let scoped = match request_trace_id(&req) {
            Some(trace_id) if self.include_trace_id => base.with_trace_id(&trace_id),
            _ => base.clone(),
        };

        let span = scoped.span().clone();
        req.extensions_mut().insert(scoped);

        let fut = span.in_scope(|| self.inner.call(req));
        fut.instrument(span)
    }
}

/// Access to the logger stored by [`RequestLoggerLayer`].
pub trait LoggerExt {
    /// The request's scoped logger, or `None` if the layer is not installed
    /// or has no base logger.
    fn logger(&self) -> Option<&Logger>;
}

impl<B> LoggerExt for axum::http::Request<B> {
    fn logger(&self) -> Option<&Logger> {
        self.extensions().get::<Logger>()
    }
}

impl LoggerExt for axum::http::request::Parts {
    fn logger(&self) -> Option<&Logger> {
        self.extensions.get::<Logger>()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::middleware::trace_id::TRACE_ID_HEADER;
    use axum::{body::Body, response::Response};
    use scaffold_testing::LogCapture;
    use std::convert::Infallible;
    use tower::{service_fn, ServiceExt};

    async fn logging_handler(req: Request) -> Result<Response, Infallible> {
        let has_logger = req.logger().is_some();
        tracing::info!(has_logger, "handled");
        Ok(Response::new(Body::empty()))
    }

    fn request(trace_id: Option<&str>) -> Request {
        let mut builder = Request::builder().uri("/");
        if let Some(id) = trace_id {
            builder = builder.header(TRACE_ID_HEADER, id);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_scoped_logger_carries_trace_id() {
        let capture = LogCapture::new();
        let _guard = capture.install();

        let service = RequestLoggerLayer::new(Some(Logger::new("webservice")), true)
            .layer(service_fn(logging_handler));
        service.oneshot(request(Some("t-42"))).await.unwrap();

        let event = capture.find("handled").unwrap();
        assert_eq!(event.field("has_logger"), Some("true"));
        assert_eq!(event.field("trace_id"), Some("t-42"));
        assert_eq!(event.field("component"), Some("webservice"));
    }

    #[tokio::test]
    async fn test_trace_id_omitted_when_disabled() {
        let capture = LogCapture::new();
        let _guard = capture.install();

        let service = RequestLoggerLayer::new(Some(Logger::new("webservice")), false)
            .layer(service_fn(logging_handler));
        service.oneshot(request(Some("t-42"))).await.unwrap();

        let event = capture.find("handled").unwrap();
        assert_eq!(event.field("trace_id"), None);
        assert_eq!(event.field("component"), Some("webservice"));
    }

    #[tokio::test]
    async fn test_missing_trace_id_uses_base_logger() {
        let capture = LogCapture::new();
        let _guard = capture.install();

        let service = RequestLoggerLayer::new(Some(Logger::new("webservice")), true)
            .layer(service_fn(logging_handler));
        service.oneshot(request(None)).await.unwrap();

        let event = capture.find("handled").unwrap();
        assert_eq!(event.field("has_logger"), Some("true"));
        assert_eq!(event.field("trace_id"), None);
    }

    #[tokio::test]
    async fn test_without_base_logger_passes_through() {
        let capture = LogCapture::new();
        let _guard = capture.install();

        let service = RequestLoggerLayer::new(None, true).layer(service_fn(logging_handler));
        let response = service.oneshot(request(Some("t-42"))).await.unwrap();

        assert_eq!(response.status(), 200);
        let event = capture.find("handled").unwrap();
        assert_eq!(event.field("has_logger"), Some("false"));
        assert!(event.spans.is_empty());
    }

    #[test]
    fn test_with_trace_id_keeps_base_fields() {
        let capture = LogCapture::new();
        let _guard = capture.install();

        let base = Logger::new("worker");
        let scoped = base.with_trace_id("abc");
        tracing::warn!(parent: scoped.span(), "scoped");
        tracing::warn!(parent: base.span(), "base");

        let scoped_event = capture.find("scoped").unwrap();
        assert_eq!(scoped_event.field("component"), Some("worker"));
        assert_eq!(scoped_event.field("trace_id"), Some("abc"));
        assert_eq!(capture.find("base").unwrap().field("trace_id"), None);
    }
}
