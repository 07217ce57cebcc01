//! Custom Axum extractors.
//!
//! - [`TraceId`]: the request's trace id
//! - [`Logger`]: the request's scoped logger
//!
//! # Examples
//!
//! ```ignore
//! use scaffold_web::{Logger, TraceId};
//!
//! async fn handler(trace_id: TraceId, logger: Logger) -> Json<Response> {
//!     tracing::info!(parent: logger.span(), %trace_id, "Processing request");
//!     Json(response)
//! }
//! ```

use crate::middleware::logger::Logger;
use crate::middleware::trace_id::{trace_id_of, TraceId};
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use std::convert::Infallible;
use tracing::Span;

/// Uses the id stored by the trace id layer, then the `x-trace-id` header,
/// and generates a new id when neither is present.
#[async_trait]
impl<S> FromRequestParts<S> for TraceId
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let trace_id = parts
            .extensions
            .get::<Self>()
            .cloned()
            .or_else(|| trace_id_of(&parts.headers).map(|id| Self(id.into_owned())))
            .unwrap_or_else(Self::generate);

        Ok(trace_id)
    }
}

/// Uses the scoped logger stored by the request logger layer, falling back
/// to the current span.
#[async_trait]
impl<S> FromRequestParts<S> for Logger
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<Self>()
            .cloned()
            .unwrap_or_else(|| Self::from_span(Span::current())))
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;
    use crate::middleware::trace_id::TRACE_ID_HEADER;
    use axum::http::Request;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_trace_id_from_extension_first() {
        let mut req = Request::builder()
            .header(TRACE_ID_HEADER, "from-header")
            .body(())
            .expect("Valid request");
        req.extensions_mut().insert(TraceId("from-extension".to_owned()));

        let (mut parts, ()) = req.into_parts();
        let trace_id = TraceId::from_request_parts(&mut parts, &())
            .await
            .expect("Should extract");

        assert_eq!(trace_id.as_str(), "from-extension");
    }

    #[tokio::test]
    async fn test_trace_id_from_header() {
        let req = Request::builder()
            .header(TRACE_ID_HEADER, "from-header")
            .body(())
            .expect("Valid request");

        let (mut parts, ()) = req.into_parts();
        let trace_id = TraceId::from_request_parts(&mut parts, &())
            .await
            .expect("Should extract");

        assert_eq!(trace_id.as_str(), "from-header");
    }

    #[tokio::test]
    async fn test_trace_id_generates_new() {
        let req = Request::builder().body(()).expect("Valid request");

        let (mut parts, ()) = req.into_parts();
        let trace_id = TraceId::from_request_parts(&mut parts, &())
            .await
            .expect("Should extract");

        assert!(Uuid::parse_str(trace_id.as_str()).is_ok());
    }

    #[tokio::test]
    async fn test_logger_from_extension() {
        let capture = scaffold_testing::LogCapture::new();
        let _guard = capture.install();

        let mut req = Request::builder().body(()).expect("Valid request");
        req.extensions_mut().insert(Logger::new("webservice"));

        let (mut parts, ()) = req.into_parts();
        let logger = Logger::from_request_parts(&mut parts, &())
            .await
            .expect("Should extract");

        let expected = parts.extensions.get::<Logger>().expect("Inserted above");
        assert!(logger.span().id().is_some());
        assert_eq!(logger.span().id(), expected.span().id());
    }
}
