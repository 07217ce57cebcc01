//! Trace id assignment.
//!
//! Every request leaving this layer carries an `x-trace-id` header. A value
//! supplied by the caller is reused unchanged (it is not validated); when the
//! header is missing or empty a new UUID v4 is generated. The effective id is
//! also stored in the request extensions as [`TraceId`] and echoed on the
//! response. A header that is not UTF-8 is echoed as sent; its text form
//! replaces the invalid bytes with U+FFFD.
//!
//! # Example
//!
//! ```ignore
//! use scaffold_web::middleware::{Pipeline, TraceIdLayer};
//!
//! let service = Pipeline::new().layer(TraceIdLayer).compose(router);
//! ```

use axum::{extract::Request, http::HeaderMap, http::HeaderValue, response::Response};
use futures::future::BoxFuture;
use std::borrow::Cow;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use uuid::Uuid;

/// Header carrying the trace id.
pub const TRACE_ID_HEADER: &str = "x-trace-id";

/// The trace id of a request, as stored in its extensions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TraceId(pub String);

impl TraceId {
    /// A fresh random id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// The id as text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TraceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// The non-empty trace id header of a request, if any. Bytes that are not
/// UTF-8 are replaced with U+FFFD.
#[must_use]
pub fn trace_id_of(headers: &HeaderMap) -> Option<Cow<'_, str>> {
    headers
        .get(TRACE_ID_HEADER)
        .filter(|v| !v.is_empty())
        .map(|v| String::from_utf8_lossy(v.as_bytes()))
}

/// The trace id the rest of the pipeline works with: the [`TraceId`]
/// extension when [`TraceIdLayer`] ran, otherwise the header.
#[must_use]
pub fn request_trace_id<B>(req: &axum::http::Request<B>) -> Option<Cow<'_, str>> {
    match req.extensions().get::<TraceId>() {
        Some(trace_id) => Some(Cow::Borrowed(trace_id.as_str())),
        None => trace_id_of(req.headers()),
    }
}

/// Layer assigning trace ids.
#[derive(Clone, Copy, Debug, Default)]
pub struct TraceIdLayer;

impl<S> Layer<S> for TraceIdLayer {
    type Service = TraceIdMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TraceIdMiddleware { inner }
    }
}

/// Middleware service assigning trace ids.
#[derive(Clone, Debug)]
pub struct TraceIdMiddleware<S> {
    inner: S,
}

impl<S> Service<Request> for TraceIdMiddleware<S>
where
    S: Service<Request, Response = Response> + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request) -> Self::Future {
        let supplied = trace_id_of(req.headers()).map(|id| TraceId(id.into_owned()));

        let (trace_id, header) = match supplied {
            Some(trace_id) => {
                let value = req.headers()[TRACE_ID_HEADER].clone();
                (trace_id, value)
            }
            None => {
                let trace_id = TraceId::generate();
                // A hyphenated UUID is always a valid header value.
                let value = HeaderValue::from_str(trace_id.as_str())
                    .unwrap_or_else(|_| HeaderValue::from_static(""));
                req.headers_mut().insert(TRACE_ID_HEADER, value.clone());
                (trace_id, value)
            }
        };

        req.extensions_mut().insert(trace_id);

        let fut = self.inner.call(req);

        Box::pin(async move {
            let mut response = fut.await?;
            response.headers_mut().insert(TRACE_ID_HEADER, header);
            Ok(response)
        })
    }
}

/// Access to the trace id stored by [`TraceIdLayer`].
///
/// # Example
///
/// ```ignore
/// use scaffold_web::middleware::TraceIdExt;
///
/// async fn handler(req: Request) -> String {
///     format!("Request ID: {}", req.trace_id().unwrap_or_default())
/// }
/// ```
pub trait TraceIdExt {
    /// The trace id, or `None` if the layer is not installed.
    fn trace_id(&self) -> Option<&str>;
}

impl<B> TraceIdExt for axum::http::Request<B> {
    fn trace_id(&self) -> Option<&str> {
        self.extensions().get::<TraceId>().map(TraceId::as_str)
    }
}

impl TraceIdExt for axum::http::request::Parts {
    fn trace_id(&self) -> Option<&str> {
        self.extensions.get::<TraceId>().map(TraceId::as_str)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use axum::{body::Body, response::IntoResponse, routing::get, Router};
    use tower::ServiceExt;

    fn app() -> Router {
        Router::new()
            .route(
                "/test",
                get(|req: Request| async move {
                    let header = trace_id_of(req.headers())
                        .map(Cow::into_owned)
                        .unwrap_or_default();
                    let extension = req.trace_id().unwrap_or_default().to_owned();
                    format!("{header}|{extension}")
                }),
            )
            .layer(TraceIdLayer)
    }

    async fn seen_by_handler(response: Response) -> (String, String) {
        let text = scaffold_testing::helpers::body_text(response).await;
        let (header, extension) = text.split_once('|').unwrap();
        (header.to_owned(), extension.to_owned())
    }

    #[tokio::test]
    async fn test_trace_id_generated_if_missing() {
        let request = Request::builder().uri("/test").body(Body::empty()).unwrap();

        let response = app().oneshot(request).await.unwrap();

        let echoed = response
            .headers()
            .get(TRACE_ID_HEADER)
            .expect("Trace ID header should be present")
            .to_str()
            .unwrap()
            .to_owned();
        assert!(Uuid::parse_str(&echoed).is_ok());

        let (header, extension) = seen_by_handler(response).await;
        assert_eq!(header, echoed);
        assert_eq!(extension, echoed);
    }

    #[tokio::test]
    async fn test_empty_trace_id_is_replaced() {
        let request = Request::builder()
            .uri("/test")
            .header(TRACE_ID_HEADER, "")
            .body(Body::empty())
            .unwrap();

        let response = app().oneshot(request).await.unwrap();

        let (header, _) = seen_by_handler(response).await;
        assert!(Uuid::parse_str(&header).is_ok());
    }

    #[tokio::test]
    async fn test_supplied_trace_id_preserved_without_validation() {
        let request = Request::builder()
            .uri("/test")
            .header(TRACE_ID_HEADER, "not-a-uuid")
            .body(Body::empty())
            .unwrap();

        let response = app().oneshot(request).await.unwrap();

        assert_eq!(response.headers().get(TRACE_ID_HEADER).unwrap(), "not-a-uuid");
        let (header, extension) = seen_by_handler(response).await;
        assert_eq!(header, "not-a-uuid");
        assert_eq!(extension, "not-a-uuid");
    }

    #[tokio::test]
    async fn test_each_request_gets_its_own_id() {
        let first = app()
            .oneshot(Request::builder().uri("/test").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let second = app()
            .oneshot(Request::builder().uri("/test").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_ne!(
            first.headers().get(TRACE_ID_HEADER),
            second.headers().get(TRACE_ID_HEADER)
        );
    }

    #[test]
    fn test_trace_id_of_ignores_empty_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(trace_id_of(&headers), None);
        headers.insert(TRACE_ID_HEADER, HeaderValue::from_static(""));
        assert_eq!(trace_id_of(&headers), None);
        headers.insert(TRACE_ID_HEADER, HeaderValue::from_static("abc"));
        assert_eq!(trace_id_of(&headers).as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn test_non_utf8_trace_id_is_kept_lossily() {
        let raw = HeaderValue::from_bytes(b"caf\xe9-1").unwrap();
        let request = Request::builder()
            .uri("/test")
            .header(TRACE_ID_HEADER, raw.clone())
            .body(Body::empty())
            .unwrap();

        let response = app().oneshot(request).await.unwrap();

        assert_eq!(response.headers()[TRACE_ID_HEADER], raw);
        let (header, extension) = seen_by_handler(response).await;
        assert_eq!(header, "caf\u{fffd}-1");
        assert_eq!(extension, "caf\u{fffd}-1");
    }

    #[test]
    fn test_request_trace_id_prefers_extension() {
        let mut req = Request::builder()
            .header(TRACE_ID_HEADER, "from-header")
            .body(Body::empty())
            .unwrap();
        assert_eq!(request_trace_id(&req).as_deref(), Some("from-header"));

        req.extensions_mut().insert(TraceId("from-layer".to_owned()));
        assert_eq!(request_trace_id(&req).as_deref(), Some("from-layer"));

        let bare = Request::builder().body(Body::empty()).unwrap();
        assert_eq!(request_trace_id(&bare), None);
    }

    #[tokio::test]
    async fn test_handler_without_layer_sees_no_trace_id() {
        async fn handler(req: Request) -> impl IntoResponse {
            req.trace_id().is_none().to_string()
        }

        let app = Router::new().route("/test", get(handler));
        let response = app
            .oneshot(Request::builder().uri("/test").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(scaffold_testing::helpers::body_text(response).await, "true");
    }
}
