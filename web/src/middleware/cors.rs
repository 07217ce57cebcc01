//! Cross-origin access control.
//!
//! Requests without an `origin` header are not CORS requests and pass
//! through. Otherwise the origin is checked against the allow-list:
//!
//! - denied origins get a 403 and never reach the handler
//! - allowed origins get the `access-control-allow-*` headers
//! - allowed `OPTIONS` requests (preflight) are answered here with a 200
//!
//! The loopback origin [`LOCALHOST_ORIGIN`] is special: when allowed, it
//! matches any request origin containing it, on any port, so local frontends
//! on dev servers work without listing every port.

use crate::error::{ApiError, MiddlewareError};
use axum::body::Body;
use axum::extract::Request;
use axum::http::{header, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// The loopback origin allowed on any port.
pub const LOCALHOST_ORIGIN: &str = "http://localhost";

/// Origin policy settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Origins allowed to call the service, checked in order.
    pub allowed_origins: Vec<String>,
    /// Request headers the browser may send.
    pub allowed_headers: Vec<String>,
    /// Methods the browser may use.
    pub allowed_methods: Vec<String>,
    /// Whether credentials (cookies, auth headers) may be sent.
    pub allow_credentials: bool,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: vec![
                LOCALHOST_ORIGIN.to_owned(),
                "https://mywebsitedomain.com".to_owned(),
            ],
            allowed_headers: vec!["content-type".to_owned(), "authorization".to_owned()],
            allowed_methods: ["HEAD", "GET", "OPTIONS", "PATCH", "POST", "PUT"]
                .into_iter()
                .map(str::to_owned)
                .collect(),
            allow_credentials: false,
        }
    }
}

impl CorsConfig {
    /// The value to send as `access-control-allow-origin` for `origin`, or
    /// `None` if the origin is not allowed.
    ///
    /// Entries are scanned in order and the first match wins. An entry equal
    /// to [`LOCALHOST_ORIGIN`] matches any origin containing it and answers
    /// with the loopback origin plus the request's explicit port, if any.
    /// Any other entry must match exactly.
    #[must_use]
    pub fn allowed_origin(&self, origin: &str) -> Option<String> {
        for allowed in &self.allowed_origins {
            if allowed == LOCALHOST_ORIGIN && origin.contains(LOCALHOST_ORIGIN) {
                let port = origin.parse::<Uri>().ok().and_then(|uri| uri.port_u16());
                return Some(match port {
                    Some(port) => format!("{LOCALHOST_ORIGIN}:{port}"),
                    None => LOCALHOST_ORIGIN.to_owned(),
                });
            }

            if allowed == origin {
                return Some(allowed.clone());
            }
        }
        None
    }
}

fn header_value(header: &'static str, value: String) -> Result<HeaderValue, MiddlewareError> {
    HeaderValue::from_str(&value).map_err(|source| MiddlewareError::InvalidHeaderValue {
        header,
        value,
        source,
    })
}

#[derive(Debug)]
struct Policy {
    config: CorsConfig,
    allow_headers: HeaderValue,
    allow_methods: HeaderValue,
}

/// Layer enforcing a [`CorsConfig`].
#[derive(Clone, Debug)]
pub struct CorsLayer {
    policy: Arc<Policy>,
}

impl CorsLayer {
    /// Build the layer, validating the header values once.
    ///
    /// # Errors
    ///
    /// Returns [`MiddlewareError::InvalidHeaderValue`] if an allowed origin
    /// or the joined header or method list cannot be sent as a header.
    pub fn new(config: CorsConfig) -> Result<Self, MiddlewareError> {
        for origin in &config.allowed_origins {
            header_value("access-control-allow-origin", origin.clone())?;
        }
        let allow_headers = header_value(
            "access-control-allow-headers",
            config.allowed_headers.join(", "),
        )?;
        let allow_methods = header_value(
            "access-control-allow-methods",
            config.allowed_methods.join(", "),
        )?;

        Ok(Self {
            policy: Arc::new(Policy {
                config,
                allow_headers,
                allow_methods,
            }),
        })
    }
}

impl<S> Layer<S> for CorsLayer {
    type Service = Cors<S>;

    fn layer(&self, inner: S) -> Self::Service {
        Cors {
            inner,
            policy: Arc::clone(&self.policy),
        }
    }
}

/// Middleware service enforcing a [`CorsConfig`].
#[derive(Clone, Debug)]
pub struct Cors<S> {
    inner: S,
    policy: Arc<Policy>,
}

impl Policy {
    fn apply(&self, allowed_origin: HeaderValue, response: &mut Response) {
        let headers = response.headers_mut();
        headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, allowed_origin);
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            self.allow_headers.clone(),
        );
        headers.insert(
            header::ACCESS_CONTROL_ALLOW_METHODS,
            self.allow_methods.clone(),
        );
        if self.config.allow_credentials {
            headers.insert(
                header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
                HeaderValue::from_static("true"),
            );
        }
    }
}

impl<S> Service<Request> for Cors<S>
where
    S: Service<Request, Response = Response, Error = Infallible> + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response;
    type Error = Infallible;
    type Future = BoxFuture<'static, Result<Response, Infallible>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request) -> Self::Future {
        let origin = match req.headers().get(header::ORIGIN) {
            Some(value) if !value.is_empty() => String::from_utf8_lossy(value.as_bytes()).into_owned(),
            _ => return Box::pin(self.inner.call(req)),
        };

        let allowed = self
            .policy
            .config
            .allowed_origin(&origin)
            .and_then(|allowed| HeaderValue::from_str(&allowed).ok());

        let Some(allowed) = allowed else {
            tracing::warn!(origin = %origin, "Request origin does not match any of the allowed origins");
            let response = ApiError::forbidden(format!("origin '{origin}' is not allowed")).into_response();
            return Box::pin(async move { Ok(response) });
        };

        let policy = Arc::clone(&self.policy);

        if req.method() == Method::OPTIONS {
            return Box::pin(async move {
                let mut response = Response::new(Body::empty());
                *response.status_mut() = StatusCode::OK;
                policy.apply(allowed, &mut response);
                Ok(response)
            });
        }

        let fut = self.inner.call(req);
        Box::pin(async move {
            let mut response = fut.await?;
            policy.apply(allowed, &mut response);
            Ok(response)
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::middleware::logger::{Logger, RequestLoggerLayer};
    use crate::middleware::trace_id::TRACE_ID_HEADER;
    use scaffold_testing::helpers::{body_json, body_text};
    use scaffold_testing::LogCapture;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tower::{service_fn, ServiceExt};

    fn localhost_only() -> CorsConfig {
        CorsConfig {
            allowed_origins: vec![LOCALHOST_ORIGIN.to_owned()],
            ..CorsConfig::default()
        }
    }

    fn counting_service(
        calls: Arc<AtomicUsize>,
    ) -> impl Service<Request, Response = Response, Error = Infallible, Future: Send> + Clone + Send
    {
        service_fn(move |_req: Request| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Ok::<_, Infallible>(Response::new(Body::from("downstream"))) }
        })
    }

    fn request(method: Method, origin: Option<&str>) -> Request {
        let mut builder = Request::builder().method(method).uri("/foo");
        if let Some(origin) = origin {
            builder = builder.header(header::ORIGIN, origin);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn test_localhost_any_port() {
        let config = localhost_only();
        assert_eq!(
            config.allowed_origin("http://localhost:5173").as_deref(),
            Some("http://localhost:5173")
        );
        assert_eq!(
            config.allowed_origin("http://localhost").as_deref(),
            Some("http://localhost")
        );
        assert_eq!(config.allowed_origin("https://evil.com"), None);
    }

    #[test]
    fn test_exact_match_and_order() {
        let config = CorsConfig {
            allowed_origins: vec![
                "https://mywebsitedomain.com".to_owned(),
                LOCALHOST_ORIGIN.to_owned(),
            ],
            ..CorsConfig::default()
        };
        assert_eq!(
            config.allowed_origin("https://mywebsitedomain.com").as_deref(),
            Some("https://mywebsitedomain.com")
        );
        assert_eq!(config.allowed_origin("https://mywebsitedomain.com.evil"), None);
        assert_eq!(
            config.allowed_origin("http://localhost:8080").as_deref(),
            Some("http://localhost:8080")
        );
    }

    #[test]
    fn test_localhost_not_special_unless_listed() {
        let config = CorsConfig {
            allowed_origins: vec!["https://mywebsitedomain.com".to_owned()],
            ..CorsConfig::default()
        };
        assert_eq!(config.allowed_origin("http://localhost:5173"), None);
    }

    #[test]
    fn test_invalid_header_list_rejected() {
        let config = CorsConfig {
            allowed_headers: vec!["content-type\r\n".to_owned()],
            ..CorsConfig::default()
        };
        assert!(matches!(
            CorsLayer::new(config),
            Err(MiddlewareError::InvalidHeaderValue {
                header: "access-control-allow-headers",
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_no_origin_passes_through() {
        let calls = Arc::new(AtomicUsize::new(0));
        let service = CorsLayer::new(localhost_only())
            .unwrap()
            .layer(counting_service(Arc::clone(&calls)));

        let response = service.oneshot(request(Method::GET, None)).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(header::ACCESS_CONTROL_ALLOW_ORIGIN).is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_allowed_origin_gets_headers() {
        let calls = Arc::new(AtomicUsize::new(0));
        let service = CorsLayer::new(localhost_only())
            .unwrap()
            .layer(counting_service(Arc::clone(&calls)));

        let response = service
            .oneshot(request(Method::GET, Some("http://localhost:5173")))
            .await
            .unwrap();

        let headers = response.headers();
        assert_eq!(headers[header::ACCESS_CONTROL_ALLOW_ORIGIN], "http://localhost:5173");
        assert_eq!(
            headers[header::ACCESS_CONTROL_ALLOW_HEADERS],
            "content-type, authorization"
        );
        assert_eq!(
            headers[header::ACCESS_CONTROL_ALLOW_METHODS],
            "HEAD, GET, OPTIONS, PATCH, POST, PUT"
        );
        assert!(headers.get(header::ACCESS_CONTROL_ALLOW_CREDENTIALS).is_none());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(body_text(response).await, "downstream");
    }

    #[tokio::test]
    async fn test_credentials_header_when_enabled() {
        let config = CorsConfig {
            allow_credentials: true,
            ..localhost_only()
        };
        let calls = Arc::new(AtomicUsize::new(0));
        let service = CorsLayer::new(config).unwrap().layer(counting_service(calls));

        let response = service
            .oneshot(request(Method::GET, Some("http://localhost")))
            .await
            .unwrap();

        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_CREDENTIALS], "true");
    }

    #[tokio::test]
    async fn test_denied_origin_is_forbidden() {
        let calls = Arc::new(AtomicUsize::new(0));
        let service = CorsLayer::new(localhost_only())
            .unwrap()
            .layer(counting_service(Arc::clone(&calls)));

        let response = service
            .oneshot(request(Method::GET, Some("https://evil.com")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(
            body_json(response).await,
            serde_json::json!({ "errorMessage": "origin 'https://evil.com' is not allowed" })
        );
    }

    #[tokio::test]
    async fn test_denied_origin_logs_warning() {
        let capture = LogCapture::new();
        let _guard = capture.install();

        let calls = Arc::new(AtomicUsize::new(0));
        let service = CorsLayer::new(localhost_only())
            .unwrap()
            .layer(counting_service(calls));
        service
            .oneshot(request(Method::GET, Some("https://evil.com")))
            .await
            .unwrap();

        let event = capture
            .find("Request origin does not match any of the allowed origins")
            .unwrap();
        assert_eq!(event.level, tracing::Level::WARN);
        assert_eq!(event.field("origin"), Some("https://evil.com"));
    }

    #[tokio::test]
    async fn test_denied_origin_warning_carries_scoped_trace_id() {
        let capture = LogCapture::new();
        let _guard = capture.install();

        let calls = Arc::new(AtomicUsize::new(0));
        let service = RequestLoggerLayer::new(Some(Logger::new("webservice")), true).layer(
            CorsLayer::new(localhost_only())
                .unwrap()
                .layer(counting_service(calls)),
        );
        let mut req = request(Method::GET, Some("https://evil.com"));
        req.headers_mut()
            .insert(TRACE_ID_HEADER, HeaderValue::from_static("cors-7"));

        let response = service.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let event = capture
            .find("Request origin does not match any of the allowed origins")
            .unwrap();
        assert_eq!(event.level, tracing::Level::WARN);
        assert_eq!(event.field("trace_id"), Some("cors-7"));
        assert_eq!(event.field("component"), Some("webservice"));
    }

    #[tokio::test]
    async fn test_preflight_answered_without_downstream() {
        let calls = Arc::new(AtomicUsize::new(0));
        let service = CorsLayer::new(localhost_only())
            .unwrap()
            .layer(counting_service(Arc::clone(&calls)));

        let response = service
            .oneshot(request(Method::OPTIONS, Some("http://localhost:3000")))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN],
            "http://localhost:3000"
        );
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(body_text(response).await.is_empty());
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: CorsConfig =
            serde_json::from_str(r#"{"allow_credentials": true}"#).unwrap();
        assert!(config.allow_credentials);
        assert_eq!(config.allowed_origins, CorsConfig::default().allowed_origins);
    }
}
