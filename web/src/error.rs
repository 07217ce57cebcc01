//! Error types for the HTTP layer.
//!
//! [`ApiError`] is what handlers and middleware send back to clients. The
//! other types describe failures of the middleware setup and of the server
//! itself and never reach a client.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::fmt;
use std::net::SocketAddr;
use thiserror::Error;

/// Error sent to a client as `{"errorMessage": "..."}`.
///
/// # Examples
///
/// ```ignore
/// async fn handler() -> Result<Json<Foo>, ApiError> {
///     let foo = business.find_foo("baz").await
///         .map_err(|_| ApiError::new(StatusCode::NOT_FOUND, "foo baz not found"))?;
///     Ok(Json(foo))
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    /// Create an error with any status.
    #[must_use]
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    /// Create a 403 Forbidden error.
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    /// Create a 500 Internal Server Error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    /// The response status.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// The message sent to the client.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl std::error::Error for ApiError {}

/// Error response body (JSON).
#[derive(Debug, Serialize)]
struct ErrorResponse<'a> {
    #[serde(rename = "errorMessage")]
    error_message: &'a str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(status = self.status.as_u16(), message = %self.message, "Internal server error");
        }

        let body = ErrorResponse {
            error_message: &self.message,
        };

        (self.status, Json(body)).into_response()
    }
}

/// A middleware could not be built from its configuration.
#[derive(Error, Debug)]
pub enum MiddlewareError {
    /// A configured value cannot be sent as a header.
    #[error("invalid value for header {header}: {value:?}")]
    InvalidHeaderValue {
        /// The header the value was meant for.
        header: &'static str,
        /// The offending value.
        value: String,
        /// Why it was rejected.
        #[source]
        source: http::header::InvalidHeaderValue,
    },
}

/// The server failed to start or stopped abnormally.
#[derive(Error, Debug)]
pub enum ServerError {
    /// The listener could not be bound.
    #[error("failed to listen on {addr}: {source}")]
    Bind {
        /// The requested address.
        addr: SocketAddr,
        /// The bind failure.
        #[source]
        source: std::io::Error,
    },

    /// The bound listener has no usable local address.
    #[error("failed to read listener address: {0}")]
    LocalAddr(#[source] std::io::Error),

    /// Serving stopped for a reason other than shutdown.
    #[error("error while trying to serve: {0}")]
    Serve(#[source] std::io::Error),

    /// The serve task itself panicked.
    #[error("serve task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use scaffold_testing::helpers::body_json;

    #[test]
    fn test_error_display_is_message() {
        let err = ApiError::forbidden("origin 'x' is not allowed");
        assert_eq!(err.to_string(), "origin 'x' is not allowed");
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_error_renders_json_body() {
        let response = ApiError::new(StatusCode::NOT_FOUND, "foo missing").into_response();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "application/json"
        );
        let body = body_json(response).await;
        assert_eq!(body, serde_json::json!({ "errorMessage": "foo missing" }));
    }

    #[test]
    fn test_invalid_header_error_names_header() {
        let source = http::HeaderValue::from_str("bad\nvalue").unwrap_err();
        let err = MiddlewareError::InvalidHeaderValue {
            header: "access-control-allow-headers",
            value: "bad\nvalue".into(),
            source,
        };
        assert!(err.to_string().starts_with("invalid value for header access-control-allow-headers"));
    }
}
