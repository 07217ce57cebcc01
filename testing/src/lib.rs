//! # Scaffold Testing
//!
//! Testing utilities for the service scaffold.
//!
//! This crate provides:
//! - [`MockConnection`]: an in-memory connection and transaction pair that
//!   records every begin, statement, commit and rollback
//! - [`LogCapture`]: a `tracing` layer that keeps events for assertions
//! - Helpers for reading HTTP response bodies
//!
//! ## Example
//!
//! ```ignore
//! use scaffold_testing::{LogCapture, MockConnection};
//!
//! #[tokio::test]
//! async fn test_create_foo_commits() {
//!     let conn = MockConnection::new();
//!     let business = Business::new(conn.clone());
//!
//!     business.create_foo("baz").await.unwrap();
//!
//!     assert_eq!(conn.journal().committed, 1);
//! }
//! ```

pub mod database_mocks;
pub mod log_capture;

/// Mock implementations of the database traits.
pub mod mocks {
    pub use crate::database_mocks::{
        Journal, MockConnection, MockTransaction, Outcome, RecordedStatement,
    };
}

/// Helpers for HTTP responses.
pub mod helpers {
    use axum::body::Body;
    use axum::response::Response;

    const BODY_LIMIT: usize = 1024 * 1024;

    /// Read the whole response body as UTF-8 text.
    ///
    /// # Panics
    ///
    /// Panics if the body cannot be read or is not UTF-8.
    #[allow(clippy::expect_used)]
    pub async fn body_text(response: Response<Body>) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), BODY_LIMIT)
            .await
            .expect("response body should be readable");
        String::from_utf8(bytes.to_vec()).expect("response body should be UTF-8")
    }

    /// Read the whole response body as JSON.
    ///
    /// # Panics
    ///
    /// Panics if the body cannot be read or is not JSON.
    #[allow(clippy::expect_used)]
    pub async fn body_json(response: Response<Body>) -> serde_json::Value {
        let text = body_text(response).await;
        serde_json::from_str(&text).expect("response body should be JSON")
    }
}

pub use log_capture::{CapturedEvent, CapturingLayer, LogCapture};
pub use mocks::{Journal, MockConnection, MockTransaction, Outcome};
