//! HTTP handlers.

use crate::router::AppState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use scaffold_postgres::Connection;
use scaffold_web::Logger;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Liveness probe.
pub async fn healthz() -> StatusCode {
    StatusCode::OK
}

/// Body of `GET /foo`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FooResponse {
    /// Always `baz`.
    pub bar: String,
}

/// `GET /foo`
pub async fn foo<C>(State(_state): State<Arc<AppState<C>>>, logger: Logger) -> Json<FooResponse>
where
    C: Connection + Clone + 'static,
{
    debug!(parent: logger.span(), "Serving foo");

    Json(FooResponse {
        bar: "baz".to_owned(),
    })
}
