//! Routes and the middleware pipeline around them.

use crate::business::Business;
use crate::handlers;
use axum::routing::get;
use axum::Router;
use scaffold_postgres::Connection;
use scaffold_web::middleware::{
    AccessLogLayer, CorsConfig, CorsLayer, RequestLoggerLayer, TraceIdLayer,
};
use scaffold_web::{HttpService, Logger, MiddlewareError, Pipeline};
use std::sync::Arc;

/// Dependencies shared by the handlers.
///
/// Anything a handler needs (database, queues, clients) is created once at
/// startup and added here.
#[derive(Debug)]
pub struct AppState<C> {
    /// Business operations.
    pub business: Business<C>,
}

/// The routes of the service.
pub fn routes<C>(business: Business<C>) -> Router
where
    C: Connection + Clone + 'static,
{
    Router::new()
        .route("/healthz", get(handlers::healthz))
        .route("/foo", get(handlers::foo::<C>))
        .with_state(Arc::new(AppState { business }))
}

/// The routes wrapped in the service's middleware, outermost first.
///
/// # Errors
///
/// Returns [`MiddlewareError`] if the origin policy cannot be turned into
/// response headers.
pub fn service<C>(
    business: Business<C>,
    logger: &Logger,
    cors: CorsConfig,
) -> Result<HttpService, MiddlewareError>
where
    C: Connection + Clone + 'static,
{
    Ok(Pipeline::new()
        .layer(TraceIdLayer)
        .layer(AccessLogLayer::new(logger.clone()))
        .layer(RequestLoggerLayer::new(Some(logger.clone()), true))
        .layer(CorsLayer::new(cors)?)
        .compose(routes(business)))
}
