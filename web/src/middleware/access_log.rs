//! Access logging and the panic boundary.
//!
//! Every request produces an `Incoming request` event on entry and an
//! `Outgoing response` event on exit. The exit event's level follows the
//! response status (see [`severity_for_status`]).
//!
//! A panic anywhere downstream stops here: it is logged with its message and
//! backtrace, the client gets a 500, and the completion event is still
//! emitted with status 0.

use crate::error::ApiError;
use crate::middleware::logger::Logger;
use crate::middleware::panic::{catch_panic, guarded};
use crate::middleware::trace_id::request_trace_id;
use axum::extract::{ConnectInfo, Request};
use axum::http::header::USER_AGENT;
use axum::response::{IntoResponse, Response};
use futures::future::BoxFuture;
use std::borrow::Cow;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::task::{Context, Poll};
use std::time::Instant;
use tower::{Layer, Service};
use tracing::Level;

/// Emit an event at a level chosen at runtime.
macro_rules! event_at {
    ($parent:expr, $level:expr, $($fields:tt)+) => {
        match $level {
            Level::ERROR => tracing::event!(parent: $parent, Level::ERROR, $($fields)+),
            Level::WARN => tracing::event!(parent: $parent, Level::WARN, $($fields)+),
            Level::INFO => tracing::event!(parent: $parent, Level::INFO, $($fields)+),
            Level::DEBUG => tracing::event!(parent: $parent, Level::DEBUG, $($fields)+),
            _ => tracing::event!(parent: $parent, Level::TRACE, $($fields)+),
        }
    };
}

/// Level of the completion event for a response status.
///
/// | status | level |
/// |---|---|
/// | 0 (no response) | ERROR |
/// | 100–199 | DEBUG |
/// | 200–399 | INFO |
/// | 400–499 | WARN |
/// | 500–599 | ERROR |
/// | anything else | INFO |
#[must_use]
pub const fn severity_for_status(status: u16) -> Level {
    match status {
        0 | 500..=599 => Level::ERROR,
        100..=199 => Level::DEBUG,
        400..=499 => Level::WARN,
        _ => Level::INFO,
    }
}

/// Layer logging each request and containing panics.
#[derive(Clone, Debug)]
pub struct AccessLogLayer {
    logger: Logger,
}

impl AccessLogLayer {
    /// Log through `logger`.
    #[must_use]
    pub const fn new(logger: Logger) -> Self {
        Self { logger }
    }
}

impl<S> Layer<S> for AccessLogLayer {
    type Service = AccessLog<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AccessLog {
            inner,
            logger: self.logger.clone(),
        }
    }
}

/// Middleware service logging each request and containing panics.
#[derive(Clone, Debug)]
pub struct AccessLog<S> {
    inner: S,
    logger: Logger,
}

impl<S> Service<Request> for AccessLog<S>
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
        let start = Instant::now();
        let logger = self.logger.clone();
        let trace_id = request_trace_id(&req).map(Cow::into_owned).unwrap_or_default();

        let remote_ip = req
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.to_string())
            .unwrap_or_default();
        let user_agent = req
            .headers()
            .get(USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();

        tracing::info!(
            parent: logger.span(),
            url = %req.uri().path(),
            proto = ?req.version(),
            method = %req.method(),
            remote_ip = %remote_ip,
            user_agent = %user_agent,
            trace_id = %trace_id,
            "Incoming request"
        );

        let call = guarded(|| self.inner.call(req));

        Box::pin(async move {
            let outcome = match call {
                Ok(fut) => catch_panic(fut).await,
                Err(report) => Err(report),
            };

            let (status, response) = match outcome {
                Ok(Ok(response)) => (response.status().as_u16(), response),
                Ok(Err(never)) => match never {},
                Err(report) => {
                    tracing::error!(
                        parent: logger.span(),
                        recover_info = %report.message,
                        stack_trace = %report.stack_trace,
                        trace_id = %trace_id,
                        "Panic while handling incoming request"
                    );
                    (0, ApiError::internal("internal server error").into_response())
                }
            };

            let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
            event_at!(
                logger.span(),
                severity_for_status(status),
                status,
                trace_id = %trace_id,
                latency_ms,
                "Outgoing response"
            );

            Ok(response)
        })
    }
}
