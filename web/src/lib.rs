//! HTTP layer of the service scaffold.
//!
//! This crate hosts an Axum router behind a fixed middleware pipeline and
//! runs it with bounded graceful shutdown.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │ Server (listener, shutdown watcher)      │  ← SIGINT / SIGTERM
//! ├──────────────────────────────────────────┤
//! │ TraceIdLayer        x-trace-id           │
//! │ AccessLogLayer      access log, panics   │
//! │ RequestLoggerLayer  scoped logger        │
//! │ CorsLayer           origin policy        │
//! ├──────────────────────────────────────────┤
//! │ Router → handlers → business → database  │
//! └──────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use scaffold_web::middleware::{AccessLogLayer, CorsLayer, Pipeline, RequestLoggerLayer, TraceIdLayer};
//! use scaffold_web::{shutdown_signal, Logger, Server, ServerConfig};
//!
//! let logger = Logger::new("webservice");
//! let service = Pipeline::new()
//!     .layer(TraceIdLayer)
//!     .layer(AccessLogLayer::new(logger.clone()))
//!     .layer(RequestLoggerLayer::new(Some(logger), true))
//!     .layer(CorsLayer::new(cors_config)?)
//!     .compose(router);
//!
//! Server::new(ServerConfig::default(), service)
//!     .run(shutdown_signal())
//!     .await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod extractors;
pub mod middleware;
pub mod server;

// Re-export key types for convenience
pub use error::{ApiError, MiddlewareError, ServerError};
pub use middleware::{HttpService, Logger, LoggerExt, Pipeline, TraceId, TraceIdExt, TRACE_ID_HEADER};
pub use server::{shutdown_signal, Server, ServerConfig, ServerState};
