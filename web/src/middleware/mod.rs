//! Tower middleware for request tracking, logging and access control.
//!
//! This module provides layers for:
//! - **Trace ids**: make sure every request carries an `x-trace-id`
//! - **Access logging**: log every request and response, contain panics
//! - **Scoped loggers**: attach a per-request logger carrying the trace id
//! - **CORS**: allow or deny cross-origin requests
//!
//! and [`Pipeline`], which stacks them around a router in declaration order.
//!
//! # Example
//!
//! ```ignore
//! use scaffold_web::middleware::{
//!     AccessLogLayer, CorsConfig, CorsLayer, Pipeline, RequestLoggerLayer, TraceIdLayer,
//! };
//!
//! let service = Pipeline::new()
//!     .layer(TraceIdLayer)
//!     .layer(AccessLogLayer::new(logger.clone()))
//!     .layer(RequestLoggerLayer::new(Some(logger), true))
//!     .layer(CorsLayer::new(CorsConfig::default())?)
//!     .compose(router);
//! ```

pub mod access_log;
pub mod cors;
pub mod logger;
pub mod panic;
pub mod pipeline;
pub mod trace_id;

pub use access_log::{severity_for_status, AccessLog, AccessLogLayer};
pub use cors::{Cors, CorsConfig, CorsLayer, LOCALHOST_ORIGIN};
pub use logger::{Logger, LoggerExt, RequestLogger, RequestLoggerLayer};
pub use panic::PanicReport;
pub use pipeline::{HttpService, Pipeline};
pub use trace_id::{request_trace_id, trace_id_of, TraceId, TraceIdExt, TraceIdLayer, TraceIdMiddleware, TRACE_ID_HEADER};
