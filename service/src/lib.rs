//! The runnable service built on the scaffold.
//!
//! - [`config`]: settings from environment variables
//! - [`telemetry`]: global tracing subscriber
//! - [`business`]: business operations over a database connection
//! - [`router`] / [`handlers`]: routes and the middleware pipeline
//! - [`webservice`]: the `webservice` component
//!
//! The binary picks a component by name from its first argument:
//!
//! ```text
//! scaffold webservice
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod business;
pub mod config;
pub mod handlers;
pub mod router;
pub mod telemetry;
pub mod webservice;

pub use business::{Business, BusinessError};
pub use config::{Config, ConfigError, LogFormat};
