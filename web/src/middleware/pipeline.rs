//! Ordered composition of middleware around a base service.
//!
//! Layers run in the order they are declared: the first declared layer sees
//! the request first and the response last.
//!
//! ```text
//! request ──▶ layer 1 ──▶ layer 2 ──▶ … ──▶ base
//! response ◀── layer 1 ◀── layer 2 ◀── … ◀──┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use scaffold_web::middleware::{AccessLogLayer, Pipeline, TraceIdLayer};
//!
//! let service = Pipeline::new()
//!     .layer(TraceIdLayer)
//!     .layer(AccessLogLayer::new(logger))
//!     .compose(router);
//! ```

use axum::extract::Request;
use axum::response::Response;
use std::convert::Infallible;
use std::fmt;
use tower::util::BoxCloneService;
use tower::{Layer, Service};

/// The type-erased service every layer wraps and produces.
pub type HttpService = BoxCloneService<Request, Response, Infallible>;

type Wrap = Box<dyn FnOnce(HttpService) -> HttpService + Send>;

/// An ordered list of layers waiting for a base service.
#[derive(Default)]
pub struct Pipeline {
    layers: Vec<Wrap>,
}

impl Pipeline {
    /// An empty pipeline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a layer; it runs after every layer declared before it.
    #[must_use]
    pub fn layer<L>(mut self, layer: L) -> Self
    where
        L: Layer<HttpService> + Send + 'static,
        L::Service: Service<Request, Response = Response, Error = Infallible> + Clone + Send + 'static,
        <L::Service as Service<Request>>::Future: Send + 'static,
    {
        self.layers
            .push(Box::new(move |inner| BoxCloneService::new(layer.layer(inner))));
        self
    }

    /// Number of declared layers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Whether no layer was declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Wrap `base` in every declared layer.
    ///
    /// The last declared layer is applied first so that the first declared
    /// ends up outermost.
    pub fn compose<S>(self, base: S) -> HttpService
    where
        S: Service<Request, Response = Response, Error = Infallible> + Clone + Send + 'static,
        S::Future: Send + 'static,
    {
        self.layers
            .into_iter()
            .rev()
            .fold(BoxCloneService::new(base), |inner, wrap| wrap(inner))
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("layers", &self.layers.len())
            .finish()
    }
}
