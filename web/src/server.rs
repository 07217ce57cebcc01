//! Service lifecycle and graceful shutdown.
//!
//! [`Server::run`] binds the listener and then runs two tasks until both
//! have finished:
//!
//! 1. **Serve**: accept connections and hand requests to the composed
//!    service. Stopping because of shutdown is normal; any other failure is
//!    returned as [`ServerError::Serve`].
//! 2. **Watch**: wait for the shutdown future, stop accepting new
//!    connections and let in-flight requests finish. Once the shutdown
//!    timeout has elapsed, requests still running are dropped and answered
//!    with a 503, and the serve task is aborted.
//!
//! # Example
//!
//! ```rust,ignore
//! let server = Server::new(ServerConfig::default(), service);
//! server.run(shutdown_signal()).await?;
//! ```

use crate::error::{ApiError, ServerError};
use crate::middleware::pipeline::HttpService;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower::ServiceExt;
use tracing::{error, info, warn};

/// Where to listen and how long to wait for in-flight requests on shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerConfig {
    /// Listener address.
    pub addr: SocketAddr,
    /// Upper bound on graceful shutdown.
    pub shutdown_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            shutdown_timeout: Duration::from_secs(60),
        }
    }
}

/// Lifecycle of a [`Server`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Created, not yet accepting connections.
    Starting,
    /// Accepting connections.
    Running,
    /// No longer accepting; draining in-flight requests.
    ShuttingDown,
    /// Both tasks have finished.
    Stopped,
}

/// An HTTP server hosting one composed service.
#[derive(Debug)]
pub struct Server {
    config: ServerConfig,
    service: HttpService,
    state: watch::Sender<ServerState>,
}

impl Server {
    /// A server that will host `service`.
    #[must_use]
    pub fn new(config: ServerConfig, service: HttpService) -> Self {
        let (state, _) = watch::channel(ServerState::Starting);
        Self {
            config,
            service,
            state,
        }
    }

    /// Follow the server's state.
    #[must_use]
    pub fn state(&self) -> watch::Receiver<ServerState> {
        self.state.subscribe()
    }

    /// Bind the configured address and serve until `shutdown` resolves.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound, and
    /// otherwise the errors of [`Server::run_with_listener`].
    pub async fn run<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.config.addr;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;

        self.run_with_listener(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves.
    ///
    /// Returns once the serve task and the shutdown watcher have both
    /// finished. Problems during shutdown are logged, not returned.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Serve`] if serving fails for a reason other
    /// than shutdown, and [`ServerError::Task`] if the serve task panicked.
    pub async fn run_with_listener<F>(
        self,
        listener: TcpListener,
        shutdown: F,
    ) -> Result<(), ServerError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr().map_err(ServerError::LocalAddr)?;
        let shutdown_timeout = self.config.shutdown_timeout;
        let state = Arc::new(self.state);

        let (cutoff_tx, cutoff_rx) = watch::channel(false);
        let app = Router::new()
            .fallback_service(with_cutoff(self.service, cutoff_rx))
            .into_make_service_with_connect_info::<SocketAddr>();

        let (drain_tx, mut drain_rx) = watch::channel(false);
        let (finished_tx, mut finished_rx) = watch::channel(false);

        info!(%addr, "Starting http server");
        state.send_replace(ServerState::Running);

        let serve_task = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async move { raised(&mut drain_rx).await })
                .await;
            finished_tx.send_replace(true);
            result
        });
        let serve_abort = serve_task.abort_handle();

        let watcher_state = Arc::clone(&state);
        let watcher_task = tokio::spawn(async move {
            tokio::select! {
                () = shutdown => {
                    info!("Shutdown requested, draining in-flight requests");
                }
                () = raised(&mut finished_rx) => {
                    return;
                }
            }

            watcher_state.send_replace(ServerState::ShuttingDown);
            drain_tx.send_replace(true);

            let drained = tokio::time::timeout(shutdown_timeout, raised(&mut finished_rx)).await;

            if drained.is_err() {
                error!(
                    timeout_secs = shutdown_timeout.as_secs_f64(),
                    "Error while trying to gracefully shutdown: timed out, closing remaining connections"
                );
                cutoff_tx.send_replace(true);
                serve_abort.abort();
            }
        });

        let (serve_result, watcher_result) = tokio::join!(serve_task, watcher_task);

        if let Err(err) = watcher_result {
            warn!(error = %err, "Shutdown watcher failed");
        }

        let result = match serve_result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => {
                error!(error = %err, "Error while trying to serve");
                Err(ServerError::Serve(err))
            }
            Err(err) if err.is_cancelled() => Ok(()),
            Err(err) => Err(ServerError::Task(err)),
        };

        state.send_replace(ServerState::Stopped);
        info!("Http server stopped");
        result
    }
}

/// Resolves once `flag` is set or its sender is gone.
async fn raised(flag: &mut watch::Receiver<bool>) {
    let _ = flag.wait_for(|set| *set).await;
}

/// Resolves only once `flag` is set; a dropped sender never cuts anything off.
async fn cut_off(mut flag: watch::Receiver<bool>) {
    if flag.wait_for(|set| *set).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Race every response future of `service` against `cutoff`. A request still
/// pending when the flag is raised has its future dropped and gets a 503
/// that closes the connection.
fn with_cutoff(service: HttpService, cutoff: watch::Receiver<bool>) -> HttpService {
    HttpService::new(service.map_future(move |fut| {
        let cutoff = cutoff.clone();
        async move {
            tokio::select! {
                result = fut => result,
                () = cut_off(cutoff) => {
                    warn!("Request cut off by shutdown");
                    Ok(cut_off_response())
                }
            }
        }
    }))
}

fn cut_off_response() -> Response {
    let mut response =
        ApiError::new(StatusCode::SERVICE_UNAVAILABLE, "server is shutting down").into_response();
    response
        .headers_mut()
        .insert(header::CONNECTION, HeaderValue::from_static("close"));
    response
}

/// Resolves on the first SIGINT (Ctrl+C) or SIGTERM.
///
/// A signal whose handler cannot be installed is logged and ignored.
pub async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal");
        }
        () = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
