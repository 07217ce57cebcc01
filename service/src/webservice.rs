//! The `webservice` component.

use crate::business::Business;
use crate::config::Config;
use crate::router;
use anyhow::Context as _;
use scaffold_postgres::connect;
use scaffold_web::{Logger, Server};
use std::future::Future;
use tracing::info;

/// Connect to the database, build the router and serve until `shutdown`
/// resolves.
///
/// # Errors
///
/// Returns an error if the database is unreachable, the middleware cannot
/// be built, or the server fails to bind or serve.
pub async fn run<F>(config: Config, logger: Logger, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let pool = connect(&config.database.url, config.database.pool)
        .await
        .context("failed to get router")?;

    let service = router::service(Business::new(pool), &logger, config.cors)
        .context("failed to get router")?;

    info!(parent: logger.span(), addr = %config.server.addr, "Starting webservice");

    Server::new(config.server, service)
        .run(shutdown)
        .await
        .context("http server failed")
}
