//! Service entry point.
//!
//! ```text
//! scaffold webservice
//! ```

use anyhow::{bail, Context as _};
use scaffold_service::config::{Config, ConfigError};
use scaffold_service::{telemetry, webservice};
use scaffold_web::{shutdown_signal, Logger};
use std::process::ExitCode;
use tracing::error;

#[tokio::main]
async fn main() -> ExitCode {
    let component = std::env::args().nth(1).unwrap_or_default();
    let config = Config::from_env();

    let format = config
        .as_ref()
        .map(|config| config.log_format)
        .unwrap_or_default();
    if let Err(err) = telemetry::init(format) {
        eprintln!("failed to initialize logging: {err}");
        return ExitCode::FAILURE;
    }

    let logger = Logger::new(&component);

    match run(&component, config, logger.clone()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let chain = format!("{err:#}");
            error!(parent: logger.span(), error = %chain, "Error while running, exiting");
            ExitCode::FAILURE
        }
    }
}

async fn run(
    component: &str,
    config: Result<Config, ConfigError>,
    logger: Logger,
) -> anyhow::Result<()> {
    match component {
        "webservice" => {
            let config = config.context("failed to load configuration")?;
            webservice::run(config, logger, shutdown_signal()).await
        }
        other => bail!("unknown component '{other}', failed to start"),
    }
}
