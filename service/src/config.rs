//! Configuration loaded from environment variables.
//!
//! Every setting except `DATABASE_URL` has a default:
//!
//! | Variable | Default |
//! |---|---|
//! | `DATABASE_URL` | required |
//! | `DATABASE_MAX_CONNECTIONS` | `10` |
//! | `DATABASE_CONNECT_TIMEOUT_SECS` | `30` |
//! | `LISTEN_ADDR` | `0.0.0.0:3000` |
//! | `SHUTDOWN_TIMEOUT_SECS` | `60` |
//! | `CORS_ALLOWED_ORIGINS` | `http://localhost,https://mywebsitedomain.com` |
//! | `CORS_ALLOWED_HEADERS` | `content-type,authorization` |
//! | `CORS_ALLOWED_METHODS` | `HEAD,GET,OPTIONS,PATCH,POST,PUT` |
//! | `CORS_ALLOW_CREDENTIALS` | `false` |
//! | `LOG_FORMAT` | `json` |

use scaffold_postgres::PoolOptions;
use scaffold_web::middleware::CorsConfig;
use scaffold_web::ServerConfig;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Configuration could not be loaded.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required variable is not set.
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    /// A variable is set to something that cannot be used.
    #[error("invalid value '{value}' for {key}: {reason}")]
    Invalid {
        /// The variable name.
        key: &'static str,
        /// The value found.
        value: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The `.env` file exists but could not be read.
    #[error("failed to load .env file: {0}")]
    DotEnv(#[from] dotenvy::Error),
}

/// How log lines are rendered.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// One JSON object per line.
    #[default]
    Json,
    /// Human-readable, for local development.
    Pretty,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "pretty" => Ok(Self::Pretty),
            other => Err(format!("expected 'json' or 'pretty', got '{other}'")),
        }
    }
}

/// Database connection settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// `PostgreSQL` connection string.
    pub url: String,
    /// Pool sizing and timeouts.
    pub pool: PoolOptions,
}

/// Everything the service needs to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Database connection settings.
    pub database: DatabaseConfig,
    /// Listener address and shutdown bound.
    pub server: ServerConfig,
    /// Origin policy.
    pub cors: CorsConfig,
    /// Log rendering.
    pub log_format: LogFormat,
}

impl Config {
    /// Load configuration from the process environment, after reading a
    /// `.env` file if one exists.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DotEnv`] for an unreadable `.env` file and
    /// otherwise the errors of [`Config::from_lookup`].
    pub fn from_env() -> Result<Self, ConfigError> {
        if let Err(err) = dotenvy::dotenv() {
            if !err.not_found() {
                return Err(err.into());
            }
        }

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from `lookup`, which returns the value of a
    /// variable or `None` when it is unset.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Missing`] when `DATABASE_URL` is unset and
    /// [`ConfigError::Invalid`] for any value that does not parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env { lookup };
        let server_defaults = ServerConfig::default();
        let pool_defaults = PoolOptions::default();
        let cors_defaults = CorsConfig::default();

        let url = env
            .get("DATABASE_URL")
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;

        Ok(Self {
            database: DatabaseConfig {
                url,
                pool: PoolOptions {
                    max_connections: env
                        .parse("DATABASE_MAX_CONNECTIONS")?
                        .unwrap_or(pool_defaults.max_connections),
                    acquire_timeout: env
                        .seconds("DATABASE_CONNECT_TIMEOUT_SECS")?
                        .unwrap_or(pool_defaults.acquire_timeout),
                },
            },
            server: ServerConfig {
                addr: env
                    .parse::<SocketAddr>("LISTEN_ADDR")?
                    .unwrap_or(server_defaults.addr),
                shutdown_timeout: env
                    .seconds("SHUTDOWN_TIMEOUT_SECS")?
                    .unwrap_or(server_defaults.shutdown_timeout),
            },
            cors: CorsConfig {
                allowed_origins: env
                    .list("CORS_ALLOWED_ORIGINS")
                    .unwrap_or(cors_defaults.allowed_origins),
                allowed_headers: env
                    .list("CORS_ALLOWED_HEADERS")
                    .unwrap_or(cors_defaults.allowed_headers),
                allowed_methods: env
                    .list("CORS_ALLOWED_METHODS")
                    .unwrap_or(cors_defaults.allowed_methods),
                allow_credentials: env
                    .parse("CORS_ALLOW_CREDENTIALS")?
                    .unwrap_or(cors_defaults.allow_credentials),
            },
            log_format: env.parse("LOG_FORMAT")?.unwrap_or_default(),
        })
    }
}

struct Env<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Env<F> {
    /// The trimmed value of `key`; blank counts as unset.
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
    }

    fn parse<T>(&self, key: &'static str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: Display,
    {
        self.get(key)
            .map(|value| {
                value.parse().map_err(|err: T::Err| ConfigError::Invalid {
                    key,
                    reason: err.to_string(),
                    value,
                })
            })
            .transpose()
    }

    fn seconds(&self, key: &'static str) -> Result<Option<Duration>, ConfigError> {
        Ok(self.parse::<u64>(key)?.map(Duration::from_secs))
    }

    fn list(&self, key: &str) -> Option<Vec<String>> {
        self.get(key).map(|value| {
            value
                .split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_owned)
                .collect()
        })
    }
}
