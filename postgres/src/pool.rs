//! Connection pool construction.

use crate::error::{DatabaseError, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Connection as _, PgPool};
use std::time::Duration;
use tracing::info;

/// Pool sizing and timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolOptions {
    /// Maximum number of connections in the pool.
    pub max_connections: u32,
    /// How long to wait for a free connection.
    pub acquire_timeout: Duration,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout: Duration::from_secs(30),
        }
    }
}

/// Build a pool for `url` and ping the database once.
///
/// # Errors
///
/// Returns [`DatabaseError::Connect`] when the pool cannot be created and
/// [`DatabaseError::Ping`] when the database does not answer.
pub async fn connect(url: &str, options: PoolOptions) -> Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(options.max_connections)
        .acquire_timeout(options.acquire_timeout)
        .connect(url)
        .await
        .map_err(DatabaseError::Connect)?;

    let mut conn = pool.acquire().await.map_err(DatabaseError::Ping)?;
    conn.ping().await.map_err(DatabaseError::Ping)?;
    drop(conn);

    info!(
        max_connections = options.max_connections,
        "Database pool ready"
    );

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = PoolOptions::default();
        assert_eq!(options.max_connections, 10);
        assert_eq!(options.acquire_timeout, Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_connect_reports_unreachable_database() {
        let options = PoolOptions {
            max_connections: 1,
            acquire_timeout: Duration::from_millis(200),
        };

        let result = connect("postgres://nobody@127.0.0.1:1/nothing", options).await;

        assert!(matches!(result, Err(DatabaseError::Connect(_))));
    }
}
