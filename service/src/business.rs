//! Business logic, kept apart from HTTP and SQL.
//!
//! Handlers call into [`Business`]; [`Business`] talks to the database only
//! through the [`Connection`] capability, so tests run it against an
//! in-memory connection.

use scaffold_postgres::{transaction_block, Connection, Database, DatabaseError, Foo, TransactionError};
use thiserror::Error;
use tracing::{debug, instrument};

/// Errors returned by [`Business`].
#[derive(Error, Debug)]
pub enum BusinessError {
    /// No record matched.
    #[error("foo '{0}' not found")]
    NotFound(String),

    /// A record could not be written.
    #[error("failed to create foo: {0}")]
    Create(#[source] TransactionError<DatabaseError>),

    /// A read failed.
    #[error(transparent)]
    Database(#[from] DatabaseError),
}

/// The business operations of the service.
#[derive(Debug, Clone)]
pub struct Business<C> {
    conn: C,
}

impl<C> Business<C>
where
    C: Connection + Clone,
{
    /// Create a business client over `conn`.
    #[must_use]
    pub const fn new(conn: C) -> Self {
        Self { conn }
    }

    /// Store a new `foo` record inside a transaction.
    ///
    /// # Errors
    ///
    /// Returns [`BusinessError::Create`] if the transaction could not be
    /// started, the insert failed, or the commit failed.
    #[instrument(skip(self))]
    pub async fn create_foo(&self, bar: &str) -> Result<Foo, BusinessError> {
        let foo = Foo::new(bar);
        let record = foo.clone();

        transaction_block(&self.conn, move |tx| {
            Box::pin(async move { Database::new(tx).foo().insert(&record).await })
        })
        .await
        .map_err(BusinessError::Create)?;

        debug!("Created foo");
        Ok(foo)
    }

    /// Look up a `foo` record.
    ///
    /// # Errors
    ///
    /// Returns [`BusinessError::NotFound`] when no record matches and
    /// [`BusinessError::Database`] for any other failure.
    #[instrument(skip(self))]
    pub async fn find_foo(&self, bar: &str) -> Result<Foo, BusinessError> {
        let mut db = Database::new(self.conn.clone());

        db.foo().get(bar).await.map_err(|err| {
            if err.is_row_not_found() {
                BusinessError::NotFound(bar.to_owned())
            } else {
                BusinessError::Database(err)
            }
        })
    }
}
