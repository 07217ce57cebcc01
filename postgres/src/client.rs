//! Database client holding the record-level queries.
//!
//! A [`Database`] wraps any [`Queryable`] handle, so the same queries run on
//! the pool or inside a transaction:
//!
//! ```ignore
//! // On the pool
//! let foo = Database::new(pool.clone()).foo().get("baz").await?;
//!
//! // Inside a transaction
//! transaction_block(&pool, |tx| {
//!     Box::pin(async move { Database::new(tx).foo().insert(&Foo::new("baz")).await })
//! })
//! .await?;
//! ```

use crate::error::Result;
use crate::foo::FooClient;
use crate::handle::Queryable;

/// Entry point to the record clients.
///
/// Group related queries in sub-clients (see [`Database::foo`]) instead of
/// growing this type.
#[derive(Debug)]
pub struct Database<H> {
    handle: H,
}

impl<H: Queryable> Database<H> {
    /// Create a client over a pooled connection or an open transaction.
    #[must_use]
    pub const fn new(handle: H) -> Self {
        Self { handle }
    }

    /// Queries on the `foo` table.
    pub fn foo(&mut self) -> FooClient<'_, H> {
        FooClient::new(&mut self.handle)
    }

    /// Cheap connectivity check.
    ///
    /// # Errors
    ///
    /// Returns the query error if the database cannot be reached.
    pub async fn ping(&mut self) -> Result<()> {
        self.handle
            .execute(sqlx::query("SELECT 1"))
            .await
            .map(|_| ())
            .map_err(|e| e.context("failed to ping database"))
    }

    /// Give the underlying handle back.
    #[must_use]
    pub fn into_inner(self) -> H {
        self.handle
    }
}
