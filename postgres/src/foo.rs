//! The `foo` record.

use crate::error::Result;
use crate::handle::Queryable;
use sqlx::FromRow;

/// Schema for the `foo` table.
pub const FOO_SCHEMA: &str = r"
    CREATE TABLE IF NOT EXISTS foo (
        bar TEXT NOT NULL
    )
";

/// A row of the `foo` table.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Foo {
    /// The only column.
    pub bar: String,
}

impl Foo {
    /// Create a record.
    #[must_use]
    pub fn new(bar: impl Into<String>) -> Self {
        Self { bar: bar.into() }
    }
}

/// Queries on the `foo` table, borrowed from a [`Database`](crate::Database).
#[derive(Debug)]
pub struct FooClient<'a, H> {
    handle: &'a mut H,
}

impl<'a, H: Queryable> FooClient<'a, H> {
    pub(crate) fn new(handle: &'a mut H) -> Self {
        Self { handle }
    }

    /// Insert a record.
    ///
    /// # Errors
    ///
    /// Returns the query error wrapped with `failed to insert foo`.
    pub async fn insert(&mut self, foo: &Foo) -> Result<()> {
        self.handle
            .execute(sqlx::query("INSERT INTO foo (bar) VALUES ($1)").bind(foo.bar.clone()))
            .await
            .map(|_| ())
            .map_err(|e| e.context("failed to insert foo"))
    }

    /// Fetch the record whose `bar` equals `bar`.
    ///
    /// # Errors
    ///
    /// Returns the query error wrapped with `failed to get foo`; a missing
    /// record satisfies [`DatabaseError::is_row_not_found`](crate::DatabaseError::is_row_not_found).
    pub async fn get(&mut self, bar: &str) -> Result<Foo> {
        let row = self
            .handle
            .fetch_one(sqlx::query("SELECT bar FROM foo WHERE bar = $1").bind(bar.to_owned()))
            .await
            .map_err(|e| e.context("failed to get foo"))?;

        Foo::from_row(&row).map_err(|e| crate::DatabaseError::from(e).context("failed to get foo"))
    }

    /// Fetch every record.
    ///
    /// # Errors
    ///
    /// Returns the query error wrapped with `failed to list foo`.
    pub async fn list(&mut self) -> Result<Vec<Foo>> {
        let rows = self
            .handle
            .fetch_all(sqlx::query("SELECT bar FROM foo ORDER BY bar"))
            .await
            .map_err(|e| e.context("failed to list foo"))?;

        rows.iter()
            .map(Foo::from_row)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| crate::DatabaseError::from(e).context("failed to list foo"))
    }
}
