//! One operation surface over a pooled connection or an open transaction.
//!
//! Record clients are written against [`Queryable`] and never know whether
//! they run on the pool or inside a transaction:
//!
//! ```text
//! PgPool ─────────────┐
//!                     ├── Queryable: execute / fetch_one / fetch_all
//! PgTransaction ──────┘
//!     ▲
//!     └── Connection::begin (PgPool)
//! ```
//!
//! A transaction handle is owned by exactly one caller at a time; every
//! method takes `&mut self`, so concurrent use is ruled out by the borrow
//! checker rather than by a lock.

use crate::error::{DatabaseError, Result};
use sqlx::postgres::{PgArguments, PgQueryResult, PgRow};
use sqlx::{PgPool, Postgres};
use std::future::Future;

/// A statement with its bound arguments, as built by [`sqlx::query`].
pub type PgQuery<'q> = sqlx::query::Query<'q, Postgres, PgArguments>;

/// The three operations every database handle supports.
pub trait Queryable: Send {
    /// Run a statement that returns no rows.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Query`] when the statement fails and
    /// [`DatabaseError::TransactionClosed`] when the handle is a finished
    /// transaction.
    fn execute<'q>(
        &mut self,
        query: PgQuery<'q>,
    ) -> impl Future<Output = Result<PgQueryResult>> + Send;

    /// Run a statement that must return exactly one row.
    ///
    /// # Errors
    ///
    /// As [`Queryable::execute`]; no row is `sqlx::Error::RowNotFound`.
    fn fetch_one<'q>(&mut self, query: PgQuery<'q>) -> impl Future<Output = Result<PgRow>> + Send;

    /// Run a statement and collect every row.
    ///
    /// # Errors
    ///
    /// As [`Queryable::execute`].
    fn fetch_all<'q>(
        &mut self,
        query: PgQuery<'q>,
    ) -> impl Future<Output = Result<Vec<PgRow>>> + Send;
}

/// A handle that can open transactions.
pub trait Connection: Queryable + Sync {
    /// The transaction type this connection opens.
    type Transaction: Transaction;

    /// Start a new transaction.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Begin`] when the transaction cannot be started.
    fn begin(&self) -> impl Future<Output = Result<Self::Transaction>> + Send;
}

/// An open transaction.
///
/// It starts open and moves exactly once to committed or rolled back. Any
/// further terminal call, or any query afterwards, fails with
/// [`DatabaseError::TransactionClosed`].
pub trait Transaction: Queryable {
    /// Make the transaction's changes permanent.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::TransactionClosed`] if the transaction already
    /// finished, or [`DatabaseError::Query`] if the commit itself failed.
    fn commit(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Discard the transaction's changes.
    ///
    /// # Errors
    ///
    /// As [`Transaction::commit`].
    fn rollback(&mut self) -> impl Future<Output = Result<()>> + Send;

    /// Whether the transaction has not finished yet.
    fn is_open(&self) -> bool;
}

impl Queryable for PgPool {
    async fn execute<'q>(&mut self, query: PgQuery<'q>) -> Result<PgQueryResult> {
        Ok(query.execute(&*self).await?)
    }

    async fn fetch_one<'q>(&mut self, query: PgQuery<'q>) -> Result<PgRow> {
        Ok(query.fetch_one(&*self).await?)
    }

    async fn fetch_all<'q>(&mut self, query: PgQuery<'q>) -> Result<Vec<PgRow>> {
        Ok(query.fetch_all(&*self).await?)
    }
}

impl Connection for PgPool {
    type Transaction = PgTransaction;

    async fn begin(&self) -> Result<PgTransaction> {
        let inner = sqlx::Pool::begin(self).await.map_err(DatabaseError::Begin)?;
        Ok(PgTransaction { inner: Some(inner) })
    }
}

/// An open `PostgreSQL` transaction taken from a [`PgPool`].
///
/// Dropping it while still open rolls it back when the connection returns
/// to the pool.
pub struct PgTransaction {
    inner: Option<sqlx::Transaction<'static, Postgres>>,
}

impl std::fmt::Debug for PgTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgTransaction")
            .field("open", &self.inner.is_some())
            .finish()
    }
}

impl PgTransaction {
    fn open(&mut self) -> Result<&mut sqlx::Transaction<'static, Postgres>> {
        self.inner.as_mut().ok_or(DatabaseError::TransactionClosed)
    }
}

impl Queryable for PgTransaction {
    async fn execute<'q>(&mut self, query: PgQuery<'q>) -> Result<PgQueryResult> {
        let tx = self.open()?;
        Ok(query.execute(&mut **tx).await?)
    }

    async fn fetch_one<'q>(&mut self, query: PgQuery<'q>) -> Result<PgRow> {
        let tx = self.open()?;
        Ok(query.fetch_one(&mut **tx).await?)
    }

    async fn fetch_all<'q>(&mut self, query: PgQuery<'q>) -> Result<Vec<PgRow>> {
        let tx = self.open()?;
        Ok(query.fetch_all(&mut **tx).await?)
    }
}

impl Transaction for PgTransaction {
    async fn commit(&mut self) -> Result<()> {
        let tx = self.inner.take().ok_or(DatabaseError::TransactionClosed)?;
        Ok(tx.commit().await?)
    }

    async fn rollback(&mut self) -> Result<()> {
        let tx = self.inner.take().ok_or(DatabaseError::TransactionClosed)?;
        Ok(tx.rollback().await?)
    }

    fn is_open(&self) -> bool {
        self.inner.is_some()
    }
}

impl<T: Queryable + ?Sized> Queryable for &mut T {
    fn execute<'q>(
        &mut self,
        query: PgQuery<'q>,
    ) -> impl Future<Output = Result<PgQueryResult>> + Send {
        (**self).execute(query)
    }

    fn fetch_one<'q>(&mut self, query: PgQuery<'q>) -> impl Future<Output = Result<PgRow>> + Send {
        (**self).fetch_one(query)
    }

    fn fetch_all<'q>(
        &mut self,
        query: PgQuery<'q>,
    ) -> impl Future<Output = Result<Vec<PgRow>>> + Send {
        (**self).fetch_all(query)
    }
}
