//! In-memory connection and transaction for testing data access code.
//!
//! [`MockConnection`] implements the same traits as `PgPool`, so business
//! code generic over [`Connection`] runs against it unchanged. Every call is
//! written to a shared [`Journal`] that tests inspect afterwards.
//!
//! # Example
//!
//! ```
//! use scaffold_postgres::{transaction_block, DatabaseError};
//! use scaffold_testing::MockConnection;
//!
//! # async fn example() {
//! let conn = MockConnection::new();
//!
//! let result: Result<(), _> =
//!     transaction_block(&conn, |_tx| Box::pin(async { Ok::<_, DatabaseError>(()) })).await;
//!
//! assert!(result.is_ok());
//! assert_eq!(conn.journal().committed, 1);
//! # }
//! ```

use scaffold_postgres::{Connection, DatabaseError, PgQuery, Queryable, Result, Transaction};
use sqlx::postgres::{PgQueryResult, PgRow};
use sqlx::Execute;
use std::sync::{Arc, Mutex, PoisonError};

/// What a scripted step does when it is reached.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Outcome {
    /// The step succeeds.
    #[default]
    Succeed,
    /// The step fails with a database error.
    Fail,
    /// The step fails because the transaction was already closed.
    Closed,
}

/// How the mock behaves at each step.
#[derive(Debug, Clone, Copy, Default)]
struct Script {
    begin: Outcome,
    statement: Outcome,
    commit: Outcome,
    rollback: Outcome,
}

/// A statement seen by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedStatement {
    /// The SQL text.
    pub sql: String,
    /// Whether it ran inside a transaction.
    pub in_transaction: bool,
}

/// Everything the mock was asked to do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Journal {
    /// Transactions started.
    pub begun: usize,
    /// Successful commits.
    pub committed: usize,
    /// Successful rollbacks.
    pub rolled_back: usize,
    /// Commit attempts, successful or not.
    pub commit_attempts: usize,
    /// Rollback attempts, successful or not.
    pub rollback_attempts: usize,
    /// Statements in the order they ran.
    pub statements: Vec<RecordedStatement>,
}

type SharedJournal = Arc<Mutex<Journal>>;

fn record<R>(journal: &SharedJournal, f: impl FnOnce(&mut Journal) -> R) -> R {
    let mut guard = journal.lock().unwrap_or_else(PoisonError::into_inner);
    f(&mut guard)
}

fn scripted_failure(outcome: Outcome, what: &str) -> Result<()> {
    match outcome {
        Outcome::Succeed => Ok(()),
        Outcome::Fail => Err(DatabaseError::Query(sqlx::Error::Protocol(format!(
            "mock {what} failure"
        )))),
        Outcome::Closed => Err(DatabaseError::TransactionClosed),
    }
}

/// In-memory stand-in for a connection pool.
#[derive(Debug, Clone, Default)]
pub struct MockConnection {
    journal: SharedJournal,
    script: Script,
}

impl MockConnection {
    /// A connection on which every step succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `begin` fail.
    #[must_use]
    pub const fn fail_begin(mut self) -> Self {
        self.script.begin = Outcome::Fail;
        self
    }

    /// Make every statement fail.
    #[must_use]
    pub const fn fail_statements(mut self) -> Self {
        self.script.statement = Outcome::Fail;
        self
    }

    /// Choose what `commit` does.
    #[must_use]
    pub const fn on_commit(mut self, outcome: Outcome) -> Self {
        self.script.commit = outcome;
        self
    }

    /// Choose what `rollback` does.
    #[must_use]
    pub const fn on_rollback(mut self, outcome: Outcome) -> Self {
        self.script.rollback = outcome;
        self
    }

    /// Snapshot of everything recorded so far.
    #[must_use]
    pub fn journal(&self) -> Journal {
        record(&self.journal, |j| j.clone())
    }

    fn statement(&self, sql: &str, in_transaction: bool) -> Result<()> {
        record(&self.journal, |j| {
            j.statements.push(RecordedStatement {
                sql: sql.to_owned(),
                in_transaction,
            });
        });
        scripted_failure(self.script.statement, "statement")
    }
}

impl Queryable for MockConnection {
    async fn execute<'q>(&mut self, query: PgQuery<'q>) -> Result<PgQueryResult> {
        self.statement(query.sql(), false)?;
        Ok(PgQueryResult::default())
    }

    async fn fetch_one<'q>(&mut self, query: PgQuery<'q>) -> Result<PgRow> {
        self.statement(query.sql(), false)?;
        Err(DatabaseError::Query(sqlx::Error::RowNotFound))
    }

    async fn fetch_all<'q>(&mut self, query: PgQuery<'q>) -> Result<Vec<PgRow>> {
        self.statement(query.sql(), false)?;
        Ok(Vec::new())
    }
}

impl Connection for MockConnection {
    type Transaction = MockTransaction;

    async fn begin(&self) -> Result<MockTransaction> {
        scripted_failure(self.script.begin, "begin").map_err(|e| match e {
            DatabaseError::Query(source) => DatabaseError::Begin(source),
            other => other,
        })?;
        record(&self.journal, |j| j.begun += 1);
        Ok(MockTransaction {
            conn: self.clone(),
            open: true,
        })
    }
}

/// Transaction opened by a [`MockConnection`].
#[derive(Debug)]
pub struct MockTransaction {
    conn: MockConnection,
    open: bool,
}

impl MockTransaction {
    fn ensure_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(DatabaseError::TransactionClosed)
        }
    }
}

impl Queryable for MockTransaction {
    async fn execute<'q>(&mut self, query: PgQuery<'q>) -> Result<PgQueryResult> {
        self.ensure_open()?;
        self.conn.statement(query.sql(), true)?;
        Ok(PgQueryResult::default())
    }

    async fn fetch_one<'q>(&mut self, query: PgQuery<'q>) -> Result<PgRow> {
        self.ensure_open()?;
        self.conn.statement(query.sql(), true)?;
        Err(DatabaseError::Query(sqlx::Error::RowNotFound))
    }

    async fn fetch_all<'q>(&mut self, query: PgQuery<'q>) -> Result<Vec<PgRow>> {
        self.ensure_open()?;
        self.conn.statement(query.sql(), true)?;
        Ok(Vec::new())
    }
}

impl Transaction for MockTransaction {
    async fn commit(&mut self) -> Result<()> {
        record(&self.conn.journal, |j| j.commit_attempts += 1);
        self.ensure_open()?;
        self.open = false;
        scripted_failure(self.conn.script.commit, "commit")?;
        record(&self.conn.journal, |j| j.committed += 1);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<()> {
        record(&self.conn.journal, |j| j.rollback_attempts += 1);
        self.ensure_open()?;
        self.open = false;
        scripted_failure(self.conn.script.rollback, "rollback")?;
        record(&self.conn.journal, |j| j.rolled_back += 1);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_statements_are_recorded_with_their_context() {
        let mut conn = MockConnection::new();
        conn.execute(sqlx::query("SELECT 1")).await.unwrap();

        let mut tx = conn.begin().await.unwrap();
        tx.execute(sqlx::query("SELECT 2")).await.unwrap();
        tx.commit().await.unwrap();

        let journal = conn.journal();
        assert_eq!(journal.begun, 1);
        assert_eq!(journal.committed, 1);
        assert_eq!(
            journal.statements,
            vec![
                RecordedStatement { sql: "SELECT 1".into(), in_transaction: false },
                RecordedStatement { sql: "SELECT 2".into(), in_transaction: true },
            ]
        );
    }

    #[tokio::test]
    async fn test_finished_transaction_rejects_further_use() {
        let conn = MockConnection::new();
        let mut tx = conn.begin().await.unwrap();
        tx.rollback().await.unwrap();

        assert!(!tx.is_open());
        assert!(tx.commit().await.unwrap_err().is_transaction_closed());
        assert!(tx.execute(sqlx::query("SELECT 1")).await.unwrap_err().is_transaction_closed());
        assert_eq!(conn.journal().rolled_back, 1);
        assert_eq!(conn.journal().committed, 0);
    }

    #[tokio::test]
    async fn test_begin_failure_is_reported_as_begin() {
        let conn = MockConnection::new().fail_begin();
        let err = conn.begin().await.unwrap_err();
        assert!(matches!(err, DatabaseError::Begin(_)));
        assert_eq!(conn.journal().begun, 0);
    }
}
