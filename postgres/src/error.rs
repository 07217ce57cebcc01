//! Error types for data access.
//!
//! Every layer wraps the error it receives with the operation it was
//! performing, so the message a caller finally sees reads as a chain:
//!
//! ```text
//! failed to insert foo: query failed: error returned from database: ...
//! ```

use thiserror::Error;

/// Errors produced by connections, transactions and the record clients.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// The pool could not be created.
    #[error("failed to get new db pool: {0}")]
    Connect(#[source] sqlx::Error),

    /// The pool was created but the initial ping failed.
    #[error("ping to db failed: {0}")]
    Ping(#[source] sqlx::Error),

    /// A transaction could not be started.
    #[error("failed to start db transaction: {0}")]
    Begin(#[source] sqlx::Error),

    /// The transaction already reached its terminal state.
    ///
    /// Returned when a transaction is committed or rolled back twice, or used
    /// for a query after either.
    #[error("transaction has already been committed or rolled back")]
    TransactionClosed,

    /// A statement failed.
    #[error("query failed: {0}")]
    Query(#[from] sqlx::Error),

    /// Another error annotated with the operation that was running.
    #[error("{context}: {source}")]
    Context {
        /// What was being attempted.
        context: String,
        /// The underlying failure.
        #[source]
        source: Box<DatabaseError>,
    },
}

impl DatabaseError {
    /// Wrap this error with the operation that produced it.
    #[must_use]
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Whether this error (or the error it wraps) means the transaction was
    /// already closed.
    #[must_use]
    pub fn is_transaction_closed(&self) -> bool {
        match self {
            Self::TransactionClosed => true,
            Self::Context { source, .. } => source.is_transaction_closed(),
            _ => false,
        }
    }

    /// Whether the statement matched no row.
    #[must_use]
    pub fn is_row_not_found(&self) -> bool {
        match self {
            Self::Query(sqlx::Error::RowNotFound) => true,
            Self::Context { source, .. } => source.is_row_not_found(),
            _ => false,
        }
    }
}

/// Result alias for data access operations.
pub type Result<T> = std::result::Result<T, DatabaseError>;

/// Failure of a [`transaction_block`](crate::transaction_block).
///
/// `E` is the error type of the unit of work. When the work fails and the
/// rollback succeeds, its error comes back untouched in
/// [`TransactionError::Operation`].
#[derive(Error, Debug)]
pub enum TransactionError<E> {
    /// The transaction could not be started; nothing else was attempted.
    #[error(transparent)]
    Begin(DatabaseError),

    /// The unit of work failed and the transaction was rolled back.
    #[error(transparent)]
    Operation(E),

    /// The unit of work failed and so did the rollback.
    #[error("{rollback}: {original}")]
    Rollback {
        /// The error returned by the unit of work.
        original: E,
        /// The error returned by the rollback.
        #[source]
        rollback: DatabaseError,
    },

    /// The unit of work succeeded but the commit failed.
    #[error("failed to commit db transaction: {0}")]
    Commit(#[source] DatabaseError),
}

impl<E> TransactionError<E> {
    /// The unit of work's own error, if it produced one.
    pub const fn operation(&self) -> Option<&E> {
        match self {
            Self::Operation(original) | Self::Rollback { original, .. } => Some(original),
            Self::Begin(_) | Self::Commit(_) => None,
        }
    }
}
