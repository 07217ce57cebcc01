//! Run a unit of work inside a transaction.

use crate::error::TransactionError;
use crate::handle::{Connection, Transaction};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use tracing::error;

/// Runs `work` inside a transaction started from `conn`.
///
/// The transaction is committed when `work` returns `Ok` and rolled back when
/// it returns `Err`, so it ends in exactly one terminal state. A terminal call
/// that fails only because the transaction was already closed (for instance
/// because `work` committed it itself) is not treated as a failure.
///
/// If `work` panics, the transaction is rolled back and the panic is resumed.
///
/// The future returned by `work` may borrow only the transaction; values it
/// needs from the caller are moved in.
///
/// # Example
///
/// ```ignore
/// use scaffold_postgres::{transaction_block, Database, Foo};
///
/// transaction_block(&pool, |tx| {
///     Box::pin(async move {
///         Database::new(tx).foo().insert(&Foo::new("baz")).await
///     })
/// })
/// .await?;
/// ```
///
/// # Errors
///
/// - [`TransactionError::Begin`] when the transaction cannot be started;
///   `work` is not run.
/// - [`TransactionError::Operation`] carrying `work`'s error unchanged when it
///   failed and the rollback went through.
/// - [`TransactionError::Rollback`] when `work` failed and so did the rollback.
/// - [`TransactionError::Commit`] when `work` succeeded but the commit failed.
pub async fn transaction_block<C, F, T, E>(conn: &C, work: F) -> Result<T, TransactionError<E>>
where
    C: Connection,
    F: for<'t> FnOnce(&'t mut C::Transaction) -> BoxFuture<'t, Result<T, E>> + Send,
    T: Send,
    E: Send,
{
    let mut tx = conn.begin().await.map_err(TransactionError::Begin)?;

    let outcome = AssertUnwindSafe(work(&mut tx)).catch_unwind().await;

    match outcome {
        Ok(Ok(value)) => match tx.commit().await {
            Err(err) if !err.is_transaction_closed() => Err(TransactionError::Commit(err)),
            _ => Ok(value),
        },
        Ok(Err(original)) => match tx.rollback().await {
            Err(rollback) if !rollback.is_transaction_closed() => Err(TransactionError::Rollback {
                original,
                rollback,
            }),
            _ => Err(TransactionError::Operation(original)),
        },
        Err(panic) => {
            if let Err(err) = tx.rollback().await {
                if !err.is_transaction_closed() {
                    error!(error = %err, "Failed to roll back transaction after panic");
                }
            }
            std::panic::resume_unwind(panic)
        }
    }
}
