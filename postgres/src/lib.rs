//! `PostgreSQL` data access for the service scaffold.
//!
//! This crate provides:
//!
//! - [`Queryable`]: one operation surface (execute, fetch one row, fetch all
//!   rows) implemented by both a pooled connection and an open transaction
//! - [`Connection`] / [`Transaction`]: opening and finishing transactions
//! - [`transaction_block`]: run a unit of work with a guaranteed commit or
//!   rollback
//! - [`Database`]: record-level queries written once against [`Queryable`]
//! - [`connect`]: pool construction with an initial ping
//!
//! # Example
//!
//! ```ignore
//! use scaffold_postgres::{connect, transaction_block, Database, Foo, PoolOptions};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let pool = connect("postgres://localhost/mydb", PoolOptions::default()).await?;
//!
//!     transaction_block(&pool, |tx| {
//!         Box::pin(async move { Database::new(tx).foo().insert(&Foo::new("baz")).await })
//!     })
//!     .await?;
//!
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod error;
pub mod foo;
pub mod handle;
pub mod pool;
pub mod transaction;

pub use client::Database;
pub use error::{DatabaseError, Result, TransactionError};
pub use foo::{Foo, FooClient, FOO_SCHEMA};
pub use handle::{Connection, PgQuery, PgTransaction, Queryable, Transaction};
pub use pool::{connect, PoolOptions};
pub use transaction::transaction_block;

pub use sqlx::PgPool;
