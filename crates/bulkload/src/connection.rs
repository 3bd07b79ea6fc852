//! Connection traits for bulkload
//!
//! A [`Connection`] is one database session. Load paths drive it strictly
//! sequentially: every statement is awaited before the next is issued, so a
//! session never has more than one statement in flight.
//!
//! Transaction control lives on the connection itself rather than in a
//! separate guard object. Externally scoped loads
//! ([`BulkLoader::load_with`](crate::loader::BulkLoader::load_with)) borrow a
//! connection whose transaction belongs to the caller, which a guard that
//! commits on drop could not express.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;
use crate::types::{Row, Value};

/// A connection to a database
#[async_trait]
pub trait Connection: Send + Sync {
    /// Execute a query that returns rows
    async fn query(&self, sql: &str, params: &[Value]) -> Result<Vec<Row>>;

    /// Execute a statement that modifies data, returns affected row count
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<u64>;

    /// Execute one or more parameterless statements (simple query protocol)
    async fn batch_execute(&self, sql: &str) -> Result<()>;

    /// Run a `COPY ... FROM STDIN` statement and stream `payload` into it.
    ///
    /// Returns the number of rows the server reports as copied.
    async fn copy_in(&self, sql: &str, payload: Bytes) -> Result<u64>;

    /// Begin a transaction
    async fn begin(&self) -> Result<()>;

    /// Commit the current transaction
    async fn commit(&self) -> Result<()>;

    /// Roll back the current transaction
    async fn rollback(&self) -> Result<()>;

    /// Execute a query and return the first row (convenience method)
    async fn query_one(&self, sql: &str, params: &[Value]) -> Result<Option<Row>> {
        let rows = self.query(sql, params).await?;
        Ok(rows.into_iter().next())
    }

    /// Check if connection is valid/alive
    async fn is_valid(&self) -> bool;

    /// Close the connection
    async fn close(&self) -> Result<()>;
}

/// Factory for creating connections.
///
/// Connection parameters are given to the factory at construction, so load
/// paths only ever ask for "a session".
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    /// Open a new session
    async fn connect(&self) -> Result<Box<dyn Connection>>;
}

/// Roll back and log instead of failing; used on error paths where the
/// triggering error must win.
pub(crate) async fn rollback_quietly(conn: &dyn Connection) {
    if let Err(e) = conn.rollback().await {
        tracing::warn!(error = %e, "rollback failed");
    }
}

/// Close and log instead of failing
pub(crate) async fn close_quietly(conn: &dyn Connection) {
    if let Err(e) = conn.close().await {
        tracing::warn!(error = %e, "close failed");
    }
}
