use std::sync::Arc;

use async_trait::async_trait;

use crate::config::DbConfig;
use crate::error::Result;
use crate::types::{RawQueryResult, SqlValue};

/// Trait for database driver implementations.
/// Drivers are responsible for:
/// - Converting SqlValue parameters to native types
/// - Executing statements and converting results to RawQueryResult
/// - Reporting and ending the lifetime of their connection
///
/// SQL handed to a driver uses `?` positional placeholders; drivers translate
/// them to their native syntax. Any execution failure is reported as
/// `SimpleDbError::QueryFailed`.
#[async_trait]
pub trait DatabaseDriver: Send + Sync {
    /// Run a query and return its rows.
    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<RawQueryResult>;

    /// Run a statement and return the number of affected rows.
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64>;

    /// Run an insert and return the first generated key, if any.
    async fn insert(&self, sql: &str, params: &[SqlValue]) -> Result<Option<i64>>;

    /// Run one or more parameterless statements.
    async fn batch_execute(&self, sql: &str) -> Result<()>;

    /// Whether the underlying connection has been closed.
    fn is_closed(&self) -> bool;

    /// Close the underlying connection. Closing twice is a no-op.
    ///
    /// Synchronous so that context cleanup can run from `Drop`.
    fn close(&self);
}

/// Opens driver connections for the connection manager.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, config: &DbConfig) -> Result<Arc<dyn DatabaseDriver>>;
}
