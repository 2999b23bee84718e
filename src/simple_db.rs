use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::builders::Sql;
use crate::config::DbConfig;
use crate::context::{self, ContextConnection, ContextId, ContextRegistry, TransactionState};
use crate::drivers::TokioPostgresConnector;
use crate::error::{Result, SimpleDbError};
use crate::traits::{Connector, Table};
use crate::types::SqlValue;

/// Main entry point for simpledb.
///
/// Holds the connection parameters and one connection per execution context
/// (see [`ContextId`]). Connections are opened lazily on first use, reopened
/// when found closed and closed when their context ends; contexts never share
/// one. Cloning is cheap and clones share the same connections.
#[derive(Clone)]
pub struct SimpleDb {
    inner: Arc<Inner>,
}

struct Inner {
    config: DbConfig,
    connector: Arc<dyn Connector>,
    contexts: ContextRegistry,
    dev_mode: AtomicBool,
}

impl SimpleDb {
    /// Configure a PostgreSQL-backed instance from individual parameters.
    ///
    /// # Example
    /// ```ignore
    /// let db = SimpleDb::configure("localhost", "app", "secret", "blog")?;
    /// let count = db.gen_sql().append("SELECT COUNT(*) FROM article").select_long().await?;
    /// ```
    pub fn configure(
        host: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
        db_name: impl Into<String>,
    ) -> Result<Self> {
        Self::new(DbConfig::new(host, user, password, db_name))
    }

    /// Create a PostgreSQL-backed instance.
    pub fn new(config: DbConfig) -> Result<Self> {
        Self::with_connector(config, Arc::new(TokioPostgresConnector))
    }

    /// Create an instance with a custom connector.
    /// Useful for testing or using alternative database drivers.
    pub fn with_connector(config: DbConfig, connector: Arc<dyn Connector>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                connector,
                contexts: ContextRegistry::default(),
                dev_mode: AtomicBool::new(false),
            }),
        })
    }

    pub fn config(&self) -> &DbConfig {
        &self.inner.config
    }

    /// Log every executed statement at `info` level instead of `debug`.
    pub fn set_dev_mode(&self, enabled: bool) {
        self.inner.dev_mode.store(enabled, Ordering::Relaxed);
    }

    pub fn is_dev_mode(&self) -> bool {
        self.inner.dev_mode.load(Ordering::Relaxed)
    }

    /// Start building a statement.
    pub fn gen_sql(&self) -> Sql {
        Sql::new(self.clone())
    }

    /// Lease the connection of the calling context, opening it if absent or closed.
    ///
    /// Inside a plain tokio task the connection is closed once the last
    /// lease drops; use [`scope`](Self::scope) to keep one for a whole unit
    /// of work.
    pub async fn acquire(&self) -> Result<ContextConnection> {
        let context = ContextId::current();
        if let Some(connection) = self.inner.contexts.lease(context) {
            tracing::trace!(%context, "reusing context connection");
            return Ok(connection);
        }

        let purged = self.inner.contexts.purge_closed();
        if purged > 0 {
            tracing::debug!(purged, "dropped closed connections of other contexts");
        }

        let driver = self.inner.connector.connect(&self.inner.config).await?;
        tracing::info!(%context, target = %self.inner.config.target(), "opened connection");
        Ok(self.inner.contexts.install(context, driver))
    }

    /// Close and forget the connection of the calling context. Idempotent.
    pub fn release(&self) {
        let context = ContextId::current();
        if self.inner.contexts.close(context) {
            tracing::info!(%context, "released connection");
        }
    }

    /// Run `future` as its own context: every statement inside shares one
    /// connection, which is closed when the future completes or is dropped.
    ///
    /// # Example
    /// ```ignore
    /// let handle = tokio::spawn(db.clone().scope(async move {
    ///     db.start_transaction().await?;
    ///     db.gen_sql().append("DELETE FROM article").delete().await?;
    ///     db.commit().await
    /// }));
    /// ```
    pub fn scope<F: Future>(&self, future: F) -> impl Future<Output = F::Output> {
        let (context, scoped) = context::scoped(future);
        let exit = self.inner.contexts.exit_guard(context);
        async move {
            let _exit = exit;
            scoped.await
        }
    }

    /// Number of contexts currently holding a connection.
    pub fn open_contexts(&self) -> usize {
        self.inner.contexts.len()
    }

    /// Run a single statement and return the number of affected rows.
    pub async fn run<I, V>(&self, sql: &str, params: I) -> Result<u64>
    where
        I: IntoIterator<Item = V>,
        V: Into<SqlValue>,
    {
        self.gen_sql().append_with(sql, params).update().await
    }

    /// Create the table of `T` if it does not exist yet.
    pub async fn bootstrap<T: Table>(&self) -> Result<()> {
        let sql = T::create_sql();
        self.log_statement(&sql, &[]);
        self.acquire().await?.batch_execute(&sql).await
    }

    /// Begin a transaction on the calling context's connection.
    ///
    /// Inside a plain tokio task the connection must be held (a lease from
    /// [`acquire`](Self::acquire)) or the task run in a [`scope`](Self::scope);
    /// otherwise it would close, and roll back, right after `BEGIN`.
    pub async fn start_transaction(&self) -> Result<()> {
        let context = ContextId::current();
        if context.is_lease_bound() && self.inner.contexts.leases(context) == 0 {
            return Err(SimpleDbError::Transaction(
                "Transaction in a task needs a held connection or a scope".to_string(),
            ));
        }
        let driver = self.acquire().await?;
        if self.inner.contexts.transaction_state(context) == TransactionState::Transaction {
            return Err(SimpleDbError::Transaction(
                "Transaction already in progress".to_string(),
            ));
        }
        driver.batch_execute("BEGIN").await?;
        self.inner
            .contexts
            .set_transaction_state(context, TransactionState::Transaction);
        Ok(())
    }

    pub async fn commit(&self) -> Result<()> {
        self.finish_transaction("COMMIT").await
    }

    pub async fn rollback(&self) -> Result<()> {
        self.finish_transaction("ROLLBACK").await
    }

    async fn finish_transaction(&self, statement: &str) -> Result<()> {
        let context = ContextId::current();
        if self.inner.contexts.transaction_state(context) != TransactionState::Transaction {
            return Err(SimpleDbError::Transaction(
                "No transaction in progress".to_string(),
            ));
        }
        let driver = self.acquire().await?;
        // The server ends the transaction even when the statement reports an error.
        self.inner
            .contexts
            .set_transaction_state(context, TransactionState::Autocommit);
        driver.batch_execute(statement).await
    }

    /// Transaction state of the calling context.
    pub fn transaction_state(&self) -> TransactionState {
        self.inner.contexts.transaction_state(ContextId::current())
    }

    pub(crate) fn log_statement(&self, sql: &str, params: &[SqlValue]) {
        if self.is_dev_mode() {
            tracing::info!(sql, ?params, "executing statement");
        } else {
            tracing::debug!(sql, ?params, "executing statement");
        }
    }
}

impl fmt::Debug for SimpleDb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleDb")
            .field("config", &self.inner.config)
            .field("open_contexts", &self.open_contexts())
            .field("dev_mode", &self.is_dev_mode())
            .finish()
    }
}
