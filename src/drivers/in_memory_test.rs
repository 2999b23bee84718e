use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::config::DbConfig;
use crate::error::{Result, SimpleDbError};
use crate::traits::{Connector, DatabaseDriver};
use crate::translation::count_placeholders;
use crate::types::{RawQueryResult, SqlValue};

/// How a recorded statement was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Query,
    Execute,
    Insert,
    Batch,
}

/// A recorded statement execution for verification.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedQuery {
    pub kind: StatementKind,
    pub sql: String,
    pub params: Vec<SqlValue>,
}

/// A scripted outcome for the next statement.
#[derive(Debug, Clone, PartialEq)]
pub enum InMemoryTestResponse {
    Rows(RawQueryResult),
    Affected(u64),
    GeneratedKey(Option<i64>),
    Failure(String),
}

/// An in-memory database driver for testing.
///
/// Records every statement and replays scripted responses in FIFO order.
/// Like a real server it rejects statements whose placeholder count does not
/// match the number of bound parameters.
///
/// # Example
/// ```
/// use std::sync::Arc;
/// use simpledb::drivers::{InMemoryTestDriver, InMemoryTestResponseBuilder};
/// use simpledb::SqlValue;
///
/// let driver = Arc::new(
///     InMemoryTestDriver::new().with_response(
///         InMemoryTestResponseBuilder::new()
///             .columns(&["id", "title"])
///             .row(vec![SqlValue::Int(1), "hello".into()])
///             .build(),
///     ),
/// );
/// ```
pub struct InMemoryTestDriver {
    responses: Mutex<VecDeque<InMemoryTestResponse>>,
    recorded_queries: Mutex<Vec<RecordedQuery>>,
    closed: AtomicBool,
}

impl InMemoryTestDriver {
    /// Create a new in-memory test driver with no pre-configured responses.
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            recorded_queries: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Add a response to be returned by the next statement.
    pub fn with_response(self, response: InMemoryTestResponse) -> Self {
        self.responses.lock().unwrap().push_back(response);
        self
    }

    /// Add multiple responses to be returned by subsequent statements.
    pub fn with_responses(self, responses: impl IntoIterator<Item = InMemoryTestResponse>) -> Self {
        self.responses.lock().unwrap().extend(responses);
        self
    }

    /// Queue a response on a driver that is already shared.
    pub fn push_response(&self, response: InMemoryTestResponse) {
        self.responses.lock().unwrap().push_back(response);
    }

    /// Get all recorded queries that have been executed.
    pub fn recorded_queries(&self) -> Vec<RecordedQuery> {
        self.recorded_queries.lock().unwrap().clone()
    }

    /// Get the last recorded query, if any.
    pub fn last_query(&self) -> Option<RecordedQuery> {
        self.recorded_queries.lock().unwrap().last().cloned()
    }

    /// Clear all recorded queries.
    pub fn clear_recorded_queries(&self) {
        self.recorded_queries.lock().unwrap().clear();
    }

    /// Assert that the last query matches the expected SQL and parameters.
    pub fn assert_last_query(&self, expected_sql: &str, expected_params: &[SqlValue]) {
        let last = self.last_query().expect("No queries were recorded");
        assert_eq!(
            last.sql, expected_sql,
            "SQL mismatch.\nExpected: {}\nActual: {}",
            expected_sql, last.sql
        );
        assert_eq!(
            last.params, expected_params,
            "Parameters mismatch.\nExpected: {:?}\nActual: {:?}",
            expected_params, last.params
        );
    }

    /// Assert that exactly n queries were executed.
    pub fn assert_query_count(&self, expected: usize) {
        let actual = self.recorded_queries.lock().unwrap().len();
        assert_eq!(
            actual, expected,
            "Query count mismatch. Expected: {}, Actual: {}",
            expected, actual
        );
    }

    fn record(
        &self,
        kind: StatementKind,
        sql: &str,
        params: &[SqlValue],
    ) -> Result<Option<InMemoryTestResponse>> {
        if self.is_closed() {
            return Err(SimpleDbError::query_failed(sql, "connection is closed"));
        }

        self.recorded_queries.lock().unwrap().push(RecordedQuery {
            kind,
            sql: sql.to_string(),
            params: params.to_vec(),
        });

        let placeholders = count_placeholders(sql);
        if placeholders != params.len() {
            return Err(SimpleDbError::query_failed(
                sql,
                format!(
                    "statement has {} placeholder(s) but {} parameter(s) were bound",
                    placeholders,
                    params.len()
                ),
            ));
        }

        match self.responses.lock().unwrap().pop_front() {
            Some(InMemoryTestResponse::Failure(message)) => {
                Err(SimpleDbError::query_failed(sql, message))
            }
            next => Ok(next),
        }
    }
}

impl Default for InMemoryTestDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatabaseDriver for InMemoryTestDriver {
    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<RawQueryResult> {
        match self.record(StatementKind::Query, sql, params)? {
            Some(InMemoryTestResponse::Rows(result)) => Ok(result),
            _ => Ok(RawQueryResult::empty()),
        }
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        match self.record(StatementKind::Execute, sql, params)? {
            Some(InMemoryTestResponse::Affected(count)) => Ok(count),
            Some(InMemoryTestResponse::Rows(result)) => Ok(result.rows.len() as u64),
            Some(InMemoryTestResponse::GeneratedKey(Some(_))) => Ok(1),
            _ => Ok(0),
        }
    }

    async fn insert(&self, sql: &str, params: &[SqlValue]) -> Result<Option<i64>> {
        match self.record(StatementKind::Insert, sql, params)? {
            Some(InMemoryTestResponse::GeneratedKey(key)) => Ok(key),
            Some(InMemoryTestResponse::Rows(result)) => Ok(result
                .rows
                .first()
                .and_then(|row| row.first())
                .and_then(SqlValue::as_i64)),
            _ => Ok(None),
        }
    }

    async fn batch_execute(&self, sql: &str) -> Result<()> {
        self.record(StatementKind::Batch, sql, &[]).map(|_| ())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

/// Builder for creating row responses easily.
pub struct InMemoryTestResponseBuilder {
    columns: Vec<String>,
    rows: Vec<Vec<SqlValue>>,
}

impl InMemoryTestResponseBuilder {
    pub fn new() -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    /// Set the column labels for the response.
    pub fn columns(mut self, cols: &[&str]) -> Self {
        self.columns = cols.iter().map(|s| s.to_string()).collect();
        self
    }

    /// Add a row of values.
    pub fn row(mut self, values: Vec<SqlValue>) -> Self {
        self.rows.push(values);
        self
    }

    /// Build the response.
    pub fn build(self) -> InMemoryTestResponse {
        InMemoryTestResponse::Rows(RawQueryResult::new(self.columns, self.rows))
    }
}

impl Default for InMemoryTestResponseBuilder {
    fn default() -> Self {
        Self::new()
    }
}

type DriverFactory = Box<dyn Fn() -> InMemoryTestDriver + Send + Sync>;

/// Connector handing out fresh [`InMemoryTestDriver`]s, one per connect.
///
/// Every driver it created stays inspectable through [`connections`](Self::connections).
pub struct InMemoryTestConnector {
    factory: DriverFactory,
    connections: Mutex<Vec<Arc<InMemoryTestDriver>>>,
    refuse: Option<String>,
}

impl InMemoryTestConnector {
    pub fn new() -> Self {
        Self::with_factory(InMemoryTestDriver::new)
    }

    /// Build each new connection with `factory`, e.g. to pre-script responses.
    pub fn with_factory(factory: impl Fn() -> InMemoryTestDriver + Send + Sync + 'static) -> Self {
        Self {
            factory: Box::new(factory),
            connections: Mutex::new(Vec::new()),
            refuse: None,
        }
    }

    /// A connector whose every connect attempt fails with `reason`.
    pub fn refusing(reason: impl Into<String>) -> Self {
        Self {
            refuse: Some(reason.into()),
            ..Self::new()
        }
    }

    /// All drivers created so far, in creation order.
    pub fn connections(&self) -> Vec<Arc<InMemoryTestDriver>> {
        self.connections.lock().unwrap().clone()
    }

    /// The most recently created driver.
    pub fn last_connection(&self) -> Option<Arc<InMemoryTestDriver>> {
        self.connections.lock().unwrap().last().cloned()
    }

    pub fn connect_count(&self) -> usize {
        self.connections.lock().unwrap().len()
    }
}

impl Default for InMemoryTestConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Connector for InMemoryTestConnector {
    async fn connect(&self, config: &DbConfig) -> Result<Arc<dyn DatabaseDriver>> {
        if let Some(reason) = &self.refuse {
            return Err(SimpleDbError::ConnectionFailed {
                target: config.target(),
                source: reason.clone().into(),
            });
        }

        let driver = Arc::new((self.factory)());
        self.connections.lock().unwrap().push(Arc::clone(&driver));
        Ok(driver)
    }
}
