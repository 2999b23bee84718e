use thiserror::Error;

/// Boxed driver-level error carried as the source of connection and query failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Error type for simpledb operations
#[derive(Debug, Error)]
pub enum SimpleDbError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connection to {target} failed: {source}")]
    ConnectionFailed {
        target: String,
        #[source]
        source: BoxError,
    },

    #[error("Query failed: {source}")]
    QueryFailed {
        sql: String,
        #[source]
        source: BoxError,
    },

    #[error("Expected {expected} row(s), got {actual}")]
    UnexpectedRowCount { expected: usize, actual: usize },

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Column {column} cannot be decoded as {expected}")]
    Decode {
        column: String,
        expected: &'static str,
    },

    #[error("Transaction error: {0}")]
    Transaction(String),
}

impl SimpleDbError {
    pub(crate) fn query_failed(sql: &str, source: impl Into<BoxError>) -> Self {
        SimpleDbError::QueryFailed {
            sql: sql.to_string(),
            source: source.into(),
        }
    }
}

/// Result type alias for simpledb operations
pub type Result<T> = std::result::Result<T, SimpleDbError>;
