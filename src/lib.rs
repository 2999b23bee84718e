//! simpledb - a small PostgreSQL access layer: one connection per execution
//! context and a fluent SQL builder with positional parameters.
//!
//! # Example
//! ```ignore
//! use simpledb::{params, Article, SimpleDb};
//!
//! let db = SimpleDb::configure("localhost", "app", "secret", "blog")?;
//! db.bootstrap::<Article>().await?;
//!
//! let id = db
//!     .gen_sql()
//!     .append("INSERT INTO article (created_date, modified_date, title, body)")
//!     .append_with("VALUES (NOW(), NOW(), ?, ?)", params!["hello", "world"])
//!     .insert()
//!     .await?;
//!
//! let articles: Vec<Article> = db
//!     .gen_sql()
//!     .append("SELECT * FROM article")
//!     .append_in("WHERE id IN (?)", [1, 2, 3])
//!     .select_rows_as()
//!     .await?;
//!
//! db.release();
//! ```

pub mod builders;
pub mod clauses;
pub mod config;
pub mod context;
pub mod drivers;
pub mod error;
pub mod traits;
pub mod translation;
pub mod types;

mod simple_db;

// Re-export main types for convenient access
pub use builders::Sql;
pub use clauses::InList;
pub use config::DbConfig;
pub use context::{ContextConnection, ContextId, TransactionState};
pub use error::{Result, SimpleDbError};
pub use simple_db::SimpleDb;
pub use traits::{Connector, DatabaseDriver, FromRow, FromSqlValue, Table};
pub use types::{Article, QueryResult, RawQueryResult, Row, SqlValue};

/// Builds a `Vec<SqlValue>` from values of mixed types.
///
/// ```
/// use simpledb::{params, SqlValue};
///
/// let values = params!["title", 3, true, None::<i64>];
/// assert_eq!(values[1], SqlValue::Int(3));
/// assert_eq!(values[3], SqlValue::Null);
/// ```
#[macro_export]
macro_rules! params {
    () => {
        ::std::vec::Vec::<$crate::SqlValue>::new()
    };
    ($($value:expr),+ $(,)?) => {
        ::std::vec![$($crate::SqlValue::from($value)),+]
    };
}
