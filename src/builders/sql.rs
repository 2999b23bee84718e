use chrono::NaiveDateTime;

use crate::clauses::InList;
use crate::error::{Result, SimpleDbError};
use crate::simple_db::SimpleDb;
use crate::traits::{FromRow, FromSqlValue};
use crate::types::{QueryResult, Row, SqlValue};

/// Fluent SQL builder.
///
/// Fragments are joined by single spaces and `?` placeholders bind the
/// accumulated parameters in order. Every terminal operation consumes the
/// builder and runs on the connection of the calling context.
///
/// # Example
/// ```ignore
/// let ids = db
///     .gen_sql()
///     .append("SELECT id FROM article")
///     .append_in("WHERE id IN (?)", [1, 2, 3])
///     .append("ORDER BY id DESC")
///     .select_longs()
///     .await?;
/// ```
pub struct Sql {
    db: SimpleDb,
    sql: String,
    params: Vec<SqlValue>,
}

impl Sql {
    pub(crate) fn new(db: SimpleDb) -> Self {
        Self {
            db,
            sql: String::with_capacity(128),
            params: Vec::new(),
        }
    }

    fn push_fragment(&mut self, fragment: &str) {
        let fragment = fragment.trim();
        if fragment.is_empty() {
            return;
        }
        if !self.sql.is_empty() {
            self.sql.push(' ');
        }
        self.sql.push_str(fragment);
    }

    /// Append a SQL fragment without parameters.
    pub fn append(mut self, fragment: &str) -> Self {
        self.push_fragment(fragment);
        self
    }

    /// Append a SQL fragment binding one parameter.
    pub fn bind(mut self, fragment: &str, value: impl Into<SqlValue>) -> Self {
        self.push_fragment(fragment);
        self.params.push(value.into());
        self
    }

    /// Append a SQL fragment and its parameters, in order.
    /// Use [`params!`](crate::params) for values of mixed types.
    ///
    /// The number of `?` in `fragment` is not checked here; a mismatch
    /// surfaces as a binding error when the statement runs.
    pub fn append_with<I, V>(mut self, fragment: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<SqlValue>,
    {
        self.push_fragment(fragment);
        self.params.extend(values.into_iter().map(Into::into));
        self
    }

    /// Append a list-membership fragment; see [`InList`] for how the list renders.
    pub fn append_in<I, V>(mut self, fragment: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<SqlValue>,
    {
        let clause = InList::new(fragment, values).build_sql(&mut self.params);
        self.push_fragment(&clause);
        self
    }

    /// The SQL text accumulated so far.
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// The parameters accumulated so far, in binding order.
    pub fn params(&self) -> &[SqlValue] {
        &self.params
    }

    /// Run an insert and return the first generated key, if the statement produced one.
    pub async fn insert(self) -> Result<Option<i64>> {
        self.db.log_statement(&self.sql, &self.params);
        let driver = self.db.acquire().await?;
        driver.insert(&self.sql, &self.params).await
    }

    /// Run an update and return the number of affected rows.
    pub async fn update(self) -> Result<u64> {
        self.execute().await
    }

    /// Run a delete and return the number of affected rows.
    pub async fn delete(self) -> Result<u64> {
        self.execute().await
    }

    async fn execute(self) -> Result<u64> {
        self.db.log_statement(&self.sql, &self.params);
        let driver = self.db.acquire().await?;
        driver.execute(&self.sql, &self.params).await
    }

    async fn fetch(self) -> Result<QueryResult> {
        self.db.log_statement(&self.sql, &self.params);
        let driver = self.db.acquire().await?;
        let raw = driver.query(&self.sql, &self.params).await?;
        Ok(QueryResult::from_raw(raw))
    }

    /// All rows, in result order.
    pub async fn select_rows(self) -> Result<Vec<Row>> {
        Ok(self.fetch().await?.rows())
    }

    /// The first row, or `None` when nothing matched.
    pub async fn select_row(self) -> Result<Option<Row>> {
        Ok(self.fetch().await?.into_first_row())
    }

    /// All rows materialized as `T`.
    pub async fn select_rows_as<T: FromRow>(self) -> Result<Vec<T>> {
        self.select_rows().await?.iter().map(T::from_row).collect()
    }

    /// The first row materialized as `T`.
    pub async fn select_row_as<T: FromRow>(self) -> Result<Option<T>> {
        self.select_row()
            .await?
            .map(|row| T::from_row(&row))
            .transpose()
    }

    /// First column of the first row coerced to `T`.
    ///
    /// `None` when no row matched, the value is NULL, or it cannot be
    /// represented as `T`.
    pub async fn select_scalar<T: FromSqlValue>(self) -> Result<Option<T>> {
        Ok(self
            .select_row()
            .await?
            .and_then(|row| row.first_value().and_then(T::from_sql_value)))
    }

    /// First column of every row coerced to `T`, in result order.
    /// NULL and non-coercible values are skipped.
    pub async fn select_scalar_list<T: FromSqlValue>(self) -> Result<Vec<T>> {
        let rows = self.select_rows().await?;
        let total = rows.len();
        let values: Vec<T> = rows
            .iter()
            .filter_map(|row| row.first_value().and_then(T::from_sql_value))
            .collect();
        if values.len() < total {
            tracing::debug!(
                skipped = total - values.len(),
                kind = T::KIND,
                "skipped values that could not be decoded"
            );
        }
        Ok(values)
    }

    pub async fn select_long(self) -> Result<Option<i64>> {
        self.select_scalar().await
    }

    pub async fn select_longs(self) -> Result<Vec<i64>> {
        self.select_scalar_list().await
    }

    pub async fn select_string(self) -> Result<Option<String>> {
        self.select_scalar().await
    }

    pub async fn select_boolean(self) -> Result<Option<bool>> {
        self.select_scalar().await
    }

    /// First column of the first row as a timestamp.
    /// Unlike the other scalar reads, a missing row is an error.
    pub async fn select_datetime(self) -> Result<NaiveDateTime> {
        let row = self
            .select_row()
            .await?
            .ok_or(SimpleDbError::UnexpectedRowCount {
                expected: 1,
                actual: 0,
            })?;
        let column = row.columns().first().map(|c| c.to_string()).unwrap_or_default();
        row.first_value()
            .and_then(NaiveDateTime::from_sql_value)
            .ok_or(SimpleDbError::Decode {
                column,
                expected: NaiveDateTime::KIND,
            })
    }
}
