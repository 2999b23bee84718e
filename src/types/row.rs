use crate::error::{Result, SimpleDbError};
use crate::traits::FromSqlValue;
use crate::types::SqlValue;

/// Driver-agnostic raw result from a database query.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawQueryResult {
    /// Column labels in result order
    pub columns: Vec<String>,
    /// Rows, where each row is a vector of values in column order
    pub rows: Vec<Vec<SqlValue>>,
}

impl RawQueryResult {
    pub fn new(columns: Vec<String>, rows: Vec<Vec<SqlValue>>) -> Self {
        Self { columns, rows }
    }

    pub fn empty() -> Self {
        Self::default()
    }
}

/// A single result row: column labels mapped to values, in result column order.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    entries: Vec<(String, SqlValue)>,
}

impl Row {
    /// Creates a new Row from column labels and values.
    pub fn new(columns: &[String], values: Vec<SqlValue>) -> Self {
        let entries = columns.iter().cloned().zip(values).collect();
        Self { entries }
    }

    /// Gets the raw value of a column.
    pub fn get(&self, column: &str) -> Option<&SqlValue> {
        self.entries
            .iter()
            .find(|(label, _)| label == column)
            .map(|(_, value)| value)
    }

    /// Gets a column coerced to `T`, or `None` when absent, NULL or not coercible.
    pub fn get_as<T: FromSqlValue>(&self, column: &str) -> Option<T> {
        self.get(column).and_then(T::from_sql_value)
    }

    /// Gets a column coerced to `T`, failing when it is missing or cannot be decoded.
    pub fn try_get<T: FromSqlValue>(&self, column: &str) -> Result<T> {
        let value = self
            .get(column)
            .ok_or_else(|| SimpleDbError::ColumnNotFound(column.to_string()))?;
        T::from_sql_value(value).ok_or_else(|| SimpleDbError::Decode {
            column: column.to_string(),
            expected: T::KIND,
        })
    }

    /// Value of the first column, if any.
    pub fn first_value(&self) -> Option<&SqlValue> {
        self.entries.first().map(|(_, value)| value)
    }

    /// Returns all column labels in this row, in result order.
    pub fn columns(&self) -> Vec<&str> {
        self.entries.iter().map(|(label, _)| label.as_str()).collect()
    }

    /// Iterates over `(label, value)` pairs in result order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SqlValue)> {
        self.entries
            .iter()
            .map(|(label, value)| (label.as_str(), value))
    }

    /// Returns the number of columns in this row.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if this row has no columns.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Result of a query execution, containing zero or more rows.
#[derive(Debug)]
pub struct QueryResult {
    columns: Vec<String>,
    rows: Vec<Row>,
}

impl QueryResult {
    /// Creates a QueryResult from a RawQueryResult.
    pub fn from_raw(raw: RawQueryResult) -> Self {
        let rows = raw
            .rows
            .into_iter()
            .map(|values| Row::new(&raw.columns, values))
            .collect();
        Self {
            columns: raw.columns,
            rows,
        }
    }

    /// Takes the first row, if the result has any.
    pub fn into_first_row(self) -> Option<Row> {
        self.rows.into_iter().next()
    }

    /// Returns all rows from the result.
    pub fn rows(self) -> Vec<Row> {
        self.rows
    }

    /// Returns the column labels from this result.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Returns the number of rows in this result.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if this result contains no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
