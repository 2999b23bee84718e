use chrono::NaiveDateTime;

use crate::error::Result;
use crate::types::{Row, SqlValue};

/// A scalar kind a column value can be coerced into.
///
/// Conversions are total: a value that cannot be represented as `Self`
/// (including NULL) yields `None` instead of an error.
pub trait FromSqlValue: Sized {
    /// Name used in decode errors.
    const KIND: &'static str;

    fn from_sql_value(value: &SqlValue) -> Option<Self>;
}

impl FromSqlValue for i64 {
    const KIND: &'static str = "integer";

    fn from_sql_value(value: &SqlValue) -> Option<Self> {
        value.as_i64()
    }
}

impl FromSqlValue for i32 {
    const KIND: &'static str = "integer";

    fn from_sql_value(value: &SqlValue) -> Option<Self> {
        value.as_i64().and_then(|v| i32::try_from(v).ok())
    }
}

impl FromSqlValue for f64 {
    const KIND: &'static str = "float";

    fn from_sql_value(value: &SqlValue) -> Option<Self> {
        value.as_f64()
    }
}

impl FromSqlValue for String {
    const KIND: &'static str = "string";

    fn from_sql_value(value: &SqlValue) -> Option<Self> {
        value.to_text()
    }
}

impl FromSqlValue for bool {
    const KIND: &'static str = "boolean";

    fn from_sql_value(value: &SqlValue) -> Option<Self> {
        value.as_bool()
    }
}

impl FromSqlValue for NaiveDateTime {
    const KIND: &'static str = "timestamp";

    fn from_sql_value(value: &SqlValue) -> Option<Self> {
        value.as_timestamp()
    }
}

impl FromSqlValue for SqlValue {
    const KIND: &'static str = "value";

    fn from_sql_value(value: &SqlValue) -> Option<Self> {
        (!value.is_null()).then(|| value.clone())
    }
}

/// A typed record that can be materialized from a result row.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> Result<Self>;
}
