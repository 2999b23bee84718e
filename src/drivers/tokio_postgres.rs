use std::error::Error;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tokio_postgres::types::{to_sql_checked, FromSql, IsNull, ToSql, Type};
use tokio_postgres::{Client, NoTls};
use uuid::Uuid;

use crate::config::DbConfig;
use crate::error::{Result, SimpleDbError};
use crate::traits::{Connector, DatabaseDriver};
use crate::translation::{contains_keyword, to_numbered, trim_statement_end};
use crate::types::{RawQueryResult, SqlValue};

/// PostgreSQL driver implementation using tokio-postgres.
///
/// Closing drops the client, which makes the background connection task
/// send `Terminate` and finish once in-flight statements are done.
pub struct TokioPostgresDriver {
    client: Mutex<Option<Arc<Client>>>,
}

impl TokioPostgresDriver {
    /// Connect to a PostgreSQL database.
    pub async fn connect(config: &DbConfig) -> Result<Self> {
        let mut pg_config = tokio_postgres::Config::new();
        pg_config
            .host(&config.host)
            .port(config.port)
            .user(&config.user)
            .password(&config.password)
            .dbname(&config.db_name);
        if let Some(timezone) = &config.timezone {
            pg_config.options(&format!("-c TimeZone={timezone}"));
        }

        let (client, connection) =
            pg_config
                .connect(NoTls)
                .await
                .map_err(|e| SimpleDbError::ConnectionFailed {
                    target: config.target(),
                    source: Box::new(e),
                })?;

        // The connection object performs the actual communication with the server.
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::warn!(error = %e, "PostgreSQL connection error");
            }
        });

        Ok(Self {
            client: Mutex::new(Some(Arc::new(client))),
        })
    }

    fn client(&self, sql: &str) -> Result<Arc<Client>> {
        self.client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| SimpleDbError::query_failed(sql, "connection is closed"))
    }

    async fn run_query(&self, sql: &str, params: &[SqlValue]) -> Result<RawQueryResult> {
        let client = self.client(sql)?;
        let numbered = to_numbered(sql);
        let statement = client
            .prepare(&numbered)
            .await
            .map_err(|e| SimpleDbError::query_failed(sql, e))?;
        let rows = client
            .query(&statement, &param_refs(params))
            .await
            .map_err(|e| SimpleDbError::query_failed(sql, e))?;

        let columns: Vec<String> = statement
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();

        let result_rows = rows
            .iter()
            .map(|row| (0..columns.len()).map(|idx| extract_value(row, idx)).collect())
            .collect();

        Ok(RawQueryResult::new(columns, result_rows))
    }
}

#[async_trait]
impl DatabaseDriver for TokioPostgresDriver {
    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<RawQueryResult> {
        self.run_query(sql, params).await
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<u64> {
        let client = self.client(sql)?;
        let numbered = to_numbered(sql);
        client
            .execute(&*numbered, &param_refs(params))
            .await
            .map_err(|e| SimpleDbError::query_failed(sql, e))
    }

    async fn insert(&self, sql: &str, params: &[SqlValue]) -> Result<Option<i64>> {
        let result = self.run_query(&with_returning(sql), params).await?;
        Ok(result
            .rows
            .first()
            .and_then(|row| row.first())
            .and_then(SqlValue::as_i64))
    }

    async fn batch_execute(&self, sql: &str) -> Result<()> {
        self.client(sql)?
            .batch_execute(sql)
            .await
            .map_err(|e| SimpleDbError::query_failed(sql, e))
    }

    fn is_closed(&self) -> bool {
        self.client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(true, |client| client.is_closed())
    }

    fn close(&self) {
        self.client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

/// Opens [`TokioPostgresDriver`] connections.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioPostgresConnector;

#[async_trait]
impl Connector for TokioPostgresConnector {
    async fn connect(&self, config: &DbConfig) -> Result<Arc<dyn DatabaseDriver>> {
        Ok(Arc::new(TokioPostgresDriver::connect(config).await?))
    }
}

/// Requests the inserted row back so the first column can serve as the generated key.
fn with_returning(sql: &str) -> String {
    let statement = trim_statement_end(sql);
    if contains_keyword(statement, "returning") {
        statement.to_string()
    } else {
        format!("{statement} RETURNING *")
    }
}

fn param_refs(params: &[SqlValue]) -> Vec<&(dyn ToSql + Sync)> {
    params.iter().map(|p| p as &(dyn ToSql + Sync)).collect()
}

fn is_text_type(ty: &Type) -> bool {
    matches!(
        *ty,
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN
    )
}

/// Extracts a `SqlValue` from a tokio-postgres row at the given index.
/// Values that cannot be represented become `SqlValue::Null`.
fn extract_value(row: &tokio_postgres::Row, idx: usize) -> SqlValue {
    let ty = row.columns()[idx].type_();
    let value = match *ty {
        Type::INT2 => read::<i16>(row, idx).map(SqlValue::from),
        Type::INT4 => read::<i32>(row, idx).map(SqlValue::from),
        Type::INT8 => read::<i64>(row, idx).map(SqlValue::Int),
        Type::OID => read::<u32>(row, idx).map(SqlValue::from),
        Type::FLOAT4 => read::<f32>(row, idx).map(SqlValue::from),
        Type::FLOAT8 => read::<f64>(row, idx).map(SqlValue::Float),
        Type::NUMERIC => read::<Decimal>(row, idx).map(decimal_value),
        Type::BOOL => read::<bool>(row, idx).map(SqlValue::Bool),
        Type::TIMESTAMP => read::<NaiveDateTime>(row, idx).map(SqlValue::Timestamp),
        Type::TIMESTAMPTZ => read::<DateTime<Utc>>(row, idx).map(|ts| SqlValue::Timestamp(ts.naive_utc())),
        Type::DATE => read::<NaiveDate>(row, idx)
            .map(|date| SqlValue::Timestamp(date.and_time(NaiveTime::MIN))),
        Type::UUID => read::<Uuid>(row, idx).map(|id| SqlValue::Text(id.to_string())),
        Type::JSON | Type::JSONB => {
            read::<serde_json::Value>(row, idx).map(|json| SqlValue::Text(json.to_string()))
        }
        _ => read::<String>(row, idx).map(SqlValue::Text),
    };
    value.unwrap_or(SqlValue::Null)
}

/// `None` for NULL and for values that cannot be read as `T`.
fn read<'a, T: FromSql<'a>>(row: &'a tokio_postgres::Row, idx: usize) -> Option<T> {
    match row.try_get::<_, Option<T>>(idx) {
        Ok(value) => value,
        Err(e) => {
            let column = &row.columns()[idx];
            tracing::debug!(
                column = column.name(),
                ty = %column.type_(),
                error = %e,
                "unreadable column value, using NULL"
            );
            None
        }
    }
}

/// Integral numerics fitting in `i64` stay exact; the rest become floats.
fn decimal_value(value: Decimal) -> SqlValue {
    if value.fract().is_zero() {
        if let Some(int) = value.to_i64() {
            return SqlValue::Int(int);
        }
    }
    match value.to_f64() {
        Some(float) => SqlValue::Float(float),
        None => SqlValue::Text(value.to_string()),
    }
}

impl ToSql for SqlValue {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> std::result::Result<IsNull, Box<dyn Error + Sync + Send>> {
        match self {
            SqlValue::Null => Ok(IsNull::Yes),
            SqlValue::Int(v) => match *ty {
                Type::INT2 => i16::try_from(*v)?.to_sql(ty, out),
                Type::INT4 => i32::try_from(*v)?.to_sql(ty, out),
                Type::INT8 => v.to_sql(ty, out),
                Type::OID => u32::try_from(*v)?.to_sql(ty, out),
                Type::FLOAT4 => (*v as f32).to_sql(ty, out),
                Type::FLOAT8 => (*v as f64).to_sql(ty, out),
                Type::NUMERIC => Decimal::from(*v).to_sql(ty, out),
                Type::BOOL => (*v != 0).to_sql(ty, out),
                _ if is_text_type(ty) => v.to_string().to_sql(ty, out),
                _ => Err(cannot_bind(self, ty)),
            },
            SqlValue::Float(v) => match *ty {
                Type::FLOAT4 => (*v as f32).to_sql(ty, out),
                Type::FLOAT8 => v.to_sql(ty, out),
                Type::NUMERIC => Decimal::try_from(*v)?.to_sql(ty, out),
                _ if is_text_type(ty) => v.to_string().to_sql(ty, out),
                _ => match self.as_i64() {
                    Some(int) => SqlValue::Int(int).to_sql(ty, out),
                    None => Err(cannot_bind(self, ty)),
                },
            },
            SqlValue::Bool(b) => match *ty {
                Type::BOOL => b.to_sql(ty, out),
                Type::INT2 | Type::INT4 | Type::INT8 => SqlValue::Int(i64::from(*b)).to_sql(ty, out),
                _ if is_text_type(ty) => b.to_string().to_sql(ty, out),
                _ => Err(cannot_bind(self, ty)),
            },
            SqlValue::Timestamp(ts) => match *ty {
                Type::TIMESTAMP => ts.to_sql(ty, out),
                Type::TIMESTAMPTZ => DateTime::<Utc>::from_naive_utc_and_offset(*ts, Utc).to_sql(ty, out),
                Type::DATE => ts.date().to_sql(ty, out),
                _ if is_text_type(ty) => self.to_string().to_sql(ty, out),
                _ => Err(cannot_bind(self, ty)),
            },
            SqlValue::Text(s) => {
                if is_text_type(ty) {
                    return s.as_str().to_sql(ty, out);
                }
                // Let the server-inferred type decide how the text is read.
                let parsed = match *ty {
                    Type::INT2 | Type::INT4 | Type::INT8 | Type::OID => {
                        SqlValue::Int(s.trim().parse()?)
                    }
                    Type::FLOAT4 | Type::FLOAT8 => SqlValue::Float(s.trim().parse()?),
                    Type::NUMERIC => return s.trim().parse::<Decimal>()?.to_sql(ty, out),
                    Type::UUID => return Uuid::parse_str(s.trim())?.to_sql(ty, out),
                    Type::JSON | Type::JSONB => {
                        return serde_json::from_str::<serde_json::Value>(s)?.to_sql(ty, out)
                    }
                    Type::BOOL => SqlValue::Bool(self.as_bool().ok_or_else(|| cannot_bind(self, ty))?),
                    Type::TIMESTAMP | Type::TIMESTAMPTZ | Type::DATE => {
                        SqlValue::Timestamp(self.as_timestamp().ok_or_else(|| cannot_bind(self, ty))?)
                    }
                    _ => return Err(cannot_bind(self, ty)),
                };
                parsed.to_sql(ty, out)
            }
        }
    }

    fn accepts(_ty: &Type) -> bool {
        // Compatibility is decided per value in `to_sql`.
        true
    }

    to_sql_checked!();
}

fn cannot_bind(value: &SqlValue, ty: &Type) -> Box<dyn Error + Sync + Send> {
    format!("cannot bind {} value as {}", value.kind(), ty).into()
}
