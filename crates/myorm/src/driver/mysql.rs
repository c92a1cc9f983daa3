//! [`Driver`] implementation on top of `mysql_async`.

use super::{Driver, DriverError, QueryOutput, RawConnection};
use crate::config::ConnectionConfig;
use crate::error::{CR_SERVER_GONE_ERROR, CR_UNKNOWN_ERROR};
use crate::row::Row;
use crate::value::Value;
use chrono::NaiveDate;
use mysql_async::prelude::Queryable;
use std::future::Future;
use std::sync::Arc;

/// Opens plain TCP connections with `mysql_async::Conn::new`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MysqlDriver;

impl MysqlDriver {
    pub fn new() -> Self {
        Self
    }
}

impl Driver for MysqlDriver {
    type Conn = MysqlConnection;

    fn connect(
        &self,
        config: &ConnectionConfig,
    ) -> impl Future<Output = Result<Self::Conn, DriverError>> + Send {
        let opts = mysql_async::OptsBuilder::default()
            .ip_or_hostname(config.host.clone())
            .tcp_port(config.port)
            .user(Some(config.username.clone()))
            .pass(Some(config.password.clone()))
            .db_name(config.database.clone());

        async move {
            let conn = mysql_async::Conn::new(opts).await.map_err(map_error)?;
            Ok(MysqlConnection { conn })
        }
    }
}

/// One `mysql_async` connection.
pub struct MysqlConnection {
    conn: mysql_async::Conn,
}

impl RawConnection for MysqlConnection {
    fn query(&mut self, sql: &str) -> impl Future<Output = Result<QueryOutput, DriverError>> + Send {
        async move {
            let raw: Vec<mysql_async::Row> = self.conn.query(sql).await.map_err(map_error)?;
            let rows = convert_rows(raw);
            let affected_rows = if rows.is_empty() {
                self.conn.affected_rows()
            } else {
                rows.len() as u64
            };
            Ok(QueryOutput {
                rows,
                affected_rows,
                last_insert_id: self.conn.last_insert_id().unwrap_or(0),
            })
        }
    }

    fn close(self) -> impl Future<Output = Result<(), DriverError>> + Send {
        async move { self.conn.disconnect().await.map_err(map_error) }
    }
}

fn map_error(err: mysql_async::Error) -> DriverError {
    match err {
        mysql_async::Error::Server(e) => DriverError::new(e.code, e.message),
        mysql_async::Error::Io(e) => DriverError::new(CR_SERVER_GONE_ERROR, e.to_string()),
        mysql_async::Error::Driver(mysql_async::DriverError::ConnectionClosed) => {
            DriverError::server_gone()
        }
        other => DriverError::new(CR_UNKNOWN_ERROR, other.to_string()),
    }
}

fn convert_rows(raw: Vec<mysql_async::Row>) -> Vec<Row> {
    let Some(first) = raw.first() else {
        return Vec::new();
    };
    let columns: Arc<[String]> = first
        .columns_ref()
        .iter()
        .map(|c| c.name_str().into_owned())
        .collect();

    raw.into_iter()
        .map(|row| {
            let values = row.unwrap().into_iter().map(convert_value).collect();
            Row::new(columns.clone(), values)
        })
        .collect()
}

fn convert_value(value: mysql_async::Value) -> Value {
    use mysql_async::Value as V;

    match value {
        V::NULL => Value::Null,
        V::Bytes(bytes) => Value::Str(String::from_utf8_lossy(&bytes).into_owned()),
        V::Int(v) => Value::Int(v),
        V::UInt(v) => Value::UInt(v),
        V::Float(v) => Value::Float(f64::from(v)),
        V::Double(v) => Value::Float(v),
        V::Date(year, month, day, hour, minute, second, micros) => {
            NaiveDate::from_ymd_opt(i32::from(year), u32::from(month), u32::from(day))
                .and_then(|d| {
                    d.and_hms_micro_opt(
                        u32::from(hour),
                        u32::from(minute),
                        u32::from(second),
                        micros,
                    )
                })
                .map(Value::DateTime)
                // Zero dates have no chrono representation.
                .unwrap_or_else(|| {
                    Value::Str(format!(
                        "{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}"
                    ))
                })
        }
        V::Time(negative, days, hours, minutes, seconds, _micros) => {
            let hours = days * 24 + u32::from(hours);
            let sign = if negative { "-" } else { "" };
            Value::Str(format!("{sign}{hours:02}:{minutes:02}:{seconds:02}"))
        }
    }
}
