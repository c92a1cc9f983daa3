//! The seam between [`Connection`](crate::Connection) and a physical MySQL client.

use crate::config::ConnectionConfig;
use crate::error::CR_SERVER_GONE_ERROR;
use crate::row::Row;
use std::fmt;
use std::future::Future;

#[cfg(feature = "mysql")]
pub mod mysql;

/// Error reported by a driver: MySQL error code plus message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverError {
    pub code: u16,
    pub message: String,
}

impl DriverError {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// The "MySQL server has gone away" condition.
    pub fn server_gone() -> Self {
        Self::new(CR_SERVER_GONE_ERROR, "MySQL server has gone away")
    }

    pub fn is_server_gone(&self) -> bool {
        self.code == CR_SERVER_GONE_ERROR
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}) {}", self.code, self.message)
    }
}

impl std::error::Error for DriverError {}

/// Everything a single text query produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOutput {
    /// Result rows; empty for statements without a result set.
    pub rows: Vec<Row>,
    /// Rows changed by a write, or rows returned by a read.
    pub affected_rows: u64,
    /// `AUTO_INCREMENT` value generated by the statement, 0 if none.
    pub last_insert_id: u64,
}

impl QueryOutput {
    pub fn rows(rows: Vec<Row>) -> Self {
        let affected_rows = rows.len() as u64;
        Self {
            rows,
            affected_rows,
            last_insert_id: 0,
        }
    }

    pub fn affected(affected_rows: u64, last_insert_id: u64) -> Self {
        Self {
            rows: Vec::new(),
            affected_rows,
            last_insert_id,
        }
    }
}

/// Opens physical connections.
pub trait Driver: Send + Sync + 'static {
    type Conn: RawConnection;

    /// Perform the handshake. Session setup (charset, time zone) is done by the caller.
    fn connect(
        &self,
        config: &ConnectionConfig,
    ) -> impl Future<Output = Result<Self::Conn, DriverError>> + Send;
}

/// One open physical connection.
pub trait RawConnection: Send + 'static {
    /// Run a text-protocol query.
    fn query(&mut self, sql: &str) -> impl Future<Output = Result<QueryOutput, DriverError>> + Send;

    /// Close the connection.
    fn close(self) -> impl Future<Output = Result<(), DriverError>> + Send
    where
        Self: Sized;
}
