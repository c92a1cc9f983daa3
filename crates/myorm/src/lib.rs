//! # myorm
//!
//! A MySQL query-construction and execution layer.
//!
//! ## Features
//!
//! - **Table aliases**: queries name logical tables; a catalog maps them to
//!   `database.table` and to the connection that serves them
//! - **Fluent builder**: SELECT / INSERT (single and multi-row) / UPDATE / REPLACE /
//!   DELETE / TRUNCATE / OPTIMIZE with joins, index hints, sub-queries and paging
//! - **Safe defaults**: UPDATE and DELETE require WHERE, TRUNCATE is denied unless
//!   the builder opts out
//! - **One connection per alias**: lazy connect, session charset and time zone,
//!   a single reconnect-and-retry when the server has gone away
//! - **Result cache**: SELECT results cached per key with a TTL
//! - **Query monitoring**: one [`QueryRecord`] per execution, optional SQL formatter
//!
//! ## Query Builder
//!
//! ```ignore
//! use myorm::prelude::*;
//!
//! let db = MysqlDb::new(MysqlDriver::new(), DbConfig::load("db.toml")?)?;
//!
//! // SELECT
//! let mut q = db.table("users")?;
//! q.select(["id", "name"], Some(CALC_FOUND_ROWS))
//!     .where_(params! { "id" => between(2, 3), "name" => like("Ma%") })
//!     .order_by(OrderSpec::terms().desc("id"))
//!     .set_page(1, 20);
//! let names = q.column_by("id", "name").await?;
//! let total = q.get_row_count().await?;
//!
//! // INSERT
//! let mut q = db.table("users")?;
//! q.insert(params! { "name" => "Ippolit" }, None);
//! let id = q.get_insert_id().await?;
//!
//! // UPDATE
//! let mut q = db.table("users")?;
//! q.update(params! { "name" => "Matwey" }, None)
//!     .where_(params! { "id" => id });
//! q.exec().await?;
//! ```

pub mod cache;
pub mod catalog;
pub mod config;
pub mod connection;
pub mod driver;
pub mod error;
pub mod ident;
pub mod manager;
pub mod monitor;
pub mod prelude;
pub mod query;
pub mod row;
pub mod transaction;
pub mod value;

#[cfg(test)]
mod testing;

pub use cache::{CachedRows, ResultCache};
pub use catalog::{TableCatalog, TableEntry};
pub use config::{ConnectionConfig, DbConfig, TableConfig};
pub use connection::{CacheOptions, Connection};
pub use driver::{Driver, DriverError, QueryOutput, RawConnection};
pub use error::{DbError, DbResult};
pub use manager::DbManager;
pub use monitor::{
    CommentFormatter, CompositeLogger, QueryCollector, QueryFormatter, QueryLogger, QueryOutcome,
    QueryRecord, TracingQueryLogger,
};
pub use query::{DbQuery, Field, Fields, InsertData, OrderSpec, Params, QueryKind, Relation};
pub use row::{FromValue, Row};
pub use value::{Value, ValueExpr};

#[cfg(feature = "cache")]
pub use cache::MokaResultCache;

#[cfg(feature = "mysql")]
pub use driver::mysql::{MysqlConnection, MysqlDriver};

/// Registry over the `mysql_async` driver.
#[cfg(feature = "mysql")]
pub type MysqlDb = DbManager<MysqlDriver>;

/// Query builder over the `mysql_async` driver.
#[cfg(feature = "mysql")]
pub type MysqlQuery = DbQuery<MysqlDriver>;
