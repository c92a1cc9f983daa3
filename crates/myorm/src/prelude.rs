//! Convenient imports for typical `myorm` usage.
//!
//! ```ignore
//! use myorm::prelude::*;
//! ```

pub use crate::value::{
    CALC_FOUND_ROWS, DISTINCT, IGNORE, INNER, LEFT, RIGHT, between, escape_like, field, less,
    like, more, not, value,
};
pub use crate::{
    CacheOptions, Connection, DbConfig, DbError, DbManager, DbQuery, DbResult, Fields, OrderSpec,
    Params, Row, Value, params,
};

#[cfg(feature = "mysql")]
pub use crate::{MysqlDb, MysqlDriver, MysqlQuery};

#[cfg(feature = "cache")]
pub use crate::MokaResultCache;
