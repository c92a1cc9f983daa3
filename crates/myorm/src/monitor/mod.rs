//! Per-query logging and query-text formatting.
//!
//! Every call to [`Connection::execute`](crate::Connection::execute) emits exactly one
//! [`QueryRecord`] to the attached [`QueryLogger`], whether the rows came from the
//! database or from the cache. Aggregation for display is a separate concern handled
//! by [`QueryCollector`].
//!
//! # Example
//!
//! ```rust,ignore
//! use myorm::monitor::{QueryCollector, TracingQueryLogger};
//! use std::sync::Arc;
//!
//! let collector = Arc::new(QueryCollector::new());
//! db.set_logger(Some(collector.clone()));
//! // ... run queries ...
//! println!("{} queries in {:?}", collector.count(), collector.total_time());
//! ```

mod loggers;
mod types;


pub use loggers::{CommentFormatter, CompositeLogger, QueryCollector, TracingQueryLogger};
pub use types::{QueryFormatter, QueryLogger, QueryOutcome, QueryRecord};

pub(crate) fn truncate_sql_bytes(sql: &str, max_bytes: usize) -> &str {
    if sql.len() <= max_bytes {
        return sql;
    }
    let mut end = max_bytes;
    while end > 0 && !sql.is_char_boundary(end) {
        end -= 1;
    }
    &sql[..end]
}
