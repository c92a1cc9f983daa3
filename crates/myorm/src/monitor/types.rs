use chrono::{DateTime, Utc};
use std::fmt;
use std::time::Duration;

/// Maximum length for error messages in `QueryOutcome::Error`.
const MAX_ERROR_LEN: usize = 512;

/// How a query finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOutcome {
    /// Query returned (or the cache served) this many rows.
    Rows(usize),
    /// Query failed with an error (truncated to 512 characters).
    Error(String),
}

impl QueryOutcome {
    /// Create an error outcome, truncating the message.
    pub fn error(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        if msg.len() > MAX_ERROR_LEN {
            Self::Error(format!(
                "{}...",
                super::truncate_sql_bytes(&msg, MAX_ERROR_LEN)
            ))
        } else {
            Self::Error(msg)
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

impl fmt::Display for QueryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryOutcome::Rows(n) => write!(f, "{n} rows"),
            QueryOutcome::Error(e) => write!(f, "error: {e}"),
        }
    }
}

/// Timing record for one `execute()` call.
#[derive(Debug, Clone)]
pub struct QueryRecord {
    /// SQL as rendered by the builder (before the formatter ran).
    pub sql: String,
    /// Connection alias.
    pub alias: String,
    /// Rows were served by the cache without running the query.
    pub is_cached: bool,
    pub started_at: DateTime<Utc>,
    /// Time spent establishing (or re-establishing) the connection.
    pub connect_time: Duration,
    /// Time spent in the query round-trips.
    pub query_time: Duration,
    /// Wall time of the whole call, cache included.
    pub total_time: Duration,
    pub outcome: QueryOutcome,
}

/// Sink for per-query records.
///
/// Implement this to forward records to a log, metrics system or debug toolbar.
pub trait QueryLogger: Send + Sync {
    fn log(&self, record: &QueryRecord);
}

/// Rewrites SQL text immediately before it is sent to the server,
/// e.g. to prepend request metadata as a comment.
///
/// Closures with the matching signature implement this trait.
pub trait QueryFormatter: Send + Sync {
    fn format(&self, sql: &str, cache_key: Option<&str>, cache_ttl: Option<Duration>) -> String;
}

impl<F> QueryFormatter for F
where
    F: Fn(&str, Option<&str>, Option<Duration>) -> String + Send + Sync,
{
    fn format(&self, sql: &str, cache_key: Option<&str>, cache_ttl: Option<Duration>) -> String {
        self(sql, cache_key, cache_ttl)
    }
}
