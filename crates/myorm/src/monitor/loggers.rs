use super::truncate_sql_bytes;
use super::types::{QueryFormatter, QueryLogger, QueryRecord};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::Level;

/// A `tracing`-based logger that emits one event per query.
#[derive(Debug, Clone)]
pub struct TracingQueryLogger {
    /// Tracing event level to emit at.
    pub level: Level,
    /// Truncate long SQL strings (in bytes). `None` means no truncation.
    pub max_sql_length: Option<usize>,
}

impl Default for TracingQueryLogger {
    fn default() -> Self {
        Self {
            level: Level::DEBUG,
            max_sql_length: Some(200),
        }
    }
}

impl TracingQueryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the tracing event level.
    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Set maximum SQL length to display.
    pub fn max_sql_length(mut self, len: usize) -> Self {
        self.max_sql_length = Some(len);
        self
    }

    /// Disable SQL truncation.
    pub fn no_truncate(mut self) -> Self {
        self.max_sql_length = None;
        self
    }

    pub(crate) fn truncate_sql(&self, sql: &str) -> String {
        match self.max_sql_length {
            Some(max) if sql.len() > max => format!("{}...", truncate_sql_bytes(sql, max)),
            _ => sql.to_string(),
        }
    }
}

impl QueryLogger for TracingQueryLogger {
    fn log(&self, record: &QueryRecord) {
        /// Dispatch a tracing event at a runtime-determined level.
        macro_rules! emit_at_level {
            ($level:expr, $($field:tt)*) => {
                match $level {
                    Level::ERROR => tracing::error!($($field)*),
                    Level::WARN  => tracing::warn!($($field)*),
                    Level::INFO  => tracing::info!($($field)*),
                    Level::DEBUG => tracing::debug!($($field)*),
                    Level::TRACE => tracing::trace!($($field)*),
                }
            };
        }

        let sql = self.truncate_sql(&record.sql);
        emit_at_level!(
            self.level,
            target: "myorm.sql",
            alias = %record.alias,
            is_cached = record.is_cached,
            started_at = %record.started_at,
            connect_time = ?record.connect_time,
            query_time = ?record.query_time,
            total_time = ?record.total_time,
            outcome = %record.outcome,
            sql = %sql,
        );
    }
}

/// Collects query records in memory for per-request diagnostics.
#[derive(Debug, Default)]
pub struct QueryCollector {
    records: Mutex<Vec<QueryRecord>>,
}

impl QueryCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded queries.
    pub fn count(&self) -> usize {
        self.lock().len()
    }

    /// Sum of `total_time` over all records.
    pub fn total_time(&self) -> Duration {
        self.lock().iter().map(|r| r.total_time).sum()
    }

    /// Number of records served from the cache.
    pub fn cache_hits(&self) -> usize {
        self.lock().iter().filter(|r| r.is_cached).count()
    }

    /// Number of records whose query failed.
    pub fn error_count(&self) -> usize {
        self.lock().iter().filter(|r| r.outcome.is_error()).count()
    }

    /// Snapshot of recorded queries, oldest first.
    pub fn queries(&self) -> Vec<QueryRecord> {
        self.lock().clone()
    }

    pub fn reset(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<QueryRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl QueryLogger for QueryCollector {
    fn log(&self, record: &QueryRecord) {
        self.lock().push(record.clone());
    }
}

/// Fans one record out to several loggers, in insertion order.
#[derive(Default, Clone)]
pub struct CompositeLogger {
    loggers: Vec<Arc<dyn QueryLogger>>,
}

impl CompositeLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<L: QueryLogger + 'static>(self, logger: L) -> Self {
        self.add_arc(Arc::new(logger))
    }

    pub fn add_arc(mut self, logger: Arc<dyn QueryLogger>) -> Self {
        self.loggers.push(logger);
        self
    }
}

impl QueryLogger for CompositeLogger {
    fn log(&self, record: &QueryRecord) {
        for logger in &self.loggers {
            logger.log(record);
        }
    }
}

/// Prepends a `/* key=value ... */` comment to every query.
///
/// Fields are emitted in insertion order. `*/` inside a value is neutralized.
#[derive(Debug, Clone, Default)]
pub struct CommentFormatter {
    fields: Vec<(String, String)>,
}

impl CommentFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((key.into(), value.into()));
        self
    }
}

impl QueryFormatter for CommentFormatter {
    fn format(&self, sql: &str, cache_key: Option<&str>, _cache_ttl: Option<Duration>) -> String {
        let mut parts: Vec<String> = self
            .fields
            .iter()
            .map(|(k, v)| format!("{k}={}", v.replace("*/", "* /")))
            .collect();
        if let Some(key) = cache_key {
            parts.push(format!("cache_key={}", key.replace("*/", "* /")));
        }
        if parts.is_empty() {
            return sql.to_string();
        }
        format!("/* {} */ {sql}", parts.join(" "))
    }
}
