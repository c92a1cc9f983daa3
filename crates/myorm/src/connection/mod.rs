//! One logical MySQL connection.
//!
//! A [`Connection`] owns at most one physical handle obtained from a [`Driver`].
//! It connects lazily, applies the session charset and time zone, and retries a
//! query exactly once after reconnecting when the server reports that it has
//! gone away. Results can be served from an attached [`ResultCache`], and every
//! [`execute`](Connection::execute) call reports a [`QueryRecord`] to the
//! attached [`QueryLogger`].
//!
//! Access to the handle is serialized: one statement is in flight per
//! connection at any time.

use crate::cache::{CachedRows, ResultCache};
use crate::config::ConnectionConfig;
use crate::driver::{Driver, DriverError, QueryOutput, RawConnection};
use crate::error::{CR_UNKNOWN_ERROR, DbError, DbResult};
use crate::monitor::{QueryFormatter, QueryLogger, QueryOutcome, QueryRecord};
use crate::row::Row;
use crate::value::{Value, escape_string};
use chrono::Utc;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};


/// Cache directive for one [`Connection::execute`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheOptions {
    pub key: String,
    pub ttl: Duration,
    /// Evict `key` before fetching.
    pub force_rebuild: bool,
}

impl CacheOptions {
    pub fn new(key: impl Into<String>, ttl: Duration) -> Self {
        Self {
            key: key.into(),
            ttl,
            force_rebuild: false,
        }
    }

    pub fn force_rebuild(mut self, force: bool) -> Self {
        self.force_rebuild = force;
        self
    }

    fn is_active(&self) -> bool {
        !self.key.is_empty() && !self.ttl.is_zero()
    }
}

#[derive(Default, Clone)]
struct Hooks {
    cache: Option<Arc<dyn ResultCache>>,
    logger: Option<Arc<dyn QueryLogger>>,
    formatter: Option<Arc<dyn QueryFormatter>>,
}

struct State<C> {
    conn: Option<C>,
    affected_rows: u64,
    insert_id: u64,
}

#[derive(Default)]
struct Timings {
    ran: bool,
    connect_time: Duration,
    query_time: Duration,
    found_rows: Option<u64>,
}

/// Executor for one connection alias.
pub struct Connection<D: Driver> {
    alias: String,
    config: ConnectionConfig,
    driver: Arc<D>,
    hooks: RwLock<Hooks>,
    state: tokio::sync::Mutex<State<D::Conn>>,
}

impl<D: Driver> Connection<D> {
    pub fn new(alias: impl Into<String>, config: ConnectionConfig, driver: Arc<D>) -> Self {
        Self {
            alias: alias.into(),
            config,
            driver,
            hooks: RwLock::new(Hooks::default()),
            state: tokio::sync::Mutex::new(State {
                conn: None,
                affected_rows: 0,
                insert_id: 0,
            }),
        }
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Attach (or detach with `None`) a result cache.
    pub fn set_cache(&self, cache: Option<Arc<dyn ResultCache>>) {
        self.hooks_mut().cache = cache;
    }

    pub fn set_logger(&self, logger: Option<Arc<dyn QueryLogger>>) {
        self.hooks_mut().logger = logger;
    }

    pub fn set_formatter(&self, formatter: Option<Arc<dyn QueryFormatter>>) {
        self.hooks_mut().formatter = formatter;
    }

    pub async fn is_connected(&self) -> bool {
        self.state.lock().await.conn.is_some()
    }

    /// Open the physical connection and apply session settings. No-op when connected.
    pub async fn connect(&self) -> DbResult<()> {
        let mut state = self.state.lock().await;
        self.ensure_connected(&mut state).await.map(|_| ())
    }

    /// Close the physical connection, if any.
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        self.close_locked(&mut state).await;
    }

    /// `close()` followed by `connect()`.
    pub async fn reconnect(&self) -> DbResult<()> {
        let mut state = self.state.lock().await;
        self.close_locked(&mut state).await;
        self.ensure_connected(&mut state).await.map(|_| ())
    }

    /// Escape `s` for use inside a quoted string literal.
    pub fn escape(&self, s: &str) -> String {
        escape_string(s)
    }

    /// Run `sql` and return its rows, through the cache when `cache` is given
    /// and a cache is attached.
    pub async fn execute(&self, sql: &str, cache: Option<&CacheOptions>) -> DbResult<CachedRows> {
        self.execute_with(sql, cache, false)
            .await
            .map(|(rows, _)| rows)
    }

    /// Run a `SQL_CALC_FOUND_ROWS` select and return its rows with the `FOUND_ROWS()`
    /// count, read under the same lock as the select.
    ///
    /// When the result is cached, the count is cached beside it under `{key}#found_rows`
    /// so a cache hit never asks the server. If the count entry is gone while the rows
    /// are still cached, both are rebuilt.
    pub async fn execute_found_rows(
        &self,
        sql: &str,
        cache: Option<&CacheOptions>,
    ) -> DbResult<(CachedRows, u64)> {
        let store = self
            .hooks()
            .cache
            .filter(|_| cache.is_some_and(CacheOptions::is_active));
        let (Some(store), Some(options)) = (store, cache) else {
            let (rows, count) = self.execute_with(sql, cache, true).await?;
            return Ok((rows, self.require_count(count)?));
        };

        let count_key = format!("{}#found_rows", options.key);
        if options.force_rebuild {
            store.delete(&count_key).await;
        }
        let (rows, fresh) = self.execute_with(sql, Some(options), true).await?;
        if let Some(count) = fresh {
            store_count(store.as_ref(), &count_key, options.ttl, count).await?;
            return Ok((rows, count));
        }

        let missing = Box::pin(async {
            Err::<CachedRows, _>(DbError::invalid_operation(
                self.alias.as_str(),
                "found rows count is not cached",
            ))
        });
        let cached = store.get_with(&count_key, options.ttl, missing).await;
        if let Some(count) = cached.ok().and_then(|rows| first_count(&rows)) {
            return Ok((rows, count));
        }

        tracing::debug!(
            alias = %self.alias,
            key = %options.key,
            "found rows count evicted, rebuilding cached result"
        );
        let rebuild = options.clone().force_rebuild(true);
        let (rows, fresh) = self.execute_with(sql, Some(&rebuild), true).await?;
        let count = self.require_count(fresh)?;
        store_count(store.as_ref(), &count_key, options.ttl, count).await?;
        Ok((rows, count))
    }

    /// `execute`, optionally reading `FOUND_ROWS()` right after a query that ran.
    /// The count is `None` when the rows came from the cache.
    async fn execute_with(
        &self,
        sql: &str,
        cache: Option<&CacheOptions>,
        found_rows: bool,
    ) -> DbResult<(CachedRows, Option<u64>)> {
        let started_at = Utc::now();
        let start = Instant::now();
        let hooks = self.hooks();
        let timings = Mutex::new(Timings::default());

        let result = match (hooks.cache.as_ref(), cache) {
            (Some(store), Some(options)) if options.is_active() => {
                if options.force_rebuild {
                    store.delete(&options.key).await;
                }
                let compute = Box::pin(async {
                    self.run(sql, Some(options), &hooks, &timings, found_rows)
                        .await
                        .map(Arc::new)
                });
                store.get_with(&options.key, options.ttl, compute).await
            }
            _ => self
                .run(sql, cache, &hooks, &timings, found_rows)
                .await
                .map(Arc::new),
        };

        let timings = timings.into_inner().unwrap_or_else(PoisonError::into_inner);
        if let Some(logger) = &hooks.logger {
            logger.log(&QueryRecord {
                sql: sql.to_string(),
                alias: self.alias.clone(),
                is_cached: !timings.ran,
                started_at,
                connect_time: timings.connect_time,
                query_time: timings.query_time,
                total_time: start.elapsed(),
                outcome: match &result {
                    Ok(rows) => QueryOutcome::Rows(rows.len()),
                    Err(e) => QueryOutcome::error(e.to_string()),
                },
            });
        }

        result.map(|rows| (rows, timings.found_rows))
    }

    /// Run `sql` without a cache.
    pub async fn query(&self, sql: &str) -> DbResult<CachedRows> {
        self.execute(sql, None).await
    }

    /// `AUTO_INCREMENT` id generated by the last statement.
    pub async fn get_insert_id(&self) -> DbResult<u64> {
        let mut state = self.state.lock().await;
        self.ensure_connected(&mut state).await?;
        Ok(state.insert_id)
    }

    /// Rows affected (or returned) by the last statement.
    pub async fn get_affected_rows(&self) -> DbResult<u64> {
        let mut state = self.state.lock().await;
        self.ensure_connected(&mut state).await?;
        Ok(state.affected_rows)
    }

    /// `SELECT FOUND_ROWS()` for the last `SQL_CALC_FOUND_ROWS` query.
    pub async fn get_found_rows(&self) -> DbResult<u64> {
        let mut state = self.state.lock().await;
        self.found_rows_locked(&mut state).await
    }

    async fn found_rows_locked(&self, state: &mut State<D::Conn>) -> DbResult<u64> {
        let output = self.statement(state, FOUND_ROWS_SQL).await?;
        self.require_count(first_count(&output.rows))
    }

    fn require_count(&self, count: Option<u64>) -> DbResult<u64> {
        count.ok_or_else(|| DbError::Execution {
            alias: self.alias.clone(),
            code: CR_UNKNOWN_ERROR,
            message: "FOUND_ROWS() returned no count".to_string(),
            sql: Some(FOUND_ROWS_SQL.to_string()),
        })
    }

    pub async fn begin_transaction(&self) -> DbResult<()> {
        self.statements(&["SET autocommit = 0", "START TRANSACTION"])
            .await
    }

    pub async fn commit(&self) -> DbResult<()> {
        self.statements(&["COMMIT", "SET autocommit = 1"]).await
    }

    pub async fn rollback(&self) -> DbResult<()> {
        self.statements(&["ROLLBACK", "SET autocommit = 1"]).await
    }

    async fn statements(&self, sqls: &[&str]) -> DbResult<()> {
        let mut state = self.state.lock().await;
        for sql in sqls {
            self.statement(&mut state, sql).await?;
        }
        Ok(())
    }

    /// One internal statement: no formatter, no retry, no record.
    async fn statement(&self, state: &mut State<D::Conn>, sql: &str) -> DbResult<QueryOutput> {
        let conn = self.ensure_connected(state).await?;
        conn.query(sql)
            .await
            .map_err(|e| self.execution_error(e, sql))
    }

    async fn run(
        &self,
        sql: &str,
        cache: Option<&CacheOptions>,
        hooks: &Hooks,
        timings: &Mutex<Timings>,
        found_rows: bool,
    ) -> DbResult<Vec<Row>> {
        let formatted = match &hooks.formatter {
            Some(formatter) => formatter.format(
                sql,
                cache.map(|c| c.key.as_str()),
                cache.map(|c| c.ttl),
            ),
            None => sql.to_string(),
        };

        let mut state = self.state.lock().await;
        let mut spent = Timings::default();
        let result = self
            .run_with_retry(&mut state, &formatted, sql, &mut spent)
            .await;

        {
            let mut timings = timings.lock().unwrap_or_else(PoisonError::into_inner);
            timings.ran = true;
            timings.connect_time += spent.connect_time;
            timings.query_time += spent.query_time;
        }

        let output = result?;
        state.affected_rows = output.affected_rows;
        state.insert_id = output.last_insert_id;
        if found_rows {
            let count = self.found_rows_locked(&mut state).await?;
            timings.lock().unwrap_or_else(PoisonError::into_inner).found_rows = Some(count);
        }
        Ok(output.rows)
    }

    /// Send `formatted`; on "server has gone away" reconnect once and resend once.
    /// Errors carry the unformatted `sql`.
    async fn run_with_retry(
        &self,
        state: &mut State<D::Conn>,
        formatted: &str,
        sql: &str,
        spent: &mut Timings,
    ) -> DbResult<QueryOutput> {
        let t = Instant::now();
        let conn = self.ensure_connected(state).await?;
        spent.connect_time += t.elapsed();

        let t = Instant::now();
        let first = conn.query(formatted).await;
        spent.query_time += t.elapsed();

        let err = match first {
            Ok(output) => return Ok(output),
            Err(e) if e.is_server_gone() => e,
            Err(e) => return Err(self.execution_error(e, sql)),
        };

        tracing::warn!(
            alias = %self.alias,
            code = err.code,
            error = %err.message,
            "server has gone away, reconnecting"
        );
        let t = Instant::now();
        self.close_locked(state).await;
        let conn = self.ensure_connected(state).await?;
        spent.connect_time += t.elapsed();

        let t = Instant::now();
        let retried = conn.query(formatted).await;
        spent.query_time += t.elapsed();
        retried.map_err(|e| self.execution_error(e, sql))
    }

    async fn ensure_connected<'s>(
        &self,
        state: &'s mut State<D::Conn>,
    ) -> DbResult<&'s mut D::Conn> {
        let conn = match state.conn.take() {
            Some(conn) => conn,
            None => self.open().await?,
        };
        Ok(state.conn.insert(conn))
    }

    async fn open(&self) -> DbResult<D::Conn> {
        let mut conn = self
            .driver
            .connect(&self.config)
            .await
            .map_err(|e| self.connection_error(e))?;

        if let Err(err) = self.apply_session(&mut conn).await {
            if let Err(e) = conn.close().await {
                tracing::debug!(alias = %self.alias, error = %e, "close after failed setup");
            }
            return Err(err);
        }

        tracing::debug!(
            alias = %self.alias,
            host = %self.config.host,
            port = self.config.port,
            "connected"
        );
        Ok(conn)
    }

    async fn apply_session(&self, conn: &mut D::Conn) -> DbResult<()> {
        let charset = &self.config.charset;
        if charset.is_empty()
            || !charset
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(DbError::Connection {
                alias: self.alias.clone(),
                code: CR_UNKNOWN_ERROR,
                message: format!("invalid charset \"{charset}\""),
            });
        }
        conn.query(&format!("SET NAMES {charset}"))
            .await
            .map_err(|e| self.connection_error(e))?;

        if let Some(tz) = &self.config.timezone {
            conn.query(&format!("SET time_zone = \"{}\"", escape_string(tz)))
                .await
                .map_err(|e| self.connection_error(e))?;
        }
        Ok(())
    }

    async fn close_locked(&self, state: &mut State<D::Conn>) {
        state.affected_rows = 0;
        state.insert_id = 0;
        if let Some(conn) = state.conn.take() {
            if let Err(e) = conn.close().await {
                tracing::debug!(alias = %self.alias, error = %e, "error while closing");
            }
            tracing::debug!(alias = %self.alias, "closed");
        }
    }

    fn connection_error(&self, err: DriverError) -> DbError {
        DbError::Connection {
            alias: self.alias.clone(),
            code: err.code,
            message: err.message,
        }
    }

    fn execution_error(&self, err: DriverError, sql: &str) -> DbError {
        DbError::Execution {
            alias: self.alias.clone(),
            code: err.code,
            message: err.message,
            sql: Some(sql.to_string()),
        }
    }

    fn hooks(&self) -> Hooks {
        self.hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn hooks_mut(&self) -> std::sync::RwLockWriteGuard<'_, Hooks> {
        self.hooks.write().unwrap_or_else(PoisonError::into_inner)
    }
}

const FOUND_ROWS_SQL: &str = "SELECT FOUND_ROWS()";

fn first_count(rows: &[Row]) -> Option<u64> {
    rows.first()
        .and_then(|row| row.values().first())
        .and_then(Value::as_u64)
}

async fn store_count(
    store: &dyn ResultCache,
    key: &str,
    ttl: Duration,
    count: u64,
) -> DbResult<()> {
    let rows = Arc::new(vec![Row::from_pairs([("FOUND_ROWS()", count)])]);
    store.delete(key).await;
    store
        .get_with(key, ttl, Box::pin(async move { Ok(rows) }))
        .await
        .map(drop)
}

impl<D: Driver> std::fmt::Debug for Connection<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("alias", &self.alias)
            .field("host", &self.config.host)
            .field("port", &self.config.port)
            .finish_non_exhaustive()
    }
}
