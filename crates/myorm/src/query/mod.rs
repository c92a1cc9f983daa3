//! Fluent MySQL statement builder bound to a table alias and a connection.
//!
//! A [`DbQuery`] describes one statement. Builder methods take `&mut self` and
//! return `&mut Self`; none of them touch the server. Argument errors (a bad
//! operator, join type or literal) are recorded and reported by
//! [`get_query`](DbQuery::get_query) and by every execution method, so chains
//! never need `?` in the middle.
//!
//! The first execution method to run sends the statement and memoizes the
//! rows; later accessors reshape the same rows. A builder is single-use.
//!
//! ```ignore
//! use myorm::{params, value::between};
//!
//! let mut q = db.table("users")?;
//! q.select(["id", "name"], None)
//!     .where_(params! { "id" => between(2, 3) })
//!     .order_by([("id", "DESC")])
//!     .limit(10);
//! let names = q.column_by("id", "name").await?;
//! ```

mod args;
mod render;
mod result;

#[cfg(test)]
mod tests;

pub use args::{Field, Fields, InsertData, OrderSpec, Params, Relation};

use crate::cache::CachedRows;
use crate::catalog::TableCatalog;
use crate::connection::{CacheOptions, Connection};
use crate::driver::Driver;
use crate::error::{DbError, DbResult};
use crate::row::Row;
use crate::value::{CALC_FOUND_ROWS, Value};
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// The statement a builder renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Select,
    Insert,
    MultiInsert,
    Update,
    Replace,
    Delete,
    Truncate,
    Optimize,
}

impl QueryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKind::Select => "select",
            QueryKind::Insert => "insert",
            QueryKind::MultiInsert => "multi_insert",
            QueryKind::Update => "update",
            QueryKind::Replace => "replace",
            QueryKind::Delete => "delete",
            QueryKind::Truncate => "truncate",
            QueryKind::Optimize => "optimize",
        }
    }
}

impl fmt::Display for QueryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Builder for one statement against one table alias.
pub struct DbQuery<D: Driver> {
    alias: String,
    table: String,
    catalog: Arc<TableCatalog>,
    connection: Arc<Connection<D>>,
    sub_query: Option<Box<DbQuery<D>>>,
    security: bool,

    kind: Option<QueryKind>,
    options: Option<String>,
    fields: String,
    joins: Vec<String>,
    indexes: Vec<String>,
    where_clause: Option<String>,
    group_by: Option<String>,
    having: Option<String>,
    order_by: Option<String>,
    limit: Option<u64>,
    offset: Option<u64>,
    set: Option<String>,
    values: Option<String>,
    on_duplicate: Option<String>,

    cache: Option<CacheOptions>,
    build_error: Option<DbError>,

    result: Option<CachedRows>,
    row_count: Option<u64>,
}

impl<D: Driver> DbQuery<D> {
    /// Builder for `alias`, resolved through `catalog`.
    pub fn new(
        alias: impl Into<String>,
        catalog: Arc<TableCatalog>,
        connection: Arc<Connection<D>>,
    ) -> DbResult<Self> {
        let alias = alias.into();
        let table = catalog.render_identifier(&alias)?;
        Ok(Self::with_table(alias, table, catalog, connection, None))
    }

    /// Builder selecting from `sub_query` instead of a table. Both must be SELECTs
    /// when rendered.
    pub fn from_subquery(
        sub_query: DbQuery<D>,
        catalog: Arc<TableCatalog>,
        connection: Arc<Connection<D>>,
    ) -> Self {
        let alias = sub_query.alias.clone();
        let table = sub_query.table.clone();
        Self::with_table(alias, table, catalog, connection, Some(Box::new(sub_query)))
    }

    fn with_table(
        alias: String,
        table: String,
        catalog: Arc<TableCatalog>,
        connection: Arc<Connection<D>>,
        sub_query: Option<Box<DbQuery<D>>>,
    ) -> Self {
        Self {
            alias,
            table,
            catalog,
            connection,
            sub_query,
            security: true,
            kind: None,
            options: None,
            fields: "*".to_string(),
            joins: Vec::new(),
            indexes: Vec::new(),
            where_clause: None,
            group_by: None,
            having: None,
            order_by: None,
            limit: None,
            offset: None,
            set: None,
            values: None,
            on_duplicate: None,
            cache: None,
            build_error: None,
            result: None,
            row_count: None,
        }
    }

    /// Table alias this builder was created for.
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Quoted physical table identifier.
    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn kind(&self) -> Option<QueryKind> {
        self.kind
    }

    pub fn connection(&self) -> &Arc<Connection<D>> {
        &self.connection
    }

    // ==================== Operations ====================

    /// `SELECT [options] fields`
    pub fn select(&mut self, fields: impl Into<Fields>, options: Option<&str>) -> &mut Self {
        self.kind = Some(QueryKind::Select);
        self.options = options.map(str::to_string);
        self.fields = render::fields_statement(&fields.into());
        self
    }

    /// One row renders `INSERT ... SET`, several render a VALUES block.
    pub fn insert(&mut self, data: impl Into<InsertData>, options: Option<&str>) -> &mut Self {
        let data = data.into();
        self.options = options.map(str::to_string);
        let rendered = render::insert_statement(self.connection.alias(), &data);
        match data {
            InsertData::One(_) => {
                self.kind = Some(QueryKind::Insert);
                self.set = self.record(rendered);
            }
            InsertData::Many(_) => {
                self.kind = Some(QueryKind::MultiInsert);
                self.values = self.record(rendered);
            }
        }
        self
    }

    pub fn update(&mut self, data: impl Into<Params>, options: Option<&str>) -> &mut Self {
        self.kind = Some(QueryKind::Update);
        self.options = options.map(str::to_string);
        let rendered = render::set_statement(self.connection.alias(), &data.into());
        self.set = self.record(rendered);
        self
    }

    pub fn replace(&mut self, data: impl Into<Params>, options: Option<&str>) -> &mut Self {
        self.kind = Some(QueryKind::Replace);
        self.options = options.map(str::to_string);
        let rendered = render::set_statement(self.connection.alias(), &data.into());
        self.set = self.record(rendered);
        self
    }

    pub fn delete(&mut self, options: Option<&str>) -> &mut Self {
        self.kind = Some(QueryKind::Delete);
        self.options = options.map(str::to_string);
        self
    }

    /// Needs [`disable_security`](Self::disable_security) to render.
    pub fn truncate(&mut self) -> &mut Self {
        self.kind = Some(QueryKind::Truncate);
        self
    }

    pub fn optimize(&mut self) -> &mut Self {
        self.kind = Some(QueryKind::Optimize);
        self
    }

    /// Allow UPDATE/DELETE without WHERE, and TRUNCATE.
    pub fn disable_security(&mut self) -> &mut Self {
        self.security = false;
        self
    }

    // ==================== Clauses ====================

    /// `TYPE JOIN table AS alias ON (relation)`. `table` is a catalog alias;
    /// `join_type` is one of [`INNER`](crate::value::INNER),
    /// [`LEFT`](crate::value::LEFT), [`RIGHT`](crate::value::RIGHT).
    pub fn join(
        &mut self,
        table: &str,
        alias: &str,
        relation: impl Into<Relation>,
        join_type: &str,
    ) -> &mut Self {
        let rendered = self.catalog.render_identifier(table).and_then(|identifier| {
            render::join_statement(
                self.connection.alias(),
                &identifier,
                alias,
                &relation.into(),
                join_type,
            )
        });
        if let Some(join) = self.record(rendered) {
            self.joins.push(join);
        }
        self
    }

    /// Index hint. `action` is USE, FORCE or IGNORE; `purpose` is JOIN,
    /// ORDER BY or GROUP BY.
    pub fn index<S: AsRef<str>>(
        &mut self,
        names: &[S],
        action: &str,
        purpose: Option<&str>,
    ) -> &mut Self {
        let rendered = render::index_statement(self.connection.alias(), names, action, purpose);
        if let Some(index) = self.record(rendered) {
            self.indexes.push(index);
        }
        self
    }

    /// AND-joined predicates. Replaces any previous WHERE.
    pub fn where_(&mut self, params: impl Into<Params>) -> &mut Self {
        let rendered = render::where_statement(self.connection.alias(), &params.into());
        self.where_clause = self.record(rendered);
        self
    }

    /// Raw WHERE condition; `None` clears it.
    pub fn where_raw(&mut self, statement: Option<&str>) -> &mut Self {
        self.where_clause = statement.map(str::to_string);
        self
    }

    pub fn having(&mut self, params: impl Into<Params>) -> &mut Self {
        let rendered = render::where_statement(self.connection.alias(), &params.into());
        self.having = self.record(rendered);
        self
    }

    /// Raw HAVING condition; `None` clears it.
    pub fn having_raw(&mut self, statement: Option<&str>) -> &mut Self {
        self.having = statement.map(str::to_string);
        self
    }

    pub fn group_by(&mut self, spec: impl Into<OrderSpec>) -> &mut Self {
        self.group_by = render::order_statement(&spec.into());
        self
    }

    pub fn order_by(&mut self, spec: impl Into<OrderSpec>) -> &mut Self {
        self.order_by = render::order_statement(&spec.into());
        self
    }

    /// `None` or 0 removes the clause.
    pub fn limit(&mut self, limit: Option<u64>) -> &mut Self {
        self.limit = limit;
        self
    }

    /// `None` or 0 removes the clause.
    pub fn offset(&mut self, offset: Option<u64>) -> &mut Self {
        self.offset = offset;
        self
    }

    /// Legacy combined form of [`offset`](Self::offset) and [`limit`](Self::limit).
    #[deprecated(note = "use `limit()` and `offset()`")]
    pub fn limit_offset(&mut self, offset: u64, count: u64) -> &mut Self {
        self.offset = Some(offset);
        self.limit = Some(count);
        self
    }

    /// 1-based page of `page_size` rows.
    pub fn set_page(&mut self, page: u64, page_size: u64) -> &mut Self {
        self.offset = Some(page.saturating_sub(1) * page_size);
        self.limit = Some(page_size);
        self
    }

    /// `ON DUPLICATE KEY UPDATE ...` for INSERTs.
    pub fn on_duplicate_key(&mut self, data: impl Into<Params>) -> &mut Self {
        let rendered = render::set_statement(self.connection.alias(), &data.into());
        self.on_duplicate = self.record(rendered);
        self
    }

    /// Serve this SELECT through the connection's result cache.
    ///
    /// With [`CALC_FOUND_ROWS`] the found-rows count is cached with the rows, so
    /// [`get_row_count`](Self::get_row_count) on a cache hit reports the cached count.
    pub fn set_caching(
        &mut self,
        key: impl Into<String>,
        ttl: Duration,
        force_rebuild: bool,
    ) -> &mut Self {
        if self.kind != Some(QueryKind::Select) {
            self.fail(DbError::invalid_operation(
                self.connection.alias(),
                "Cache available only for SELECT",
            ));
            return self;
        }
        self.cache = Some(CacheOptions::new(key, ttl).force_rebuild(force_rebuild));
        self
    }

    pub fn cache_options(&self) -> Option<&CacheOptions> {
        self.cache.as_ref()
    }

    // ==================== Rendering ====================

    /// Render the statement. Pure: repeated calls give identical text.
    pub fn get_query(&self) -> DbResult<String> {
        if let Some(err) = &self.build_error {
            return Err(err.clone());
        }

        let conn_alias = self.connection.alias();
        if let Some(sub) = &self.sub_query {
            if self.kind != Some(QueryKind::Select) || sub.kind != Some(QueryKind::Select) {
                return Err(DbError::invalid_operation(
                    conn_alias,
                    "Sub query is supported only in SELECT-queries",
                ));
            }
        }

        let Some(kind) = self.kind else {
            return Err(DbError::invalid_operation(conn_alias, "Unknown operation"));
        };

        let mut sql = String::with_capacity(128);
        match kind {
            QueryKind::Select => {
                sql.push_str("SELECT ");
                self.push_options(&mut sql);
                sql.push_str(&self.fields);
                sql.push_str("\nFROM ");
                match &self.sub_query {
                    Some(sub) => {
                        sql.push_str("(\n");
                        sql.push_str(&sub.get_query()?);
                        sql.push_str("\n)");
                    }
                    None => sql.push_str(&self.table),
                }
                sql.push_str(" AS self");
                for line in self.indexes.iter().chain(&self.joins) {
                    sql.push('\n');
                    sql.push_str(line);
                }
                push_clause(&mut sql, "WHERE", self.where_clause.as_deref());
                push_clause(&mut sql, "GROUP BY", self.group_by.as_deref());
                push_clause(&mut sql, "HAVING", self.having.as_deref());
                self.push_tail(&mut sql);
            }
            QueryKind::Insert | QueryKind::MultiInsert => {
                sql.push_str("INSERT ");
                self.push_options(&mut sql);
                sql.push_str("INTO ");
                sql.push_str(&self.table);
                if kind == QueryKind::Insert {
                    sql.push_str("\nSET ");
                    sql.push_str(self.set.as_deref().unwrap_or_default());
                } else {
                    sql.push('\n');
                    sql.push_str(self.values.as_deref().unwrap_or_default());
                }
                push_clause(
                    &mut sql,
                    "ON DUPLICATE KEY UPDATE",
                    self.on_duplicate.as_deref(),
                );
            }
            QueryKind::Update => {
                sql.push_str("UPDATE ");
                self.push_options(&mut sql);
                sql.push_str(&self.table);
                sql.push_str("\nSET ");
                sql.push_str(self.set.as_deref().unwrap_or_default());
                self.push_guarded_where(&mut sql, "UPDATE")?;
                self.push_tail(&mut sql);
            }
            QueryKind::Replace => {
                sql.push_str("REPLACE ");
                self.push_options(&mut sql);
                sql.push_str("INTO ");
                sql.push_str(&self.table);
                sql.push_str("\nSET ");
                sql.push_str(self.set.as_deref().unwrap_or_default());
            }
            QueryKind::Delete => {
                sql.push_str("DELETE ");
                self.push_options(&mut sql);
                sql.push_str("FROM ");
                sql.push_str(&self.table);
                self.push_guarded_where(&mut sql, "DELETE")?;
                self.push_tail(&mut sql);
            }
            QueryKind::Truncate => {
                if self.security {
                    return Err(DbError::security(conn_alias, "Operation TRUNCATE denied"));
                }
                sql.push_str("TRUNCATE TABLE ");
                sql.push_str(&self.table);
            }
            QueryKind::Optimize => {
                sql.push_str("OPTIMIZE TABLE ");
                sql.push_str(&self.table);
            }
        }
        Ok(sql)
    }

    fn push_options(&self, sql: &mut String) {
        if let Some(options) = self.options.as_deref().filter(|o| !o.is_empty()) {
            sql.push_str(options);
            sql.push(' ');
        }
    }

    fn push_guarded_where(&self, sql: &mut String, operation: &str) -> DbResult<()> {
        match self.where_clause.as_deref().filter(|w| !w.is_empty()) {
            Some(condition) => push_clause(sql, "WHERE", Some(condition)),
            None if self.security => {
                return Err(DbError::security(
                    self.connection.alias(),
                    format!("Operation {operation} require non-empty WHERE"),
                ));
            }
            None => {}
        }
        Ok(())
    }

    /// ORDER BY, LIMIT, OFFSET
    fn push_tail(&self, sql: &mut String) {
        push_clause(sql, "ORDER BY", self.order_by.as_deref());
        if let Some(limit) = self.limit.filter(|&n| n > 0) {
            sql.push_str(&format!("\nLIMIT {limit}"));
        }
        if let Some(offset) = self.offset.filter(|&n| n > 0) {
            sql.push_str(&format!("\nOFFSET {offset}"));
        }
    }

    /// Keep the first argument error; later ones are dropped.
    fn fail(&mut self, err: DbError) {
        if self.build_error.is_none() {
            self.build_error = Some(err);
        }
    }

    fn record(&mut self, rendered: DbResult<String>) -> Option<String> {
        match rendered {
            Ok(s) => Some(s),
            Err(e) => {
                self.fail(e);
                None
            }
        }
    }

    // ==================== Execution ====================

    /// Send the statement unless a result is already memoized.
    pub async fn exec(&mut self) -> DbResult<()> {
        if self.result.is_some() {
            return Ok(());
        }

        let sql = self.get_query()?;
        let rows = if self.kind == Some(QueryKind::Select) && self.calc_found_rows() {
            let (rows, count) = self
                .connection
                .execute_found_rows(&sql, self.cache.as_ref())
                .await?;
            self.row_count = Some(count);
            rows
        } else {
            self.connection.execute(&sql, self.cache.as_ref()).await?
        };
        self.result = Some(rows);
        Ok(())
    }

    fn calc_found_rows(&self) -> bool {
        self.options
            .as_deref()
            .is_some_and(|o| o.contains(CALC_FOUND_ROWS))
    }

    async fn fetched(&mut self) -> DbResult<&[Row]> {
        self.exec().await?;
        Ok(self.result.as_deref().map(Vec::as_slice).unwrap_or_default())
    }

    /// All rows, in server order.
    pub async fn rows(&mut self) -> DbResult<CachedRows> {
        self.exec().await?;
        Ok(self.result.clone().unwrap_or_default())
    }

    /// `field` of every row.
    pub async fn column(&mut self, field: &str) -> DbResult<Vec<Value>> {
        Ok(result::column(self.fetched().await?, field))
    }

    /// Rows keyed by the text of their `key` column; the last duplicate wins.
    pub async fn rows_by(&mut self, key: &str) -> DbResult<IndexMap<String, Row>> {
        Ok(result::rows_by(self.fetched().await?, key))
    }

    /// `field` keyed by the text of `key`.
    pub async fn column_by(&mut self, key: &str, field: &str) -> DbResult<IndexMap<String, Value>> {
        Ok(result::column_by(self.fetched().await?, key, field))
    }

    /// Rows grouped by the text of `key`.
    pub async fn rows_grouped(&mut self, key: &str) -> DbResult<IndexMap<String, Vec<Row>>> {
        Ok(result::rows_grouped(self.fetched().await?, key))
    }

    /// `field` grouped by the text of `key`.
    pub async fn column_grouped(
        &mut self,
        key: &str,
        field: &str,
    ) -> DbResult<IndexMap<String, Vec<Value>>> {
        Ok(result::column_grouped(self.fetched().await?, key, field))
    }

    /// First row, or `None` for an empty result.
    pub async fn row(&mut self) -> DbResult<Option<Row>> {
        Ok(self.fetched().await?.first().cloned())
    }

    /// `field` of the first row.
    pub async fn value(&mut self, field: &str) -> DbResult<Option<Value>> {
        Ok(self
            .fetched()
            .await?
            .first()
            .and_then(|row| row.get(field))
            .cloned())
    }

    /// `FOUND_ROWS()` when selected with [`CALC_FOUND_ROWS`], affected rows otherwise.
    pub async fn get_row_count(&mut self) -> DbResult<u64> {
        self.exec().await?;
        if let Some(count) = self.row_count {
            return Ok(count);
        }
        let count = self.connection.get_affected_rows().await?;
        self.row_count = Some(count);
        Ok(count)
    }

    /// Pages of `limit` rows needed for [`get_row_count`](Self::get_row_count) rows.
    pub async fn get_page_count(&mut self) -> DbResult<u64> {
        let Some(page_size) = self.limit.filter(|&n| n > 0) else {
            return Err(DbError::invalid_operation(
                self.connection.alias(),
                "Page count requires a limit",
            ));
        };
        Ok(self.get_row_count().await?.div_ceil(page_size))
    }

    pub async fn get_insert_id(&mut self) -> DbResult<u64> {
        self.exec().await?;
        self.connection.get_insert_id().await
    }

    pub async fn begin_transaction(&self) -> DbResult<()> {
        self.connection.begin_transaction().await
    }

    pub async fn commit(&self) -> DbResult<()> {
        self.connection.commit().await
    }

    pub async fn rollback(&self) -> DbResult<()> {
        self.connection.rollback().await
    }
}

fn push_clause(sql: &mut String, keyword: &str, body: Option<&str>) {
    if let Some(body) = body.filter(|b| !b.is_empty()) {
        sql.push('\n');
        sql.push_str(keyword);
        sql.push(' ');
        sql.push_str(body);
    }
}

impl<D: Driver> fmt::Display for DbQuery<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.get_query() {
            Ok(sql) => f.write_str(&sql),
            Err(e) => write!(f, "<invalid query: {e}>"),
        }
    }
}

impl<D: Driver> fmt::Debug for DbQuery<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DbQuery")
            .field("alias", &self.alias)
            .field("table", &self.table)
            .field("kind", &self.kind)
            .field("security", &self.security)
            .finish_non_exhaustive()
    }
}
