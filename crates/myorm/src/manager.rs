//! Registry of connections and entry point for building queries.
//!
//! A [`DbManager`] owns the configuration, the table catalog and one memoized
//! [`Connection`] per connection alias. Connections are created on first use and
//! connect lazily on their first statement.
//!
//! ```ignore
//! use myorm::{DbConfig, DbManager, MysqlDriver, params};
//!
//! let db = DbManager::new(MysqlDriver::new(), DbConfig::load("db.toml")?)?;
//! let mut q = db.table("users")?;
//! q.select(["id", "name"], None).where_(params! { "id" => 5 });
//! let user = q.row().await?;
//! ```

use crate::cache::ResultCache;
use crate::catalog::{TableCatalog, TableEntry};
use crate::config::DbConfig;
use crate::connection::Connection;
use crate::driver::Driver;
use crate::error::{DbError, DbResult};
use crate::monitor::{QueryFormatter, QueryLogger};
use crate::query::DbQuery;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

#[derive(Default, Clone)]
struct SharedHooks {
    cache: Option<Arc<dyn ResultCache>>,
    logger: Option<Arc<dyn QueryLogger>>,
    formatter: Option<Arc<dyn QueryFormatter>>,
}

/// Connection registry and query factory.
pub struct DbManager<D: Driver> {
    driver: Arc<D>,
    config: DbConfig,
    catalog: Arc<TableCatalog>,
    default_connection: RwLock<String>,
    connections: Mutex<HashMap<String, Arc<Connection<D>>>>,
    hooks: RwLock<SharedHooks>,
}

impl<D: Driver> DbManager<D> {
    /// Validate `config` and build the table catalog from it.
    pub fn new(driver: D, config: DbConfig) -> DbResult<Self> {
        config.validate()?;
        let catalog = TableCatalog::from_config(&config);
        Ok(Self {
            driver: Arc::new(driver),
            default_connection: RwLock::new(config.default_connection.clone()),
            catalog: Arc::new(catalog),
            config,
            connections: Mutex::new(HashMap::new()),
            hooks: RwLock::new(SharedHooks::default()),
        })
    }

    pub fn config(&self) -> &DbConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Arc<TableCatalog> {
        &self.catalog
    }

    pub fn default_connection(&self) -> String {
        self.default_connection
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Use `alias` for tables without an explicit connection.
    pub fn set_default_connection(&self, alias: impl Into<String>) -> DbResult<()> {
        let alias = alias.into();
        if !self.config.connections.contains_key(&alias) {
            return Err(DbError::UnknownConnection(alias));
        }
        *self
            .default_connection
            .write()
            .unwrap_or_else(PoisonError::into_inner) = alias;
        Ok(())
    }

    /// Catalog entry of a table alias.
    pub fn get_config(&self, table_alias: &str) -> DbResult<&TableEntry> {
        self.catalog.resolve(table_alias)
    }

    /// The memoized connection for `alias`, or for the default alias when `None`.
    pub fn get_connection(&self, alias: Option<&str>) -> DbResult<Arc<Connection<D>>> {
        let alias = match alias {
            Some(alias) => alias.to_string(),
            None => self.default_connection(),
        };

        let mut connections = self.connections();
        if let Some(conn) = connections.get(&alias) {
            return Ok(conn.clone());
        }

        let Some(config) = self.config.connections.get(&alias) else {
            return Err(DbError::UnknownConnection(alias));
        };
        let conn = Arc::new(Connection::new(
            alias.clone(),
            config.clone(),
            self.driver.clone(),
        ));
        let hooks = self.hooks();
        conn.set_cache(hooks.cache);
        conn.set_logger(hooks.logger);
        conn.set_formatter(hooks.formatter);

        tracing::debug!(alias = %alias, "registered connection");
        connections.insert(alias, conn.clone());
        Ok(conn)
    }

    /// Builder for a table alias, bound to the table's connection.
    pub fn table(&self, table_alias: &str) -> DbResult<DbQuery<D>> {
        let conn = self.connection_for(table_alias)?;
        DbQuery::new(table_alias, self.catalog.clone(), conn)
    }

    /// Builder selecting from `builder`. Both must be SELECTs when rendered.
    pub fn subquery(&self, builder: DbQuery<D>) -> DbResult<DbQuery<D>> {
        let conn = self.connection_for(builder.alias())?;
        Ok(DbQuery::from_subquery(builder, self.catalog.clone(), conn))
    }

    fn connection_for(&self, table_alias: &str) -> DbResult<Arc<Connection<D>>> {
        let entry = self.catalog.resolve(table_alias)?;
        self.get_connection(entry.connection.as_deref())
    }

    // ==================== Hooks ====================

    /// Attach a result cache to every current and future connection.
    pub fn set_cache(&self, cache: Option<Arc<dyn ResultCache>>) {
        self.hooks_mut().cache = cache.clone();
        for conn in self.connections().values() {
            conn.set_cache(cache.clone());
        }
    }

    /// Attach a query logger to every current and future connection.
    pub fn set_logger(&self, logger: Option<Arc<dyn QueryLogger>>) {
        self.hooks_mut().logger = logger.clone();
        for conn in self.connections().values() {
            conn.set_logger(logger.clone());
        }
    }

    /// Attach a query formatter to every current and future connection.
    pub fn set_formatter(&self, formatter: Option<Arc<dyn QueryFormatter>>) {
        self.hooks_mut().formatter = formatter.clone();
        for conn in self.connections().values() {
            conn.set_formatter(formatter.clone());
        }
    }

    /// Close every connection created so far. They reconnect on next use.
    pub async fn close_all(&self) {
        let connections: Vec<_> = self.connections().values().cloned().collect();
        for conn in connections {
            conn.close().await;
        }
    }

    fn connections(&self) -> MutexGuard<'_, HashMap<String, Arc<Connection<D>>>> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn hooks(&self) -> SharedHooks {
        self.hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn hooks_mut(&self) -> std::sync::RwLockWriteGuard<'_, SharedHooks> {
        self.hooks.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<D: Driver> std::fmt::Debug for DbManager<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbManager")
            .field("default_connection", &self.default_connection())
            .field("tables", &self.catalog.len())
            .field("connections", &self.connections().len())
            .finish_non_exhaustive()
    }
}
