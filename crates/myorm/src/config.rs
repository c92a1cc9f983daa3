//! Connection and table configuration.
//!
//! ```toml
//! default_connection = "default"
//! default_database = "app"
//!
//! [connections.default]
//! host = "127.0.0.1"
//! username = "app"
//! password = "${APP_DB_PASSWORD}"
//! timezone = "+00:00"
//!
//! [tables.users]
//! table = "users"
//!
//! [tables.logs]
//! table = "request_log"
//! database = "stats"
//! connection = "stats"
//! ```

use crate::error::{DbError, DbResult};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Top-level configuration for a [`DbManager`](crate::DbManager).
#[derive(Debug, Clone, Deserialize)]
pub struct DbConfig {
    #[serde(default = "default_connection_alias")]
    pub default_connection: String,

    /// Database used for tables that don't name one.
    #[serde(default)]
    pub default_database: Option<String>,

    #[serde(default)]
    pub connections: BTreeMap<String, ConnectionConfig>,

    #[serde(default)]
    pub tables: BTreeMap<String, TableConfig>,
}

/// Parameters of one physical connection.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    pub host: String,
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_charset")]
    pub charset: String,
    /// Session time zone (`SET time_zone = ...`), e.g. `+00:00` or `Europe/Berlin`.
    #[serde(default)]
    pub timezone: Option<String>,
}

/// One table alias entry.
#[derive(Debug, Clone, Deserialize)]
pub struct TableConfig {
    pub table: String,
    #[serde(default)]
    pub database: Option<String>,
    /// Connection alias; the default connection when unset.
    #[serde(default)]
    pub connection: Option<String>,
}

fn default_connection_alias() -> String {
    "default".to_string()
}

fn default_port() -> u16 {
    3306
}

fn default_charset() -> String {
    "utf8mb4".to_string()
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            default_connection: default_connection_alias(),
            default_database: None,
            connections: BTreeMap::new(),
            tables: BTreeMap::new(),
        }
    }
}

impl ConnectionConfig {
    /// Connection parameters with default port, charset and no time zone.
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            username: username.into(),
            password: password.into(),
            database: None,
            port: default_port(),
            charset: default_charset(),
            timezone: None,
        }
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = charset.into();
        self
    }

    pub fn timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = Some(timezone.into());
        self
    }
}

impl TableConfig {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            database: None,
            connection: None,
        }
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn connection(mut self, connection: impl Into<String>) -> Self {
        self.connection = Some(connection.into());
        self
    }
}

impl DbConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse TOML, expand `${VAR}` references and validate.
    pub fn from_toml_str(raw: &str) -> DbResult<Self> {
        let mut config: DbConfig = toml::from_str(raw)?;
        config.expand_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> DbResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            DbError::config(format!(
                "failed to read config file {}: {e}",
                path.display()
            ))
        })?;
        Self::from_toml_str(&raw)
            .map_err(|e| DbError::config(format!("{}: {e}", path.display())))
    }

    pub fn with_connection(mut self, alias: impl Into<String>, config: ConnectionConfig) -> Self {
        self.connections.insert(alias.into(), config);
        self
    }

    pub fn with_table(mut self, alias: impl Into<String>, config: TableConfig) -> Self {
        self.tables.insert(alias.into(), config);
        self
    }

    pub fn with_default_database(mut self, database: impl Into<String>) -> Self {
        self.default_database = Some(database.into());
        self
    }

    /// Check cross-references between tables and connections.
    pub fn validate(&self) -> DbResult<()> {
        if !self.connections.is_empty() && !self.connections.contains_key(&self.default_connection)
        {
            return Err(DbError::config(format!(
                "default connection \"{}\" is not configured",
                self.default_connection
            )));
        }

        for (alias, table) in &self.tables {
            if table.table.trim().is_empty() {
                return Err(DbError::config(format!("table \"{alias}\" has an empty name")));
            }
            if let Some(conn) = &table.connection {
                if !self.connections.contains_key(conn) {
                    return Err(DbError::config(format!(
                        "table \"{alias}\" uses unknown connection \"{conn}\""
                    )));
                }
            }
        }

        for (alias, conn) in &self.connections {
            if conn.host.trim().is_empty() {
                return Err(DbError::config(format!(
                    "connection \"{alias}\" has an empty host"
                )));
            }
        }

        Ok(())
    }

    fn expand_env(&mut self) -> DbResult<()> {
        if let Some(db) = self.default_database.as_mut() {
            *db = expand_env_vars(db)?;
        }

        for conn in self.connections.values_mut() {
            conn.host = expand_env_vars(&conn.host)?;
            conn.username = expand_env_vars(&conn.username)?;
            conn.password = expand_env_vars(&conn.password)?;
            if let Some(db) = conn.database.as_mut() {
                *db = expand_env_vars(db)?;
            }
            if let Some(tz) = conn.timezone.as_mut() {
                *tz = expand_env_vars(tz)?;
            }
        }

        for table in self.tables.values_mut() {
            if let Some(db) = table.database.as_mut() {
                *db = expand_env_vars(db)?;
            }
        }

        Ok(())
    }
}

fn expand_env_vars(input: &str) -> DbResult<String> {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next();

            let mut key = String::new();
            let mut closed = false;
            for ch in chars.by_ref() {
                if ch == '}' {
                    closed = true;
                    break;
                }
                key.push(ch);
            }

            if !closed {
                return Err(DbError::config(format!(
                    "unterminated env reference in \"{input}\""
                )));
            }
            if key.is_empty() {
                return Err(DbError::config("empty env reference ${}"));
            }

            let value = std::env::var(&key).map_err(|_| {
                DbError::config(format!("environment variable {key} is not set"))
            })?;
            out.push_str(&value);
        } else {
            out.push(c);
        }
    }

    Ok(out)
}
