//! Table alias → physical table resolution.

use crate::config::DbConfig;
use crate::error::{DbError, DbResult};
use crate::ident::quote_table;
use std::collections::HashMap;

/// A resolved table alias.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableEntry {
    pub alias: String,
    pub table: String,
    pub database: Option<String>,
    /// Connection alias; `None` means the registry's default connection.
    pub connection: Option<String>,
}

impl TableEntry {
    /// Backtick-quoted, database-qualified when a database is set.
    pub fn identifier(&self) -> String {
        quote_table(&self.table, self.database.as_deref())
    }
}

/// Lookup table of table aliases. Aliases are unique; later inserts replace earlier ones.
#[derive(Debug, Clone, Default)]
pub struct TableCatalog {
    tables: HashMap<String, TableEntry>,
}

impl TableCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from config, filling unset databases with `default_database`.
    pub fn from_config(config: &DbConfig) -> Self {
        let mut catalog = Self::new();
        for (alias, table) in &config.tables {
            catalog.insert(TableEntry {
                alias: alias.clone(),
                table: table.table.clone(),
                database: table
                    .database
                    .clone()
                    .or_else(|| config.default_database.clone()),
                connection: table.connection.clone(),
            });
        }
        catalog
    }

    pub fn insert(&mut self, entry: TableEntry) {
        self.tables.insert(entry.alias.clone(), entry);
    }

    pub fn contains(&self, alias: &str) -> bool {
        self.tables.contains_key(alias)
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Look up an alias.
    pub fn resolve(&self, alias: &str) -> DbResult<&TableEntry> {
        self.tables
            .get(alias)
            .ok_or_else(|| DbError::UnknownTable(alias.to_string()))
    }

    /// Look up an alias and render its quoted identifier.
    pub fn render_identifier(&self, alias: &str) -> DbResult<String> {
        self.resolve(alias).map(TableEntry::identifier)
    }
}
