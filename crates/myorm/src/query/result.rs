//! Reshaping of memoized result rows.
//!
//! Keyed forms use the text form of the key column ([`Value::to_key`]); rows
//! whose key is missing or NULL are skipped.

use crate::row::Row;
use crate::value::Value;
use indexmap::IndexMap;

/// One column of every row that has it.
pub(crate) fn column(rows: &[Row], field: &str) -> Vec<Value> {
    rows.iter()
        .filter_map(|row| row.get(field).cloned())
        .collect()
}

/// Rows keyed by `key`. A later row replaces an earlier one with the same key
/// but keeps its position.
pub(crate) fn rows_by(rows: &[Row], key: &str) -> IndexMap<String, Row> {
    keyed(rows, key)
        .map(|(k, row)| (k, row.clone()))
        .collect()
}

/// `field` of each row keyed by `key`. Rows without `field` are skipped.
pub(crate) fn column_by(rows: &[Row], key: &str, field: &str) -> IndexMap<String, Value> {
    keyed(rows, key)
        .filter_map(|(k, row)| row.get(field).map(|v| (k, v.clone())))
        .collect()
}

/// Rows grouped by `key`, groups in first-seen order.
pub(crate) fn rows_grouped(rows: &[Row], key: &str) -> IndexMap<String, Vec<Row>> {
    let mut groups: IndexMap<String, Vec<Row>> = IndexMap::new();
    for (k, row) in keyed(rows, key) {
        groups.entry(k).or_default().push(row.clone());
    }
    groups
}

/// `field` of each row grouped by `key`.
pub(crate) fn column_grouped(rows: &[Row], key: &str, field: &str) -> IndexMap<String, Vec<Value>> {
    let mut groups: IndexMap<String, Vec<Value>> = IndexMap::new();
    for (k, row) in keyed(rows, key) {
        if let Some(value) = row.get(field) {
            groups.entry(k).or_default().push(value.clone());
        }
    }
    groups
}

fn keyed<'a>(rows: &'a [Row], key: &'a str) -> impl Iterator<Item = (String, &'a Row)> + 'a {
    rows.iter()
        .filter_map(move |row| row.get(key).and_then(Value::to_key).map(|k| (k, row)))
}
