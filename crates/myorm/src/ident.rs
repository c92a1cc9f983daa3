//! MySQL identifier quoting.
//!
//! Two rules are used by the query builder:
//!
//! - [`prepare_field`]: bare names get backticks; qualified names (`t.col`), function
//!   calls (`COUNT(*)`) and anything containing a space pass through untouched.
//! - [`quote_table`]: catalog entries always render as `` `table` `` or
//!   `` `database`.`table` ``.

/// Quote a field name unless it is qualified or a raw expression.
///
/// Pre-existing backticks and surrounding whitespace are trimmed first, so the
/// result is wrapped exactly once.
pub fn prepare_field(name: &str) -> String {
    let name = name.trim();
    if name.contains('.') || name.contains('(') || name.contains(' ') {
        name.to_string()
    } else {
        format!("`{}`", trim_quotes(name))
    }
}

/// Quote one identifier part, trimming existing backticks and spaces.
pub fn quote_ident(name: &str) -> String {
    format!("`{}`", trim_quotes(name))
}

/// Render a physical table name, database-qualified when `database` is set.
pub fn quote_table(table: &str, database: Option<&str>) -> String {
    match database {
        Some(db) => format!("`{db}`.`{table}`"),
        None => format!("`{table}`"),
    }
}

fn trim_quotes(name: &str) -> &str {
    name.trim_matches(|c| c == '`' || c == ' ')
}
