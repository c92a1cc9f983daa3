//! Clause rendering.
//!
//! Every function takes the connection alias only to label its errors.

use super::args::{Fields, InsertData, OrderSpec, Params, Relation};
use crate::error::{DbError, DbResult};
use crate::ident::{prepare_field, quote_ident};
use crate::value::{Value, ValueExpr, escape_string};

const FIELD_OPERATORS: &[&str] = &["<", ">", "=", "!=", ">=", "<="];
const VALUE_OPERATORS: &[&str] = &["LIKE", "<", ">", "=", "!=", ">=", "<="];
const INDEX_ACTIONS: &[&str] = &["USE", "FORCE", "IGNORE"];
const INDEX_PURPOSES: &[&str] = &["JOIN", "ORDER BY", "GROUP BY"];
const JOIN_TYPES: &[&str] = &["INNER", "LEFT", "RIGHT"];

/// Render a literal.
pub(crate) fn literal(alias: &str, value: &Value) -> DbResult<String> {
    match value {
        Value::Null => Ok("NULL".to_string()),
        Value::Int(v) => Ok(v.to_string()),
        Value::UInt(v) => Ok(v.to_string()),
        Value::Float(v) if v.is_finite() => Ok(v.to_string().replace(',', ".")),
        Value::Float(v) => Err(DbError::invalid_argument(
            alias,
            format!("{v} has no SQL literal"),
        )),
        Value::Str(s) => Ok(format!("\"{}\"", escape_string(s))),
        Value::Bool(v) => Ok(if *v { "1" } else { "0" }.to_string()),
        Value::DateTime(dt) => Ok(format!("\"{}\"", dt.format("%Y-%m-%d %H:%M:%S"))),
        Value::List(_) => Err(DbError::invalid_argument(
            alias,
            "a list is not a literal",
        )),
    }
}

/// `OPERATOR field` for a comparison against another column.
pub(crate) fn field_statement(alias: &str, name: &Value, operator: &str) -> DbResult<String> {
    if !FIELD_OPERATORS.contains(&operator) {
        return Err(DbError::invalid_argument(
            alias,
            format!("Invalid operator \"{operator}\""),
        ));
    }
    Ok(format!("{operator} {}", field_ref(alias, name)?))
}

/// `OPERATOR literal`, `IS [NOT] NULL`, `[NOT] IN (...)` or `BETWEEN a AND b`.
pub(crate) fn value_statement(alias: &str, value: &Value, operator: &str) -> DbResult<String> {
    match value {
        Value::Null => match operator {
            "=" | "IS" => Ok("IS NULL".to_string()),
            "!=" | "IS NOT" => Ok("IS NOT NULL".to_string()),
            _ => Err(DbError::invalid_argument(
                alias,
                format!("Invalid operator \"{operator}\" for NULL"),
            )),
        },
        Value::List(items) => {
            if operator == "BETWEEN" {
                let [from, to] = items.as_slice() else {
                    return Err(DbError::invalid_argument(
                        alias,
                        format!("BETWEEN takes 2 values, got {}", items.len()),
                    ));
                };
                return Ok(format!(
                    "BETWEEN {} AND {}",
                    literal(alias, from)?,
                    literal(alias, to)?
                ));
            }

            let operator = match operator {
                "=" | "IN" => "IN",
                "!=" | "NOT IN" => "NOT IN",
                other => {
                    return Err(DbError::invalid_argument(
                        alias,
                        format!("Invalid operator \"{other}\" for IN()"),
                    ));
                }
            };
            let list = items
                .iter()
                .map(|item| literal(alias, item))
                .collect::<DbResult<Vec<_>>>()?;
            Ok(format!("{operator} ({})", list.join(",")))
        }
        scalar => {
            if !VALUE_OPERATORS.contains(&operator) {
                return Err(DbError::invalid_argument(
                    alias,
                    format!("Invalid operator \"{operator}\""),
                ));
            }
            Ok(format!("{operator} {}", literal(alias, scalar)?))
        }
    }
}

/// AND-joined predicates.
pub(crate) fn where_statement(alias: &str, params: &Params) -> DbResult<String> {
    let parts = params
        .iter()
        .map(|(field, expr)| {
            let rhs = if expr.is_field {
                field_statement(alias, &expr.value, &expr.operator)?
            } else {
                value_statement(alias, &expr.value, &expr.operator)?
            };
            Ok(format!("{} {rhs}", prepare_field(field)))
        })
        .collect::<DbResult<Vec<_>>>()?;
    Ok(parts.join(" AND "))
}

/// `field = value, ...`. Operators are ignored in assignments.
pub(crate) fn set_statement(alias: &str, params: &Params) -> DbResult<String> {
    let parts = params
        .iter()
        .map(|(field, expr)| Ok(format!("{} = {}", prepare_field(field), assigned(alias, expr)?)))
        .collect::<DbResult<Vec<_>>>()?;
    Ok(parts.join(", "))
}

/// `(a,b) VALUES\n(1,2),\n(3,4)`, columns in the first row's order.
pub(crate) fn multi_insert_statement(alias: &str, rows: &[Params]) -> DbResult<String> {
    let Some(first) = rows.first() else {
        return Err(DbError::invalid_argument(alias, "No rows to insert"));
    };
    let fields: Vec<&str> = first.keys().collect();

    let mut statement = format!(
        "({}) VALUES",
        fields
            .iter()
            .map(|f| prepare_field(f))
            .collect::<Vec<_>>()
            .join(",")
    );

    for (i, row) in rows.iter().enumerate() {
        let values = fields
            .iter()
            .map(|field| {
                let expr = row.get(field).ok_or_else(|| {
                    DbError::invalid_argument(
                        alias,
                        format!("Row {i} has no value for \"{field}\""),
                    )
                })?;
                assigned(alias, expr)
            })
            .collect::<DbResult<Vec<_>>>()?;
        if i > 0 {
            statement.push(',');
        }
        statement.push('\n');
        statement.push('(');
        statement.push_str(&values.join(","));
        statement.push(')');
    }

    Ok(statement)
}

/// SET clause for one row, VALUES block for several.
pub(crate) fn insert_statement(alias: &str, data: &InsertData) -> DbResult<String> {
    match data {
        InsertData::One(row) => set_statement(alias, row),
        InsertData::Many(rows) => multi_insert_statement(alias, rows),
    }
}

pub(crate) fn fields_statement(fields: &Fields) -> String {
    match fields {
        Fields::All => "*".to_string(),
        Fields::Expr(expr) if expr == "*" || expr.contains(',') => expr.clone(),
        Fields::Expr(name) => prepare_field(name),
        Fields::List(items) => items
            .iter()
            .enumerate()
            .map(|(i, field)| match &field.alias {
                None if i == 0 && field.name == "*" => "*".to_string(),
                None => prepare_field(&field.name),
                Some(alias) => format!("{} AS `{alias}`", prepare_field(&field.name)),
            })
            .collect::<Vec<_>>()
            .join(", "),
    }
}

pub(crate) fn order_statement(spec: &OrderSpec) -> Option<String> {
    match spec {
        OrderSpec::None => None,
        OrderSpec::Raw(raw) => Some(raw.clone()),
        OrderSpec::Terms(terms) => Some(
            terms
                .iter()
                .map(|(field, direction)| match direction {
                    Some(direction) => format!("{} {direction}", prepare_field(field)),
                    None => prepare_field(field),
                })
                .collect::<Vec<_>>()
                .join(", "),
        ),
    }
}

/// `ACTION INDEX[ FOR purpose] (`a`, `b`)`
pub(crate) fn index_statement<S: AsRef<str>>(
    alias: &str,
    names: &[S],
    action: &str,
    purpose: Option<&str>,
) -> DbResult<String> {
    if !INDEX_ACTIONS.contains(&action) {
        return Err(DbError::invalid_argument(
            alias,
            format!("Invalid action \"{action}\""),
        ));
    }
    let purpose = match purpose {
        Some(p) if !INDEX_PURPOSES.contains(&p) => {
            return Err(DbError::invalid_argument(
                alias,
                format!("Invalid purpose \"{p}\""),
            ));
        }
        Some(p) => format!(" FOR {p}"),
        None => String::new(),
    };
    let names = names
        .iter()
        .map(|n| quote_ident(n.as_ref()))
        .collect::<Vec<_>>()
        .join(", ");
    Ok(format!("{action} INDEX{purpose} ({names})"))
}

/// `TYPE JOIN identifier AS `alias` ON (relation)`
pub(crate) fn join_statement(
    alias: &str,
    identifier: &str,
    table_alias: &str,
    relation: &Relation,
    join_type: &str,
) -> DbResult<String> {
    if !JOIN_TYPES.contains(&join_type) {
        return Err(DbError::invalid_argument(
            alias,
            format!("Invalid join type \"{join_type}\""),
        ));
    }
    let relation = match relation {
        Relation::Raw(raw) => raw.clone(),
        Relation::Params(params) => where_statement(alias, params)?,
    };
    Ok(format!(
        "{join_type} JOIN {identifier} AS `{table_alias}` ON ({relation})"
    ))
}

/// Right-hand side of an assignment or inserted value.
fn assigned(alias: &str, expr: &ValueExpr) -> DbResult<String> {
    if expr.is_field {
        field_ref(alias, &expr.value)
    } else {
        literal(alias, &expr.value)
    }
}

fn field_ref(alias: &str, name: &Value) -> DbResult<String> {
    match name {
        Value::Str(name) => Ok(prepare_field(name)),
        other => Err(DbError::invalid_argument(
            alias,
            format!("Invalid field reference {other:?}"),
        )),
    }
}
