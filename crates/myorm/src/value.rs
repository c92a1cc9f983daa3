//! Literal values and value expressions.
//!
//! [`Value`] is the closed set of literals the query builder knows how to render.
//! [`ValueExpr`] pairs a value (or a field reference) with a comparison operator;
//! whether the operator is legal is decided by the clause that renders it, not here.
//!
//! ```ignore
//! use myorm::value::{between, field, like, escape_like};
//!
//! query.select(None, None).where_(params! {
//!     "id" => between(2, 3),
//!     "self.parent_id" => field("self.id", "!="),
//!     "name" => like(format!("%{}%", escape_like(input))),
//! });
//! ```

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone};
use serde::Serialize;
use std::fmt;

/// SELECT option: count rows ignoring LIMIT (read back through `FOUND_ROWS()`).
pub const CALC_FOUND_ROWS: &str = "SQL_CALC_FOUND_ROWS";
/// SELECT option: distinct rows.
pub const DISTINCT: &str = "DISTINCT";
/// INSERT/UPDATE/DELETE option: ignore errors.
pub const IGNORE: &str = "IGNORE";

/// Join types accepted by `DbQuery::join`.
pub const INNER: &str = "INNER";
pub const LEFT: &str = "LEFT";
pub const RIGHT: &str = "RIGHT";

/// A literal value, either bound into SQL text or read back from a result row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    Bool(bool),
    DateTime(NaiveDateTime),
    /// Two items for BETWEEN, any number for IN.
    List(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Text form used as a map key when reshaping rows. `None` for NULL and lists.
    pub fn to_key(&self) -> Option<String> {
        match self {
            Value::Null | Value::List(_) => None,
            Value::Str(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::UInt(v) => i64::try_from(*v).ok(),
            Value::Bool(v) => Some(i64::from(*v)),
            Value::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::UInt(v) => Some(*v),
            Value::Int(v) => u64::try_from(*v).ok(),
            Value::Bool(v) => Some(u64::from(*v)),
            Value::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            Value::UInt(v) => Some(*v as f64),
            Value::Str(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Int(v) => write!(f, "{v}"),
            Value::UInt(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(s) => f.write_str(s),
            Value::Bool(v) => f.write_str(if *v { "1" } else { "0" }),
            Value::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

macro_rules! impl_from_int {
    ($variant:ident: $($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::$variant(v.into())
            }
        })*
    };
}

impl_from_int!(Int: i8, i16, i32, i64);
impl_from_int!(UInt: u8, u16, u32, u64);

impl From<isize> for Value {
    fn from(v: isize) -> Self {
        Value::Int(v as i64)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::UInt(v as u64)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(f64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Str(v.clone())
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::DateTime(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::DateTime(v.and_time(chrono::NaiveTime::MIN))
    }
}

impl<Tz: TimeZone> From<DateTime<Tz>> for Value {
    fn from(v: DateTime<Tz>) -> Self {
        Value::DateTime(v.naive_local())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Value {
    fn from(v: [T; N]) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

/// A value (or field reference) paired with the operator it is compared with.
///
/// Plain values convert into `ValueExpr` with operator `=`, which renders
/// exactly like an unwrapped value in every clause.
#[derive(Debug, Clone, PartialEq)]
pub struct ValueExpr {
    pub value: Value,
    pub operator: String,
    pub is_field: bool,
}

impl ValueExpr {
    pub fn new(value: impl Into<Value>, operator: impl Into<String>, is_field: bool) -> Self {
        Self {
            value: value.into(),
            operator: operator.into(),
            is_field,
        }
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn operator(&self) -> &str {
        &self.operator
    }

    pub fn is_field(&self) -> bool {
        self.is_field
    }
}

macro_rules! impl_expr_from {
    ($($t:ty),*) => {
        $(impl From<$t> for ValueExpr {
            fn from(v: $t) -> Self {
                ValueExpr::new(v, "=", false)
            }
        })*
    };
}

impl_expr_from!(
    Value, i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64, bool, &str, String,
    &String, NaiveDateTime, NaiveDate
);

impl<T: Into<Value>> From<Option<T>> for ValueExpr {
    fn from(v: Option<T>) -> Self {
        ValueExpr::new(v, "=", false)
    }
}

impl<T: Into<Value>> From<Vec<T>> for ValueExpr {
    fn from(v: Vec<T>) -> Self {
        ValueExpr::new(v, "=", false)
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for ValueExpr {
    fn from(v: [T; N]) -> Self {
        ValueExpr::new(v, "=", false)
    }
}

impl<Tz: TimeZone> From<DateTime<Tz>> for ValueExpr {
    fn from(v: DateTime<Tz>) -> Self {
        ValueExpr::new(v, "=", false)
    }
}

/// Compare with `operator` against a literal.
pub fn value(operator: &str, v: impl Into<Value>) -> ValueExpr {
    ValueExpr::new(v, operator, false)
}

/// `BETWEEN from AND to`
pub fn between(from: impl Into<Value>, to: impl Into<Value>) -> ValueExpr {
    ValueExpr::new(Value::List(vec![from.into(), to.into()]), "BETWEEN", false)
}

/// `< v`
pub fn less(v: impl Into<Value>) -> ValueExpr {
    ValueExpr::new(v, "<", false)
}

/// `> v`
pub fn more(v: impl Into<Value>) -> ValueExpr {
    ValueExpr::new(v, ">", false)
}

/// `!= v`, `NOT IN (...)` for lists, `IS NOT NULL` for NULL.
pub fn not(v: impl Into<Value>) -> ValueExpr {
    ValueExpr::new(v, "!=", false)
}

/// `LIKE v`. Escape user input with [`escape_like`] first.
pub fn like(v: impl Into<Value>) -> ValueExpr {
    ValueExpr::new(v, "LIKE", false)
}

/// Compare against another column or raw SQL fragment instead of a literal.
pub fn field(name: &str, operator: &str) -> ValueExpr {
    ValueExpr::new(Value::Str(name.to_string()), operator, true)
}

/// Backslash-escape `_`, `%` and `\` for use inside a LIKE pattern.
pub fn escape_like(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 4);
    for c in s.chars() {
        if matches!(c, '_' | '%' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Escape a string for a quoted MySQL literal (`mysql_real_escape_string` rules).
pub fn escape_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 8);
    for c in s.chars() {
        match c {
            '\0' => out.push_str("\\0"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '"' => out.push_str("\\\""),
            '\x1a' => out.push_str("\\Z"),
            c => out.push(c),
        }
    }
    out
}
