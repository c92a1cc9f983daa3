//! Argument types accepted by [`DbQuery`](super::DbQuery) methods.

use crate::value::ValueExpr;

/// Ordered `field → value` list used for WHERE/HAVING predicates, join
/// relations, SET clauses and inserted rows.
///
/// Built with the [`params!`](crate::params) macro or by chaining [`Params::with`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    items: Vec<(String, ValueExpr)>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pair. A repeated field is rendered twice.
    pub fn push(&mut self, field: impl Into<String>, value: impl Into<ValueExpr>) {
        self.items.push((field.into(), value.into()));
    }

    pub fn with(mut self, field: impl Into<String>, value: impl Into<ValueExpr>) -> Self {
        self.push(field, value);
        self
    }

    /// First value stored under `field`.
    pub fn get(&self, field: &str) -> Option<&ValueExpr> {
        self.items
            .iter()
            .find(|(name, _)| name == field)
            .map(|(_, value)| value)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ValueExpr)> {
        self.items.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<K: Into<String>, V: Into<ValueExpr>> FromIterator<(K, V)> for Params {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            items: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl<K: Into<String>, V: Into<ValueExpr>, const N: usize> From<[(K, V); N]> for Params {
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}

/// Build [`Params`] from `field => value` pairs, keeping their order.
///
/// ```ignore
/// let p = params! { "id" => 5, "name" => like("a%"), "parent_id" => None::<i64> };
/// ```
#[macro_export]
macro_rules! params {
    () => { $crate::Params::new() };
    ($($field:expr => $value:expr),+ $(,)?) => {{
        let mut params = $crate::Params::new();
        $(params.push($field, $value);)+
        params
    }};
}

/// One selected column, optionally aliased.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub alias: Option<String>,
}

/// The column list of a SELECT.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Fields {
    /// `*`
    #[default]
    All,
    /// A single name (quoted) or, when it contains a comma, a raw column list.
    Expr(String),
    /// Columns rendered one by one; a leading `*` is kept as is.
    List(Vec<Field>),
}

impl Fields {
    /// Empty column list, filled with [`field`](Self::field) and [`aliased`](Self::aliased).
    pub fn list() -> Self {
        Fields::List(Vec::new())
    }

    /// Append a column. On [`Fields::All`] the `*` stays first (`*, `name``), and a
    /// [`Fields::Expr`] stays first as written; start from [`Fields::list`] for only
    /// the named columns.
    pub fn field(self, name: impl Into<String>) -> Self {
        self.push(Field {
            name: name.into(),
            alias: None,
        })
    }

    /// `name AS `alias``, appended the same way as [`field`](Self::field).
    pub fn aliased(self, name: impl Into<String>, alias: impl Into<String>) -> Self {
        self.push(Field {
            name: name.into(),
            alias: Some(alias.into()),
        })
    }

    fn push(self, field: Field) -> Self {
        match self {
            Fields::List(mut items) => {
                items.push(field);
                Fields::List(items)
            }
            Fields::All => Fields::List(vec![
                Field {
                    name: "*".to_string(),
                    alias: None,
                },
                field,
            ]),
            Fields::Expr(expr) => Fields::List(vec![
                Field {
                    name: expr,
                    alias: None,
                },
                field,
            ]),
        }
    }
}

impl From<&str> for Fields {
    fn from(s: &str) -> Self {
        Fields::Expr(s.to_string())
    }
}

impl From<String> for Fields {
    fn from(s: String) -> Self {
        Fields::Expr(s)
    }
}

impl<T: Into<Fields>> From<Option<T>> for Fields {
    fn from(v: Option<T>) -> Self {
        v.map_or(Fields::All, Into::into)
    }
}

impl From<Vec<&str>> for Fields {
    fn from(names: Vec<&str>) -> Self {
        names.into_iter().fold(Fields::list(), Fields::field)
    }
}

impl<const N: usize> From<[&str; N]> for Fields {
    fn from(names: [&str; N]) -> Self {
        names.into_iter().fold(Fields::list(), Fields::field)
    }
}

impl<const N: usize> From<[(&str, &str); N]> for Fields {
    fn from(pairs: [(&str, &str); N]) -> Self {
        pairs
            .into_iter()
            .fold(Fields::list(), |fields, (name, alias)| fields.aliased(name, alias))
    }
}

/// GROUP BY / ORDER BY terms.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum OrderSpec {
    /// Clear the clause.
    #[default]
    None,
    /// Used verbatim.
    Raw(String),
    /// `field` or `field DIRECTION` terms; field names are quoted.
    Terms(Vec<(String, Option<String>)>),
}

impl OrderSpec {
    pub fn terms() -> Self {
        OrderSpec::Terms(Vec::new())
    }

    /// Bare field.
    pub fn field(self, name: impl Into<String>) -> Self {
        self.push(name.into(), None)
    }

    /// Field followed by a direction (or any trailing modifier).
    pub fn term(self, name: impl Into<String>, direction: impl Into<String>) -> Self {
        self.push(name.into(), Some(direction.into()))
    }

    pub fn asc(self, name: impl Into<String>) -> Self {
        self.term(name, "ASC")
    }

    pub fn desc(self, name: impl Into<String>) -> Self {
        self.term(name, "DESC")
    }

    fn push(self, name: String, direction: Option<String>) -> Self {
        let mut terms = match self {
            OrderSpec::Terms(terms) => terms,
            OrderSpec::None => Vec::new(),
            OrderSpec::Raw(raw) => vec![(raw, None)],
        };
        terms.push((name, direction));
        OrderSpec::Terms(terms)
    }
}

impl From<&str> for OrderSpec {
    fn from(s: &str) -> Self {
        OrderSpec::Raw(s.to_string())
    }
}

impl From<String> for OrderSpec {
    fn from(s: String) -> Self {
        OrderSpec::Raw(s)
    }
}

impl<T: Into<OrderSpec>> From<Option<T>> for OrderSpec {
    fn from(v: Option<T>) -> Self {
        v.map_or(OrderSpec::None, Into::into)
    }
}

impl<const N: usize> From<[&str; N]> for OrderSpec {
    fn from(names: [&str; N]) -> Self {
        names.into_iter().fold(OrderSpec::terms(), OrderSpec::field)
    }
}

impl From<Vec<&str>> for OrderSpec {
    fn from(names: Vec<&str>) -> Self {
        names.into_iter().fold(OrderSpec::terms(), OrderSpec::field)
    }
}

impl<const N: usize> From<[(&str, &str); N]> for OrderSpec {
    fn from(pairs: [(&str, &str); N]) -> Self {
        pairs
            .into_iter()
            .fold(OrderSpec::terms(), |spec, (name, dir)| spec.term(name, dir))
    }
}

/// ON condition of a join.
#[derive(Debug, Clone, PartialEq)]
pub enum Relation {
    Raw(String),
    Params(Params),
}

impl From<&str> for Relation {
    fn from(s: &str) -> Self {
        Relation::Raw(s.to_string())
    }
}

impl From<String> for Relation {
    fn from(s: String) -> Self {
        Relation::Raw(s)
    }
}

impl From<Params> for Relation {
    fn from(p: Params) -> Self {
        Relation::Params(p)
    }
}

/// Rows for [`DbQuery::insert`](super::DbQuery::insert): one row renders a SET
/// clause, several render a VALUES block.
#[derive(Debug, Clone, PartialEq)]
pub enum InsertData {
    One(Params),
    Many(Vec<Params>),
}

impl From<Params> for InsertData {
    fn from(row: Params) -> Self {
        InsertData::One(row)
    }
}

impl From<Vec<Params>> for InsertData {
    fn from(rows: Vec<Params>) -> Self {
        InsertData::Many(rows)
    }
}

impl<const N: usize> From<[Params; N]> for InsertData {
    fn from(rows: [Params; N]) -> Self {
        InsertData::Many(rows.into())
    }
}
