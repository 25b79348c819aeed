//! Live database introspection.
//!
//! An [`Introspector`] rebuilds the schema model from a running engine's
//! catalog so it can be compared with the declared one. Catalog access goes
//! through the small [`CatalogConnection`] trait: every query returns rows of
//! nullable text values, which keeps introspectors independent of any driver
//! and lets tests feed canned rows.

use indexmap::IndexMap;
use tabula_db_schema::{ColumnType, DefaultValue, ReferentialAction, Schema, Table};

use crate::{Error, Result};

mod mysql;
mod pg_client;
mod postgres;

pub use mysql::MySqlIntrospector;
pub use pg_client::PgCatalog;
pub use postgres::PostgresIntrospector;

/// Error type of catalog connections.
pub type CatalogError = Box<dyn std::error::Error + Send + Sync>;

/// One catalog result row: column name to nullable text value, in select order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogRow {
    values: IndexMap<String, Option<String>>,
}

impl CatalogRow {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, mostly for tests.
    pub fn with(mut self, name: impl Into<String>, value: Option<&str>) -> Self {
        self.insert(name, value.map(str::to_string));
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Option<String>) {
        self.values.insert(name.into(), value);
    }

    /// The value of a column; `None` for SQL NULL and for unknown columns.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(|v| v.as_deref())
    }

    /// The value of the first column.
    pub fn first(&self) -> Option<&str> {
        self.values.first().and_then(|(_, v)| v.as_deref())
    }
}

impl<K: Into<String>> FromIterator<(K, Option<String>)> for CatalogRow {
    fn from_iter<I: IntoIterator<Item = (K, Option<String>)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        }
    }
}

/// Something that can run catalog queries.
///
/// Parameters are bound positionally, with the placeholder syntax of the
/// engine (`?` for MySQL, `$1` for Postgres).
pub trait CatalogConnection {
    fn query(
        &mut self,
        sql: &str,
        params: &[&str],
    ) -> std::result::Result<Vec<CatalogRow>, CatalogError>;
}

impl<C: CatalogConnection + ?Sized> CatalogConnection for &mut C {
    fn query(
        &mut self,
        sql: &str,
        params: &[&str],
    ) -> std::result::Result<Vec<CatalogRow>, CatalogError> {
        (**self).query(sql, params)
    }
}

/// Reads the schema of a live database.
pub trait Introspector {
    /// Every table except the migrations bookkeeping table.
    fn introspect(&mut self) -> Result<Schema>;

    /// A single table, or `None` when it has no columns (or does not exist).
    fn introspect_table(&mut self, name: &str) -> Result<Option<Table>>;
}

/// Run a catalog query, attaching the SQL to any failure.
pub(crate) fn fetch<C: CatalogConnection + ?Sized>(
    conn: &mut C,
    sql: &str,
    params: &[&str],
) -> Result<Vec<CatalogRow>> {
    conn.query(sql, params).map_err(|source| Error::Catalog {
        sql: sql.to_string(),
        source,
    })
}

/// A catalog row lacked a column the introspector needs.
pub(crate) fn missing(sql: &str, column: &str) -> Error {
    Error::Catalog {
        sql: sql.to_string(),
        source: format!("catalog row has no '{column}' value").into(),
    }
}

/// A native type as printed by a catalog: `BASE(arg, ..) suffix`.
///
/// ```
/// use tabula::introspect::NativeType;
///
/// let t = NativeType::parse("timestamp(3) with time zone");
/// assert_eq!(t.base, "TIMESTAMP");
/// assert_eq!(t.args, vec!["3"]);
/// assert_eq!(t.suffix, "WITH TIME ZONE");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeType {
    /// Upper-cased type name.
    pub base: String,
    /// Parenthesized arguments, unquoted (enum labels keep their case).
    pub args: Vec<String>,
    /// Upper-cased trailing modifiers such as `UNSIGNED`.
    pub suffix: String,
}

impl NativeType {
    pub fn parse(raw: &str) -> Self {
        let raw = raw.trim();
        let Some(open) = raw.find('(') else {
            return Self {
                base: normalize_words(raw),
                args: Vec::new(),
                suffix: String::new(),
            };
        };

        // Find the closing parenthesis, ignoring any inside quoted labels.
        let mut quote = None;
        let mut close = None;
        for (i, c) in raw[open + 1..].char_indices() {
            match quote {
                Some(q) if c == q => quote = None,
                Some(_) => {}
                None if c == '\'' || c == '"' => quote = Some(c),
                None if c == ')' => {
                    close = Some(open + 1 + i);
                    break;
                }
                None => {}
            }
        }
        let close = close.unwrap_or(raw.len());

        let inner = &raw[open + 1..close];
        let rest = raw.get(close + 1..).unwrap_or("");
        Self {
            base: normalize_words(&raw[..open]),
            args: tabula_sql::split_list(inner),
            suffix: normalize_words(rest),
        }
    }

    /// Base and suffix together, e.g. `TIMESTAMP WITH TIME ZONE`.
    pub fn full_name(&self) -> String {
        if self.suffix.is_empty() {
            self.base.clone()
        } else {
            format!("{} {}", self.base, self.suffix)
        }
    }

    /// Arguments parsed as numbers; `None` if any is not one.
    pub fn numeric_args(&self) -> Option<Vec<u32>> {
        self.args.iter().map(|a| a.parse().ok()).collect()
    }
}

fn normalize_words(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

/// Length, precision and scale as read from native type arguments.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TypeArgs {
    pub length: Option<u32>,
    pub precision: Option<u32>,
    pub scale: Option<u32>,
}

impl TypeArgs {
    /// Two numeric arguments are precision and scale. A single one is a
    /// length for variable-length strings and binaries, a precision for
    /// decimals and temporal types, and display width noise otherwise.
    pub fn read(native: &NativeType, column_type: ColumnType) -> Self {
        let Some(args) = native.numeric_args() else {
            return Self::default();
        };
        match (args.as_slice(), column_type) {
            ([p, s], _) => Self {
                precision: Some(*p),
                scale: Some(*s),
                ..Self::default()
            },
            ([n], ColumnType::String | ColumnType::Binary) => Self {
                length: Some(*n),
                ..Self::default()
            },
            (
                [p],
                ColumnType::Decimal
                | ColumnType::DateTime
                | ColumnType::DateTimeTz
                | ColumnType::Time,
            ) => Self {
                precision: Some(*p),
                ..Self::default()
            },
            _ => Self::default(),
        }
    }
}

/// Delete rule from a catalog. Engine defaults read as `None`, so they
/// compare equal to foreign keys declared without an action.
pub(crate) fn delete_rule(raw: Option<&str>) -> Option<ReferentialAction> {
    let raw = raw?;
    match raw.parse::<ReferentialAction>() {
        Ok(ReferentialAction::NoAction | ReferentialAction::Restrict) => None,
        Ok(action) => Some(action),
        Err(error) => {
            tracing::warn!(%error, "ignoring unknown delete rule");
            None
        }
    }
}

pub(crate) fn is_numeric(s: &str) -> bool {
    let digits = s.strip_prefix(['-', '+']).unwrap_or(s);
    !digits.is_empty()
        && digits.chars().any(|c| c.is_ascii_digit())
        && digits.chars().all(|c| c.is_ascii_digit() || c == '.')
        && digits.matches('.').count() <= 1
}

/// Align a literal default with the column it belongs to: numbers on numeric
/// columns, booleans on boolean columns.
pub(crate) fn coerce_default(default: DefaultValue, column_type: ColumnType) -> DefaultValue {
    let numeric = column_type.is_integer()
        || matches!(
            column_type,
            ColumnType::Decimal | ColumnType::SmallFloat | ColumnType::Float
        );
    match default {
        DefaultValue::Text(s) | DefaultValue::Number(s)
            if column_type == ColumnType::Boolean && matches!(s.as_str(), "0" | "1") =>
        {
            DefaultValue::Bool(s == "1")
        }
        DefaultValue::Text(s) if numeric && is_numeric(&s) => DefaultValue::Number(s),
        other => other,
    }
}
