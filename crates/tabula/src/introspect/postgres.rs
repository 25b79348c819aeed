use std::collections::HashSet;

use tabula_db_schema::{Column, ColumnType, DefaultValue, ForeignKey, Schema, Table};

use super::{
    CatalogConnection, CatalogRow, Introspector, NativeType, TypeArgs, coerce_default, delete_rule,
    fetch, is_numeric, missing,
};
use crate::Result;
use crate::config::DEFAULT_MIGRATIONS_TABLE;

// Every selected value is cast to text so any driver can hand it over as a
// nullable string, and table names are compared as text for the same reason.

const TABLES_SQL: &str = "SELECT table_name::text AS table_name \
     FROM information_schema.tables \
     WHERE table_schema = current_schema() AND table_type = 'BASE TABLE' \
     ORDER BY table_name";

const COLUMNS_SQL: &str = "SELECT a.attname::text AS name, \
     format_type(a.atttypid, a.atttypmod)::text AS type, \
     (NOT a.attnotnull)::text AS nullable, \
     pg_get_expr(d.adbin, d.adrelid)::text AS column_default, \
     (a.attidentity <> '')::text AS is_identity \
     FROM pg_attribute a \
     JOIN pg_class c ON c.oid = a.attrelid \
     JOIN pg_namespace n ON n.oid = c.relnamespace \
     LEFT JOIN pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum \
     WHERE n.nspname = current_schema() AND c.relname::text = $1 \
     AND a.attnum > 0 AND NOT a.attisdropped \
     ORDER BY a.attnum";

const KEYS_SQL: &str = "SELECT con.contype::text AS kind, a.attname::text AS column_name, \
     array_length(con.conkey, 1)::text AS width \
     FROM pg_constraint con \
     JOIN pg_class c ON c.oid = con.conrelid \
     JOIN pg_namespace n ON n.oid = c.relnamespace \
     JOIN pg_attribute a ON a.attrelid = c.oid AND a.attnum = ANY(con.conkey) \
     WHERE n.nspname = current_schema() AND c.relname::text = $1 \
     AND con.contype IN ('p', 'u')";

const FOREIGN_KEYS_SQL: &str = "SELECT tc.constraint_name::text AS constraint_name, \
     kcu.column_name::text AS column_name, \
     ccu.table_name::text AS referenced_table, \
     ccu.column_name::text AS referenced_column, \
     rc.delete_rule::text AS delete_rule \
     FROM information_schema.table_constraints tc \
     JOIN information_schema.key_column_usage kcu \
     ON kcu.constraint_name = tc.constraint_name AND kcu.constraint_schema = tc.constraint_schema \
     JOIN information_schema.constraint_column_usage ccu \
     ON ccu.constraint_name = tc.constraint_name AND ccu.constraint_schema = tc.constraint_schema \
     JOIN information_schema.referential_constraints rc \
     ON rc.constraint_name = tc.constraint_name AND rc.constraint_schema = tc.constraint_schema \
     WHERE tc.constraint_type = 'FOREIGN KEY' AND tc.table_schema = current_schema() \
     AND tc.table_name::text = $1 \
     ORDER BY tc.constraint_name";

/// Introspects PostgreSQL through `pg_catalog` and `information_schema`,
/// limited to the current schema.
pub struct PostgresIntrospector<C> {
    conn: C,
    migrations_table: String,
}

impl<C: CatalogConnection> PostgresIntrospector<C> {
    pub fn new(conn: C) -> Self {
        Self {
            conn,
            migrations_table: DEFAULT_MIGRATIONS_TABLE.to_string(),
        }
    }

    pub fn with_migrations_table(mut self, name: impl Into<String>) -> Self {
        self.migrations_table = name.into();
        self
    }

    pub fn into_inner(self) -> C {
        self.conn
    }

    /// Primary key columns and single-column unique constraints.
    fn keys(&mut self, table: &str) -> Result<(HashSet<String>, HashSet<String>)> {
        let mut primary = HashSet::new();
        let mut unique = HashSet::new();
        for row in fetch(&mut self.conn, KEYS_SQL, &[table])? {
            let column = row
                .get("column_name")
                .ok_or_else(|| missing(KEYS_SQL, "column_name"))?
                .to_string();
            match row.get("kind") {
                Some("p") => {
                    primary.insert(column);
                }
                Some("u") if row.get("width") == Some("1") => {
                    unique.insert(column);
                }
                _ => {}
            }
        }
        Ok((primary, unique))
    }

    fn foreign_keys(&mut self, table: &str) -> Result<Vec<ForeignKey>> {
        let rows = fetch(&mut self.conn, FOREIGN_KEYS_SQL, &[table])?;
        rows.iter()
            .map(|row| {
                let get = |name: &str| row.get(name).ok_or_else(|| missing(FOREIGN_KEYS_SQL, name));
                Ok(ForeignKey::new(
                    get("constraint_name")?,
                    get("column_name")?,
                    get("referenced_table")?,
                    get("referenced_column")?,
                )
                .on_delete(delete_rule(row.get("delete_rule"))))
            })
            .collect()
    }
}

impl<C: CatalogConnection> Introspector for PostgresIntrospector<C> {
    fn introspect(&mut self) -> Result<Schema> {
        let names: Vec<String> = fetch(&mut self.conn, TABLES_SQL, &[])?
            .iter()
            .filter_map(|row| row.get("table_name"))
            .map(str::to_string)
            .collect();

        let mut schema = Schema::new();
        for name in names {
            if name == self.migrations_table {
                continue;
            }
            match self.introspect_table(&name)? {
                Some(table) => schema.insert_table(table)?,
                None => tracing::debug!(table = %name, "skipping table without columns"),
            }
        }
        Ok(schema)
    }

    fn introspect_table(&mut self, name: &str) -> Result<Option<Table>> {
        let rows = fetch(&mut self.conn, COLUMNS_SQL, &[name])?;
        if rows.is_empty() {
            return Ok(None);
        }

        let (primary, unique) = self.keys(name)?;
        let columns = rows
            .iter()
            .map(|row| map_column(row, &primary, &unique))
            .collect::<Result<Vec<_>>>()?;

        let mut table = Table::new(name);
        table.set_columns(columns)?;
        for fk in self.foreign_keys(name)? {
            table.add_foreign_key(fk)?;
        }
        Ok(Some(table))
    }
}

fn map_column(
    row: &CatalogRow,
    primary: &HashSet<String>,
    unique: &HashSet<String>,
) -> Result<Column> {
    let name = row.get("name").ok_or_else(|| missing(COLUMNS_SQL, "name"))?;
    let native = NativeType::parse(row.get("type").ok_or_else(|| missing(COLUMNS_SQL, "type"))?);
    let column_type = column_type(&native);
    let args = TypeArgs::read(&native, column_type);

    let raw_default = row.get("column_default");
    let sequence = raw_default.is_some_and(|d| d.trim_start().starts_with("nextval("));
    let identity = row.get("is_identity") == Some("true");

    let mut column = Column::typed(name, column_type)
        .nullable(row.get("nullable") == Some("true"))
        .primary_key(primary.contains(name))
        .unique(unique.contains(name))
        .auto_increment(identity || sequence);
    column.length = args.length;
    column.precision = args.precision;
    column.scale = args.scale;
    if !sequence {
        column.default = raw_default
            .map(normalize_default)
            .map(|d| coerce_default(d, column_type));
    }
    Ok(column)
}

/// Logical type of a `format_type` name. Unknown types read as strings.
fn column_type(native: &NativeType) -> ColumnType {
    let name = native.full_name();
    if name.ends_with("[]") {
        return ColumnType::Array;
    }
    match name.as_str() {
        "SMALLINT" | "INT2" => ColumnType::SmallInt,
        "INTEGER" | "INT" | "INT4" => ColumnType::Integer,
        "BIGINT" | "INT8" => ColumnType::BigInt,
        "NUMERIC" | "DECIMAL" => ColumnType::Decimal,
        "REAL" | "FLOAT4" => ColumnType::SmallFloat,
        "DOUBLE PRECISION" | "FLOAT8" => ColumnType::Float,
        "CHARACTER VARYING" | "VARCHAR" | "CHARACTER" | "CHAR" => ColumnType::String,
        "TEXT" => ColumnType::Text,
        "UUID" => ColumnType::Uuid,
        "BYTEA" => ColumnType::Blob,
        "BOOLEAN" | "BOOL" => ColumnType::Boolean,
        "DATE" => ColumnType::Date,
        "TIMESTAMP" | "TIMESTAMP WITHOUT TIME ZONE" => ColumnType::DateTime,
        "TIMESTAMPTZ" | "TIMESTAMP WITH TIME ZONE" => ColumnType::DateTimeTz,
        "TIME" | "TIME WITHOUT TIME ZONE" | "TIME WITH TIME ZONE" | "TIMETZ" => ColumnType::Time,
        "JSON" | "JSONB" => ColumnType::Json,
        _ => ColumnType::String,
    }
}

/// Postgres prints defaults as SQL expressions: `'draft'::character varying`,
/// `0`, `true`, `now()`, `NULL::text`.
fn normalize_default(raw: &str) -> DefaultValue {
    let raw = raw.trim();

    if let Some(rest) = raw.strip_prefix('\'') {
        // Quoted literal, possibly followed by a cast.
        let mut value = String::new();
        let mut chars = rest.chars().peekable();
        while let Some(c) = chars.next() {
            if c == '\'' {
                if chars.peek() == Some(&'\'') {
                    value.push('\'');
                    chars.next();
                } else {
                    return DefaultValue::Text(value);
                }
            } else {
                value.push(c);
            }
        }
        return DefaultValue::Expression(raw.to_string());
    }

    let uncast = raw.split("::").next().unwrap_or(raw).trim();
    let uncast = uncast
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .unwrap_or(uncast);
    match uncast.to_lowercase().as_str() {
        "null" => DefaultValue::Null,
        "true" => DefaultValue::Bool(true),
        "false" => DefaultValue::Bool(false),
        _ if is_numeric(uncast) => DefaultValue::Number(uncast.to_string()),
        _ => DefaultValue::Expression(raw.to_string()),
    }
}
