use tabula_db_schema::{Column, ColumnType, DefaultValue, ForeignKey, Schema, Table};

use super::{
    CatalogConnection, CatalogRow, Introspector, NativeType, TypeArgs, coerce_default, delete_rule,
    fetch, is_numeric, missing,
};
use crate::Result;
use crate::config::DEFAULT_MIGRATIONS_TABLE;
use crate::grammar::{Grammar, MySqlGrammar};

const TABLES_SQL: &str = "SHOW TABLES";

const FOREIGN_KEYS_SQL: &str = "SELECT k.CONSTRAINT_NAME, k.COLUMN_NAME, k.REFERENCED_TABLE_NAME, \
     k.REFERENCED_COLUMN_NAME, r.DELETE_RULE \
     FROM information_schema.KEY_COLUMN_USAGE k \
     JOIN information_schema.REFERENTIAL_CONSTRAINTS r \
     ON r.CONSTRAINT_SCHEMA = k.CONSTRAINT_SCHEMA AND r.CONSTRAINT_NAME = k.CONSTRAINT_NAME \
     WHERE k.TABLE_NAME = ? AND k.TABLE_SCHEMA = DATABASE() \
     AND k.REFERENCED_TABLE_NAME IS NOT NULL \
     ORDER BY k.CONSTRAINT_NAME, k.ORDINAL_POSITION";

/// Introspects MySQL / MariaDB through `SHOW` statements and `information_schema`.
pub struct MySqlIntrospector<C> {
    conn: C,
    migrations_table: String,
}

impl<C: CatalogConnection> MySqlIntrospector<C> {
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

    fn foreign_keys(&mut self, table: &str) -> Result<Vec<ForeignKey>> {
        let rows = fetch(&mut self.conn, FOREIGN_KEYS_SQL, &[table])?;
        rows.iter()
            .map(|row| {
                let get = |name: &str| row.get(name).ok_or_else(|| missing(FOREIGN_KEYS_SQL, name));
                Ok(ForeignKey::new(
                    get("CONSTRAINT_NAME")?,
                    get("COLUMN_NAME")?,
                    get("REFERENCED_TABLE_NAME")?,
                    get("REFERENCED_COLUMN_NAME")?,
                )
                .on_delete(delete_rule(row.get("DELETE_RULE"))))
            })
            .collect()
    }
}

impl<C: CatalogConnection> Introspector for MySqlIntrospector<C> {
    fn introspect(&mut self) -> Result<Schema> {
        let names: Vec<String> = fetch(&mut self.conn, TABLES_SQL, &[])?
            .iter()
            .filter_map(CatalogRow::first)
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
        let sql = format!("SHOW FULL COLUMNS FROM {}", MySqlGrammar.wrap(name));
        let rows = fetch(&mut self.conn, &sql, &[])?;
        if rows.is_empty() {
            return Ok(None);
        }

        let columns = rows
            .iter()
            .map(|row| map_column(row, &sql))
            .collect::<Result<Vec<_>>>()?;

        let mut table = Table::new(name);
        table.set_columns(columns)?;
        for fk in self.foreign_keys(name)? {
            table.add_foreign_key(fk)?;
        }
        Ok(Some(table))
    }
}

fn map_column(row: &CatalogRow, sql: &str) -> Result<Column> {
    let name = row.get("Field").ok_or_else(|| missing(sql, "Field"))?;
    let native = NativeType::parse(row.get("Type").ok_or_else(|| missing(sql, "Type"))?);
    let column_type = column_type(&native);
    let args = TypeArgs::read(&native, column_type);
    let key = row.get("Key").unwrap_or("");
    let extra = row.get("Extra").unwrap_or("").to_lowercase();

    let mut column = Column::typed(name, column_type)
        .nullable(row.get("Null") == Some("YES"))
        .primary_key(key == "PRI")
        .unique(key == "UNI")
        .auto_increment(extra.contains("auto_increment"));
    column.length = args.length;
    column.precision = args.precision;
    column.scale = args.scale;
    if column_type == ColumnType::Enum {
        column.enum_options = native.args.clone();
    }
    column.default = row
        .get("Default")
        .map(|raw| normalize_default(raw, extra.contains("default_generated")))
        .map(|d| coerce_default(d, column_type));
    Ok(column)
}

/// Logical type of a MySQL native type. Unknown types read as strings.
fn column_type(native: &NativeType) -> ColumnType {
    match native.base.as_str() {
        "SMALLINT" => ColumnType::SmallInt,
        "INT" | "INTEGER" | "MEDIUMINT" => ColumnType::Integer,
        "BIGINT" => ColumnType::BigInt,
        "DECIMAL" | "NUMERIC" => ColumnType::Decimal,
        "FLOAT" => ColumnType::SmallFloat,
        "DOUBLE" | "REAL" => ColumnType::Float,
        "VARCHAR" => ColumnType::String,
        "TEXT" | "MEDIUMTEXT" | "TINYTEXT" => ColumnType::Text,
        "CHAR" => ColumnType::Uuid,
        "VARBINARY" | "BINARY" => ColumnType::Binary,
        "BLOB" | "MEDIUMBLOB" | "LONGBLOB" | "TINYBLOB" => ColumnType::Blob,
        "TINYINT" | "BOOL" | "BOOLEAN" => ColumnType::Boolean,
        "DATE" => ColumnType::Date,
        "DATETIME" => ColumnType::DateTime,
        "TIMESTAMP" => ColumnType::DateTimeTz,
        "TIME" => ColumnType::Time,
        "LONGTEXT" => ColumnType::Array,
        "JSON" => ColumnType::Json,
        "ENUM" => ColumnType::Enum,
        _ => ColumnType::String,
    }
}

/// `SHOW COLUMNS` prints defaults unquoted: literal text is indistinguishable
/// from an expression except through `DEFAULT_GENERATED` or a known keyword.
fn normalize_default(raw: &str, generated: bool) -> DefaultValue {
    let upper = raw.trim().to_uppercase();
    if upper == "NULL" {
        return DefaultValue::Null;
    }
    let keyword = ["CURRENT_TIMESTAMP", "NOW(", "CURRENT_DATE", "CURRENT_TIME", "LOCALTIMESTAMP"]
        .iter()
        .any(|k| upper.starts_with(k));
    if generated || keyword {
        DefaultValue::Expression(raw.trim().to_string())
    } else if is_numeric(raw.trim()) {
        DefaultValue::Number(raw.trim().to_string())
    } else {
        DefaultValue::Text(raw.to_string())
    }
}
