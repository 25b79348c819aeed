//! DDL grammars.
//!
//! A [`Grammar`] turns schema model values into statements for one database
//! engine. Everything engines agree on (column definitions, constraint
//! clauses, the CREATE TABLE layout) lives in [`Fragments`]; a dialect
//! supplies identifier quoting, native type names, its auto-increment token
//! and the ALTER syntax that differs between engines.
//!
//! ```
//! use tabula::{Column, ColumnType, Grammar, MySqlGrammar, Table};
//!
//! let mut users = Table::new("users");
//! users
//!     .set_columns(vec![
//!         Column::typed("id", ColumnType::Integer)
//!             .primary_key(true)
//!             .auto_increment(true),
//!     ])
//!     .unwrap();
//!
//! let sql = MySqlGrammar.create_table(&users);
//! assert!(sql.starts_with("CREATE TABLE `users` ("));
//! ```

use tabula_db_schema::{Column, ColumnType, ForeignKey, Table};
use tabula_sql::comma_list;

mod mysql;
mod postgres;

pub use mysql::MySqlGrammar;
pub use postgres::PostgresGrammar;

/// Length used for variable-length types declared without one.
pub const DEFAULT_LENGTH: u32 = 255;

/// Precision and scale used for decimals declared without them.
pub const DEFAULT_PRECISION: u32 = 10;
pub const DEFAULT_SCALE: u32 = 0;

/// Compiles schema values into DDL for one engine.
///
/// Every `compile_*` operation is pure and returns a single `;`-terminated
/// statement, except [`Grammar::compile_foreign_key`] which returns the bare
/// constraint clause.
pub trait Grammar: Send + Sync {
    /// Dialect name, for logs.
    fn name(&self) -> &'static str;

    /// Quote a table or column name.
    fn wrap(&self, identifier: &str) -> String;

    /// Native type of a column, including length/precision suffixes.
    fn type_name(&self, column: &Column) -> String;

    /// Keyword(s) making the database generate column values.
    fn auto_increment_keyword(&self) -> &'static str;

    fn compile_create_table(
        &self,
        table: &str,
        columns: &[Column],
        foreign_keys: &[ForeignKey],
    ) -> String {
        Fragments::new(self).create_table(table, columns, foreign_keys)
    }

    fn compile_drop_table(&self, table: &str) -> String {
        format!("DROP TABLE IF EXISTS {};", self.wrap(table))
    }

    fn compile_add_column(&self, table: &str, column: &Column) -> String {
        format!(
            "ALTER TABLE {} ADD COLUMN {};",
            self.wrap(table),
            Fragments::new(self).column(column, KeyPlacement::Inline)
        )
    }

    fn compile_drop_column(&self, table: &str, column: &str) -> String {
        format!(
            "ALTER TABLE {} DROP COLUMN {};",
            self.wrap(table),
            self.wrap(column)
        )
    }

    /// Turn column `old` into column `new`. Empty when they are equal.
    fn compile_modify_column(&self, table: &str, old: &Column, new: &Column) -> String;

    /// The `CONSTRAINT .. FOREIGN KEY .. REFERENCES ..` clause.
    fn compile_foreign_key(&self, fk: &ForeignKey) -> String {
        Fragments::new(self).foreign_key(fk)
    }

    fn compile_add_foreign_key(&self, table: &str, fk: &ForeignKey) -> String {
        format!(
            "ALTER TABLE {} ADD {};",
            self.wrap(table),
            self.compile_foreign_key(fk)
        )
    }

    fn compile_drop_foreign_key(&self, table: &str, fk: &ForeignKey) -> String;

    /// CREATE TABLE for a model table, foreign keys inline.
    fn create_table(&self, table: &Table) -> String {
        self.compile_create_table(&table.name, &table.columns, &table.foreign_keys)
    }
}

/// How primary key and unique constraints are rendered for one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPlacement {
    /// Inline `UNIQUE` / `PRIMARY KEY`, auto-increment allowed.
    Inline,
    /// Part of a table with a composite key declared as a table clause.
    Composite,
    /// Restating an existing column: no key constraints at all.
    Omit,
}

/// SQL fragments shared by every grammar.
pub struct Fragments<'g, G: Grammar + ?Sized> {
    grammar: &'g G,
}

impl<'g, G: Grammar + ?Sized> Fragments<'g, G> {
    pub fn new(grammar: &'g G) -> Self {
        Self { grammar }
    }

    /// `<name> <type> NULL|NOT NULL [DEFAULT ..] [UNIQUE] [auto] [PRIMARY KEY]`
    pub fn column(&self, column: &Column, keys: KeyPlacement) -> String {
        let g = self.grammar;
        let mut def = format!("{} {}", g.wrap(&column.name), g.type_name(column));

        // Primary key columns are never nullable.
        if column.nullable && !column.primary_key {
            def.push_str(" NULL");
        } else {
            def.push_str(" NOT NULL");
        }

        if let Some(default) = &column.default {
            def.push_str(" DEFAULT ");
            def.push_str(&default.to_sql());
        }

        if keys != KeyPlacement::Omit && column.unique && !column.primary_key {
            def.push_str(" UNIQUE");
        }

        if keys != KeyPlacement::Composite && column.wants_auto_increment() {
            def.push(' ');
            def.push_str(g.auto_increment_keyword());
        }

        if keys == KeyPlacement::Inline && column.primary_key {
            def.push_str(" PRIMARY KEY");
        }

        def
    }

    pub fn foreign_key(&self, fk: &ForeignKey) -> String {
        let g = self.grammar;
        let mut clause = format!(
            "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
            g.wrap(&fk.name),
            g.wrap(&fk.column),
            g.wrap(&fk.references_table),
            g.wrap(&fk.references_column)
        );
        if let Some(action) = fk.on_delete {
            clause.push_str(" ON DELETE ");
            clause.push_str(action.to_sql());
        }
        clause
    }

    pub fn create_table(
        &self,
        table: &str,
        columns: &[Column],
        foreign_keys: &[ForeignKey],
    ) -> String {
        let g = self.grammar;

        let pk_columns: Vec<&Column> = columns.iter().filter(|c| c.primary_key).collect();
        let composite = pk_columns.len() > 1;
        let keys = if composite {
            KeyPlacement::Composite
        } else {
            KeyPlacement::Inline
        };

        let mut parts: Vec<String> = columns
            .iter()
            .map(|c| format!("    {}", self.column(c, keys)))
            .collect();

        if composite {
            parts.push(format!(
                "    PRIMARY KEY ({})",
                comma_list(pk_columns.iter().map(|c| g.wrap(&c.name)))
            ));
        }

        for fk in foreign_keys {
            parts.push(format!("    {}", self.foreign_key(fk)));
        }

        format!("CREATE TABLE {} (\n{}\n);", g.wrap(table), parts.join(",\n"))
    }
}

/// Type names most engines agree on. Dialects override what they spell
/// differently and defer the rest here.
pub fn default_type_name(column: &Column) -> String {
    let length = column.length.unwrap_or(DEFAULT_LENGTH);
    match column.column_type {
        ColumnType::SmallInt => "SMALLINT".to_string(),
        ColumnType::Integer => "INTEGER".to_string(),
        ColumnType::BigInt => "BIGINT".to_string(),
        ColumnType::Decimal => format!(
            "DECIMAL({},{})",
            column.precision.unwrap_or(DEFAULT_PRECISION),
            column.scale.unwrap_or(DEFAULT_SCALE)
        ),
        ColumnType::SmallFloat => "REAL".to_string(),
        ColumnType::Float => "DOUBLE PRECISION".to_string(),
        ColumnType::String => format!("VARCHAR({length})"),
        ColumnType::Text => "TEXT".to_string(),
        ColumnType::Uuid => "CHAR(36)".to_string(),
        ColumnType::Binary => format!("VARBINARY({length})"),
        ColumnType::Blob => "BLOB".to_string(),
        ColumnType::Boolean => "BOOLEAN".to_string(),
        ColumnType::Date => "DATE".to_string(),
        ColumnType::DateTime => with_precision("DATETIME", column),
        ColumnType::DateTimeTz => with_precision("TIMESTAMP", column),
        ColumnType::Time => with_precision("TIME", column),
        ColumnType::Array => "TEXT".to_string(),
        ColumnType::Json => "JSON".to_string(),
        ColumnType::Enum => format!("VARCHAR({length})"),
    }
}

/// Fractional seconds suffix for temporal types.
pub(crate) fn with_precision(base: &str, column: &Column) -> String {
    match column.precision {
        Some(p) => format!("{base}({p})"),
        None => base.to_string(),
    }
}
