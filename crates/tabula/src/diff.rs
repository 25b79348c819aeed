//! Schema diffing: compare the declared schema against an introspected one.
//!
//! [`diff`] compares two [`Schema`] values and lists, table by table, the
//! changes that turn the current schema into the desired one. The result
//! can be printed for review or rendered as DDL through any [`Grammar`]:
//!
//! ```text
//! posts:
//!   + views: bigint
//!   ~ title: string(255) -> string(500) (nullable)
//!   + FOREIGN KEY (author_id) -> users.id
//! tags:
//!   + table tags
//! ```
//!
//! Columns are compared after filling in the lengths and precisions the
//! grammars would use anyway, so a `string` declared without a length
//! matches a `VARCHAR(255)` read back from the database. Foreign keys are
//! compared without their constraint names.

use std::collections::HashSet;
use std::fmt;

use tabula_db_schema::{Column, ColumnType, ForeignKey, Schema, Table};

use crate::grammar::{DEFAULT_LENGTH, DEFAULT_PRECISION, DEFAULT_SCALE, Grammar};

/// A diff between two schemas.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaDiff {
    /// Changes organized by table.
    pub table_diffs: Vec<TableDiff>,
}

impl SchemaDiff {
    /// Returns true if there are no differences.
    pub fn is_empty(&self) -> bool {
        self.table_diffs.is_empty()
    }

    /// Count total number of changes.
    pub fn change_count(&self) -> usize {
        self.table_diffs.iter().map(|t| t.changes.len()).sum()
    }

    /// Render every change as DDL, one statement per line.
    pub fn to_sql(&self, grammar: &dyn Grammar) -> String {
        let mut sql = String::new();
        for table_diff in &self.table_diffs {
            sql.push_str(&format!("-- Table: {}\n", table_diff.table));
            for change in &table_diff.changes {
                let statement = change.to_sql(grammar, &table_diff.table);
                if !statement.is_empty() {
                    sql.push_str(&statement);
                    sql.push('\n');
                }
            }
            sql.push('\n');
        }
        sql
    }
}

/// Changes for a single table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDiff {
    /// Table name.
    pub table: String,
    /// List of changes.
    pub changes: Vec<Change>,
}

/// A single schema change.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// Add a new table.
    AddTable(Table),
    /// Drop an existing table.
    DropTable(String),
    /// Add a new column.
    AddColumn(Column),
    /// Drop an existing column.
    DropColumn(String),
    /// Change a column's definition.
    ModifyColumn { from: Column, to: Column },
    /// Add a foreign key.
    AddForeignKey(ForeignKey),
    /// Drop a foreign key.
    DropForeignKey(ForeignKey),
}

impl Change {
    /// DDL for this change. `table` is the table the change belongs to.
    pub fn to_sql(&self, grammar: &dyn Grammar, table: &str) -> String {
        match self {
            Change::AddTable(t) => grammar.create_table(t),
            Change::DropTable(name) => grammar.compile_drop_table(name),
            Change::AddColumn(col) => grammar.compile_add_column(table, col),
            Change::DropColumn(name) => grammar.compile_drop_column(table, name),
            Change::ModifyColumn { from, to } => grammar.compile_modify_column(table, from, to),
            Change::AddForeignKey(fk) => grammar.compile_add_foreign_key(table, fk),
            Change::DropForeignKey(fk) => grammar.compile_drop_foreign_key(table, fk),
        }
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Change::AddTable(t) => write!(f, "+ table {}", t.name),
            Change::DropTable(name) => write!(f, "- table {}", name),
            Change::AddColumn(col) => write!(f, "+ {}: {}", col.name, describe(col)),
            Change::DropColumn(name) => write!(f, "- {}", name),
            Change::ModifyColumn { from, to } => {
                write!(f, "~ {}: {} -> {}", to.name, describe(from), describe(to))
            }
            Change::AddForeignKey(fk) => write!(
                f,
                "+ FOREIGN KEY ({}) -> {}.{}",
                fk.column, fk.references_table, fk.references_column
            ),
            Change::DropForeignKey(fk) => write!(
                f,
                "- FOREIGN KEY ({}) -> {}.{}",
                fk.column, fk.references_table, fk.references_column
            ),
        }
    }
}

/// Short column description: `string(255) (nullable)`.
fn describe(col: &Column) -> String {
    let mut s = col.column_type.to_string();
    if let Some(length) = col.length {
        s.push_str(&format!("({length})"));
    } else if let Some(precision) = col.precision {
        match col.scale {
            Some(scale) => s.push_str(&format!("({precision},{scale})")),
            None => s.push_str(&format!("({precision})")),
        }
    }
    if col.nullable {
        s.push_str(" (nullable)");
    }
    s
}

impl fmt::Display for SchemaDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            writeln!(f, "No changes detected.")?;
        } else {
            for table_diff in &self.table_diffs {
                writeln!(f, "{}:", table_diff.table)?;
                for change in &table_diff.changes {
                    writeln!(f, "  {}", change)?;
                }
            }
        }
        Ok(())
    }
}

/// Changes turning `current` into `desired`.
///
/// Tables to add come first, in desired order, then tables to drop, then
/// changes to tables present on both sides.
pub fn diff(desired: &Schema, current: &Schema) -> SchemaDiff {
    let mut table_diffs = Vec::new();

    for table in desired.iter_tables() {
        if current.get_table(&table.name).is_none() {
            table_diffs.push(TableDiff {
                table: table.name.clone(),
                changes: vec![Change::AddTable(table.clone())],
            });
        }
    }

    for table in current.iter_tables() {
        if desired.get_table(&table.name).is_none() {
            table_diffs.push(TableDiff {
                table: table.name.clone(),
                changes: vec![Change::DropTable(table.name.clone())],
            });
        }
    }

    for desired_table in desired.iter_tables() {
        if let Some(current_table) = current.get_table(&desired_table.name) {
            let changes = diff_table(desired_table, current_table);
            if !changes.is_empty() {
                table_diffs.push(TableDiff {
                    table: desired_table.name.clone(),
                    changes,
                });
            }
        }
    }

    SchemaDiff { table_diffs }
}

/// Method form of [`diff`]: `desired.diff(&current)`.
pub trait SchemaDiffExt {
    fn diff(&self, current: &Schema) -> SchemaDiff;
}

impl SchemaDiffExt for Schema {
    fn diff(&self, current: &Schema) -> SchemaDiff {
        diff(self, current)
    }
}

fn diff_table(desired: &Table, current: &Table) -> Vec<Change> {
    let mut changes = diff_columns(&desired.columns, &current.columns);
    changes.extend(diff_foreign_keys(
        &desired.foreign_keys,
        &current.foreign_keys,
    ));
    changes
}

/// Diff columns between desired and current state.
fn diff_columns(desired: &[Column], current: &[Column]) -> Vec<Change> {
    let mut changes = Vec::new();

    let desired_names: HashSet<&str> = desired.iter().map(|c| c.name.as_str()).collect();
    let current_names: HashSet<&str> = current.iter().map(|c| c.name.as_str()).collect();

    for col in desired {
        if !current_names.contains(col.name.as_str()) {
            changes.push(Change::AddColumn(col.clone()));
        }
    }

    for col in current {
        if !desired_names.contains(col.name.as_str()) {
            changes.push(Change::DropColumn(col.name.clone()));
        }
    }

    for desired_col in desired {
        if let Some(current_col) = current.iter().find(|c| c.name == desired_col.name)
            && effective(desired_col) != effective(current_col)
        {
            changes.push(Change::ModifyColumn {
                from: current_col.clone(),
                to: desired_col.clone(),
            });
        }
    }

    changes
}

/// A column with the implicit parts of its definition spelled out.
fn effective(col: &Column) -> Column {
    let mut col = col.clone();
    match col.column_type {
        ColumnType::String | ColumnType::Binary => {
            col.length.get_or_insert(DEFAULT_LENGTH);
        }
        ColumnType::Decimal => {
            col.precision.get_or_insert(DEFAULT_PRECISION);
            col.scale.get_or_insert(DEFAULT_SCALE);
        }
        _ => {}
    }
    if col.primary_key {
        col.nullable = false;
    }
    col.auto_increment = col.wants_auto_increment();
    col
}

/// Diff foreign keys, ignoring constraint names.
fn diff_foreign_keys(desired: &[ForeignKey], current: &[ForeignKey]) -> Vec<Change> {
    let mut changes = Vec::new();

    for fk in desired {
        if !current.iter().any(|c| c.same_target(fk)) {
            changes.push(Change::AddForeignKey(fk.clone()));
        }
    }

    for fk in current {
        if !desired.iter().any(|d| d.same_target(fk)) {
            changes.push(Change::DropForeignKey(fk.clone()));
        }
    }

    changes
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::{MySqlGrammar, PostgresGrammar};
    use tabula_db_schema::ReferentialAction;

    fn table(name: &str, columns: Vec<Column>) -> Table {
        let mut table = Table::new(name);
        table.set_columns(columns).unwrap();
        table
    }

    fn id() -> Column {
        Column::typed("id", ColumnType::Integer)
            .primary_key(true)
            .auto_increment(true)
    }

    #[test]
    fn test_diff_empty_schemas() {
        let diff = diff(&Schema::new(), &Schema::new());
        assert!(diff.is_empty());
        assert_eq!(diff.to_string(), "No changes detected.\n");
    }

    #[test]
    fn test_add_and_drop_tables() {
        let desired = Schema::from_iter([table("users", vec![id()])]);
        let current = Schema::from_iter([table("legacy", vec![id()])]);
        let diff = diff(&desired, &current);
        assert_eq!(diff.change_count(), 2);
        assert!(matches!(
            &diff.table_diffs[0].changes[0],
            Change::AddTable(t) if t.name == "users"
        ));
        assert_eq!(
            diff.table_diffs[1].changes,
            vec![Change::DropTable("legacy".into())]
        );
    }

    #[test]
    fn test_implicit_lengths_match() {
        let declared = table("posts", vec![id(), Column::typed("title", ColumnType::String)]);
        let introspected = table(
            "posts",
            vec![id(), Column::typed("title", ColumnType::String).length(255)],
        );
        let diff = diff(
            &Schema::from_iter([declared]),
            &Schema::from_iter([introspected]),
        );
        assert!(diff.is_empty(), "{diff}");
    }

    #[test]
    fn test_column_changes() {
        let desired = table(
            "posts",
            vec![
                id(),
                Column::typed("title", ColumnType::String).length(500),
                Column::typed("views", ColumnType::BigInt),
            ],
        );
        let current = table(
            "posts",
            vec![
                id(),
                Column::typed("title", ColumnType::String),
                Column::typed("slug", ColumnType::String),
            ],
        );
        let diff = diff(&Schema::from_iter([desired]), &Schema::from_iter([current]));

        insta::assert_snapshot!(diff.to_string().trim_end(), @r"
        posts:
          + views: bigint
          - slug
          ~ title: string -> string(500)
        ");

        insta::assert_snapshot!(diff.to_sql(&MySqlGrammar).trim_end(), @r"
        -- Table: posts
        ALTER TABLE `posts` ADD COLUMN `views` BIGINT NOT NULL;
        ALTER TABLE `posts` DROP COLUMN `slug`;
        ALTER TABLE `posts` MODIFY COLUMN `title` VARCHAR(500) NOT NULL;
        ");
    }

    #[test]
    fn test_unique_change_renders_sql() {
        let email = || Column::typed("email", ColumnType::String);
        let desired = table("users", vec![id(), email().unique(true)]);
        let current = table("users", vec![id(), email()]);
        let diff = diff(&Schema::from_iter([desired]), &Schema::from_iter([current]));
        assert_eq!(diff.change_count(), 1);

        insta::assert_snapshot!(diff.to_sql(&PostgresGrammar).trim_end(), @r#"
        -- Table: users
        ALTER TABLE "users" ADD CONSTRAINT "users_email_key" UNIQUE ("email");
        "#);
        assert!(diff.to_sql(&MySqlGrammar).contains("ADD UNIQUE (`email`)"));
    }

    #[test]
    fn test_foreign_keys_compare_without_names() {
        let columns = || vec![id(), Column::typed("author_id", ColumnType::Integer).nullable(true)];

        let mut desired = table("posts", columns());
        desired
            .add_foreign_key(
                ForeignKey::new("fk_posts_author_id", "author_id", "users", "id")
                    .on_delete(Some(ReferentialAction::Cascade)),
            )
            .unwrap();

        let mut current = table("posts", columns());
        current
            .add_foreign_key(ForeignKey::new("posts_ibfk_1", "author_id", "users", "id"))
            .unwrap();

        let diff = diff(&Schema::from_iter([desired]), &Schema::from_iter([current]));
        let sql = diff.to_sql(&PostgresGrammar);
        assert!(sql.contains(r#"DROP CONSTRAINT "posts_ibfk_1""#), "{sql}");
        assert!(sql.contains("ON DELETE CASCADE"), "{sql}");
        assert_eq!(diff.change_count(), 2);
    }
}
