use tabula_db_schema::{Column, ColumnType, ForeignKey};
use tabula_sql::{Lit, comma_list, quote_ident_with};

use super::{Fragments, Grammar, KeyPlacement, default_type_name};

/// MySQL / MariaDB.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlGrammar;

impl Grammar for MySqlGrammar {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn wrap(&self, identifier: &str) -> String {
        quote_ident_with(identifier, '`')
    }

    fn type_name(&self, column: &Column) -> String {
        match column.column_type {
            ColumnType::Integer => "INT".to_string(),
            ColumnType::SmallFloat => "FLOAT".to_string(),
            ColumnType::Float => "DOUBLE".to_string(),
            ColumnType::Boolean => "TINYINT(1)".to_string(),
            ColumnType::Array => "LONGTEXT".to_string(),
            ColumnType::Enum if !column.enum_options.is_empty() => {
                format!("ENUM({})", comma_list(column.enum_options.iter().map(Lit)))
            }
            ColumnType::SmallInt
            | ColumnType::BigInt
            | ColumnType::Decimal
            | ColumnType::String
            | ColumnType::Text
            | ColumnType::Uuid
            | ColumnType::Binary
            | ColumnType::Blob
            | ColumnType::Date
            | ColumnType::DateTime
            | ColumnType::DateTimeTz
            | ColumnType::Time
            | ColumnType::Json
            | ColumnType::Enum => default_type_name(column),
        }
    }

    fn auto_increment_keyword(&self) -> &'static str {
        "AUTO_INCREMENT"
    }

    fn compile_modify_column(&self, table: &str, old: &Column, new: &Column) -> String {
        if old == new {
            return String::new();
        }
        let table = self.wrap(table);
        let definition = Fragments::new(self).column(new, KeyPlacement::Omit);
        let mut actions = vec![if old.name == new.name {
            format!("MODIFY COLUMN {definition}")
        } else {
            format!("CHANGE COLUMN {} {}", self.wrap(&old.name), definition)
        }];

        // Inline UNIQUE creates an index named after the column.
        match (old.unique, new.unique) {
            (false, true) => actions.push(format!("ADD UNIQUE ({})", self.wrap(&new.name))),
            (true, false) => actions.push(format!("DROP INDEX {}", self.wrap(&old.name))),
            _ => {}
        }

        let mut sql = format!("ALTER TABLE {} {};", table, actions.join(", "));
        if old.primary_key != new.primary_key {
            sql.push_str(&format!(
                "\n-- primary key of {}.{} changed, not altered",
                table,
                self.wrap(&new.name)
            ));
        }
        sql
    }

    fn compile_drop_foreign_key(&self, table: &str, fk: &ForeignKey) -> String {
        format!(
            "ALTER TABLE {} DROP FOREIGN KEY {};",
            self.wrap(table),
            self.wrap(&fk.name)
        )
    }
}
