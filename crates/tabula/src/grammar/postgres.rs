use tabula_db_schema::{Column, ColumnType, ForeignKey};
use tabula_sql::{Lit, comma_list, quote_ident};

use super::{Grammar, default_type_name, with_precision};

/// PostgreSQL.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresGrammar;

impl PostgresGrammar {
    /// The type without the enum CHECK constraint, as used by `ALTER COLUMN .. TYPE`.
    fn native_type(&self, column: &Column) -> String {
        match column.column_type {
            ColumnType::Uuid => "UUID".to_string(),
            ColumnType::Binary | ColumnType::Blob => "BYTEA".to_string(),
            ColumnType::DateTime => with_precision("TIMESTAMP", column),
            ColumnType::DateTimeTz => with_precision("TIMESTAMPTZ", column),
            ColumnType::Json => "JSONB".to_string(),
            ColumnType::SmallInt
            | ColumnType::Integer
            | ColumnType::BigInt
            | ColumnType::Decimal
            | ColumnType::SmallFloat
            | ColumnType::Float
            | ColumnType::String
            | ColumnType::Text
            | ColumnType::Boolean
            | ColumnType::Date
            | ColumnType::Time
            | ColumnType::Array
            | ColumnType::Enum => default_type_name(column),
        }
    }
}

impl Grammar for PostgresGrammar {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn wrap(&self, identifier: &str) -> String {
        quote_ident(identifier)
    }

    fn type_name(&self, column: &Column) -> String {
        let native = self.native_type(column);
        if column.column_type == ColumnType::Enum && !column.enum_options.is_empty() {
            format!(
                "{} CHECK ({} IN ({}))",
                native,
                self.wrap(&column.name),
                comma_list(column.enum_options.iter().map(Lit))
            )
        } else {
            native
        }
    }

    fn auto_increment_keyword(&self) -> &'static str {
        "GENERATED BY DEFAULT AS IDENTITY"
    }

    fn compile_modify_column(&self, table_name: &str, old: &Column, new: &Column) -> String {
        let table = self.wrap(table_name);
        let column = self.wrap(&new.name);
        let mut statements = Vec::new();

        if old.name != new.name {
            statements.push(format!(
                "ALTER TABLE {} RENAME COLUMN {} TO {};",
                table,
                self.wrap(&old.name),
                column
            ));
        }

        let mut actions = Vec::new();

        let (old_type, new_type) = (self.native_type(old), self.native_type(new));
        if old_type != new_type {
            actions.push(format!(
                "ALTER COLUMN {column} TYPE {new_type} USING {column}::{new_type}"
            ));
        }

        let (old_nullable, new_nullable) = (
            old.nullable && !old.primary_key,
            new.nullable && !new.primary_key,
        );
        if old_nullable != new_nullable {
            if new_nullable {
                actions.push(format!("ALTER COLUMN {column} DROP NOT NULL"));
            } else {
                actions.push(format!("ALTER COLUMN {column} SET NOT NULL"));
            }
        }

        if old.default != new.default {
            match &new.default {
                Some(default) => actions.push(format!(
                    "ALTER COLUMN {column} SET DEFAULT {}",
                    default.to_sql()
                )),
                None => actions.push(format!("ALTER COLUMN {column} DROP DEFAULT")),
            }
        }

        // Inline constraints carry the names Postgres derives from the
        // column they were created with.
        match (old.unique, new.unique) {
            (false, true) => actions.push(format!(
                "ADD CONSTRAINT {} UNIQUE ({column})",
                self.wrap(&format!("{table_name}_{}_key", new.name))
            )),
            (true, false) => actions.push(format!(
                "DROP CONSTRAINT IF EXISTS {}",
                self.wrap(&format!("{table_name}_{}_key", old.name))
            )),
            _ => {}
        }

        let (old_check, new_check) = (enum_check(old), enum_check(new));
        if old_check != new_check {
            if old_check.is_some() {
                actions.push(format!(
                    "DROP CONSTRAINT IF EXISTS {}",
                    self.wrap(&format!("{table_name}_{}_check", old.name))
                ));
            }
            if let Some(options) = new_check {
                actions.push(format!(
                    "ADD CONSTRAINT {} CHECK ({column} IN ({}))",
                    self.wrap(&format!("{table_name}_{}_check", new.name)),
                    comma_list(options.iter().map(Lit))
                ));
            }
        }

        if !actions.is_empty() {
            statements.push(format!("ALTER TABLE {} {};", table, actions.join(", ")));
        }

        if old.primary_key != new.primary_key {
            statements.push(format!("-- primary key of {table}.{column} changed, not altered"));
        }

        statements.join("\n")
    }

    fn compile_drop_foreign_key(&self, table: &str, fk: &ForeignKey) -> String {
        format!(
            "ALTER TABLE {} DROP CONSTRAINT {};",
            self.wrap(table),
            self.wrap(&fk.name)
        )
    }
}

/// Options of the CHECK constraint an enum column is created with.
fn enum_check(column: &Column) -> Option<&[String]> {
    (column.column_type == ColumnType::Enum && !column.enum_options.is_empty())
        .then_some(column.enum_options.as_slice())
}
