//! Migration script generation.
//!
//! Produces one DDL script creating every table declared under a source
//! directory, in the order the tables were read.

use std::path::Path;

use crate::Result;
use crate::config::{Config, ForeignKeyPlacement};
use crate::discovery::EntityDiscovery;
use crate::entity::{EntitySchemaReader, SchemaReport};
use crate::grammar::Grammar;

/// Separator between statements of a generated script.
const BLOCK_SEPARATOR: &str = "\n\n";

pub struct MigrationGenerator {
    grammar: Box<dyn Grammar>,
    reader: EntitySchemaReader,
    foreign_keys: ForeignKeyPlacement,
}

impl MigrationGenerator {
    pub fn new(grammar: Box<dyn Grammar>, reader: EntitySchemaReader) -> Self {
        Self {
            grammar,
            reader,
            foreign_keys: ForeignKeyPlacement::default(),
        }
    }

    /// Build a generator for the configured dialect, scan mode and
    /// foreign key placement.
    pub fn from_config(config: &Config) -> Self {
        let discovery =
            EntityDiscovery::new(config.scan_mode).with_extension(config.source_extension.clone());
        Self::new(config.dialect.grammar(), EntitySchemaReader::with_discovery(discovery))
            .with_foreign_keys(config.foreign_keys)
    }

    pub fn with_foreign_keys(mut self, placement: ForeignKeyPlacement) -> Self {
        self.foreign_keys = placement;
        self
    }

    pub fn grammar(&self) -> &dyn Grammar {
        self.grammar.as_ref()
    }

    /// Generate the creation script for every entity under `dir`.
    ///
    /// Tables without columns are left out. Entities the reader skipped
    /// appear as `-- Error generating SQL for <entity>: <reason>` comments.
    pub fn generate(&self, dir: impl AsRef<Path>) -> Result<String> {
        let _span = tracing::info_span!("generate", dialect = self.grammar.name()).entered();
        let report = self.reader.read_report(dir)?;
        Ok(self.render(&report))
    }

    /// Render a schema report as a script.
    pub fn render(&self, report: &SchemaReport) -> String {
        let mut blocks = Vec::new();
        let mut deferred = Vec::new();

        for table in report.schema.iter_tables() {
            if table.is_empty() {
                tracing::debug!(table = %table.name, "skipping table without columns");
                continue;
            }
            match self.foreign_keys {
                ForeignKeyPlacement::Inline => blocks.push(self.grammar.create_table(table)),
                ForeignKeyPlacement::Deferred => {
                    blocks.push(
                        self.grammar
                            .compile_create_table(&table.name, &table.columns, &[]),
                    );
                    deferred.extend(
                        table
                            .foreign_keys
                            .iter()
                            .map(|fk| self.grammar.compile_add_foreign_key(&table.name, fk)),
                    );
                }
            }
        }

        blocks.extend(deferred);

        for skipped in &report.skipped {
            blocks.push(format!(
                "-- Error generating SQL for {}: {}",
                skipped.entity,
                single_line(&skipped.error.to_string())
            ));
        }

        blocks.join(BLOCK_SEPARATOR)
    }
}

/// Keep error comments on one line so the script stays valid SQL.
fn single_line(message: &str) -> String {
    message.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::entity::SkippedEntity;
    use crate::grammar::MySqlGrammar;
    use tabula_db_schema::{Column, ColumnType, ForeignKey, Schema, Table};

    fn report() -> SchemaReport {
        let mut users = Table::new("users");
        users
            .set_columns(vec![
                Column::typed("id", ColumnType::Integer)
                    .primary_key(true)
                    .auto_increment(true),
            ])
            .unwrap();
        let mut posts = Table::new("posts");
        posts
            .set_columns(vec![
                Column::typed("id", ColumnType::Integer)
                    .primary_key(true)
                    .auto_increment(true),
                Column::typed("author_id", ColumnType::Integer).nullable(true),
            ])
            .unwrap();
        posts
            .add_foreign_key(ForeignKey::new("fk_posts_author_id", "author_id", "users", "id"))
            .unwrap();

        SchemaReport {
            schema: Schema::from_iter([posts, Table::new("markers"), users]),
            skipped: vec![SkippedEntity {
                entity: "shop::Shop".into(),
                error: Error::UnknownTarget {
                    entity: "shop::Shop".into(),
                    target: "Owner".into(),
                },
            }],
        }
    }

    fn generator() -> MigrationGenerator {
        MigrationGenerator::new(Box::new(MySqlGrammar), EntitySchemaReader::default())
    }

    #[test]
    fn test_render_inline() {
        insta::assert_snapshot!(generator().render(&report()), @r"
        CREATE TABLE `posts` (
            `id` INT NOT NULL AUTO_INCREMENT PRIMARY KEY,
            `author_id` INT NULL,
            CONSTRAINT `fk_posts_author_id` FOREIGN KEY (`author_id`) REFERENCES `users` (`id`)
        );

        CREATE TABLE `users` (
            `id` INT NOT NULL AUTO_INCREMENT PRIMARY KEY
        );

        -- Error generating SQL for shop::Shop: shop::Shop references unknown entity 'Owner'
        ");
    }

    #[test]
    fn test_render_deferred() {
        let sql = generator()
            .with_foreign_keys(ForeignKeyPlacement::Deferred)
            .render(&report());
        let blocks: Vec<&str> = sql.split(BLOCK_SEPARATOR).collect();
        assert_eq!(blocks.len(), 4);
        assert!(!blocks[0].contains("FOREIGN KEY"));
        assert!(blocks[1].starts_with("CREATE TABLE `users`"));
        assert_eq!(
            blocks[2],
            "ALTER TABLE `posts` ADD CONSTRAINT `fk_posts_author_id` FOREIGN KEY (`author_id`) REFERENCES `users` (`id`);"
        );
        assert!(blocks[3].starts_with("-- Error generating SQL for shop::Shop"));
    }

    #[test]
    fn test_empty_report() {
        assert_eq!(generator().render(&SchemaReport::default()), "");
    }
}
