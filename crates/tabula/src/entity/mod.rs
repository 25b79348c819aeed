//! Declarative schema reader.
//!
//! Turns the entities found by [`EntityDiscovery`] into a [`Schema`]. Plain
//! columns come from `column` markers; relationships become foreign key
//! columns or pivot tables. See [`attr`] for the attribute grammar.

use std::collections::HashMap;
use std::path::Path;

use syn::Fields;
use tabula_db_schema::{Column, ColumnType, ForeignKey, ReferentialAction, Schema, Table};
use tabula_sql::{foreign_key_name, join_column_name, pivot_table_name};

use crate::config::ScanMode;
use crate::discovery::{Declaration, EntityDiscovery};
use crate::{Error, Result};

pub(crate) mod attr;

use attr::{FieldMeta, JoinColumnAttr, JoinTableAttr, Relation};

/// Default referenced column for relationships.
const DEFAULT_REFERENCED_COLUMN: &str = "id";

/// An entity that could not be turned into a table.
#[derive(Debug)]
pub struct SkippedEntity {
    pub entity: String,
    pub error: Error,
}

/// The outcome of a lenient read: the schema plus what was left out of it.
#[derive(Debug, Default)]
pub struct SchemaReport {
    pub schema: Schema,
    pub skipped: Vec<SkippedEntity>,
}

/// Reads a [`Schema`] from annotated entity sources.
#[derive(Debug, Clone, Default)]
pub struct EntitySchemaReader {
    discovery: EntityDiscovery,
}

impl EntitySchemaReader {
    pub fn new(mode: ScanMode) -> Self {
        Self {
            discovery: EntityDiscovery::new(mode),
        }
    }

    pub fn with_discovery(discovery: EntityDiscovery) -> Self {
        Self { discovery }
    }

    pub fn discovery(&self) -> &EntityDiscovery {
        &self.discovery
    }

    /// Read the schema declared under `dir`.
    pub fn read(&self, dir: impl AsRef<Path>) -> Result<Schema> {
        Ok(self.read_report(dir)?.schema)
    }

    /// Read the schema declared under `dir`, reporting the entities that
    /// were skipped.
    ///
    /// In lenient mode an entity that cannot be read contributes nothing
    /// (neither its table nor its pivot tables) and the read carries on.
    /// In strict mode the first such entity fails the read. A relationship
    /// target without a table marker always fails the read.
    pub fn read_report(&self, dir: impl AsRef<Path>) -> Result<SchemaReport> {
        let declarations = self.discovery.declarations(dir)?;
        let index = DeclarationIndex::new(&declarations);

        let mut report = SchemaReport::default();
        let mut pivots = Vec::new();

        for decl in declarations.iter().filter(|d| d.has_table_marker) {
            let _span = tracing::debug_span!("read_entity", entity = %decl.id).entered();

            let mut entity_pivots = Vec::new();
            let outcome = read_entity(decl, &index, &mut entity_pivots)
                .and_then(|table| Ok(report.schema.insert_table(table)?));

            match outcome {
                Ok(()) => pivots.extend(entity_pivots),
                Err(error) if error.is_fatal() => return Err(error),
                Err(error) => match self.discovery.mode() {
                    ScanMode::Strict => return Err(error),
                    ScanMode::Lenient => {
                        tracing::warn!(entity = %decl.id, %error, "skipping entity");
                        report.skipped.push(SkippedEntity {
                            entity: decl.id.clone(),
                            error,
                        });
                    }
                },
            }
        }

        for pivot in pivots {
            let name = pivot.name.clone();
            if report.schema.insert_if_absent(pivot) {
                tracing::debug!(table = %name, "added pivot table");
            } else {
                tracing::debug!(table = %name, "pivot table already declared");
            }
        }

        tracing::info!(
            tables = report.schema.len(),
            skipped = report.skipped.len(),
            "read declared schema"
        );
        Ok(report)
    }
}

/// Lookup of declarations by identifier, for relationship targets.
struct DeclarationIndex<'a> {
    by_id: HashMap<&'a str, &'a Declaration>,
    by_name: HashMap<String, Vec<&'a Declaration>>,
}

impl<'a> DeclarationIndex<'a> {
    fn new(declarations: &'a [Declaration]) -> Self {
        let mut by_id = HashMap::new();
        let mut by_name: HashMap<String, Vec<&Declaration>> = HashMap::new();
        for decl in declarations {
            by_id.insert(decl.id.as_str(), decl);
            by_name.entry(decl.name()).or_default().push(decl);
        }
        Self { by_id, by_name }
    }

    /// Resolve a target by fully-qualified identifier, then by bare name.
    ///
    /// A bare name shared by several declarations resolves only if exactly
    /// one of their identifiers ends with the target path.
    fn resolve(&self, target: &str) -> Option<&'a Declaration> {
        let target = target.trim().trim_start_matches("crate::");
        if let Some(decl) = self.by_id.get(target) {
            return Some(*decl);
        }

        let name = target.rsplit("::").next()?;
        let candidates = self.by_name.get(name)?;

        // Entities shadow plain structs of the same name.
        let marked: Vec<&'a Declaration> = candidates
            .iter()
            .copied()
            .filter(|d| d.has_table_marker)
            .collect();
        let candidates = if marked.is_empty() {
            candidates.clone()
        } else {
            marked
        };

        if let [only] = candidates.as_slice() {
            return Some(*only);
        }

        let suffix = format!("::{target}");
        let mut matching = candidates.iter().filter(|d| d.id.ends_with(&suffix));
        match (matching.next(), matching.next()) {
            (Some(decl), None) => Some(*decl),
            _ => None,
        }
    }

    /// Table name of a relationship target.
    fn table_of(&self, entity: &str, target: &str) -> Result<String> {
        let decl = self.resolve(target).ok_or_else(|| Error::UnknownTarget {
            entity: entity.to_string(),
            target: target.to_string(),
        })?;
        if !decl.has_table_marker {
            return Err(Error::MissingTableMarker {
                entity: decl.id.clone(),
            });
        }
        entity_table_name(decl)
    }
}

fn entity_table_name(decl: &Declaration) -> Result<String> {
    attr::table_name(&decl.id, &decl.item.attrs)?.ok_or_else(|| Error::Attribute {
        entity: decl.id.clone(),
        message: "table marker needs a name: #[orm(table = \"...\")]".to_string(),
    })
}

fn read_entity(
    decl: &Declaration,
    index: &DeclarationIndex<'_>,
    pivots: &mut Vec<Table>,
) -> Result<Table> {
    let entity = decl.id.as_str();
    let table_name = entity_table_name(decl)?;

    let fields: Vec<&syn::Field> = match &decl.item.fields {
        Fields::Named(named) => named.named.iter().collect(),
        Fields::Unnamed(_) | Fields::Unit => Vec::new(),
    };

    let mut columns = Vec::new();
    let mut foreign_keys = Vec::new();

    for field in fields {
        let Some(meta) = FieldMeta::parse(entity, field)? else {
            continue;
        };

        if let Some(column) = &meta.column {
            columns.push(column.to_column(entity, &meta.name, &meta.ty)?);
        }

        let single_target = match &meta.relation {
            Some(Relation::ManyToOne {
                target,
                inversed_by,
            }) => {
                tracing::trace!(field = %meta.name, %target, ?inversed_by, "many-to-one");
                Some(target)
            }
            Some(Relation::OneToMany { target, mapped_by }) => {
                tracing::trace!(field = %meta.name, %target, %mapped_by, "one-to-many");
                Some(target)
            }
            Some(Relation::ManyToMany {
                target,
                mapped_by: None,
                inversed_by,
            }) => {
                tracing::trace!(field = %meta.name, %target, ?inversed_by, "owning many-to-many");
                let target_table = index.table_of(entity, target)?;
                pivots.push(pivot_table(
                    &table_name,
                    &target_table,
                    meta.join_table.clone().unwrap_or_default(),
                )?);
                None
            }
            // The inverse side of a many-to-many owns nothing.
            Some(Relation::ManyToMany {
                target,
                mapped_by: Some(owner),
                ..
            }) => {
                tracing::trace!(field = %meta.name, %target, %owner, "inverse many-to-many");
                None
            }
            None => None,
        };

        if let Some(target) = single_target {
            let target_table = index.table_of(entity, target)?;
            let (column, fk) = join_column(
                &table_name,
                &meta.name,
                &target_table,
                meta.join_column.clone().unwrap_or_default(),
            );
            columns.push(column);
            foreign_keys.push(fk);
        }
    }

    let mut table = Table::new(table_name);
    table.set_columns(columns)?;
    for fk in foreign_keys {
        table.add_foreign_key(fk)?;
    }
    Ok(table)
}

/// The foreign key column and constraint for a single-valued relationship.
fn join_column(
    table: &str,
    field: &str,
    target_table: &str,
    jc: JoinColumnAttr,
) -> (Column, ForeignKey) {
    let name = jc.name.unwrap_or_else(|| join_column_name(field));
    let referenced = jc
        .referenced_column
        .unwrap_or_else(|| DEFAULT_REFERENCED_COLUMN.to_string());

    let column = Column::typed(&name, ColumnType::Integer).nullable(jc.nullable.unwrap_or(true));
    let fk = ForeignKey::new(foreign_key_name(table, &name), &name, target_table, referenced)
        .on_delete(jc.on_delete);
    (column, fk)
}

/// The pivot table backing the owning side of a many-to-many relationship.
fn pivot_table(owner: &str, target: &str, jt: JoinTableAttr) -> Result<Table> {
    let name = jt.name.unwrap_or_else(|| pivot_table_name(owner, target));
    let local = jt.join_column.unwrap_or_default();
    let inverse = jt.inverse_join_column.unwrap_or_default();

    let sides = [
        (local, owner, join_column_name(owner)),
        (inverse, target, join_column_name(target)),
    ];

    let mut columns = Vec::new();
    let mut foreign_keys = Vec::new();
    for (jc, referenced_table, default_name) in sides {
        let column_name = jc.name.unwrap_or(default_name);
        let referenced = jc
            .referenced_column
            .unwrap_or_else(|| DEFAULT_REFERENCED_COLUMN.to_string());
        columns.push(Column::typed(&column_name, ColumnType::Integer).primary_key(true));
        foreign_keys.push(
            ForeignKey::new(
                foreign_key_name(&name, &column_name),
                &column_name,
                referenced_table,
                referenced,
            )
            .on_delete(Some(jc.on_delete.unwrap_or(ReferentialAction::Cascade))),
        );
    }

    let mut table = Table::new(name);
    table.set_columns(columns)?;
    for fk in foreign_keys {
        table.add_foreign_key(fk)?;
    }
    Ok(table)
}
