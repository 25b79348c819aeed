//! Schema and migration engine.
//!
//! Tables are declared as annotated Rust structs (entities) in an ordinary
//! source tree. This crate provides:
//! - Entity discovery over a source directory
//! - A declarative reader turning entities into a schema model
//! - Introspection of a live MySQL or Postgres catalog into the same model
//! - DDL grammars for both engines
//! - Migration scripts for a whole source tree, and diffs between schemas
//!
//! # Declaring entities
//!
//! ```ignore
//! #[orm(table = "posts")]
//! pub struct Post {
//!     #[orm(column(primary_key))]
//!     id: i32,
//!     #[orm(column(length = 200))]
//!     title: String,
//!     #[orm(many_to_one(target = "User"), join_column(name = "author_id"))]
//!     author: Option<User>,
//!     #[orm(many_to_many(target = "Tag"))]
//!     tags: Vec<Tag>,
//! }
//! ```
//!
//! The `orm` attributes are only read from source; nothing needs to expand
//! them at compile time.
//!
//! # Generating a migration
//!
//! ```ignore
//! let config = Config::from_env()?;
//! let sql = MigrationGenerator::from_config(&config).generate("src/entities")?;
//! ```

pub mod config;
pub mod diff;
pub mod discovery;
pub mod entity;
mod error;
pub mod grammar;
pub mod introspect;
pub mod migration;

pub use config::{Config, ConfigError, Dialect, ForeignKeyPlacement, ScanMode};
pub use diff::{Change, SchemaDiff, SchemaDiffExt, TableDiff};
pub use discovery::{Declaration, EntityDiscovery};
pub use entity::{EntitySchemaReader, SchemaReport, SkippedEntity};
pub use error::Error;
pub use grammar::{Fragments, Grammar, KeyPlacement, MySqlGrammar, PostgresGrammar};
pub use introspect::{
    CatalogConnection, CatalogRow, Introspector, MySqlIntrospector, NativeType, PgCatalog,
    PostgresIntrospector,
};
pub use migration::MigrationGenerator;

pub use tabula_db_schema::{
    Column, ColumnType, DefaultValue, ForeignKey, ReferentialAction, Schema, Table,
    ValidationError,
};

pub type Result<T> = std::result::Result<T, Error>;
