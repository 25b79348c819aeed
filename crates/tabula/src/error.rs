use camino::Utf8PathBuf;
use tabula_db_schema::ValidationError;
use thiserror::Error;

use crate::introspect::CatalogError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid schema: {0}")]
    Validation(#[from] ValidationError),

    #[error("failed to read {path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {message}")]
    Parse { path: Utf8PathBuf, message: String },

    #[error("invalid attribute on {entity}: {message}")]
    Attribute { entity: String, message: String },

    #[error("{entity} cannot infer a column type for field '{field}', add `ty = \"...\"`")]
    UnsupportedType { entity: String, field: String },

    #[error("{entity} references unknown entity '{target}'")]
    UnknownTarget { entity: String, target: String },

    #[error("{entity} is used as a relationship target but has no #[orm(table = \"...\")] marker")]
    MissingTableMarker { entity: String },

    #[error("catalog query failed: {source} (query: {sql})")]
    Catalog {
        sql: String,
        #[source]
        source: CatalogError,
    },

    #[error("postgres error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("failed to start the async runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
}

impl Error {
    /// Whether this error must abort a whole read, regardless of scan mode.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::MissingTableMarker { .. })
    }
}
