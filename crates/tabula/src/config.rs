//! Engine configuration.
//!
//! Settings come from the environment (optionally seeded from a `.env` file
//! in the current directory or any parent), or are built in code:
//!
//! | variable                  | values                 | default      |
//! |---------------------------|------------------------|--------------|
//! | `TABULA_DIALECT`          | `mysql`, `postgres`    | `mysql`      |
//! | `TABULA_SCAN_MODE`        | `lenient`, `strict`    | `lenient`    |
//! | `TABULA_MIGRATIONS_TABLE` | any table name         | `migrations` |
//! | `TABULA_SOURCE_EXTENSION` | file extension         | `rs`         |
//! | `TABULA_FOREIGN_KEYS`     | `inline`, `deferred`   | `inline`     |
//! | `DATABASE_URL`            | connection string      | unset        |

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::grammar::{Grammar, MySqlGrammar, PostgresGrammar};

/// Default name of the migrations bookkeeping table, skipped by introspection.
pub const DEFAULT_MIGRATIONS_TABLE: &str = "migrations";

/// Supported database engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dialect {
    #[default]
    MySql,
    Postgres,
}

impl Dialect {
    /// The DDL grammar for this engine.
    pub fn grammar(&self) -> Box<dyn Grammar> {
        match self {
            Dialect::MySql => Box::new(MySqlGrammar),
            Dialect::Postgres => Box::new(PostgresGrammar),
        }
    }
}

impl FromStr for Dialect {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(Dialect::MySql),
            "postgres" | "postgresql" | "pg" => Ok(Dialect::Postgres),
            _ => Err(ConfigError::invalid("TABULA_DIALECT", s)),
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dialect::MySql => write!(f, "mysql"),
            Dialect::Postgres => write!(f, "postgres"),
        }
    }
}

/// What to do with source files and entities that cannot be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScanMode {
    /// Skip them, log a warning and keep going.
    #[default]
    Lenient,
    /// Fail the whole scan.
    Strict,
}

impl FromStr for ScanMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "lenient" => Ok(ScanMode::Lenient),
            "strict" => Ok(ScanMode::Strict),
            _ => Err(ConfigError::invalid("TABULA_SCAN_MODE", s)),
        }
    }
}

/// Where generated scripts declare foreign keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ForeignKeyPlacement {
    /// As constraint clauses inside each CREATE TABLE.
    #[default]
    Inline,
    /// As ALTER TABLE statements after every table has been created.
    Deferred,
}

impl FromStr for ForeignKeyPlacement {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "inline" => Ok(ForeignKeyPlacement::Inline),
            "deferred" => Ok(ForeignKeyPlacement::Deferred),
            _ => Err(ConfigError::invalid("TABULA_FOREIGN_KEYS", s)),
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}")]
    Invalid { key: &'static str, value: String },

    #[error("failed to load .env file: {0}")]
    DotEnv(#[from] dotenvy::Error),
}

impl ConfigError {
    fn invalid(key: &'static str, value: &str) -> Self {
        ConfigError::Invalid {
            key,
            value: value.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub dialect: Dialect,
    pub scan_mode: ScanMode,
    pub migrations_table: String,
    pub source_extension: String,
    pub foreign_keys: ForeignKeyPlacement,
    pub database_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            dialect: Dialect::default(),
            scan_mode: ScanMode::default(),
            migrations_table: DEFAULT_MIGRATIONS_TABLE.to_string(),
            source_extension: "rs".to_string(),
            foreign_keys: ForeignKeyPlacement::default(),
            database_url: None,
        }
    }
}

impl Config {
    /// Load configuration from the process environment, after loading a
    /// `.env` file if one can be found.
    pub fn from_env() -> Result<Self, ConfigError> {
        match dotenvy::dotenv() {
            Ok(path) => tracing::debug!(path = %path.display(), "loaded .env"),
            Err(e) if e.not_found() => {}
            Err(e) => return Err(e.into()),
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup. Missing keys keep
    /// their defaults, empty values count as missing.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Config::default();

        if let Some(v) = get("TABULA_DIALECT") {
            config.dialect = v.parse()?;
        }
        if let Some(v) = get("TABULA_SCAN_MODE") {
            config.scan_mode = v.parse()?;
        }
        if let Some(v) = get("TABULA_MIGRATIONS_TABLE") {
            config.migrations_table = v.trim().to_string();
        }
        if let Some(v) = get("TABULA_SOURCE_EXTENSION") {
            config.source_extension = v.trim().trim_start_matches('.').to_string();
        }
        if let Some(v) = get("TABULA_FOREIGN_KEYS") {
            config.foreign_keys = v.parse()?;
        }
        config.database_url = get("DATABASE_URL");

        Ok(config)
    }
}
