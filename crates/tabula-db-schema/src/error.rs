use thiserror::Error;

/// Errors raised while constructing schema model values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("'{given}' is not a valid column type, supported types are: {}", .valid.join(", "))]
    UnknownType { given: String, valid: Vec<String> },

    #[error("'{given}' is not a valid referential action")]
    UnknownAction { given: String },

    #[error("column '{column}' is declared twice in table '{table}'")]
    DuplicateColumn { table: String, column: String },

    #[error("table '{table}' is declared twice")]
    DuplicateTable { table: String },

    #[error("foreign key '{foreign_key}' uses column '{column}' which table '{table}' does not have")]
    UnknownColumn {
        table: String,
        foreign_key: String,
        column: String,
    },
}
