//! Database schema types for tabula.
//!
//! This crate contains the dialect-independent schema model shared by the
//! declarative entity reader, the live database introspectors and the DDL
//! grammars. Two [`Schema`] values built by different producers compare with
//! plain `==`, which is what schema diffing relies on.

use indexmap::IndexMap;
use std::fmt;
use std::str::FromStr;
use tabula_sql::Lit;

mod error;

pub use error::ValidationError;

/// Logical column types.
///
/// This is the closed registry of domain types a column may use. Each
/// grammar maps every variant to a native type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    /// 2-byte integer
    SmallInt,
    /// 4-byte integer
    Integer,
    /// 8-byte integer
    BigInt,
    /// Fixed-point number with precision and scale
    Decimal,
    /// Single precision floating point
    SmallFloat,
    /// Double precision floating point
    Float,
    /// Variable-length string with a maximum length
    String,
    /// Unbounded text
    Text,
    /// UUID
    Uuid,
    /// Variable-length binary with a maximum length
    Binary,
    /// Unbounded binary
    Blob,
    /// Boolean
    Boolean,
    /// Calendar date
    Date,
    /// Date and time without time zone
    DateTime,
    /// Date and time with time zone
    DateTimeTz,
    /// Time of day
    Time,
    /// Serialized list of values
    Array,
    /// JSON document
    Json,
    /// One of a fixed set of string values
    Enum,
}

impl ColumnType {
    /// Every registered type, in declaration order.
    pub const ALL: [ColumnType; 19] = [
        ColumnType::SmallInt,
        ColumnType::Integer,
        ColumnType::BigInt,
        ColumnType::Decimal,
        ColumnType::SmallFloat,
        ColumnType::Float,
        ColumnType::String,
        ColumnType::Text,
        ColumnType::Uuid,
        ColumnType::Binary,
        ColumnType::Blob,
        ColumnType::Boolean,
        ColumnType::Date,
        ColumnType::DateTime,
        ColumnType::DateTimeTz,
        ColumnType::Time,
        ColumnType::Array,
        ColumnType::Json,
        ColumnType::Enum,
    ];

    /// The registry key of this type.
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::SmallInt => "smallint",
            ColumnType::Integer => "integer",
            ColumnType::BigInt => "bigint",
            ColumnType::Decimal => "decimal",
            ColumnType::SmallFloat => "small_float",
            ColumnType::Float => "float",
            ColumnType::String => "string",
            ColumnType::Text => "text",
            ColumnType::Uuid => "uuid",
            ColumnType::Binary => "binary",
            ColumnType::Blob => "blob",
            ColumnType::Boolean => "boolean",
            ColumnType::Date => "date",
            ColumnType::DateTime => "datetime",
            ColumnType::DateTimeTz => "datetime_tz",
            ColumnType::Time => "time",
            ColumnType::Array => "array",
            ColumnType::Json => "json",
            ColumnType::Enum => "enum",
        }
    }

    /// Whether this is one of the integer types.
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            ColumnType::SmallInt | ColumnType::Integer | ColumnType::BigInt
        )
    }

    /// Registry keys of every type, for error messages.
    pub fn registry() -> Vec<String> {
        Self::ALL.iter().map(|t| t.as_str().to_string()).collect()
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColumnType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_lowercase();
        ColumnType::ALL
            .into_iter()
            .find(|t| t.as_str() == key)
            .ok_or_else(|| ValidationError::UnknownType {
                given: s.to_string(),
                valid: ColumnType::registry(),
            })
    }
}

/// A column default value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefaultValue {
    /// `DEFAULT NULL`
    Null,
    /// A boolean literal
    Bool(bool),
    /// A numeric literal, kept as written
    Number(String),
    /// A string literal (rendered quoted and escaped)
    Text(String),
    /// A raw SQL expression such as `CURRENT_TIMESTAMP` (rendered verbatim)
    Expression(String),
}

impl DefaultValue {
    /// Returns the SQL fragment for this default value.
    pub fn to_sql(&self) -> String {
        match self {
            DefaultValue::Null => "NULL".to_string(),
            DefaultValue::Bool(true) => "TRUE".to_string(),
            DefaultValue::Bool(false) => "FALSE".to_string(),
            DefaultValue::Number(n) => n.clone(),
            DefaultValue::Text(s) => format!("{}", Lit(s)),
            DefaultValue::Expression(e) => e.clone(),
        }
    }
}

/// Action taken on the referencing rows when a referenced row is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferentialAction {
    Cascade,
    SetNull,
    SetDefault,
    Restrict,
    NoAction,
}

impl ReferentialAction {
    /// Returns the SQL keywords for this action.
    pub fn to_sql(&self) -> &'static str {
        match self {
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::SetNull => "SET NULL",
            ReferentialAction::SetDefault => "SET DEFAULT",
            ReferentialAction::Restrict => "RESTRICT",
            ReferentialAction::NoAction => "NO ACTION",
        }
    }
}

impl fmt::Display for ReferentialAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_sql())
    }
}

impl FromStr for ReferentialAction {
    type Err = ValidationError;

    /// Accepts `CASCADE`, `SET NULL`, `set_null`, `no action`, ...
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s
            .trim()
            .to_uppercase()
            .replace('_', " ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        match normalized.as_str() {
            "CASCADE" => Ok(ReferentialAction::Cascade),
            "SET NULL" => Ok(ReferentialAction::SetNull),
            "SET DEFAULT" => Ok(ReferentialAction::SetDefault),
            "RESTRICT" => Ok(ReferentialAction::Restrict),
            "NO ACTION" => Ok(ReferentialAction::NoAction),
            _ => Err(ValidationError::UnknownAction {
                given: s.to_string(),
            }),
        }
    }
}

/// A database column definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    /// Column name
    pub name: String,
    /// Logical type
    pub column_type: ColumnType,
    /// Maximum length (strings and binaries)
    pub length: Option<u32>,
    /// Whether the column allows NULL
    pub nullable: bool,
    /// Whether this has a unique constraint
    pub unique: bool,
    /// Default value (if any)
    pub default: Option<DefaultValue>,
    /// Allowed values for enum columns
    pub enum_options: Vec<String>,
    /// Total digits for decimals, fractional second digits for temporal types
    pub precision: Option<u32>,
    /// Digits after the decimal point
    pub scale: Option<u32>,
    /// Whether this is (part of) the primary key
    pub primary_key: bool,
    /// Whether the database generates values for this column
    pub auto_increment: bool,
}

impl Column {
    /// Create a column from a type registry key.
    ///
    /// Fails with [`ValidationError::UnknownType`] when `column_type` is not a
    /// registered logical type.
    pub fn new(name: impl Into<String>, column_type: &str) -> Result<Self, ValidationError> {
        Ok(Self::typed(name, column_type.parse()?))
    }

    /// Create a NOT NULL column of the given type with no other attributes.
    pub fn typed(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            length: None,
            nullable: false,
            unique: false,
            default: None,
            enum_options: Vec::new(),
            precision: None,
            scale: None,
            primary_key: false,
            auto_increment: false,
        }
    }

    pub fn length(mut self, length: u32) -> Self {
        self.length = Some(length);
        self
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn unique(mut self, unique: bool) -> Self {
        self.unique = unique;
        self
    }

    pub fn default_value(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }

    pub fn enum_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.enum_options = options.into_iter().map(Into::into).collect();
        self
    }

    pub fn precision(mut self, precision: u32, scale: Option<u32>) -> Self {
        self.precision = Some(precision);
        self.scale = scale;
        self
    }

    pub fn primary_key(mut self, primary_key: bool) -> Self {
        self.primary_key = primary_key;
        self
    }

    pub fn auto_increment(mut self, auto_increment: bool) -> Self {
        self.auto_increment = auto_increment;
        self
    }

    /// Auto-increment only applies to integer primary keys; the flag is
    /// ignored everywhere else.
    pub fn wants_auto_increment(&self) -> bool {
        self.auto_increment && self.primary_key && self.column_type.is_integer()
    }
}

/// A foreign key constraint on a single column.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ForeignKey {
    /// Constraint name
    pub name: String,
    /// Column in the owning table
    pub column: String,
    /// Referenced table
    pub references_table: String,
    /// Referenced column
    pub references_column: String,
    /// `ON DELETE` action, `None` meaning the engine default
    pub on_delete: Option<ReferentialAction>,
}

impl ForeignKey {
    pub fn new(
        name: impl Into<String>,
        column: impl Into<String>,
        references_table: impl Into<String>,
        references_column: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            column: column.into(),
            references_table: references_table.into(),
            references_column: references_column.into(),
            on_delete: None,
        }
    }

    pub fn on_delete(mut self, action: Option<ReferentialAction>) -> Self {
        self.on_delete = action;
        self
    }

    /// Compare everything but the constraint name.
    ///
    /// Introspected constraint names are whatever the database was given, so
    /// two foreign keys describing the same reference may be named differently.
    pub fn same_target(&self, other: &ForeignKey) -> bool {
        self.column == other.column
            && self.references_table == other.references_table
            && self.references_column == other.references_column
            && self.on_delete == other.on_delete
    }
}

/// A database table definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    /// Table name
    pub name: String,
    /// Columns, in declaration order
    pub columns: Vec<Column>,
    /// Foreign keys
    pub foreign_keys: Vec<ForeignKey>,
}

impl Table {
    /// Create an empty table.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            foreign_keys: Vec::new(),
        }
    }

    /// Replace the columns of this table.
    ///
    /// Column names must be unique within the table.
    pub fn set_columns(&mut self, columns: Vec<Column>) -> Result<(), ValidationError> {
        for (i, column) in columns.iter().enumerate() {
            if columns[..i].iter().any(|c| c.name == column.name) {
                return Err(ValidationError::DuplicateColumn {
                    table: self.name.clone(),
                    column: column.name.clone(),
                });
            }
        }
        self.columns = columns;
        Ok(())
    }

    /// Add a foreign key whose local column must already be a column of this table.
    pub fn add_foreign_key(&mut self, fk: ForeignKey) -> Result<(), ValidationError> {
        if self.column(&fk.column).is_none() {
            return Err(ValidationError::UnknownColumn {
                table: self.name.clone(),
                foreign_key: fk.name,
                column: fk.column,
            });
        }
        self.foreign_keys.push(fk);
        Ok(())
    }

    /// Get a column by name.
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// Names of the primary key columns, in column order.
    pub fn primary_key_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.primary_key)
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Whether this table has no columns.
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// A complete database schema.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    /// Tables in the schema, indexed by name
    pub tables: IndexMap<String, Table>,
}

impl Schema {
    /// Create a new empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table; table names are unique within a schema.
    pub fn insert_table(&mut self, table: Table) -> Result<(), ValidationError> {
        if self.tables.contains_key(&table.name) {
            return Err(ValidationError::DuplicateTable { table: table.name });
        }
        self.tables.insert(table.name.clone(), table);
        Ok(())
    }

    /// Add a table unless one with the same name exists. Returns whether it was added.
    pub fn insert_if_absent(&mut self, table: Table) -> bool {
        if self.tables.contains_key(&table.name) {
            return false;
        }
        self.tables.insert(table.name.clone(), table);
        true
    }

    /// Get a table by name.
    pub fn get_table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    /// Iterate over all tables.
    pub fn iter_tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.values()
    }

    /// Number of tables.
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Whether the schema has no tables.
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl FromIterator<Table> for Schema {
    /// Later tables replace earlier ones with the same name.
    fn from_iter<I: IntoIterator<Item = Table>>(iter: I) -> Self {
        Self {
            tables: iter.into_iter().map(|t| (t.name.clone(), t)).collect(),
        }
    }
}

#[cfg(test)]
mod tests;
