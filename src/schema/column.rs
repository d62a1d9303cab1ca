//! Column definitions for the target schema
//!
//! Columns carry a logical [`DataType`] (what the application declared), a
//! [`ColumnKind`] tag for the derived special columns, and an optional
//! default. The physical SQLite type is a fixed function of the data type.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical column data types
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    /// Autoincrementing integer primary key. At most one per table.
    Increments,
    Int,
    Float,
    String,
    Blob,
    /// JSON-encoded value, stored as TEXT
    Object,
    /// Stored as INTEGER 0/1
    Boolean,
    /// Stored as TEXT
    Date,
}

impl DataType {
    /// The fixed physical type mapping
    pub const fn physical(self) -> PhysicalType {
        match self {
            Self::Float => PhysicalType::Real,
            Self::Increments | Self::Boolean | Self::Int => PhysicalType::Integer,
            Self::Blob => PhysicalType::Blob,
            Self::String | Self::Date | Self::Object => PhysicalType::Text,
        }
    }
}

/// Physical SQLite storage types
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PhysicalType {
    Integer,
    Real,
    Text,
    Blob,
}

impl PhysicalType {
    pub const fn as_sql(self) -> &'static str {
        match self {
            Self::Integer => "INTEGER",
            Self::Real => "REAL",
            Self::Text => "TEXT",
            Self::Blob => "BLOB",
        }
    }

    /// Whether literals of this type render as bare numbers
    pub const fn is_numeric(self) -> bool {
        matches!(self, Self::Integer | Self::Real)
    }

    /// Map a declared type from the catalog to its storage type, following
    /// SQLite's affinity rules.
    pub fn from_declared(declared: &str) -> Self {
        let upper = declared.to_uppercase();
        if upper.contains("INT") {
            Self::Integer
        } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
            Self::Text
        } else if upper.contains("BLOB") || upper.is_empty() {
            Self::Blob
        } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
            Self::Real
        } else {
            // NUMERIC affinity; the generator never emits it, treat as integer
            Self::Integer
        }
    }
}

impl fmt::Display for PhysicalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Tagged column role. The derived special columns are explicit variants
/// rather than being inferred from sentinel default values.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnKind {
    #[default]
    Plain,
    /// The table's autoincrementing integer primary key
    Increment,
    /// Creation timestamp, trigger-free (`DEFAULT CURRENT_TIMESTAMP`)
    CreatedAt,
    /// Update timestamp, maintained by an `AFTER UPDATE` trigger
    UpdatedAt,
    /// Soft-delete flag, INTEGER NOT NULL DEFAULT 0
    SoftDelete,
}

/// A column default value
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefaultValue {
    /// Quoted string literal
    Text(String),
    Integer(i64),
    Real(f64),
    Boolean(bool),
    /// Arbitrary JSON value, serialized then quoted
    Json(serde_json::Value),
    /// Raw SQL passthrough, inlined verbatim
    Raw(String),
    /// `CURRENT_TIMESTAMP`, used by the timestamp columns
    CurrentTimestamp,
}

impl DefaultValue {
    /// Render the default as a SQL literal. Strings are quoted, raw SQL is
    /// inlined verbatim, all other values are JSON-serialized then quoted.
    /// The rendering is deterministic so repeated runs produce byte-identical
    /// DDL for unchanged structures.
    pub fn render(&self) -> String {
        match self {
            Self::Text(s) => quote_literal(s),
            Self::Raw(sql) => sql.clone(),
            Self::CurrentTimestamp => "CURRENT_TIMESTAMP".to_string(),
            Self::Integer(i) => quote_literal(&i.to_string()),
            Self::Real(f) => quote_literal(&f.to_string()),
            Self::Boolean(b) => quote_literal(if *b { "true" } else { "false" }),
            Self::Json(v) => {
                let json = serde_json::to_string(v).unwrap_or_else(|_| "null".to_string());
                quote_literal(&json)
            }
        }
    }

    /// Whether `ALTER TABLE ADD COLUMN` can carry this default. SQLite
    /// rejects non-constant defaults on added columns.
    pub const fn is_constant(&self) -> bool {
        !matches!(self, Self::CurrentTimestamp)
    }
}

/// Quote a string as a SQL literal, doubling embedded quotes
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// A single column in a target table definition
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: DataType,
    #[serde(default)]
    pub kind: ColumnKind,
    #[serde(default)]
    pub not_null: bool,
    #[serde(default)]
    pub default: Option<DefaultValue>,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        let kind = if data_type == DataType::Increments {
            ColumnKind::Increment
        } else {
            ColumnKind::Plain
        };
        Self {
            name: name.into(),
            data_type,
            kind,
            not_null: false,
            default: None,
        }
    }

    /// Creation-timestamp column: TEXT DEFAULT CURRENT_TIMESTAMP
    pub fn created_at(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: DataType::Date,
            kind: ColumnKind::CreatedAt,
            not_null: false,
            default: Some(DefaultValue::CurrentTimestamp),
        }
    }

    /// Update-timestamp column: TEXT DEFAULT CURRENT_TIMESTAMP plus an
    /// AFTER UPDATE trigger emitted with the table
    pub fn updated_at(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: DataType::Date,
            kind: ColumnKind::UpdatedAt,
            not_null: false,
            default: Some(DefaultValue::CurrentTimestamp),
        }
    }

    /// Soft-delete flag column: INTEGER NOT NULL DEFAULT 0
    pub fn soft_delete(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: DataType::Boolean,
            kind: ColumnKind::SoftDelete,
            not_null: true,
            default: Some(DefaultValue::Raw("0".to_string())),
        }
    }

    #[must_use]
    pub fn not_null(mut self) -> Self {
        self.not_null = true;
        self
    }

    #[must_use]
    pub fn default_value(mut self, default: DefaultValue) -> Self {
        self.default = Some(default);
        self
    }

    /// The physical SQLite type of this column
    pub fn physical(&self) -> PhysicalType {
        self.data_type.physical()
    }

    /// Rendered default literal, if any
    pub fn rendered_default(&self) -> Option<String> {
        self.default.as_ref().map(DefaultValue::render)
    }
}
