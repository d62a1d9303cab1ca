//! Table and schema definitions
//!
//! [`TableDef`] is the declarative target shape of one table; [`Schema`] is
//! the set of tables the database should converge to. Both are inert data,
//! owned by the caller and validated before any statement is generated.

use super::column::{ColumnDef, ColumnKind, DataType};
use crate::error::SyncError;
use serde::{Deserialize, Serialize};

/// Target definition of a single table
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TableDef {
    pub name: String,
    /// Columns in declaration order; names are unique
    pub columns: Vec<ColumnDef>,
    /// Explicit primary key columns. Empty when an increments column is the
    /// implicit primary key.
    #[serde(default)]
    pub primary_key: Vec<String>,
    /// Unique constraints, each a tuple of column names
    #[serde(default)]
    pub uniques: Vec<Vec<String>>,
    /// Plain (non-unique) indexes, each a tuple of column names
    #[serde(default)]
    pub indexes: Vec<Vec<String>>,
}

impl TableDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn column(mut self, column: ColumnDef) -> Self {
        self.columns.push(column);
        self
    }

    #[must_use]
    pub fn primary_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primary_key = columns.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn unique<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.uniques
            .push(columns.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn index<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.indexes
            .push(columns.into_iter().map(Into::into).collect());
        self
    }

    /// Inject a creation-timestamp column under the given name
    #[must_use]
    pub fn created_at(self, name: impl Into<String>) -> Self {
        self.column(ColumnDef::created_at(name))
    }

    /// Inject an update-timestamp column under the given name
    #[must_use]
    pub fn updated_at(self, name: impl Into<String>) -> Self {
        self.column(ColumnDef::updated_at(name))
    }

    /// Inject a soft-delete flag column under the given name
    #[must_use]
    pub fn soft_delete(self, name: impl Into<String>) -> Self {
        self.column(ColumnDef::soft_delete(name))
    }

    /// Inject the soft-delete flag under its conventional name
    #[must_use]
    pub fn soft_deletes(self) -> Self {
        self.soft_delete("deleted")
    }

    /// Inject `created_at` and `updated_at` columns under their
    /// conventional names
    #[must_use]
    pub fn timestamps(self) -> Self {
        self.created_at("created_at").updated_at("updated_at")
    }

    /// Find a column by name
    pub fn get(&self, name: &str) -> Option<&ColumnDef> {
        self.columns.iter().find(|c| c.name == name)
    }

    /// The single increments column, if declared
    pub fn increment_column(&self) -> Option<&ColumnDef> {
        self.columns
            .iter()
            .find(|c| c.data_type == DataType::Increments)
    }

    /// The update-timestamp column, if declared. Drives trigger emission.
    pub fn updated_at_column(&self) -> Option<&ColumnDef> {
        self.columns
            .iter()
            .find(|c| c.kind == ColumnKind::UpdatedAt)
    }

    /// The key-column set used for structural comparison: the increments
    /// column when present, else the explicit primary key.
    pub fn effective_primary_key(&self) -> Vec<String> {
        match self.increment_column() {
            Some(col) => vec![col.name.clone()],
            None => self.primary_key.clone(),
        }
    }

    /// Check the definition invariants. All violations are fatal before any
    /// statement is generated.
    pub fn validate(&self) -> Result<(), SyncError> {
        let increments: Vec<&str> = self
            .columns
            .iter()
            .filter(|c| c.data_type == DataType::Increments)
            .map(|c| c.name.as_str())
            .collect();

        if increments.len() > 1 {
            return Err(SyncError::Definition(format!(
                "table '{}' declares more than one increments column: {}",
                self.name,
                increments.join(", ")
            )));
        }
        if !increments.is_empty() && !self.primary_key.is_empty() {
            return Err(SyncError::Definition(format!(
                "table '{}' declares both an increments column '{}' and an explicit primary key; \
                 increments columns are implicitly their own primary key",
                self.name, increments[0]
            )));
        }

        let mut seen: Vec<&str> = Vec::with_capacity(self.columns.len());
        for col in &self.columns {
            if seen.contains(&col.name.as_str()) {
                return Err(SyncError::Definition(format!(
                    "table '{}' declares column '{}' more than once",
                    self.name, col.name
                )));
            }
            seen.push(&col.name);
        }

        for name in self
            .primary_key
            .iter()
            .chain(self.uniques.iter().flatten())
            .chain(self.indexes.iter().flatten())
        {
            if self.get(name).is_none() {
                return Err(SyncError::Definition(format!(
                    "table '{}' references unknown column '{}' in a key or index",
                    self.name, name
                )));
            }
        }

        Ok(())
    }
}

/// The complete target schema: table name → definition. Order is not
/// significant for equality, but declaration order is preserved so the
/// generated statement list is deterministic.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    tables: Vec<TableDef>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn table(mut self, table: TableDef) -> Self {
        self.tables.push(table);
        self
    }

    pub fn get(&self, name: &str) -> Option<&TableDef> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn tables(&self) -> &[TableDef] {
        &self.tables
    }

    /// Validate every table definition
    pub fn validate(&self) -> Result<(), SyncError> {
        let mut seen: Vec<&str> = Vec::with_capacity(self.tables.len());
        for table in &self.tables {
            if seen.contains(&table.name.as_str()) {
                return Err(SyncError::Definition(format!(
                    "schema declares table '{}' more than once",
                    table.name
                )));
            }
            seen.push(&table.name);
            table.validate()?;
        }
        Ok(())
    }
}
