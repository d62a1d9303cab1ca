//! Existing-schema introspection
//!
//! Queries the live database catalog (sqlite_master plus the table pragmas)
//! and maps the raw rows at this boundary into the strongly typed
//! [`ParsedSchema`]. No downstream component ever sees a catalog row. The
//! parsed schema is rebuilt fresh on every synchronization call; the live
//! database is the only authority on what currently exists.

use crate::error::SyncError;
use crate::schema::PhysicalType;
use rusqlite::Connection;

/// One column as it exists in the database
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedColumn {
    pub name: String,
    pub physical: PhysicalType,
    pub not_null: bool,
    /// Default literal exactly as recorded in the catalog
    pub default: Option<String>,
}

/// One index or unique constraint as it exists in the database
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedIndex {
    /// Catalog name, needed to drop the index
    pub name: String,
    /// Participating columns in index order. Order within the tuple is
    /// insignificant for equality comparisons but preserved for rendering.
    pub columns: Vec<String>,
}

/// One table as it exists in the database
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParsedTable {
    pub name: String,
    pub columns: Vec<ParsedColumn>,
    /// Primary key columns in key order. Does not include the increment
    /// column, which is structurally special and tracked separately.
    pub primary_key: Vec<String>,
    /// Unique constraints (catalog origin 'u')
    pub uniques: Vec<ParsedIndex>,
    /// Plain indexes created via CREATE INDEX (catalog origin 'c')
    pub indexes: Vec<ParsedIndex>,
    /// Trigger names attached to this table
    pub triggers: Vec<String>,
    /// The AUTOINCREMENT column, if the creation SQL declares one
    pub increment_column: Option<String>,
}

impl ParsedTable {
    pub fn column(&self, name: &str) -> Option<&ParsedColumn> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Everything that exists in the database, in the same normalized shape as
/// the target schema model
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParsedSchema {
    pub tables: Vec<ParsedTable>,
}

impl ParsedSchema {
    pub fn get(&self, name: &str) -> Option<&ParsedTable> {
        self.tables.iter().find(|t| t.name == name)
    }
}

/// Raw column row from `PRAGMA table_info`, mapped immediately into
/// [`ParsedColumn`]
#[derive(Debug)]
struct RawColumnInfo {
    name: String,
    declared_type: String,
    not_null: bool,
    default_value: Option<String>,
    pk: i32,
}

/// Raw index row from `PRAGMA index_list`
#[derive(Debug)]
struct RawIndexInfo {
    name: String,
    /// 'c' for CREATE INDEX, 'u' for UNIQUE constraint, 'pk' for primary key
    origin: String,
}

/// Catalog queries
pub mod queries {
    /// All user tables with their creation SQL. System tables are excluded
    /// here; caller-supplied prefixes are filtered after the fetch.
    pub const TABLES_QUERY: &str = "\
        SELECT name, sql FROM sqlite_master \
        WHERE type = 'table' AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\' \
        ORDER BY name";

    /// All triggers with the table they fire on
    pub const TRIGGERS_QUERY: &str = "\
        SELECT name, tbl_name FROM sqlite_master \
        WHERE type = 'trigger' AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\' \
        ORDER BY name";

    pub fn table_info(table: &str) -> String {
        format!("PRAGMA table_info(\"{table}\")")
    }

    pub fn index_list(table: &str) -> String {
        format!("PRAGMA index_list(\"{table}\")")
    }

    pub fn index_info(index: &str) -> String {
        format!("PRAGMA index_info(\"{index}\")")
    }
}

/// Read the full physical schema, excluding tables whose name starts with
/// any of `exclude_prefixes`. Read-only.
pub fn introspect(
    conn: &Connection,
    exclude_prefixes: &[String],
) -> Result<ParsedSchema, SyncError> {
    let excluded = |name: &str| exclude_prefixes.iter().any(|p| name.starts_with(p.as_str()));

    let mut stmt = conn.prepare(queries::TABLES_QUERY)?;
    let tables: Vec<(String, Option<String>)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<_, _>>()?;

    let mut stmt = conn.prepare(queries::TRIGGERS_QUERY)?;
    let triggers: Vec<(String, String)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<_, _>>()?;

    let mut schema = ParsedSchema::default();

    for (name, sql) in tables {
        if excluded(&name) {
            continue;
        }
        let mut table = parse_table(conn, &name, sql.as_deref())?;
        table.triggers = triggers
            .iter()
            .filter(|(trigger, tbl)| tbl == &name && !excluded(trigger))
            .map(|(trigger, _)| trigger.clone())
            .collect();
        schema.tables.push(table);
    }

    Ok(schema)
}

fn parse_table(
    conn: &Connection,
    name: &str,
    creation_sql: Option<&str>,
) -> Result<ParsedTable, SyncError> {
    let mut stmt = conn.prepare(&queries::table_info(name))?;
    let raw_columns: Vec<RawColumnInfo> = stmt
        .query_map([], |row| {
            Ok(RawColumnInfo {
                name: row.get(1)?,
                declared_type: row.get(2)?,
                not_null: row.get(3)?,
                default_value: row.get(4)?,
                pk: row.get(5)?,
            })
        })?
        .collect::<Result<_, _>>()?;

    if raw_columns.is_empty() {
        return Err(SyncError::Introspection {
            table: name.to_string(),
            message: "catalog lists the table but table_info returned no columns".to_string(),
        });
    }

    let increment_column = creation_sql
        .and_then(parse_autoincrement_column)
        .filter(|col| raw_columns.iter().any(|c| &c.name == col));

    let columns: Vec<ParsedColumn> = raw_columns
        .iter()
        .map(|c| ParsedColumn {
            name: c.name.clone(),
            physical: PhysicalType::from_declared(&c.declared_type),
            not_null: c.not_null,
            default: c.default_value.clone(),
        })
        .collect();

    // Primary key columns in key order, minus the increment column which is
    // tracked separately (it cannot be dropped or altered like an ordinary
    // key column).
    let mut pk_ordered: Vec<(i32, String)> = raw_columns
        .iter()
        .filter(|c| c.pk > 0)
        .map(|c| (c.pk, c.name.clone()))
        .collect();
    pk_ordered.sort_by_key(|(ordinal, _)| *ordinal);
    let primary_key: Vec<String> = pk_ordered
        .into_iter()
        .map(|(_, name)| name)
        .filter(|c| increment_column.as_deref() != Some(c.as_str()))
        .collect();

    let mut stmt = conn.prepare(&queries::index_list(name))?;
    let raw_indexes: Vec<RawIndexInfo> = stmt
        .query_map([], |row| {
            Ok(RawIndexInfo {
                name: row.get(1)?,
                origin: row.get(3)?,
            })
        })?
        .collect::<Result<_, _>>()?;

    let mut uniques = Vec::new();
    let mut indexes = Vec::new();
    for raw in &raw_indexes {
        // 'pk' indexes are implied by the primary key already captured above
        if raw.origin != "c" && raw.origin != "u" {
            continue;
        }
        let mut stmt = conn.prepare(&queries::index_info(&raw.name))?;
        let mut cols: Vec<(i32, String)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(2)?)))?
            .collect::<Result<_, _>>()?;
        cols.sort_by_key(|(seqno, _)| *seqno);
        let parsed = ParsedIndex {
            name: raw.name.clone(),
            columns: cols.into_iter().map(|(_, c)| c).collect(),
        };
        if raw.origin == "u" {
            uniques.push(parsed);
        } else {
            indexes.push(parsed);
        }
    }

    Ok(ParsedTable {
        name: name.to_string(),
        columns,
        primary_key,
        uniques,
        indexes,
        triggers: Vec::new(),
        increment_column,
    })
}

/// Find the AUTOINCREMENT column in a CREATE TABLE statement, if any.
/// Tolerant of the common quoting styles; not a full DDL parser.
pub fn parse_autoincrement_column(sql: &str) -> Option<String> {
    let sql = sql.trim();
    let start = sql.find('(')?;

    let mut depth = 0i32;
    let mut end = None;
    for (i, ch) in sql[start..].char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    end = Some(start + i);
                    break;
                }
            }
            _ => {}
        }
    }
    let body = &sql[start + 1..end?];

    // Split on top-level commas (ignore commas inside parentheses).
    let mut parts: Vec<&str> = Vec::new();
    let mut part_start = 0usize;
    let mut p_depth = 0i32;
    for (i, ch) in body.char_indices() {
        match ch {
            '(' => p_depth += 1,
            ')' => p_depth -= 1,
            ',' if p_depth == 0 => {
                parts.push(body[part_start..i].trim());
                part_start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(body[part_start..].trim());

    for item in parts {
        let upper = item.to_uppercase();
        if upper.starts_with("CONSTRAINT ")
            || upper.starts_with("PRIMARY ")
            || upper.starts_with("UNIQUE ")
            || upper.starts_with("CHECK ")
            || upper.starts_with("FOREIGN ")
        {
            continue;
        }
        if !upper.contains("AUTOINCREMENT") {
            continue;
        }

        // First token is the column name, possibly quoted.
        let rest = item.trim();
        if let Some(r) = rest.strip_prefix('"') {
            if let Some(endq) = r.find('"') {
                return Some(r[..endq].to_string());
            }
        } else if let Some(r) = rest.strip_prefix('`') {
            if let Some(endq) = r.find('`') {
                return Some(r[..endq].to_string());
            }
        } else if let Some(r) = rest.strip_prefix('[') {
            if let Some(endq) = r.find(']') {
                return Some(r[..endq].to_string());
            }
        } else if let Some(name) = rest.split_whitespace().next() {
            return Some(name.to_string());
        }
    }

    None
}
