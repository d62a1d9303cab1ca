//! Column/table diffing and statement planning
//!
//! Given one introspected table and one target definition, decide whether an
//! in-place column add/drop suffices or the table must be rebuilt through
//! the create-copy-drop-rename sequence, and render the ordered statement
//! list. All comparisons are structural; nothing is inferred from heuristic
//! change flags.

use crate::introspect::{ParsedColumn, ParsedIndex, ParsedSchema, ParsedTable};
use crate::schema::{ColumnDef, ColumnKind, PhysicalType, Schema, TableDef};
use crate::statements::{self, RestoreEntry};
use std::collections::BTreeSet;

/// Context handed to a fallback function when a NOT NULL column must be
/// populated for rows that have no source value
#[derive(Debug)]
pub struct FallbackInfo<'a> {
    pub table: &'a str,
    pub column: &'a str,
    pub physical: PhysicalType,
}

/// Per-column fallback override. Returns a SQL literal.
pub type FallbackFn = dyn Fn(&FallbackInfo<'_>) -> String + Send + Sync;

/// Default fallback: `0` for numeric-rendered types, `'0'` for
/// text-rendered types
pub fn default_fallback(info: &FallbackInfo<'_>) -> String {
    if info.physical.is_numeric() {
        "0".to_string()
    } else {
        "'0'".to_string()
    }
}

/// The statement plan for one table pairing. Pre-statements (index and
/// trigger drops) are ordered before any table body alteration across the
/// whole run, so nothing references a structure that is about to change.
#[derive(Clone, Debug, Default)]
pub struct TablePlan {
    pub pre: Vec<String>,
    pub main: Vec<String>,
}

impl TablePlan {
    pub fn is_empty(&self) -> bool {
        self.pre.is_empty() && self.main.is_empty()
    }

    /// Flatten into the executable statement order
    pub fn into_statements(self) -> Vec<String> {
        let mut out = self.pre;
        out.extend(self.main);
        out
    }
}

/// What to do with one target column relative to the existing table
#[derive(Debug)]
enum ColumnAction<'a> {
    /// Present with identical physical type, not-null flag, and default
    Unchanged(&'a ColumnDef),
    /// Present but differs; forces a rebuild with a CAST expression
    Alter {
        target: &'a ColumnDef,
        needs_fallback: bool,
    },
    /// Absent; a plain ADD COLUMN suffices
    Add(&'a ColumnDef),
    /// Absent and not addable in place (NOT NULL without default, or a
    /// non-constant default); forces a rebuild
    AddViaRebuild {
        target: &'a ColumnDef,
        needs_fallback: bool,
    },
}

fn column_matches(existing: &ParsedColumn, target: &ColumnDef) -> bool {
    existing.physical == target.physical()
        && existing.not_null == target.not_null
        && existing.default == target.rendered_default()
}

fn classify<'a>(existing: &ParsedTable, target: &'a ColumnDef) -> ColumnAction<'a> {
    match existing.column(&target.name) {
        Some(current) => {
            if column_matches(current, target) {
                ColumnAction::Unchanged(target)
            } else {
                // No fallback needed when the source was already not-null or
                // the new column is nullable: a CAST copy cannot produce a
                // violating NULL.
                let needs_fallback = target.not_null && !current.not_null;
                ColumnAction::Alter {
                    target,
                    needs_fallback,
                }
            }
        }
        None => {
            if target.not_null && target.default.is_none() {
                ColumnAction::AddViaRebuild {
                    target,
                    needs_fallback: true,
                }
            } else if target.default.as_ref().is_some_and(|d| !d.is_constant()) {
                // ALTER TABLE ADD COLUMN rejects non-constant defaults
                ColumnAction::AddViaRebuild {
                    target,
                    needs_fallback: false,
                }
            } else {
                ColumnAction::Add(target)
            }
        }
    }
}

/// Order-insensitive tuple set for unique/index comparison. Order within a
/// tuple is insignificant for equality.
fn tuple_set(tuples: &[Vec<String>]) -> BTreeSet<Vec<String>> {
    tuples
        .iter()
        .map(|t| {
            let mut sorted = t.clone();
            sorted.sort();
            sorted
        })
        .collect()
}

fn parsed_tuple_set(indexes: &[ParsedIndex]) -> BTreeSet<Vec<String>> {
    let tuples: Vec<Vec<String>> = indexes.iter().map(|i| i.columns.clone()).collect();
    tuple_set(&tuples)
}

/// Target trigger names for a table: one update trigger when an
/// update-timestamp column is declared
fn target_triggers(target: &TableDef) -> Vec<String> {
    target
        .updated_at_column()
        .map(|c| statements::trigger_name(&target.name, &c.name))
        .into_iter()
        .collect()
}

/// Statements that create a table from scratch, with its indexes and
/// update trigger
pub fn create_table_plan(target: &TableDef) -> Vec<String> {
    let mut out = vec![statements::create_table(target)];
    for index in &target.indexes {
        out.push(statements::create_index(&target.name, index));
    }
    if let Some(col) = target.updated_at_column() {
        out.push(statements::create_update_trigger(target, col));
    }
    out
}

/// Diff one existing table against its target definition
pub fn diff_table(existing: &ParsedTable, target: &TableDef, fallback: &FallbackFn) -> TablePlan {
    // Primary key or unique-constraint-set changes cannot be applied in
    // place and force a full rebuild.
    let target_increment = target.increment_column().map(|c| c.name.clone());
    let existing_key = match &existing.increment_column {
        Some(col) => vec![col.clone()],
        None => existing.primary_key.clone(),
    };
    let key_changed = existing.increment_column != target_increment
        || existing_key != target.effective_primary_key();
    let unique_changed = parsed_tuple_set(&existing.uniques) != tuple_set(&target.uniques);

    let actions: Vec<ColumnAction<'_>> = target
        .columns
        .iter()
        .map(|col| {
            if col.kind == ColumnKind::Increment
                && existing.increment_column.as_deref() == Some(col.name.as_str())
            {
                // A matching increments column is never altered; it is
                // structurally pinned to the table.
                ColumnAction::Unchanged(col)
            } else {
                classify(existing, col)
            }
        })
        .collect();

    let rebuild = key_changed
        || unique_changed
        || actions.iter().any(|a| {
            matches!(
                a,
                ColumnAction::Alter { .. } | ColumnAction::AddViaRebuild { .. }
            )
        });

    let dropped: Vec<&ParsedColumn> = existing
        .columns
        .iter()
        .filter(|c| target.get(&c.name).is_none())
        .collect();

    if rebuild {
        rebuild_plan(existing, target, &actions, fallback)
    } else {
        incremental_plan(existing, target, &actions, &dropped)
    }
}

/// The create-copy-drop-rename sequence. Indexes and triggers are dropped
/// before the copy and recreated only after the rename.
fn rebuild_plan(
    existing: &ParsedTable,
    target: &TableDef,
    actions: &[ColumnAction<'_>],
    fallback: &FallbackFn,
) -> TablePlan {
    let mut plan = TablePlan::default();

    for index in &existing.indexes {
        plan.pre.push(statements::drop_index(&index.name));
    }
    for trigger in &existing.triggers {
        plan.pre.push(statements::drop_trigger(trigger));
    }

    let mut restores: Vec<RestoreEntry> = Vec::new();
    for action in actions {
        match action {
            ColumnAction::Unchanged(col) => {
                if existing.column(&col.name).is_some() {
                    restores.push(RestoreEntry {
                        column: col.name.clone(),
                        expression: statements::quote_ident(&col.name),
                    });
                }
            }
            ColumnAction::Alter {
                target: col,
                needs_fallback,
            } => {
                let cast = format!(
                    "CAST({} AS {})",
                    statements::quote_ident(&col.name),
                    col.physical().as_sql()
                );
                let expression = if *needs_fallback {
                    let literal = fallback(&FallbackInfo {
                        table: &target.name,
                        column: &col.name,
                        physical: col.physical(),
                    });
                    format!("IFNULL({cast}, {literal})")
                } else {
                    cast
                };
                restores.push(RestoreEntry {
                    column: col.name.clone(),
                    expression,
                });
            }
            ColumnAction::AddViaRebuild {
                target: col,
                needs_fallback: true,
            } => {
                // Rows copied from the original have no source value; the
                // fallback literal populates them.
                let literal = fallback(&FallbackInfo {
                    table: &target.name,
                    column: &col.name,
                    physical: col.physical(),
                });
                restores.push(RestoreEntry {
                    column: col.name.clone(),
                    expression: literal,
                });
            }
            // Columns with a usable default are omitted from the copy so
            // the default applies; dropped columns are simply not listed.
            ColumnAction::Add(_) | ColumnAction::AddViaRebuild { .. } => {}
        }
    }

    let temp = statements::temp_name(&target.name);
    plan.main.push(statements::create_table_as(target, &temp));
    if !restores.is_empty() {
        plan.main
            .push(statements::insert_select(&temp, &existing.name, &restores));
    }
    plan.main.push(statements::drop_table(&existing.name));
    plan.main.push(statements::rename_table(&temp, &target.name));
    for index in &target.indexes {
        plan.main.push(statements::create_index(&target.name, index));
    }
    if let Some(col) = target.updated_at_column() {
        plan.main.push(statements::create_update_trigger(target, col));
    }

    plan
}

/// In-place column adds/drops plus index and trigger maintenance by set
/// difference. Index drops are ordered before column drops so an index on a
/// column being dropped never survives it.
fn incremental_plan(
    existing: &ParsedTable,
    target: &TableDef,
    actions: &[ColumnAction<'_>],
    dropped: &[&ParsedColumn],
) -> TablePlan {
    let mut plan = TablePlan::default();

    let existing_tuples = parsed_tuple_set(&existing.indexes);
    let wanted_tuples = tuple_set(&target.indexes);

    for index in &existing.indexes {
        let mut sorted = index.columns.clone();
        sorted.sort();
        if !wanted_tuples.contains(&sorted) {
            plan.pre.push(statements::drop_index(&index.name));
        }
    }

    let wanted_triggers = target_triggers(target);
    for trigger in &existing.triggers {
        if !wanted_triggers.contains(trigger) {
            plan.pre.push(statements::drop_trigger(trigger));
        }
    }

    for action in actions {
        if let ColumnAction::Add(col) = action {
            plan.main.push(statements::add_column(&target.name, col));
        }
    }
    for col in dropped {
        plan.main
            .push(statements::drop_column(&existing.name, &col.name));
    }

    for index in &target.indexes {
        let mut sorted = index.clone();
        sorted.sort();
        if !existing_tuples.contains(&sorted) {
            plan.main.push(statements::create_index(&target.name, index));
        }
    }

    if let Some(col) = target.updated_at_column() {
        let name = statements::trigger_name(&target.name, &col.name);
        if !existing.triggers.contains(&name) {
            plan.main.push(statements::create_update_trigger(target, col));
        }
    }

    plan
}

/// Compute the ordered statement list for the whole run: index/trigger
/// drops for restructured tables first, then table drops, updates, and
/// creates.
pub fn plan_schema(
    existing: &ParsedSchema,
    target: &Schema,
    fallback: Option<&FallbackFn>,
    truncate: &dyn Fn(&str) -> bool,
) -> Result<Vec<String>, crate::error::SyncError> {
    target.validate()?;
    let fallback: &FallbackFn = match fallback {
        Some(f) => f,
        None => &default_fallback,
    };

    let mut pre = Vec::new();
    let mut drops = Vec::new();
    let mut updates = Vec::new();
    let mut creates = Vec::new();

    for table in &existing.tables {
        match target.get(&table.name) {
            None => drops.push(statements::drop_table(&table.name)),
            Some(def) if truncate(&table.name) => {
                // Forced truncate: drop and recreate empty, no diffing
                for index in &table.indexes {
                    pre.push(statements::drop_index(&index.name));
                }
                for trigger in &table.triggers {
                    pre.push(statements::drop_trigger(trigger));
                }
                drops.push(statements::drop_table(&table.name));
                creates.extend(create_table_plan(def));
            }
            Some(def) => {
                let plan = diff_table(table, def, fallback);
                pre.extend(plan.pre);
                updates.extend(plan.main);
            }
        }
    }

    for def in target.tables() {
        if existing.get(&def.name).is_none() {
            creates.extend(create_table_plan(def));
        }
    }

    let mut out = pre;
    out.extend(drops);
    out.extend(updates);
    out.extend(creates);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnDef, DataType, DefaultValue};

    fn existing_users() -> ParsedTable {
        ParsedTable {
            name: "t".to_string(),
            columns: vec![ParsedColumn {
                name: "id".to_string(),
                physical: PhysicalType::Integer,
                not_null: false,
                default: None,
            }],
            primary_key: Vec::new(),
            uniques: Vec::new(),
            indexes: Vec::new(),
            triggers: Vec::new(),
            increment_column: Some("id".to_string()),
        }
    }

    #[test]
    fn test_add_column_is_single_alter() {
        let target = TableDef::new("t")
            .column(ColumnDef::new("id", DataType::Increments))
            .column(ColumnDef::new("name", DataType::String));

        let plan = diff_table(&existing_users(), &target, &default_fallback);
        assert_eq!(
            plan.into_statements(),
            vec!["ALTER TABLE \"t\" ADD COLUMN \"name\" TEXT;".to_string()]
        );
    }

    #[test]
    fn test_unchanged_table_plans_nothing() {
        let target = TableDef::new("t").column(ColumnDef::new("id", DataType::Increments));
        let plan = diff_table(&existing_users(), &target, &default_fallback);
        assert!(plan.is_empty());
    }

    #[test]
    fn test_drop_column_is_single_alter() {
        let mut existing = existing_users();
        existing.columns.push(ParsedColumn {
            name: "name".to_string(),
            physical: PhysicalType::Text,
            not_null: false,
            default: None,
        });
        let target = TableDef::new("t").column(ColumnDef::new("id", DataType::Increments));

        let plan = diff_table(&existing, &target, &default_fallback);
        assert_eq!(
            plan.into_statements(),
            vec!["ALTER TABLE \"t\" DROP COLUMN \"name\";".to_string()]
        );
    }

    #[test]
    fn test_primary_key_change_forces_rebuild() {
        let existing = ParsedTable {
            name: "t".to_string(),
            columns: vec![
                ParsedColumn {
                    name: "id".to_string(),
                    physical: PhysicalType::Integer,
                    not_null: true,
                    default: None,
                },
                ParsedColumn {
                    name: "name".to_string(),
                    physical: PhysicalType::Text,
                    not_null: true,
                    default: None,
                },
            ],
            primary_key: vec!["id".to_string()],
            ..ParsedTable::default()
        };
        let target = TableDef::new("t")
            .column(ColumnDef::new("id", DataType::Int).not_null())
            .column(ColumnDef::new("name", DataType::String).not_null())
            .primary_key(["id", "name"]);

        let statements = diff_table(&existing, &target, &default_fallback).into_statements();
        assert!(statements[0].starts_with("CREATE TABLE \"_temp_t\""), "{statements:?}");
        assert_eq!(
            statements[1],
            "INSERT INTO \"_temp_t\" (\"id\",\"name\") SELECT \"id\",\"name\" FROM \"t\";"
        );
        assert_eq!(statements[2], "DROP TABLE \"t\";");
        assert_eq!(statements[3], "ALTER TABLE \"_temp_t\" RENAME TO \"t\";");
    }

    #[test]
    fn test_unique_set_change_forces_rebuild_even_without_column_changes() {
        let existing = ParsedTable {
            name: "t".to_string(),
            columns: vec![ParsedColumn {
                name: "email".to_string(),
                physical: PhysicalType::Text,
                not_null: false,
                default: None,
            }],
            ..ParsedTable::default()
        };
        let target = TableDef::new("t")
            .column(ColumnDef::new("email", DataType::String))
            .unique(["email"]);

        let statements = diff_table(&existing, &target, &default_fallback).into_statements();
        assert!(statements[0].starts_with("CREATE TABLE \"_temp_t\""), "{statements:?}");
        assert!(
            statements[0].contains("CONSTRAINT \"unique_t_email\" UNIQUE (\"email\")"),
            "{statements:?}"
        );
    }

    #[test]
    fn test_not_null_add_without_default_uses_fallback() {
        let target = TableDef::new("t")
            .column(ColumnDef::new("id", DataType::Increments))
            .column(ColumnDef::new("count", DataType::Int).not_null());

        let statements = diff_table(&existing_users(), &target, &default_fallback).into_statements();
        let copy = statements
            .iter()
            .find(|s| s.starts_with("INSERT INTO"))
            .expect("copy statement");
        assert_eq!(
            copy,
            "INSERT INTO \"_temp_t\" (\"id\",\"count\") SELECT \"id\",0 FROM \"t\";"
        );
    }

    #[test]
    fn test_nullable_to_not_null_wraps_cast_in_ifnull() {
        let existing = ParsedTable {
            name: "t".to_string(),
            columns: vec![ParsedColumn {
                name: "age".to_string(),
                physical: PhysicalType::Text,
                not_null: false,
                default: None,
            }],
            ..ParsedTable::default()
        };
        let target = TableDef::new("t").column(ColumnDef::new("age", DataType::Int).not_null());

        let statements = diff_table(&existing, &target, &default_fallback).into_statements();
        let copy = statements
            .iter()
            .find(|s| s.starts_with("INSERT INTO"))
            .expect("copy statement");
        assert!(copy.contains("IFNULL(CAST(\"age\" AS INTEGER), 0)"), "{copy}");
    }

    #[test]
    fn test_not_null_source_casts_without_fallback() {
        let existing = ParsedTable {
            name: "t".to_string(),
            columns: vec![ParsedColumn {
                name: "age".to_string(),
                physical: PhysicalType::Text,
                not_null: true,
                default: None,
            }],
            ..ParsedTable::default()
        };
        let target = TableDef::new("t").column(ColumnDef::new("age", DataType::Int).not_null());

        let statements = diff_table(&existing, &target, &default_fallback).into_statements();
        let copy = statements
            .iter()
            .find(|s| s.starts_with("INSERT INTO"))
            .expect("copy statement");
        assert!(copy.contains("CAST(\"age\" AS INTEGER)"), "{copy}");
        assert!(!copy.contains("IFNULL"), "{copy}");
    }

    #[test]
    fn test_custom_fallback_is_threaded_through() {
        let target = TableDef::new("t")
            .column(ColumnDef::new("id", DataType::Increments))
            .column(ColumnDef::new("label", DataType::String).not_null());

        let fallback = |info: &FallbackInfo<'_>| {
            assert_eq!(info.table, "t");
            assert_eq!(info.column, "label");
            "'unknown'".to_string()
        };
        let statements = diff_table(&existing_users(), &target, &fallback).into_statements();
        let copy = statements
            .iter()
            .find(|s| s.starts_with("INSERT INTO"))
            .expect("copy statement");
        assert!(copy.contains("SELECT \"id\",'unknown' FROM"), "{copy}");
    }

    #[test]
    fn test_timestamp_addition_forces_rebuild() {
        // ALTER TABLE ADD COLUMN cannot carry DEFAULT CURRENT_TIMESTAMP
        let target = TableDef::new("t")
            .column(ColumnDef::new("id", DataType::Increments))
            .created_at("created_at");

        let statements = diff_table(&existing_users(), &target, &default_fallback).into_statements();
        assert!(statements[0].starts_with("CREATE TABLE \"_temp_t\""), "{statements:?}");
        // created_at is omitted from the copy so its default applies
        assert_eq!(
            statements[1],
            "INSERT INTO \"_temp_t\" (\"id\") SELECT \"id\" FROM \"t\";"
        );
    }

    #[test]
    fn test_index_drop_ordered_before_column_drop() {
        let mut existing = existing_users();
        existing.columns.push(ParsedColumn {
            name: "name".to_string(),
            physical: PhysicalType::Text,
            not_null: false,
            default: None,
        });
        existing.indexes.push(ParsedIndex {
            name: "index_t_name".to_string(),
            columns: vec!["name".to_string()],
        });
        let target = TableDef::new("t").column(ColumnDef::new("id", DataType::Increments));

        let statements = diff_table(&existing, &target, &default_fallback).into_statements();
        assert_eq!(statements[0], "DROP INDEX \"index_t_name\";");
        assert_eq!(statements[1], "ALTER TABLE \"t\" DROP COLUMN \"name\";");
    }

    #[test]
    fn test_index_matching_is_tuple_order_insensitive() {
        let mut existing = existing_users();
        existing.columns.push(ParsedColumn {
            name: "a".to_string(),
            physical: PhysicalType::Text,
            not_null: false,
            default: None,
        });
        existing.columns.push(ParsedColumn {
            name: "b".to_string(),
            physical: PhysicalType::Text,
            not_null: false,
            default: None,
        });
        existing.indexes.push(ParsedIndex {
            name: "custom_name".to_string(),
            columns: vec!["b".to_string(), "a".to_string()],
        });
        let target = TableDef::new("t")
            .column(ColumnDef::new("id", DataType::Increments))
            .column(ColumnDef::new("a", DataType::String))
            .column(ColumnDef::new("b", DataType::String))
            .index(["a", "b"]);

        let plan = diff_table(&existing, &target, &default_fallback);
        assert!(plan.is_empty(), "{:?}", plan.into_statements());
    }

    #[test]
    fn test_plan_schema_orders_drops_updates_creates() {
        let existing = ParsedSchema {
            tables: vec![
                ParsedTable {
                    name: "old".to_string(),
                    columns: vec![ParsedColumn {
                        name: "id".to_string(),
                        physical: PhysicalType::Integer,
                        not_null: false,
                        default: None,
                    }],
                    ..ParsedTable::default()
                },
                existing_users(),
            ],
        };
        let target = Schema::new()
            .table(
                TableDef::new("t")
                    .column(ColumnDef::new("id", DataType::Increments))
                    .column(ColumnDef::new("name", DataType::String)),
            )
            .table(TableDef::new("fresh").column(ColumnDef::new("id", DataType::Increments)));

        let statements = plan_schema(&existing, &target, None, &|_| false).unwrap();
        assert_eq!(
            statements,
            vec![
                "DROP TABLE \"old\";".to_string(),
                "ALTER TABLE \"t\" ADD COLUMN \"name\" TEXT;".to_string(),
                "CREATE TABLE \"fresh\" (\"id\" INTEGER PRIMARY KEY AUTOINCREMENT);".to_string(),
            ]
        );
    }

    #[test]
    fn test_plan_schema_truncate_recreates_empty() {
        let existing = ParsedSchema {
            tables: vec![existing_users()],
        };
        let target =
            Schema::new().table(TableDef::new("t").column(ColumnDef::new("id", DataType::Increments)));

        let statements = plan_schema(&existing, &target, None, &|name| name == "t").unwrap();
        assert_eq!(
            statements,
            vec![
                "DROP TABLE \"t\";".to_string(),
                "CREATE TABLE \"t\" (\"id\" INTEGER PRIMARY KEY AUTOINCREMENT);".to_string(),
            ]
        );
    }

    #[test]
    fn test_definition_error_short_circuits_planning() {
        let target = Schema::new().table(
            TableDef::new("t")
                .column(ColumnDef::new("a", DataType::Increments))
                .column(ColumnDef::new("b", DataType::Increments)),
        );
        let err = plan_schema(&ParsedSchema::default(), &target, None, &|_| false).unwrap_err();
        assert!(matches!(err, crate::error::SyncError::Definition(_)));
    }

    #[test]
    fn test_changed_default_forces_rebuild() {
        let existing = ParsedTable {
            name: "t".to_string(),
            columns: vec![ParsedColumn {
                name: "state".to_string(),
                physical: PhysicalType::Text,
                not_null: false,
                default: Some("'new'".to_string()),
            }],
            ..ParsedTable::default()
        };
        let target = TableDef::new("t").column(
            ColumnDef::new("state", DataType::String)
                .default_value(DefaultValue::Text("open".into())),
        );

        let statements = diff_table(&existing, &target, &default_fallback).into_statements();
        assert!(statements[0].starts_with("CREATE TABLE \"_temp_t\""), "{statements:?}");
        assert!(statements[0].contains("DEFAULT 'open'"), "{statements:?}");
    }
}
