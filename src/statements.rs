//! SQL statement rendering
//!
//! Pure functions from table/column/index/trigger descriptions to literal
//! DDL/DML strings. Rendering is deterministic: identical inputs always
//! produce byte-identical SQL, which is what makes repeated synchronization
//! runs idempotent.

use crate::schema::{ColumnDef, ColumnKind, TableDef};

/// Quote an identifier, doubling embedded quotes
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Temporary table name used during a rebuild
pub fn temp_name(table: &str) -> String {
    format!("_temp_{table}")
}

/// Deterministic index name: table and column names joined by underscores
pub fn index_name(table: &str, columns: &[String]) -> String {
    format!("index_{}_{}", table, columns.join("_"))
}

/// Deterministic name for the update-timestamp trigger
pub fn trigger_name(table: &str, column: &str) -> String {
    format!("trigger_{table}_{column}")
}

/// Deterministic unique-constraint name
pub fn unique_name(table: &str, columns: &[String]) -> String {
    format!("unique_{}_{}", table, columns.join("_"))
}

/// How to populate one column of the rebuilt table from the original.
/// Computed once per rebuild and consumed by [`insert_select`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RestoreEntry {
    /// Target column name
    pub column: String,
    /// Source expression evaluated against the original table
    pub expression: String,
}

/// Render one column definition fragment
pub fn render_column(column: &ColumnDef) -> String {
    match column.kind {
        ColumnKind::Increment => {
            format!("{} INTEGER PRIMARY KEY AUTOINCREMENT", quote_ident(&column.name))
        }
        ColumnKind::CreatedAt | ColumnKind::UpdatedAt => {
            format!("{} TEXT DEFAULT CURRENT_TIMESTAMP", quote_ident(&column.name))
        }
        ColumnKind::Plain | ColumnKind::SoftDelete => {
            let mut sql = format!("{} {}", quote_ident(&column.name), column.physical().as_sql());
            if column.not_null {
                sql.push_str(" NOT NULL");
            }
            if let Some(default) = column.rendered_default() {
                sql.push_str(" DEFAULT ");
                sql.push_str(&default);
            }
            sql
        }
    }
}

/// Render a CREATE TABLE statement for the target definition
pub fn create_table(table: &TableDef) -> String {
    create_table_as(table, &table.name)
}

/// Render a CREATE TABLE statement under an explicit name (used for the
/// temporary table during a rebuild)
pub fn create_table_as(table: &TableDef, name: &str) -> String {
    let mut parts: Vec<String> = table.columns.iter().map(render_column).collect();

    // An increments column is implicitly the primary key and suppresses the
    // separate PRIMARY KEY clause.
    if table.increment_column().is_none() && !table.primary_key.is_empty() {
        parts.push(format!(
            "PRIMARY KEY ({})",
            table
                .primary_key
                .iter()
                .map(|c| quote_ident(c))
                .collect::<Vec<_>>()
                .join(",")
        ));
    }

    for unique in &table.uniques {
        parts.push(format!(
            "CONSTRAINT {} UNIQUE ({})",
            quote_ident(&unique_name(&table.name, unique)),
            unique
                .iter()
                .map(|c| quote_ident(c))
                .collect::<Vec<_>>()
                .join(",")
        ));
    }

    format!("CREATE TABLE {} ({});", quote_ident(name), parts.join(", "))
}

pub fn drop_table(name: &str) -> String {
    format!("DROP TABLE {};", quote_ident(name))
}

pub fn rename_table(from: &str, to: &str) -> String {
    format!("ALTER TABLE {} RENAME TO {};", quote_ident(from), quote_ident(to))
}

pub fn add_column(table: &str, column: &ColumnDef) -> String {
    format!(
        "ALTER TABLE {} ADD COLUMN {};",
        quote_ident(table),
        render_column(column)
    )
}

pub fn drop_column(table: &str, column: &str) -> String {
    format!(
        "ALTER TABLE {} DROP COLUMN {};",
        quote_ident(table),
        quote_ident(column)
    )
}

/// Render a CREATE INDEX statement with the deterministic index name
pub fn create_index(table: &str, columns: &[String]) -> String {
    format!(
        "CREATE INDEX {} ON {} ({});",
        quote_ident(&index_name(table, columns)),
        quote_ident(table),
        columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(",")
    )
}

pub fn drop_index(name: &str) -> String {
    format!("DROP INDEX {};", quote_ident(name))
}

pub fn drop_trigger(name: &str) -> String {
    format!("DROP TRIGGER {};", quote_ident(name))
}

/// Render the AFTER UPDATE trigger that maintains an update-timestamp
/// column. Rows are keyed by the increments column when the table has one,
/// else by rowid.
pub fn create_update_trigger(table: &TableDef, column: &ColumnDef) -> String {
    let key = match table.increment_column() {
        Some(inc) => format!("{key} = NEW.{key}", key = quote_ident(&inc.name)),
        None => "rowid = NEW.rowid".to_string(),
    };
    format!(
        "CREATE TRIGGER {trigger} AFTER UPDATE ON {table} FOR EACH ROW \
         BEGIN UPDATE {table} SET {column} = CURRENT_TIMESTAMP WHERE {key}; END;",
        trigger = quote_ident(&trigger_name(&table.name, &column.name)),
        table = quote_ident(&table.name),
        column = quote_ident(&column.name),
        key = key,
    )
}

/// Render the data-copy statement of a rebuild
pub fn insert_select(target: &str, source: &str, restores: &[RestoreEntry]) -> String {
    let columns = restores
        .iter()
        .map(|r| quote_ident(&r.column))
        .collect::<Vec<_>>()
        .join(",");
    let expressions = restores
        .iter()
        .map(|r| r.expression.clone())
        .collect::<Vec<_>>()
        .join(",");
    format!(
        "INSERT INTO {} ({}) SELECT {} FROM {};",
        quote_ident(target),
        columns,
        expressions,
        quote_ident(source)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ColumnDef, DataType, DefaultValue};

    #[test]
    fn test_render_increments_column() {
        let col = ColumnDef::new("id", DataType::Increments);
        assert_eq!(render_column(&col), "\"id\" INTEGER PRIMARY KEY AUTOINCREMENT");
    }

    #[test]
    fn test_render_plain_column_with_default() {
        let col = ColumnDef::new("name", DataType::String)
            .not_null()
            .default_value(DefaultValue::Text("anon".into()));
        assert_eq!(render_column(&col), "\"name\" TEXT NOT NULL DEFAULT 'anon'");
    }

    #[test]
    fn test_render_timestamp_column() {
        let col = ColumnDef::updated_at("updated_at");
        assert_eq!(
            render_column(&col),
            "\"updated_at\" TEXT DEFAULT CURRENT_TIMESTAMP"
        );
    }

    #[test]
    fn test_create_table_suppresses_pk_clause_for_increments() {
        let table = TableDef::new("t")
            .column(ColumnDef::new("id", DataType::Increments))
            .column(ColumnDef::new("name", DataType::String));
        let sql = create_table(&table);
        assert_eq!(
            sql,
            "CREATE TABLE \"t\" (\"id\" INTEGER PRIMARY KEY AUTOINCREMENT, \"name\" TEXT);"
        );
    }

    #[test]
    fn test_create_table_composite_pk_and_unique() {
        let table = TableDef::new("t")
            .column(ColumnDef::new("a", DataType::Int).not_null())
            .column(ColumnDef::new("b", DataType::String).not_null())
            .primary_key(["a", "b"])
            .unique(["b"]);
        let sql = create_table(&table);
        assert!(sql.contains("PRIMARY KEY (\"a\",\"b\")"), "{sql}");
        assert!(sql.contains("CONSTRAINT \"unique_t_b\" UNIQUE (\"b\")"), "{sql}");
    }

    #[test]
    fn test_add_column() {
        let sql = add_column("t", &ColumnDef::new("name", DataType::String));
        assert_eq!(sql, "ALTER TABLE \"t\" ADD COLUMN \"name\" TEXT;");
    }

    #[test]
    fn test_drop_column() {
        assert_eq!(
            drop_column("t", "name"),
            "ALTER TABLE \"t\" DROP COLUMN \"name\";"
        );
    }

    #[test]
    fn test_create_index_name_is_deterministic() {
        let cols = vec!["a".to_string(), "b".to_string()];
        let sql = create_index("t", &cols);
        assert_eq!(sql, "CREATE INDEX \"index_t_a_b\" ON \"t\" (\"a\",\"b\");");
    }

    #[test]
    fn test_update_trigger_keys_by_increment_column() {
        let table = TableDef::new("t")
            .column(ColumnDef::new("id", DataType::Increments))
            .updated_at("updated_at");
        let trigger = create_update_trigger(&table, table.updated_at_column().unwrap());
        assert!(trigger.contains("AFTER UPDATE ON \"t\""), "{trigger}");
        assert!(trigger.contains("WHERE \"id\" = NEW.\"id\""), "{trigger}");
    }

    #[test]
    fn test_update_trigger_falls_back_to_rowid() {
        let table = TableDef::new("t")
            .column(ColumnDef::new("k", DataType::String))
            .updated_at("updated_at");
        let trigger = create_update_trigger(&table, table.updated_at_column().unwrap());
        assert!(trigger.contains("WHERE rowid = NEW.rowid"), "{trigger}");
    }

    #[test]
    fn test_insert_select() {
        let restores = vec![
            RestoreEntry {
                column: "id".into(),
                expression: "\"id\"".into(),
            },
            RestoreEntry {
                column: "age".into(),
                expression: "IFNULL(CAST(\"age\" AS INTEGER), 0)".into(),
            },
        ];
        assert_eq!(
            insert_select("_temp_t", "t", &restores),
            "INSERT INTO \"_temp_t\" (\"id\",\"age\") SELECT \"id\",IFNULL(CAST(\"age\" AS INTEGER), 0) FROM \"t\";"
        );
    }
}
