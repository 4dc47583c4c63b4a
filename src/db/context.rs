//! Plain-text schema rendering fed to the completion API.

use crate::models::{DatabaseType, Schema, Table};
use std::fmt::Write;

/// Render the schema as deterministic text.
///
/// ```text
/// Table: employees
///   id INTEGER PRIMARY KEY NOT NULL
///   name TEXT NOT NULL
///
/// Table: sales.orders
///   ...
/// ```
pub fn render_schema_context(schema: &Schema, db_type: DatabaseType) -> String {
    schema
        .tables
        .iter()
        .map(|table| render_table(table, db_type))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn render_table(table: &Table, db_type: DatabaseType) -> String {
    let mut out = if db_type.is_document() {
        format!(
            "Collection: {} ({} documents)",
            table.display_name(),
            table.row_count.unwrap_or(0)
        )
    } else {
        format!("Table: {}", table.display_name())
    };

    for column in &table.columns {
        let _ = write!(out, "\n  {} {}", column.name, column.data_type);
        if column.is_primary_key {
            out.push_str(" PRIMARY KEY");
        }
        if !column.nullable {
            out.push_str(" NOT NULL");
        }
    }
    out
}
