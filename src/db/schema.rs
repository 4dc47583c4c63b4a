//! Schema assembly from catalog rows.
//!
//! Relational adapters read three flat result sets from the system catalogs
//! (tables, columns, primary keys) and hand them here to build a `Schema`.
//! Tables keep catalog order, columns keep ordinal order.

use crate::models::{Column, Schema, Table};
use std::collections::{HashMap, HashSet};

/// Key identifying a column across catalog queries.
type ColumnKey = (Option<String>, String, String);

/// One row of a columns catalog query.
#[derive(Debug, Clone)]
pub(crate) struct CatalogColumn {
    pub namespace: Option<String>,
    pub table: String,
    pub column: Column,
}

/// Collects catalog rows and joins them into a `Schema`.
#[derive(Debug, Default)]
pub(crate) struct SchemaBuilder {
    tables: Vec<Table>,
    columns: Vec<CatalogColumn>,
    primary_keys: HashSet<ColumnKey>,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&mut self, namespace: Option<String>, name: String, row_count: Option<u64>) {
        let mut table = Table::new(name, namespace);
        table.row_count = row_count;
        self.tables.push(table);
    }

    pub fn column(&mut self, namespace: Option<String>, table: String, column: Column) {
        self.columns.push(CatalogColumn {
            namespace,
            table,
            column,
        });
    }

    pub fn primary_key(&mut self, namespace: Option<String>, table: String, column: String) {
        self.primary_keys.insert((namespace, table, column));
    }

    /// Join columns to tables and flag primary keys.
    ///
    /// Columns whose table is missing from the tables list are dropped.
    pub fn build(self) -> Schema {
        let mut by_table: HashMap<(Option<String>, String), Vec<Column>> = HashMap::new();
        for entry in self.columns {
            let key = (
                entry.namespace.clone(),
                entry.table.clone(),
                entry.column.name.clone(),
            );
            let is_pk = self.primary_keys.contains(&key);
            by_table
                .entry((entry.namespace, entry.table))
                .or_default()
                .push(entry.column.primary_key(is_pk));
        }

        let tables = self
            .tables
            .into_iter()
            .map(|mut table| {
                if let Some(columns) = by_table.remove(&(table.namespace.clone(), table.name.clone()))
                {
                    table.columns = columns;
                }
                table
            })
            .collect();

        Schema::new(tables)
    }
}

/// Quote an identifier with double quotes, doubling embedded quotes.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
