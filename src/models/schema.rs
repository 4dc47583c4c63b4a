//! Schema-related data models.
//!
//! A backend-neutral snapshot of tables (or collections) and their columns.

use serde::{Deserialize, Serialize};

/// Column definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    /// Backend-native type name
    pub data_type: String,
    pub nullable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    pub is_primary_key: bool,
}

impl Column {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable,
            default_value: None,
            is_primary_key: false,
        }
    }

    pub fn with_default(mut self, default_value: Option<String>) -> Self {
        self.default_value = default_value;
        self
    }

    pub fn primary_key(mut self, is_primary_key: bool) -> Self {
        self.is_primary_key = is_primary_key;
        self
    }
}

/// Table or collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub name: String,
    /// Schema/database the table lives in, when the backend has one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    pub columns: Vec<Column>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<u64>,
}

impl Table {
    pub fn new(name: impl Into<String>, namespace: Option<String>) -> Self {
        Self {
            name: name.into(),
            namespace,
            columns: Vec::new(),
            row_count: None,
        }
    }

    /// Name qualified with its namespace unless the namespace is one of the
    /// backend defaults.
    pub fn display_name(&self) -> String {
        match self.namespace.as_deref() {
            Some(ns) if !is_default_namespace(ns) => format!("{}.{}", ns, self.name),
            _ => self.name.clone(),
        }
    }

    pub fn primary_keys(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| c.is_primary_key)
    }
}

/// Namespaces that are implied when unqualified.
pub fn is_default_namespace(namespace: &str) -> bool {
    matches!(
        namespace.to_lowercase().as_str(),
        "public" | "dbo" | "main"
    )
}

/// Full schema of a connected database.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    pub tables: Vec<Table>,
}

impl Schema {
    pub fn new(tables: Vec<Table>) -> Self {
        Self { tables }
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    pub fn column_count(&self) -> usize {
        self.tables.iter().map(|t| t.columns.len()).sum()
    }

    /// Find a table by name, case-insensitively; accepts `namespace.name`.
    pub fn find_table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| {
            t.name.eq_ignore_ascii_case(name) || t.display_name().eq_ignore_ascii_case(name)
        })
    }

    pub fn summary(&self) -> SchemaSummary {
        SchemaSummary {
            table_count: self.table_count(),
            column_count: self.column_count(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaSummary {
    pub table_count: usize,
    pub column_count: usize,
}
