//! Schema introspection handler.

use crate::db::AdapterRegistry;
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionConfig, Schema, SchemaSummary};
use crate::tools::flow::with_adapter;
use serde::Serialize;
use std::sync::Arc;
use tracing::info;

/// Schema plus totals, as returned to the client.
#[derive(Debug, Clone, Serialize)]
pub struct SchemaOutput {
    #[serde(flatten)]
    pub schema: Schema,
    pub summary: SchemaSummary,
}

impl From<Schema> for SchemaOutput {
    fn from(schema: Schema) -> Self {
        let summary = schema.summary();
        Self { schema, summary }
    }
}

#[derive(Debug, Clone)]
pub struct SchemaToolHandler {
    registry: Arc<AdapterRegistry>,
}

impl SchemaToolHandler {
    pub fn new(registry: Arc<AdapterRegistry>) -> Self {
        Self { registry }
    }

    /// Fetch tables and columns for the connected database.
    pub async fn schema(&self, config: &ConnectionConfig) -> DbResult<SchemaOutput> {
        let schema = with_adapter(&self.registry, config, |adapter| {
            Box::pin(async move { adapter.get_schema().await })
        })
        .await?;

        let output = SchemaOutput::from(Arc::unwrap_or_clone(schema));
        info!(
            db_type = %config.db_type,
            table_count = output.summary.table_count,
            column_count = output.summary.column_count,
            "Schema fetched"
        );
        Ok(output)
    }

    /// Schema and its plain-text rendering for prompting, from one fetch.
    pub async fn schema_with_context(
        &self,
        config: &ConnectionConfig,
    ) -> DbResult<(Arc<Schema>, String)> {
        with_adapter(&self.registry, config, |adapter| {
            Box::pin(async move {
                let schema = adapter.get_schema().await?;
                let context = adapter.get_schema_context().await?;
                Ok::<_, DbError>((schema, context))
            })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Column, Table};

    #[test]
    fn test_schema_output_serialization() {
        let mut table = Table::new("employees", None);
        table.columns = vec![
            Column::new("id", "INTEGER", false).primary_key(true),
            Column::new("name", "TEXT", true),
        ];
        let output = SchemaOutput::from(Schema::new(vec![table]));

        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["tables"][0]["name"], "employees");
        assert_eq!(json["summary"]["table_count"], 1);
        assert_eq!(json["summary"]["column_count"], 2);
    }
}
