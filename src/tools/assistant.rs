//! Assistant handlers: generate, fix, explain and chart.
//!
//! Generation and fixing need the live schema, so they open an adapter for
//! the duration of the schema fetch and close it before calling the model.

use crate::error::DbResult;
use crate::llm::{ChartSuggestion, GeneratedSql, SqlAssistant};
use crate::models::{ChartRequest, ConnectionConfig, ExplainRequest, FixRequest, GenerateRequest};
use crate::tools::schema::SchemaToolHandler;
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Serialize)]
pub struct ExplainOutput {
    pub explanation: String,
}

#[derive(Clone)]
pub struct AssistantToolHandler {
    schema: SchemaToolHandler,
    assistant: SqlAssistant,
}

impl AssistantToolHandler {
    pub fn new(schema: SchemaToolHandler, assistant: SqlAssistant) -> Self {
        Self { schema, assistant }
    }

    pub async fn generate(
        &self,
        config: &ConnectionConfig,
        request: GenerateRequest,
    ) -> DbResult<GeneratedSql> {
        let (schema, context) = self.schema.schema_with_context(config).await?;
        let generated = self
            .assistant
            .generate_sql(&request.question, &context, config.db_type)
            .await?;
        info!(
            db_type = %config.db_type,
            tables = schema.table_count(),
            has_warning = generated.warning.is_some(),
            "Query generated"
        );
        Ok(generated)
    }

    pub async fn fix(
        &self,
        config: &ConnectionConfig,
        request: FixRequest,
    ) -> DbResult<GeneratedSql> {
        let (_, context) = self.schema.schema_with_context(config).await?;
        let fixed = self
            .assistant
            .fix_sql(&request.sql, &request.error, &context, config.db_type)
            .await?;
        info!(db_type = %config.db_type, "Query fixed");
        Ok(fixed)
    }

    pub async fn explain(
        &self,
        config: &ConnectionConfig,
        request: ExplainRequest,
    ) -> DbResult<ExplainOutput> {
        let explanation = self
            .assistant
            .explain_sql(&request.sql, config.db_type)
            .await?;
        Ok(ExplainOutput { explanation })
    }

    pub async fn chart(&self, request: ChartRequest) -> DbResult<ChartSuggestion> {
        self.assistant
            .suggest_chart(&request.columns, &request.rows)
            .await
    }
}
