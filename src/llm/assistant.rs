//! SQL assistant: turns completion text into usable queries, explanations
//! and chart suggestions.

use crate::error::{DbError, DbResult};
use crate::llm::client::CompletionClient;
use crate::llm::prompts::{self, Prompt};
use crate::models::{DatabaseType, DocumentQuery};
use crate::tools::sql_validator::{check_structure, sanitize};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::{Arc, LazyLock};
use tracing::{debug, warn};

/// Rows sent to the model when suggesting a chart.
pub const CHART_SAMPLE_ROWS: usize = 5;

static CODE_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\n?(.*?)```").expect("valid regex"));

/// Extract the body of the first fenced code block, or the whole text.
pub fn strip_code_fences(text: &str) -> &str {
    match CODE_FENCE.captures(text).and_then(|c| c.get(1)) {
        Some(body) => body.as_str().trim(),
        None => text.trim(),
    }
}

/// A query produced by the assistant, with an optional plausibility warning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GeneratedSql {
    pub sql: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Bar,
    Line,
    Pie,
    Area,
    Scatter,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartSuggestion {
    pub chart_type: ChartType,
    pub x_axis: String,
    pub y_axis: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub reason: String,
}

impl ChartSuggestion {
    /// Bar chart over the first two columns.
    pub fn fallback(columns: &[String]) -> Self {
        let x_axis = columns.first().cloned().unwrap_or_default();
        let y_axis = columns.get(1).cloned().unwrap_or_else(|| x_axis.clone());
        Self {
            chart_type: ChartType::Bar,
            title: format!("{} by {}", y_axis, x_axis),
            x_axis,
            y_axis,
            reason: "Default chart for the first two columns".to_string(),
        }
    }

    /// Parse a model reply; anything unusable yields the fallback.
    pub fn from_reply(reply: &str, columns: &[String]) -> Self {
        match serde_json::from_str::<ChartSuggestion>(strip_code_fences(reply)) {
            Ok(s) if columns.contains(&s.x_axis) && columns.contains(&s.y_axis) => s,
            Ok(s) => {
                debug!(x_axis = %s.x_axis, y_axis = %s.y_axis, "Chart axes not in result columns");
                Self::fallback(columns)
            }
            Err(e) => {
                debug!(error = %e, "Unparseable chart suggestion");
                Self::fallback(columns)
            }
        }
    }
}

/// Wraps a completion client with the prompt for each task.
#[derive(Clone)]
pub struct SqlAssistant {
    client: Arc<dyn CompletionClient>,
}

impl SqlAssistant {
    pub fn new(client: Arc<dyn CompletionClient>) -> Self {
        Self { client }
    }

    async fn ask(&self, prompt: Prompt) -> DbResult<String> {
        self.client.complete(&prompt.system, &prompt.user).await
    }

    fn finish_query(reply: &str, db_type: DatabaseType) -> DbResult<GeneratedSql> {
        // Whitespace inside JSON string values is significant
        let body = strip_code_fences(reply);
        let sql = if db_type.is_document() {
            body.to_string()
        } else {
            sanitize(body)
        };
        if sql.is_empty() {
            return Err(DbError::llm("The assistant did not return a query"));
        }

        let warning = if db_type.is_document() {
            DocumentQuery::parse(&sql).err().map(|e| e.to_string())
        } else {
            check_structure(&sql).warning()
        };
        if let Some(w) = &warning {
            warn!(warning = %w, "Generated query looks malformed");
        }
        Ok(GeneratedSql { sql, warning })
    }

    pub async fn generate_sql(
        &self,
        question: &str,
        schema_context: &str,
        db_type: DatabaseType,
    ) -> DbResult<GeneratedSql> {
        if question.trim().is_empty() {
            return Err(DbError::invalid_input("Question cannot be empty"));
        }
        let reply = self
            .ask(prompts::generate_sql(db_type, schema_context, question))
            .await?;
        Self::finish_query(&reply, db_type)
    }

    pub async fn fix_sql(
        &self,
        sql: &str,
        error: &str,
        schema_context: &str,
        db_type: DatabaseType,
    ) -> DbResult<GeneratedSql> {
        if sql.trim().is_empty() {
            return Err(DbError::invalid_input("SQL to fix cannot be empty"));
        }
        let reply = self
            .ask(prompts::fix_sql(db_type, schema_context, sql, error))
            .await?;
        Self::finish_query(&reply, db_type)
    }

    pub async fn explain_sql(&self, sql: &str, db_type: DatabaseType) -> DbResult<String> {
        if sql.trim().is_empty() {
            return Err(DbError::invalid_input("SQL to explain cannot be empty"));
        }
        let reply = self.ask(prompts::explain_sql(db_type, sql)).await?;
        Ok(reply.trim().to_string())
    }

    /// Suggest a chart for a result set. Completion failures propagate;
    /// a malformed reply falls back to a bar chart.
    pub async fn suggest_chart(
        &self,
        columns: &[String],
        rows: &[serde_json::Map<String, JsonValue>],
    ) -> DbResult<ChartSuggestion> {
        if columns.is_empty() {
            return Err(DbError::invalid_input("At least one column is required"));
        }
        let sample = &rows[..rows.len().min(CHART_SAMPLE_ROWS)];
        let reply = self.ask(prompts::suggest_chart(columns, sample)).await?;
        Ok(ChartSuggestion::from_reply(&reply, columns))
    }
}
