//! Prompt construction for each assistant task.

use crate::models::DatabaseType;
use serde_json::Value as JsonValue;

/// System and user messages for one completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

fn query_language(db_type: DatabaseType) -> String {
    if db_type.is_document() {
        r#"a MongoDB query as a single JSON object of the form {"collection": "...", "operation": "find" | "aggregate", "filter": {...}, "projection": {...}, "sort": {...}, "limit": n, "pipeline": [...]}"#
            .to_string()
    } else {
        format!("a single {} SELECT statement", db_type.display_name())
    }
}

pub fn generate_sql(db_type: DatabaseType, schema_context: &str, question: &str) -> Prompt {
    Prompt {
        system: format!(
            "You translate questions into {lang}. \
             Only read data; never modify it. \
             Use only the tables and columns in the schema below. \
             Reply with the query only, no explanation.\n\n\
             Schema:\n{schema}",
            lang = query_language(db_type),
            schema = schema_context,
        ),
        user: question.to_string(),
    }
}

pub fn fix_sql(db_type: DatabaseType, schema_context: &str, sql: &str, error: &str) -> Prompt {
    Prompt {
        system: format!(
            "You fix broken queries. Return {lang} that avoids the error. \
             Only read data; never modify it. \
             Reply with the corrected query only.\n\n\
             Schema:\n{schema}",
            lang = query_language(db_type),
            schema = schema_context,
        ),
        user: format!("Query:\n{}\n\nError:\n{}", sql, error),
    }
}

pub fn explain_sql(db_type: DatabaseType, sql: &str) -> Prompt {
    Prompt {
        system: format!(
            "You explain {} queries to people who do not write SQL. \
             Describe in a few plain sentences what the query returns.",
            db_type.display_name()
        ),
        user: sql.to_string(),
    }
}

pub fn suggest_chart(columns: &[String], sample_rows: &[serde_json::Map<String, JsonValue>]) -> Prompt {
    let rows = serde_json::to_string(sample_rows).unwrap_or_else(|_| "[]".to_string());
    Prompt {
        system: "You pick a chart for tabular data. Reply with JSON only: \
                 {\"chartType\": \"bar\" | \"line\" | \"pie\" | \"area\" | \"scatter\", \
                 \"xAxis\": column, \"yAxis\": column, \"title\": string, \"reason\": string}"
            .to_string(),
        user: format!("Columns: {}\nSample rows: {}", columns.join(", "), rows),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_prompt_mentions_dialect_and_schema() {
        let prompt = generate_sql(DatabaseType::SqlServer, "Table: users", "how many users?");
        assert!(prompt.system.contains("SQL Server SELECT"));
        assert!(prompt.system.contains("Table: users"));
        assert_eq!(prompt.user, "how many users?");

        let prompt = generate_sql(DatabaseType::MongoDB, "Collection: users", "q");
        assert!(prompt.system.contains("\"operation\""));
    }

    #[test]
    fn test_fix_prompt_carries_error() {
        let prompt = fix_sql(DatabaseType::PostgreSQL, "", "SELECT x", "column x does not exist");
        assert!(prompt.user.contains("column x does not exist"));
    }
}
