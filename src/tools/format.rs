//! Export formatting for query results.
//!
//! Turns a `QueryResult` into a downloadable body: CSV, JSON, a Markdown
//! table or an ASCII table in the style of the MySQL CLI.

use crate::models::{ColumnMetadata, QueryResult};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use unicode_width::UnicodeWidthStr;

/// Export format for query results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Csv,
    Json,
    Markdown,
    /// ASCII table (like MySQL CLI)
    Table,
}

impl ExportFormat {
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Csv => "text/csv; charset=utf-8",
            Self::Json => "application/json",
            Self::Markdown => "text/markdown; charset=utf-8",
            Self::Table => "text/plain; charset=utf-8",
        }
    }

    pub fn file_extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
            Self::Markdown => "md",
            Self::Table => "txt",
        }
    }
}

/// A rendered export, ready to be sent as a file.
#[derive(Debug, Clone)]
pub struct ExportOutput {
    pub format: ExportFormat,
    pub body: String,
    pub row_count: usize,
}

impl ExportOutput {
    pub fn file_name(&self) -> String {
        format!("query-results.{}", self.format.file_extension())
    }
}

pub fn export(result: &QueryResult, format: ExportFormat) -> ExportOutput {
    let body = match format {
        ExportFormat::Csv => format_as_csv(&result.columns, &result.rows),
        ExportFormat::Json => format_as_json(&result.rows),
        ExportFormat::Markdown => {
            format_as_markdown(&result.columns, &result.rows, result.truncated)
        }
        ExportFormat::Table => format_as_table(
            &result.columns,
            &result.rows,
            result.truncated,
            result.execution_time_ms,
        ),
    };
    ExportOutput {
        format,
        body,
        row_count: result.row_count,
    }
}

/// Format value for display in text exports.
pub fn format_value(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => "NULL".to_string(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::String(s) => s.clone(),
        JsonValue::Array(arr) => serde_json::to_string(arr).unwrap_or_default(),
        JsonValue::Object(obj) => serde_json::to_string(obj).unwrap_or_default(),
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// RFC 4180 CSV. NULL becomes an empty field.
pub fn format_as_csv(
    columns: &[ColumnMetadata],
    rows: &[serde_json::Map<String, JsonValue>],
) -> String {
    let mut output = columns
        .iter()
        .map(|c| csv_field(&c.name))
        .collect::<Vec<_>>()
        .join(",");
    output.push_str("\r\n");

    for row in rows {
        let line = columns
            .iter()
            .map(|col| match row.get(&col.name) {
                None | Some(JsonValue::Null) => String::new(),
                Some(value) => csv_field(&format_value(value)),
            })
            .collect::<Vec<_>>()
            .join(",");
        output.push_str(&line);
        output.push_str("\r\n");
    }
    output
}

pub fn format_as_json(rows: &[serde_json::Map<String, JsonValue>]) -> String {
    serde_json::to_string_pretty(rows).unwrap_or_else(|_| "[]".to_string())
}

/// Format query result as ASCII table (MySQL CLI style).
pub fn format_as_table(
    columns: &[ColumnMetadata],
    rows: &[serde_json::Map<String, JsonValue>],
    truncated: bool,
    execution_time_ms: u64,
) -> String {
    if columns.is_empty() {
        return "Empty set".to_string();
    }

    let mut widths: Vec<usize> = columns.iter().map(|c| c.name.width()).collect();
    for row in rows {
        for (i, col) in columns.iter().enumerate() {
            if let Some(value) = row.get(&col.name) {
                widths[i] = widths[i].max(format_value(value).width());
            }
        }
    }

    let separator: String = widths
        .iter()
        .map(|w| format!("+{}", "-".repeat(w + 2)))
        .collect::<String>()
        + "+\n";

    let mut output = separator.clone();
    output.push_str(
        &(columns
            .iter()
            .zip(&widths)
            .map(|(col, w)| format!("| {} ", pad_center(&col.name, *w)))
            .collect::<String>()
            + "|\n"),
    );
    output.push_str(&separator);

    for row in rows {
        let line: String = columns
            .iter()
            .zip(&widths)
            .map(|(col, w)| {
                let value = row.get(&col.name).unwrap_or(&JsonValue::Null);
                let formatted = format_value(value);
                // Right-align numbers
                if matches!(value, JsonValue::Number(_)) {
                    format!("| {} ", pad_left(&formatted, *w))
                } else {
                    format!("| {} ", pad_right(&formatted, *w))
                }
            })
            .collect::<String>()
            + "|\n";
        output.push_str(&line);
    }
    output.push_str(&separator);

    let row_text = if rows.len() == 1 { "row" } else { "rows" };
    let truncated_text = if truncated { " (truncated)" } else { "" };
    output.push_str(&format!(
        "{} {} in set{} ({:.2} sec)\n",
        rows.len(),
        row_text,
        truncated_text,
        execution_time_ms as f64 / 1000.0
    ));
    output
}

// std padding counts chars, not display columns, so CJK text would misalign.
fn pad_right(s: &str, width: usize) -> String {
    format!("{}{}", s, " ".repeat(width.saturating_sub(s.width())))
}

fn pad_left(s: &str, width: usize) -> String {
    format!("{}{}", " ".repeat(width.saturating_sub(s.width())), s)
}

fn pad_center(s: &str, width: usize) -> String {
    let total = width.saturating_sub(s.width());
    let left = total / 2;
    format!("{}{}{}", " ".repeat(left), s, " ".repeat(total - left))
}

/// Format query result as Markdown table.
pub fn format_as_markdown(
    columns: &[ColumnMetadata],
    rows: &[serde_json::Map<String, JsonValue>],
    truncated: bool,
) -> String {
    if columns.is_empty() {
        return "*Empty set*".to_string();
    }

    let mut output: String = columns
        .iter()
        .map(|c| format!("| {} ", c.name))
        .collect::<String>()
        + "|\n";
    output.push_str(&(columns.iter().map(|_| "|---").collect::<String>() + "|\n"));

    for row in rows {
        let line: String = columns
            .iter()
            .map(|col| {
                let value = row.get(&col.name).unwrap_or(&JsonValue::Null);
                format!("| {} ", format_value(value).replace('|', "\\|"))
            })
            .collect::<String>()
            + "|\n";
        output.push_str(&line);
    }

    let truncated_text = if truncated { " *(truncated)*" } else { "" };
    output.push_str(&format!("\n*{} rows*{}", rows.len(), truncated_text));
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> QueryResult {
        let mut a = serde_json::Map::new();
        a.insert("id".into(), json!(1));
        a.insert("name".into(), json!("Ada, \"the first\""));
        let mut b = serde_json::Map::new();
        b.insert("id".into(), json!(22));
        b.insert("name".into(), JsonValue::Null);
        QueryResult::new(
            vec![
                ColumnMetadata::new("id", "integer"),
                ColumnMetadata::new("name", "text"),
            ],
            vec![a, b],
            1500,
            false,
        )
    }

    #[test]
    fn test_csv_escapes_and_nulls() {
        let out = export(&sample(), ExportFormat::Csv);
        assert_eq!(out.body, "id,name\r\n1,\"Ada, \"\"the first\"\"\"\r\n22,\r\n");
        assert_eq!(out.row_count, 2);
        assert_eq!(out.file_name(), "query-results.csv");
    }

    #[test]
    fn test_json_export_is_row_array() {
        let out = export(&sample(), ExportFormat::Json);
        let parsed: JsonValue = serde_json::from_str(&out.body).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 2);
        assert_eq!(parsed[1]["name"], JsonValue::Null);
    }

    #[test]
    fn test_table_layout() {
        let out = export(&sample(), ExportFormat::Table);
        let lines: Vec<&str> = out.body.lines().collect();
        assert_eq!(lines[0], "+----+------------------+");
        assert_eq!(lines[1], "| id |       name       |");
        assert_eq!(lines[3], "|  1 | Ada, \"the first\" |");
        assert_eq!(lines[4], "| 22 | NULL             |");
        assert_eq!(lines[6], "2 rows in set (1.50 sec)");
    }

    #[test]
    fn test_table_wide_characters_align() {
        let mut row = serde_json::Map::new();
        row.insert("city".into(), json!("東京"));
        let table = format_as_table(&[ColumnMetadata::new("city", "text")], &[row], false, 0);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0].width(), lines[3].width());
    }

    #[test]
    fn test_markdown_truncated_footer() {
        let mut result = sample();
        result.truncated = true;
        let out = export(&result, ExportFormat::Markdown);
        assert!(out.body.starts_with("| id | name |\n|---|---|\n"));
        assert!(out.body.ends_with("*2 rows* *(truncated)*"));
    }

    #[test]
    fn test_empty_columns() {
        let result = QueryResult::empty(0);
        assert_eq!(export(&result, ExportFormat::Table).body, "Empty set");
        assert_eq!(export(&result, ExportFormat::Csv).body, "\r\n");
    }

    #[test]
    fn test_format_deserialize() {
        let f: ExportFormat = serde_json::from_str("\"markdown\"").unwrap();
        assert_eq!(f, ExportFormat::Markdown);
        assert_eq!(ExportFormat::default(), ExportFormat::Csv);
    }
}
