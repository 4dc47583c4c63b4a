//! SQL statement validation for read-only enforcement.
//!
//! Every piece of SQL that reaches a database, whether typed by a user or
//! produced by the assistant, passes through [`sanitize`] and then
//! [`validate`]. Validation is pattern based:
//!
//! 1. The statement must start with `SELECT` or `WITH`.
//! 2. No mutation or privilege keyword may appear as a whole word.
//! 3. Statement chaining, SQL comments and `UNION SELECT` are rejected.
//!
//! The checks are conservative and will reject some legal SELECTs (for
//! example a string literal containing `--`). They are a first gate only;
//! adapters still run queries through the driver, which reports anything the
//! patterns miss.

use crate::error::{DbError, DbResult};
use regex::Regex;
use std::sync::LazyLock;

/// Keywords that mutate data or privileges.
pub const DANGEROUS_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "CREATE", "ALTER", "TRUNCATE", "GRANT", "REVOKE",
    "EXECUTE", "EXEC", "CALL", "INTO",
];

mod error_messages {
    pub const NOT_SELECT: &str = "Only SELECT queries are allowed";
    pub const CHAINED: &str = "Multiple statements are not allowed";
    pub const LINE_COMMENT: &str = "SQL line comments are not allowed";
    pub const BLOCK_COMMENT: &str = "SQL block comments are not allowed";
    pub const UNION_SELECT: &str = "UNION SELECT is not allowed";
}

static READ_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^(SELECT|WITH)\b").expect("valid regex"));

static DANGEROUS_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)\b({})\b", DANGEROUS_KEYWORDS.join("|"))).expect("valid regex")
});

static CHAINED_STATEMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i);\s*({})\b", DANGEROUS_KEYWORDS.join("|"))).expect("valid regex")
});

static UNION_SELECT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bUNION\s+(ALL\s+)?SELECT\b").expect("valid regex"));

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// Normalize SQL before validation and execution.
///
/// Trims, collapses whitespace runs to a single space and strips trailing
/// semicolons. Applying it twice gives the same result as applying it once.
pub fn sanitize(sql: &str) -> String {
    let collapsed = WHITESPACE.replace_all(sql.trim(), " ");
    let mut rest = collapsed.as_ref();
    loop {
        let stripped = rest.trim_end().trim_end_matches(';');
        if stripped.len() == rest.len() {
            break;
        }
        rest = stripped;
    }
    rest.trim_end().to_string()
}

/// Reject anything that is not a plain read query.
///
/// Fails with `DbError::DangerousQuery`, naming the offending pattern.
pub fn validate(sql: &str) -> DbResult<()> {
    let trimmed = sql.trim();

    if !READ_PREFIX.is_match(trimmed) {
        let first_word = trimmed
            .split_whitespace()
            .next()
            .map(|w| w.to_uppercase())
            .unwrap_or_default();
        return Err(DbError::dangerous_query(
            first_word,
            error_messages::NOT_SELECT,
        ));
    }

    if let Some(m) = DANGEROUS_KEYWORD.find(trimmed) {
        let keyword = m.as_str().to_uppercase();
        return Err(DbError::dangerous_query(
            keyword.clone(),
            format!("Dangerous keyword '{}' is not allowed", keyword),
        ));
    }

    if let Some(m) = CHAINED_STATEMENT.find(trimmed) {
        return Err(DbError::dangerous_query(
            m.as_str().to_uppercase(),
            error_messages::CHAINED,
        ));
    }
    if trimmed.contains("--") {
        return Err(DbError::dangerous_query("--", error_messages::LINE_COMMENT));
    }
    if trimmed.contains("/*") || trimmed.contains("*/") {
        return Err(DbError::dangerous_query("/*", error_messages::BLOCK_COMMENT));
    }
    if let Some(m) = UNION_SELECT.find(trimmed) {
        return Err(DbError::dangerous_query(
            m.as_str().to_uppercase(),
            error_messages::UNION_SELECT,
        ));
    }

    Ok(())
}

/// Sanitize, then validate. Returns the SQL to execute.
pub fn prepare(sql: &str) -> DbResult<String> {
    let sql = sanitize(sql);
    if sql.is_empty() {
        return Err(DbError::invalid_input("SQL query cannot be empty"));
    }
    validate(&sql)?;
    Ok(sql)
}

/// Cheap structural hints about a statement. Never used as a gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StructureCheck {
    pub starts_with_select: bool,
    pub balanced_parentheses: bool,
}

impl StructureCheck {
    pub fn is_plausible(&self) -> bool {
        self.starts_with_select && self.balanced_parentheses
    }

    /// Human-readable warning when the check fails.
    pub fn warning(&self) -> Option<String> {
        match (self.starts_with_select, self.balanced_parentheses) {
            (true, true) => None,
            (false, true) => Some("Query does not start with SELECT or WITH".to_string()),
            (true, false) => Some("Query has unbalanced parentheses".to_string()),
            (false, false) => Some(
                "Query does not start with SELECT or WITH and has unbalanced parentheses"
                    .to_string(),
            ),
        }
    }
}

pub fn check_structure(sql: &str) -> StructureCheck {
    let mut depth: i64 = 0;
    let mut balanced = true;
    for c in sql.chars() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    balanced = false;
                    break;
                }
            }
            _ => {}
        }
    }

    StructureCheck {
        starts_with_select: READ_PREFIX.is_match(sql.trim()),
        balanced_parentheses: balanced && depth == 0,
    }
}
