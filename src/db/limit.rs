//! Row-cap rewriting.
//!
//! Read queries without an explicit cap get one appended (`LIMIT n`) or
//! inserted (`TOP n` for SQL Server) so the server never produces more rows
//! than the adapter will return. Rows are also truncated while streaming, so
//! a rewrite that does not apply (e.g. a CTE on SQL Server) is still safe.

use crate::models::{DatabaseType, QueryResult};
use regex::Regex;
use std::sync::LazyLock;

/// A cap written as a literal, a placeholder (`$1`, `?`, `?1`, `:n`) or `ALL`.
static LIMIT_CLAUSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bLIMIT\s+(\d+|\$\d+|\?\d*|:\w+|ALL\b)").expect("valid regex")
});

static TOP_CLAUSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bTOP\s*\(?\s*\d+").expect("valid regex"));

static OFFSET_FETCH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bFETCH\s+(FIRST|NEXT)\b").expect("valid regex"));

static LEADING_SELECT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*SELECT(\s+(DISTINCT|ALL))?\b").expect("valid regex")
});

static LEADING_READ: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^\s*(SELECT|WITH)\b").expect("valid regex"));

/// Apply the row cap to `sql` for the given backend.
///
/// Returns the query unchanged when it already carries a cap, is not a
/// SELECT/WITH, or targets a backend without SQL.
pub fn apply_row_limit(sql: &str, db_type: DatabaseType, max_rows: usize) -> String {
    match db_type {
        DatabaseType::PostgreSQL | DatabaseType::MySQL | DatabaseType::SQLite => {
            append_limit(sql, max_rows)
        }
        DatabaseType::SqlServer => insert_top(sql, max_rows),
        DatabaseType::MongoDB => sql.to_string(),
    }
}

/// Flag a result that filled a cap added by [`apply_row_limit`]. The database
/// stopped at the cap, so further rows were never seen.
pub(crate) fn mark_cap_reached(mut result: QueryResult, rewritten: bool, max_rows: usize) -> QueryResult {
    if rewritten && result.row_count >= max_rows {
        result.truncated = true;
    }
    result
}

fn append_limit(sql: &str, max_rows: usize) -> String {
    if !LEADING_READ.is_match(sql) || LIMIT_CLAUSE.is_match(sql) || OFFSET_FETCH.is_match(sql) {
        return sql.to_string();
    }
    let body = sql.trim_end().trim_end_matches(';').trim_end();
    format!("{} LIMIT {}", body, max_rows)
}

fn insert_top(sql: &str, max_rows: usize) -> String {
    if TOP_CLAUSE.is_match(sql) || OFFSET_FETCH.is_match(sql) {
        return sql.to_string();
    }
    // CTEs would need the cap on the outer SELECT; streaming truncation covers them.
    match LEADING_SELECT.find(sql) {
        Some(m) => format!("{} TOP {}{}", &sql[..m.end()], max_rows, &sql[m.end()..]),
        None => sql.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_appends_limit() {
        assert_eq!(
            apply_row_limit("SELECT * FROM t", DatabaseType::PostgreSQL, 1000),
            "SELECT * FROM t LIMIT 1000"
        );
        assert_eq!(
            apply_row_limit("WITH x AS (SELECT 1) SELECT * FROM x;", DatabaseType::SQLite, 1000),
            "WITH x AS (SELECT 1) SELECT * FROM x LIMIT 1000"
        );
    }

    #[test]
    fn test_existing_limit_kept() {
        let sql = "SELECT * FROM t limit 5";
        assert_eq!(apply_row_limit(sql, DatabaseType::MySQL, 1000), sql);
    }

    #[test]
    fn test_placeholder_limit_kept() {
        for sql in [
            "SELECT * FROM t LIMIT $1",
            "SELECT * FROM t LIMIT ?",
            "SELECT * FROM t LIMIT ?1 OFFSET ?2",
            "SELECT * FROM t LIMIT :n",
            "SELECT * FROM t LIMIT ALL",
        ] {
            assert_eq!(apply_row_limit(sql, DatabaseType::PostgreSQL, 1000), sql);
        }
    }

    #[test]
    fn test_fetch_first_kept() {
        let sql = "SELECT * FROM t ORDER BY id FETCH FIRST 5 ROWS ONLY";
        assert_eq!(apply_row_limit(sql, DatabaseType::PostgreSQL, 1000), sql);
    }

    #[test]
    fn test_limit_word_in_identifier_is_not_a_cap() {
        assert_eq!(
            apply_row_limit("SELECT credit_limit FROM t", DatabaseType::PostgreSQL, 1000),
            "SELECT credit_limit FROM t LIMIT 1000"
        );
    }

    #[test]
    fn test_inserts_top() {
        assert_eq!(
            apply_row_limit("SELECT name FROM t", DatabaseType::SqlServer, 1000),
            "SELECT TOP 1000 name FROM t"
        );
    }

    #[test]
    fn test_top_after_distinct() {
        assert_eq!(
            apply_row_limit("select distinct name from t", DatabaseType::SqlServer, 1000),
            "select distinct TOP 1000 name from t"
        );
    }

    #[test]
    fn test_existing_top_or_fetch_kept() {
        let top = "SELECT TOP 10 * FROM t";
        assert_eq!(apply_row_limit(top, DatabaseType::SqlServer, 1000), top);
        let paged = "SELECT * FROM t ORDER BY id OFFSET 0 ROWS FETCH NEXT 5 ROWS ONLY";
        assert_eq!(apply_row_limit(paged, DatabaseType::SqlServer, 1000), paged);
    }

    #[test]
    fn test_mssql_cte_unchanged() {
        let sql = "WITH x AS (SELECT 1 AS a) SELECT a FROM x";
        assert_eq!(apply_row_limit(sql, DatabaseType::SqlServer, 1000), sql);
    }

    #[test]
    fn test_mongo_unchanged() {
        let q = r#"{"collection":"c","operation":"find"}"#;
        assert_eq!(apply_row_limit(q, DatabaseType::MongoDB, 1000), q);
    }

    #[test]
    fn test_mark_cap_reached() {
        let rows = vec![serde_json::Map::new(); 3];
        let full = QueryResult::new(Vec::new(), rows.clone(), 1, false);
        assert!(mark_cap_reached(full.clone(), true, 3).truncated);
        assert!(!mark_cap_reached(full, false, 3).truncated);

        let short = QueryResult::new(Vec::new(), rows, 1, false);
        assert!(!mark_cap_reached(short, true, 10).truncated);
    }
}
