//! Randomized tests for SQL sanitizing and validation.
//!
//! Builds statements from random fragments and checks the properties that
//! must hold for any input: sanitize is idempotent, validation never panics,
//! and dangerous keywords are always caught as whole words.

use rand::Rng;
use rand::distributions::Alphanumeric;
use rand::seq::SliceRandom;
use sql_copilot::DbError;
use sql_copilot::tools::sql_validator::{DANGEROUS_KEYWORDS, prepare, sanitize, validate};

const ITERATIONS: usize = 500;

fn random_ident() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();
    format!("col_{}", suffix.to_lowercase())
}

fn random_whitespace() -> &'static str {
    [" ", "  ", "\t", "\n", "\r\n", " \t "]
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(" ")
}

fn random_fragment() -> String {
    let fragments = [
        "SELECT", "select", "WITH", "FROM", "WHERE", ";", ";;", "(", ")", "'x'", "--", "/*",
        "*/", "UNION", "1", "*", ",", "\u{00e9}t\u{00e9}", "\0", "",
    ];
    let mut rng = rand::thread_rng();
    if rng.gen_bool(0.3) {
        random_ident()
    } else {
        fragments.choose(&mut rng).copied().unwrap_or("").to_string()
    }
}

fn random_statement() -> String {
    let mut rng = rand::thread_rng();
    let len = rng.gen_range(0..20);
    let mut out = String::new();
    for _ in 0..len {
        out.push_str(&random_fragment());
        out.push_str(random_whitespace());
    }
    out
}

// =========================================================================
// sanitize
// =========================================================================

#[test]
fn fuzz_sanitize_is_idempotent() {
    for _ in 0..ITERATIONS {
        let sql = random_statement();
        let once = sanitize(&sql);
        assert_eq!(sanitize(&once), once, "not idempotent for {:?}", sql);
    }
}

#[test]
fn fuzz_sanitize_output_shape() {
    for _ in 0..ITERATIONS {
        let once = sanitize(&random_statement());
        assert_eq!(once.trim(), once);
        assert!(!once.ends_with(';'), "trailing semicolon in {:?}", once);
        assert!(!once.contains("  "), "whitespace run in {:?}", once);
        assert!(!once.contains('\n') && !once.contains('\t'));
    }
}

// =========================================================================
// validate
// =========================================================================

#[test]
fn fuzz_validate_never_panics() {
    for _ in 0..ITERATIONS {
        let sql = random_statement();
        match prepare(&sql) {
            Ok(prepared) => assert!(validate(&prepared).is_ok()),
            Err(DbError::DangerousQuery { .. }) | Err(DbError::InvalidInput { .. }) => {}
            Err(other) => panic!("unexpected error for {:?}: {:?}", sql, other),
        }
    }
}

#[test]
fn fuzz_keyword_anywhere_is_rejected() {
    let mut rng = rand::thread_rng();
    for _ in 0..ITERATIONS {
        let keyword = DANGEROUS_KEYWORDS.choose(&mut rng).copied().unwrap_or("DROP");
        let keyword = if rng.gen_bool(0.5) {
            keyword.to_lowercase()
        } else {
            keyword.to_string()
        };
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = {}{}",
            random_ident(),
            random_ident(),
            random_ident(),
            keyword,
            random_whitespace()
        );
        match validate(&sanitize(&sql)) {
            Err(DbError::DangerousQuery { pattern, .. }) => {
                assert_eq!(pattern, keyword.to_uppercase())
            }
            other => panic!("expected rejection for {:?}, got {:?}", sql, other),
        }
    }
}

#[test]
fn fuzz_identifiers_containing_keywords_pass() {
    let mut rng = rand::thread_rng();
    for _ in 0..ITERATIONS {
        let keyword = DANGEROUS_KEYWORDS
            .choose(&mut rng)
            .copied()
            .unwrap_or("DROP")
            .to_lowercase();
        let column = format!("{}_{}", keyword, random_ident());
        let table = format!("{}{}", random_ident(), keyword);
        let sql = format!("SELECT {} FROM {}", column, table);
        assert!(validate(&sql).is_ok(), "false positive for {:?}", sql);
    }
}

#[test]
fn fuzz_non_read_prefix_is_rejected() {
    let starts = ["SHOW", "PRAGMA", "SET", "USE", "VACUUM", "ANALYZE", "BEGIN"];
    let mut rng = rand::thread_rng();
    for _ in 0..ITERATIONS {
        let start = starts.choose(&mut rng).copied().unwrap_or("SHOW");
        let sql = format!("{} {}", start, random_ident());
        match validate(&sql) {
            Err(DbError::DangerousQuery { pattern, .. }) => assert_eq!(pattern, start),
            other => panic!("expected rejection for {:?}, got {:?}", sql, other),
        }
    }
}
