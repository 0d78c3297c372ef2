//! SQL statement validation for read-only enforcement.
//!
//! This module decides whether an arbitrary SQL string is acceptable under a
//! read-only policy. The gate is lexical: comments are removed over the
//! [sqlparser](https://docs.rs/sqlparser/) token stream of the SQL Server
//! dialect, the remaining text is normalized, and then an allowlist of
//! leading keywords, a blocklist of keywords and a set of bypass patterns are
//! applied in that order.
//!
//! The gate errs on the side of rejection: a keyword inside a string literal
//! or a bracketed identifier still blocks the query, and text the tokenizer
//! cannot read (an unterminated literal or comment) is rejected outright.

use crate::error::{DbError, DbResult};
use regex::Regex;
use schemars::JsonSchema;
use serde::Serialize;
use sqlparser::dialect::MsSqlDialect;
use sqlparser::tokenizer::{Token, Tokenizer, Whitespace};
use std::sync::LazyLock;

/// Query type reported for an empty query.
pub const QUERY_TYPE_EMPTY: &str = "EMPTY";
/// Query type reported when a bypass pattern matched.
pub const QUERY_TYPE_BLOCKED_PATTERN: &str = "BLOCKED_PATTERN";
/// Query type reported when the text cannot be tokenized.
pub const QUERY_TYPE_INVALID: &str = "INVALID";

/// Outcome of validating a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValidationVerdict {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// SELECT, CTE or SHOWPLAN when valid; otherwise the offending keyword
    /// or category
    pub query_type: String,
}

impl ValidationVerdict {
    fn allow(query_type: &str) -> Self {
        Self {
            valid: true,
            reason: None,
            query_type: query_type.to_string(),
        }
    }

    fn deny(reason: impl Into<String>, query_type: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
            query_type: query_type.into(),
        }
    }
}

/// Keywords that block a query wherever they appear as a whole word.
///
/// Checked in this order; the first hit is the one reported.
const BLOCKED_KEYWORDS: &[&str] = &[
    "INSERT",
    "UPDATE",
    "DELETE",
    "DROP",
    "ALTER",
    "CREATE",
    "TRUNCATE",
    "EXEC",
    "EXECUTE",
    "MERGE",
    "GRANT",
    "REVOKE",
    "DENY",
    "BACKUP",
    "RESTORE",
    "BULK",
    "OPENROWSET",
    "OPENDATASOURCE",
    "XP_",
    "SP_CONFIGURE",
    "RECONFIGURE",
    "DBCC",
    "SHUTDOWN",
    "KILL",
    "DISABLE",
    "ENABLE",
    "RECEIVE",
    "SEND",
    "WRITETEXT",
    "UPDATETEXT",
    "CHECKPOINT",
    "SETUSER",
    "USE",
];

static BLOCKED_KEYWORD_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    BLOCKED_KEYWORDS
        .iter()
        .map(|&kw| {
            // Extended procedures are a family: xp_cmdshell, xp_regread, ...
            let pattern = if kw == "XP_" {
                r"\bXP_\w*".to_string()
            } else {
                format!(r"\b{}\b", kw)
            };
            (kw, Regex::new(&pattern).expect("keyword pattern is valid"))
        })
        .collect()
});

/// Any token after a `;` other than SELECT or WITH is a stacked statement.
static STACKED_STATEMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r";\s*(\w+|[^\w\s;])").expect("stacked statement pattern is valid")
});

const STACKED_STATEMENT_REASON: &str = "Stacked statement other than SELECT or WITH";

fn has_stacked_statement(normalized: &str) -> bool {
    STACKED_STATEMENT
        .captures_iter(normalized)
        .any(|caps| !matches!(&caps[1], "SELECT" | "WITH"))
}

static BYPASS_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    [
        ("SELECT INTO creates a table", r"\bSELECT\b[\s\S]*?\bINTO\b"),
        ("Locking clause FOR UPDATE/DELETE", r"\bFOR\s+(UPDATE|DELETE)\b"),
        ("Linked-server pass-through query", r"\bOPENQUERY\s*\("),
        ("Remote execution on a linked server", r"\bEXEC(UTE)?\b[\s\S]*\bAT\s+\S+"),
    ]
    .into_iter()
    .map(|(description, pattern)| {
        (
            description,
            Regex::new(pattern).expect("bypass pattern is valid"),
        )
    })
    .collect()
});

static LEADING_READ: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(SELECT|WITH)\b").expect("leading pattern is valid"));

static LEADING_SHOWPLAN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^SET\s+SHOWPLAN_(XML|ALL|TEXT)\b").expect("showplan pattern is valid")
});

static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("whitespace pattern is valid"));

/// Replace every comment with a single space.
///
/// Returns `None` when the text cannot be tokenized.
pub fn strip_comments(sql: &str) -> Option<String> {
    let dialect = MsSqlDialect {};
    let tokens = Tokenizer::new(&dialect, sql).tokenize().ok()?;

    let mut out = String::with_capacity(sql.len());
    for token in tokens {
        match token {
            Token::Whitespace(Whitespace::SingleLineComment { .. })
            | Token::Whitespace(Whitespace::MultiLineComment(_)) => out.push(' '),
            other => out.push_str(&other.to_string()),
        }
    }
    Some(out)
}

/// Collapse whitespace runs, trim and uppercase.
pub fn normalize(sql: &str) -> String {
    WHITESPACE_RUN
        .replace_all(sql.trim(), " ")
        .to_uppercase()
}

/// First word of the comment-stripped, normalized text, if any.
///
/// Used to name the operation in read-only violations.
pub fn first_keyword(sql: &str) -> Option<String> {
    let normalized = normalize(&strip_comments(sql)?);
    let word: String = normalized
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_')
        .collect();
    (!word.is_empty()).then_some(word)
}

/// Validate a query against the read-only policy.
///
/// Pure and total: every input gets a verdict.
///
/// # Examples
///
/// ```
/// use mssql_mcp_server::tools::sql_validator::validate;
///
/// // SELECT is allowed
/// assert!(validate("SELECT * FROM Users WHERE Id = @id").valid);
///
/// // DELETE is blocked
/// let verdict = validate("DELETE FROM Users");
/// assert!(!verdict.valid);
/// assert_eq!(verdict.query_type, "DELETE");
/// ```
pub fn validate(sql: &str) -> ValidationVerdict {
    let Some(stripped) = strip_comments(sql) else {
        return ValidationVerdict::deny(
            "Query could not be tokenized (unterminated string, identifier or comment)",
            QUERY_TYPE_INVALID,
        );
    };

    let normalized = normalize(&stripped);
    if normalized.is_empty() {
        return ValidationVerdict::deny("Query is empty", QUERY_TYPE_EMPTY);
    }

    let query_type = if let Some(m) = LEADING_READ.find(&normalized) {
        if m.as_str() == "WITH" { "CTE" } else { "SELECT" }
    } else if LEADING_SHOWPLAN.is_match(&normalized) {
        "SHOWPLAN"
    } else {
        let first = normalized.split_whitespace().next().unwrap_or_default();
        return ValidationVerdict::deny(
            "Only SELECT or WITH queries are allowed in read-only mode",
            first,
        );
    };

    for (keyword, pattern) in BLOCKED_KEYWORD_PATTERNS.iter() {
        if pattern.is_match(&normalized) {
            return ValidationVerdict::deny(
                format!("Blocked keyword detected: {}", keyword),
                *keyword,
            );
        }
    }

    if has_stacked_statement(&normalized) {
        return ValidationVerdict::deny(STACKED_STATEMENT_REASON, QUERY_TYPE_BLOCKED_PATTERN);
    }

    for (description, pattern) in BYPASS_PATTERNS.iter() {
        if pattern.is_match(&normalized) {
            return ValidationVerdict::deny(*description, QUERY_TYPE_BLOCKED_PATTERN);
        }
    }

    ValidationVerdict::allow(query_type)
}

/// Validate and convert a rejection into [`DbError::QueryValidation`].
pub fn validate_readonly(sql: &str) -> DbResult<ValidationVerdict> {
    let verdict = validate(sql);
    if verdict.valid {
        Ok(verdict)
    } else {
        Err(DbError::query_validation(
            verdict.reason.clone().unwrap_or_default(),
            verdict.query_type,
        ))
    }
}
