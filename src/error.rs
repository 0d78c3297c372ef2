//! Error types for the MSSQL MCP Server.
//!
//! This module defines all error types using `thiserror` for ergonomic error handling.
//! Each error variant provides actionable messages to help AI assistants understand
//! and recover from error conditions. Messages coming from the driver are passed
//! through [`sanitize_message`] before they are stored in an error, so credentials
//! never cross the tool boundary.

use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

/// Marker substituted for redacted spans in error messages.
pub const REDACTED: &str = "[REDACTED]";

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Query validation failed: {reason} (query type: {query_type})")]
    QueryValidation { reason: String, query_type: String },

    #[error(
        "Read-only violation: {operation} is not allowed while the server runs in read-only mode"
    )]
    ReadOnlyViolation { operation: String },

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Timeout: {operation} exceeded the configured budget after {elapsed_ms}ms")]
    Timeout { operation: String, elapsed_ms: u64 },

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// SQL Server error number, e.g. 208 for an invalid object name
        code: Option<u32>,
        suggestion: String,
    },

    #[error("Schema error: {message} (object: {object})")]
    Schema { message: String, object: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a query validation error from a validator verdict.
    pub fn query_validation(reason: impl Into<String>, query_type: impl Into<String>) -> Self {
        Self::QueryValidation {
            reason: reason.into(),
            query_type: query_type.into(),
        }
    }

    /// Create a read-only violation error naming the blocked operation.
    pub fn read_only_violation(operation: impl Into<String>) -> Self {
        Self::ReadOnlyViolation {
            operation: operation.into(),
        }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl AsRef<str>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: sanitize_message(message.as_ref()),
            suggestion: suggestion.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, elapsed_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_ms,
        }
    }

    /// Create a database error with an optional server error number.
    pub fn database(
        message: impl AsRef<str>,
        code: Option<u32>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Database {
            message: sanitize_message(message.as_ref()),
            code,
            suggestion: suggestion.into(),
        }
    }

    /// Create a schema error.
    pub fn schema(message: impl Into<String>, object: impl Into<String>) -> Self {
        Self::Schema {
            message: message.into(),
            object: object.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl AsRef<str>) -> Self {
        Self::Internal {
            message: sanitize_message(message.as_ref()),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Database { suggestion, .. } => Some(suggestion),
            Self::QueryValidation { .. } => {
                Some("Only read-only SELECT or WITH queries are accepted in read-only mode")
            }
            Self::ReadOnlyViolation { .. } => {
                Some("Start the server with --read-only=false to enable write tools")
            }
            _ => None,
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

static LOGIN_FAILED_USER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(login failed for user\s+)'[^']*'").expect("login pattern is valid")
});

static PASSWORD_FRAGMENT: LazyLock<Regex> = LazyLock::new(|| {
    // Quoted and braced values may contain spaces and semicolons.
    Regex::new(r#"(?i)\b(password|pwd)(\s*=\s*)('[^']*'?|"[^"]*"?|\{[^}]*\}?|[^;]*)"#)
        .expect("password pattern is valid")
});

/// Redact credential-shaped substrings from a driver message.
///
/// # Examples
///
/// ```
/// use mssql_mcp_server::error::sanitize_message;
///
/// assert_eq!(
///     sanitize_message("Login failed for user 'sa'."),
///     "Login failed for user '[REDACTED]'."
/// );
/// assert_eq!(
///     sanitize_message("server=db;Password=hunter2;"),
///     "server=db;Password=[REDACTED];"
/// );
/// ```
pub fn sanitize_message(message: &str) -> String {
    let redacted = LOGIN_FAILED_USER.replace_all(message, format!("${{1}}'{REDACTED}'"));
    PASSWORD_FRAGMENT
        .replace_all(&redacted, format!("${{1}}${{2}}{REDACTED}"))
        .into_owned()
}

/// Build suggestion data as JSON value.
fn suggestion_data(suggestion: Option<&str>) -> Option<serde_json::Value> {
    suggestion.map(|s| serde_json::json!({ "suggestion": s }))
}

/// Convert DbError to MCP ErrorData for semantic error categorization.
/// Includes the suggestion field in the `data` object when available.
impl From<DbError> for rmcp::ErrorData {
    fn from(err: DbError) -> Self {
        match &err {
            // Policy and caller errors -> invalid_params
            DbError::QueryValidation { .. }
            | DbError::ReadOnlyViolation { .. }
            | DbError::InvalidInput { .. } => {
                rmcp::ErrorData::invalid_params(err.to_string(), suggestion_data(err.suggestion()))
            }

            DbError::Schema { .. } => rmcp::ErrorData::resource_not_found(
                err.to_string(),
                suggestion_data(err.suggestion()),
            ),

            DbError::Connection { suggestion, .. } => {
                rmcp::ErrorData::internal_error(err.to_string(), suggestion_data(Some(suggestion)))
            }
            DbError::Timeout { .. } => rmcp::ErrorData::internal_error(
                err.to_string(),
                suggestion_data(Some(
                    "Narrow the query (filters, TOP, fewer joins) or raise MSSQL_QUERY_TIMEOUT_MS",
                )),
            ),

            // Database errors -> invalid_params with the error number in message
            DbError::Database {
                message,
                code,
                suggestion,
            } => {
                let msg = match code {
                    Some(code) => format!("{} (error {})", message, code),
                    None => message.clone(),
                };
                rmcp::ErrorData::invalid_params(msg, suggestion_data(Some(suggestion)))
            }

            DbError::Internal { .. } => {
                rmcp::ErrorData::internal_error(err.to_string(), suggestion_data(err.suggestion()))
            }
        }
    }
}
