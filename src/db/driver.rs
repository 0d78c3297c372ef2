//! The seam between the execution pipeline and a concrete SQL Server driver.
//!
//! The pipeline only ever talks to [`Driver`]; the production implementation
//! is [`TiberiusDriver`](super::pool::TiberiusDriver) and tests use
//! [`InMemoryDriver`](super::memory::InMemoryDriver).

use crate::db::params::BoundParam;
use crate::models::{FieldInfo, JsonRow};
use async_trait::async_trait;
use std::fmt;

/// Raw result of one request, before truncation or timing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DriverResponse {
    pub rows: Vec<JsonRow>,
    /// Column metadata of the first result set; empty when the driver has none
    pub fields: Vec<FieldInfo>,
    /// Affected-row count per statement in the batch
    pub rows_affected: Vec<u64>,
}

impl DriverResponse {
    /// A response with no rows and no affected counts.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Broad category of a driver failure, used for classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
    /// Could not reach, authenticate against or obtain a connection
    Connection,
    /// The request exceeded its time budget
    Timeout,
    /// The server rejected the statement
    Database,
    /// Anything else (protocol, conversion)
    Other,
}

/// A failure reported by a [`Driver`]. The message is unsanitized.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverError {
    pub kind: DriverErrorKind,
    /// Server error number, when the server reported one
    pub code: Option<u32>,
    pub message: String,
}

impl DriverError {
    pub fn new(kind: DriverErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: None,
            message: message.into(),
        }
    }

    pub fn with_code(mut self, code: u32) -> Self {
        self.code = Some(code);
        self
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Connection, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Timeout, message)
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::new(DriverErrorKind::Database, message)
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) => write!(f, "{:?} error {}: {}", self.kind, code, self.message),
            None => write!(f, "{:?} error: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for DriverError {}

/// Trait for SQL Server driver implementations.
///
/// Drivers are responsible for:
/// - obtaining a connection and enforcing the per-request timeout
/// - attaching bound parameters to the request (named `@name` in `sql`)
/// - converting result rows into JSON rows
#[async_trait]
pub trait Driver: Send + Sync {
    /// Run a batch and return its first result set.
    async fn fetch(&self, sql: &str, params: &[BoundParam]) -> Result<DriverResponse, DriverError>;

    /// Run a batch for its side effects and return per-statement affected counts.
    async fn execute(
        &self,
        sql: &str,
        params: &[BoundParam],
    ) -> Result<DriverResponse, DriverError>;

    /// Return the estimated plan of `sql` as SHOWPLAN_XML rows.
    ///
    /// `SET SHOWPLAN_XML ON`, the statement and `SET SHOWPLAN_XML OFF` must
    /// run as separate batches on the same connection.
    async fn fetch_showplan(&self, sql: &str) -> Result<DriverResponse, DriverError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_driver_error_display() {
        let err = DriverError::database("Invalid object name 'x'.").with_code(208);
        assert_eq!(
            err.to_string(),
            "Database error 208: Invalid object name 'x'."
        );
        assert_eq!(
            DriverError::timeout("timed out").to_string(),
            "Timeout error: timed out"
        );
    }
}
