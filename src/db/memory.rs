//! An in-memory [`Driver`] for tests.
//!
//! Responses are queued up front and returned in FIFO order; every call is
//! recorded so tests can check what reached the driver (and what did not).

use crate::db::driver::{Driver, DriverError, DriverResponse};
use crate::db::params::BoundParam;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Which driver method a recorded call went through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Fetch,
    Execute,
    Showplan,
}

/// A recorded driver call for verification.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub kind: CallKind,
    pub sql: String,
    pub params: Vec<BoundParam>,
}

/// An in-memory driver for testing.
///
/// # Example
/// ```
/// use mssql_mcp_server::db::memory::{InMemoryDriver, ResponseBuilder};
///
/// let driver = InMemoryDriver::new().with_response(
///     ResponseBuilder::new()
///         .columns(&[("Id", "Int4"), ("Name", "NVarchar")])
///         .row(vec![1.into(), "Alice".into()])
///         .build(),
/// );
/// assert_eq!(driver.call_count(), 0);
/// ```
pub struct InMemoryDriver {
    responses: Mutex<VecDeque<Result<DriverResponse, DriverError>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl InMemoryDriver {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Queue a successful response.
    pub fn with_response(self, response: DriverResponse) -> Self {
        self.push(Ok(response));
        self
    }

    /// Queue a failure.
    pub fn with_error(self, error: DriverError) -> Self {
        self.push(Err(error));
        self
    }

    fn push(&self, item: Result<DriverResponse, DriverError>) {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_back(item);
    }

    /// All calls made so far.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn last_call(&self) -> Option<RecordedCall> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .cloned()
    }

    fn record(
        &self,
        kind: CallKind,
        sql: &str,
        params: &[BoundParam],
    ) -> Result<DriverResponse, DriverError> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(RecordedCall {
                kind,
                sql: sql.to_string(),
                params: params.to_vec(),
            });

        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pop_front()
            .unwrap_or_else(|| Ok(DriverResponse::empty()))
    }
}

impl Default for InMemoryDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Driver for InMemoryDriver {
    async fn fetch(&self, sql: &str, params: &[BoundParam]) -> Result<DriverResponse, DriverError> {
        self.record(CallKind::Fetch, sql, params)
    }

    async fn execute(
        &self,
        sql: &str,
        params: &[BoundParam],
    ) -> Result<DriverResponse, DriverError> {
        self.record(CallKind::Execute, sql, params)
    }

    async fn fetch_showplan(&self, sql: &str) -> Result<DriverResponse, DriverError> {
        self.record(CallKind::Showplan, sql, &[])
    }
}

/// Builder for canned responses.
#[derive(Default)]
pub struct ResponseBuilder {
    response: DriverResponse,
}

impl ResponseBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the column names and engine type names.
    pub fn columns(mut self, cols: &[(&str, &str)]) -> Self {
        self.response.fields = cols
            .iter()
            .map(|(name, ty)| crate::models::FieldInfo::new(*name, *ty))
            .collect();
        self
    }

    /// Add a row; values pair up with the configured columns.
    pub fn row(mut self, values: Vec<serde_json::Value>) -> Self {
        let row = self
            .response
            .fields
            .iter()
            .map(|f| f.name.clone())
            .zip(values)
            .collect();
        self.response.rows.push(row);
        self
    }

    /// Add `n` rows produced by `f(i)`.
    pub fn rows(mut self, n: usize, f: impl Fn(usize) -> Vec<serde_json::Value>) -> Self {
        for i in 0..n {
            self = self.row(f(i));
        }
        self
    }

    pub fn rows_affected(mut self, counts: &[u64]) -> Self {
        self.response.rows_affected = counts.to_vec();
        self
    }

    pub fn build(self) -> DriverResponse {
        self.response
    }
}
