//! Query execution engine.
//!
//! This module is the single path every tool takes to the database:
//! - read-only validation (when the policy asks for it)
//! - parameter binding (values never enter the SQL text)
//! - row limiting, with the untruncated count reported alongside
//! - duration measurement
//! - classification and sanitization of driver failures
//!
//! The executor holds no mutable state; it can be shared freely between
//! concurrent tool calls.

use crate::config::QueryPolicy;
use crate::db::driver::{Driver, DriverError, DriverErrorKind};
use crate::db::params::bind_params;
use crate::error::{DbError, DbResult};
use crate::models::{ExecutionResult, ParamMap, WriteResult};
use crate::tools::sql_validator::{self, ValidationVerdict};
use regex::Regex;
use serde::de::DeserializeOwned;
use std::sync::{Arc, LazyLock};
use std::time::Instant;
use tracing::{debug, warn};

static TIMEOUT_MESSAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)timeout|timed out").expect("timeout pattern is valid"));

/// Prefix that puts a session into estimated-plan mode.
pub const SHOWPLAN_PREFIX: &str = "SET SHOWPLAN_XML ON;";

/// Query executor that handles database query execution.
#[derive(Clone)]
pub struct QueryExecutor {
    driver: Arc<dyn Driver>,
    policy: QueryPolicy,
}

impl QueryExecutor {
    pub fn new(driver: Arc<dyn Driver>, policy: QueryPolicy) -> Self {
        Self { driver, policy }
    }

    pub fn policy(&self) -> QueryPolicy {
        self.policy
    }

    /// Validate a query against the read-only rules without running it.
    pub fn validate(&self, sql: &str) -> ValidationVerdict {
        sql_validator::validate(sql)
    }

    /// Execute a query and return at most `row_limit` rows.
    pub async fn execute_query(
        &self,
        sql: &str,
        params: &ParamMap,
        row_limit: u32,
    ) -> DbResult<ExecutionResult> {
        if self.policy.read_only {
            let verdict = sql_validator::validate_readonly(sql)?;
            // Plan mode is session state; only `explain` may switch it on.
            if verdict.query_type == "SHOWPLAN" {
                return Err(DbError::query_validation(
                    "SHOWPLAN statements are only accepted through explain_query",
                    verdict.query_type,
                ));
            }
        }

        let bound = bind_params(params);
        debug!(
            sql = %sql,
            params = bound.len(),
            limit = row_limit,
            "Executing query"
        );

        let start = Instant::now();
        let response = self
            .driver
            .fetch(sql, &bound)
            .await
            .map_err(|e| classify(e, "query", start))?;
        let duration_ms = start.elapsed().as_millis() as u64;

        let row_count_total = response.rows.len();
        let mut rows = response.rows;
        rows.truncate(row_limit as usize);

        if row_count_total > rows.len() {
            warn!(
                total_rows = row_count_total,
                limit = row_limit,
                "Query result truncated"
            );
        }

        Ok(ExecutionResult {
            rows,
            row_count_total,
            fields: response.fields,
            duration_ms,
        })
    }

    /// Execute a write statement and return the affected-row count.
    ///
    /// Under a read-only policy this fails before anything reaches the driver.
    pub async fn execute_write(&self, sql: &str, params: &ParamMap) -> DbResult<WriteResult> {
        if self.policy.read_only {
            let operation =
                sql_validator::first_keyword(sql).unwrap_or_else(|| "write".to_string());
            return Err(DbError::read_only_violation(operation));
        }

        let bound = bind_params(params);
        debug!(sql = %sql, params = bound.len(), "Executing write operation");

        let start = Instant::now();
        let response = self
            .driver
            .execute(sql, &bound)
            .await
            .map_err(|e| classify(e, "write", start))?;

        Ok(WriteResult {
            affected_rows: response.rows_affected.first().copied().unwrap_or(0),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    /// Execute a query and return the first column of the first row.
    ///
    /// `None` when there are no rows or the value is NULL.
    pub async fn execute_scalar<T: DeserializeOwned>(
        &self,
        sql: &str,
        params: &ParamMap,
    ) -> DbResult<Option<T>> {
        let result = self.execute_query(sql, params, 1).await?;
        match result.first_value() {
            None | Some(serde_json::Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| DbError::internal(format!("Unexpected scalar value: {}", e))),
        }
    }

    /// Return the estimated execution plan of a query as SHOWPLAN XML rows.
    pub async fn explain(&self, sql: &str) -> DbResult<ExecutionResult> {
        if self.policy.read_only {
            sql_validator::validate_readonly(&format!("{} {}", SHOWPLAN_PREFIX, sql))?;
        }

        debug!(sql = %sql, "Fetching estimated plan");

        let start = Instant::now();
        let response = self
            .driver
            .fetch_showplan(sql)
            .await
            .map_err(|e| classify(e, "explain", start))?;

        Ok(ExecutionResult {
            row_count_total: response.rows.len(),
            rows: response.rows,
            fields: response.fields,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

/// Map a driver failure onto the error taxonomy. Messages are sanitized by
/// the [`DbError`] constructors.
fn classify(err: DriverError, operation: &str, start: Instant) -> DbError {
    let elapsed_ms = start.elapsed().as_millis() as u64;

    if err.kind == DriverErrorKind::Timeout || TIMEOUT_MESSAGE.is_match(&err.message) {
        return DbError::timeout(operation, elapsed_ms);
    }

    match err.kind {
        DriverErrorKind::Connection => DbError::connection(
            &err.message,
            "Check that the server is reachable and the configured credentials are valid",
        ),
        DriverErrorKind::Database | DriverErrorKind::Other => {
            DbError::database(&err.message, err.code, database_suggestion(err.code))
        }
        DriverErrorKind::Timeout => DbError::timeout(operation, elapsed_ms),
    }
}

fn database_suggestion(code: Option<u32>) -> &'static str {
    match code {
        Some(208) => "Check the object name and schema; use list_tables to see what exists",
        Some(207) => "Check the column names; use describe_table to see the table's columns",
        Some(102) | Some(156) => "Check the SQL syntax near the reported position",
        Some(137) => "Declare every @name used in the query in the params object",
        Some(229) | Some(230) => "The database login lacks permission for this object",
        Some(2627) | Some(2601) => "A row with the same key already exists",
        Some(547) => "The statement conflicts with a foreign key or check constraint",
        _ => "Check the SQL statement and its parameters",
    }
}
