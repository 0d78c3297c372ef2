//! Query tools.
//!
//! This module implements the `validate_query` and `read_data` MCP tools.
//! Under a read-only policy every query passes the validator before it
//! reaches the database; values are always bound as parameters.

use crate::config::RowLimits;
use crate::db::QueryExecutor;
use crate::error::DbResult;
use crate::models::{FieldInfo, JsonRow, param_map_from_json};
use crate::tools::limit_warning;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::info;

/// Input for the validate_query tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ValidateQueryInput {
    /// SQL text to check against the read-only rules
    pub sql: String,
}

/// Output from the validate_query tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ValidateQueryOutput {
    pub valid: bool,
    /// Why the query was rejected
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Leading keyword, or EMPTY / BLOCKED_PATTERN / INVALID
    pub query_type: String,
    /// Whether the server enforces these rules on read_data
    pub read_only: bool,
}

/// Input for the read_data tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ReadDataInput {
    /// SQL SELECT (or WITH ... SELECT) statement. Reference parameters as @name.
    pub sql: String,
    /// Named parameters, e.g. {"id": 42}. Values must be strings, numbers, booleans or null.
    #[serde(default)]
    pub params: Option<serde_json::Map<String, JsonValue>>,
    /// Maximum rows to return. Defaults to the server's configured default.
    #[serde(default)]
    pub limit: Option<u32>,
}

/// Output from the read_data tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ReadDataOutput {
    /// Column names and engine types, in result order
    pub fields: Vec<FieldInfo>,
    pub rows: Vec<JsonRow>,
    /// Number of rows returned
    pub row_count: usize,
    /// Number of rows the query produced before truncation
    pub row_count_total: usize,
    /// True if result was truncated due to limit
    pub truncated: bool,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Handler for query validation and execution.
pub struct QueryToolHandler {
    executor: QueryExecutor,
    limits: RowLimits,
}

impl QueryToolHandler {
    pub fn new(executor: QueryExecutor, limits: RowLimits) -> Self {
        Self { executor, limits }
    }

    /// Check a query without running it.
    pub fn validate_query(&self, input: ValidateQueryInput) -> ValidateQueryOutput {
        let verdict = self.executor.validate(&input.sql);
        ValidateQueryOutput {
            valid: verdict.valid,
            reason: verdict.reason,
            query_type: verdict.query_type,
            read_only: self.executor.policy().read_only,
        }
    }

    /// Handle the read_data tool call.
    pub async fn read_data(&self, input: ReadDataInput) -> DbResult<ReadDataOutput> {
        let params = param_map_from_json(input.params.unwrap_or_default())?;
        let (limit, capped) = self.limits.resolve(input.limit);

        let result = self
            .executor
            .execute_query(&input.sql, &params, limit)
            .await?;

        info!(
            row_count = result.row_count(),
            row_count_total = result.row_count_total,
            truncated = result.is_truncated(),
            duration_ms = result.duration_ms,
            "Query executed"
        );

        Ok(ReadDataOutput {
            row_count: result.row_count(),
            truncated: result.is_truncated(),
            row_count_total: result.row_count_total,
            duration_ms: result.duration_ms,
            fields: result.fields,
            rows: result.rows,
            warning: limit_warning(input.limit, capped, limit),
        })
    }
}
