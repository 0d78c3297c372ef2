//! Query execution plan tool.
//!
//! This module implements the `explain_query` MCP tool. SQL Server returns
//! the estimated plan as a single XML document when the session is in
//! SHOWPLAN_XML mode; the statement itself is compiled but never run.

use crate::db::QueryExecutor;
use crate::error::{DbError, DbResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::info;

/// Input for the explain_query tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ExplainQueryInput {
    /// SELECT statement to explain. Parameters are not supported; use literal values.
    pub sql: String,
}

/// Output from the explain_query tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ExplainQueryOutput {
    /// The SQL statement that was explained
    pub sql: String,
    /// Estimated execution plan (ShowPlanXML document)
    pub plan_xml: String,
    /// Time taken to compile the plan in milliseconds
    pub duration_ms: u64,
}

/// Handler for the explain tool.
pub struct ExplainToolHandler {
    executor: QueryExecutor,
}

impl ExplainToolHandler {
    pub fn new(executor: QueryExecutor) -> Self {
        Self { executor }
    }

    pub async fn explain_query(&self, input: ExplainQueryInput) -> DbResult<ExplainQueryOutput> {
        let result = self.executor.explain(&input.sql).await?;

        let plan_xml = match result.first_value() {
            Some(JsonValue::String(xml)) => xml.clone(),
            Some(JsonValue::Null) | None => {
                return Err(DbError::internal("Server returned no execution plan"));
            }
            Some(other) => other.to_string(),
        };

        info!(
            duration_ms = result.duration_ms,
            plan_bytes = plan_xml.len(),
            "Explained query"
        );

        Ok(ExplainQueryOutput {
            sql: input.sql,
            plan_xml,
            duration_ms: result.duration_ms,
        })
    }
}
