//! Write operation tools.
//!
//! This module implements the `insert_data`, `update_data` and `delete_data`
//! MCP tools. Statements come from the builders, so column values only ever
//! travel as bound parameters. Under a read-only policy the executor refuses
//! every write before it reaches the database.

use crate::db::QueryExecutor;
use crate::error::DbResult;
use crate::models::{Statement, param_map_from_json};
use crate::tools::builders::{build_delete, build_insert, build_update, qualified_table};
use crate::tools::schema_or_default;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::info;

type JsonObject = serde_json::Map<String, JsonValue>;

/// Input for the insert_data tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct InsertDataInput {
    pub table_name: String,
    /// Schema containing the table. Default: dbo
    #[serde(default)]
    pub schema: Option<String>,
    /// Column name to value, e.g. {"Name": "Alice", "Age": 30}
    pub values: JsonObject,
}

/// Input for the update_data tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct UpdateDataInput {
    pub table_name: String,
    /// Schema containing the table. Default: dbo
    #[serde(default)]
    pub schema: Option<String>,
    /// Column name to new value
    pub values: JsonObject,
    /// WHERE condition without the WHERE keyword, e.g. "Id = @id". Required.
    pub where_clause: String,
    /// Parameters referenced by the WHERE condition, e.g. {"id": 7}
    #[serde(default)]
    pub where_params: Option<JsonObject>,
}

/// Input for the delete_data tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DeleteDataInput {
    pub table_name: String,
    /// Schema containing the table. Default: dbo
    #[serde(default)]
    pub schema: Option<String>,
    /// WHERE condition without the WHERE keyword, e.g. "Id = @id". Required.
    pub where_clause: String,
    /// Parameters referenced by the WHERE condition
    #[serde(default)]
    pub where_params: Option<JsonObject>,
}

/// Output from the write tools.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct WriteDataOutput {
    /// INSERT, UPDATE or DELETE
    pub operation: String,
    /// Quoted target, e.g. [dbo].[Users]
    pub table: String,
    /// Number of rows affected by the operation
    pub affected_rows: u64,
    /// Execution time in milliseconds
    pub duration_ms: u64,
}

pub struct WriteToolHandler {
    executor: QueryExecutor,
}

impl WriteToolHandler {
    pub fn new(executor: QueryExecutor) -> Self {
        Self { executor }
    }

    pub async fn insert_data(&self, input: InsertDataInput) -> DbResult<WriteDataOutput> {
        let schema = schema_or_default(input.schema.as_deref());
        let values = param_map_from_json(input.values)?;
        let statement = build_insert(schema, &input.table_name, &values)?;
        self.run("INSERT", schema, &input.table_name, statement)
            .await
    }

    pub async fn update_data(&self, input: UpdateDataInput) -> DbResult<WriteDataOutput> {
        let schema = schema_or_default(input.schema.as_deref());
        let values = param_map_from_json(input.values)?;
        let where_params = param_map_from_json(input.where_params.unwrap_or_default())?;
        let statement = build_update(
            schema,
            &input.table_name,
            &values,
            &input.where_clause,
            &where_params,
        )?;
        self.run("UPDATE", schema, &input.table_name, statement)
            .await
    }

    pub async fn delete_data(&self, input: DeleteDataInput) -> DbResult<WriteDataOutput> {
        let schema = schema_or_default(input.schema.as_deref());
        let where_params = param_map_from_json(input.where_params.unwrap_or_default())?;
        let statement = build_delete(
            schema,
            &input.table_name,
            &input.where_clause,
            &where_params,
        )?;
        self.run("DELETE", schema, &input.table_name, statement)
            .await
    }

    async fn run(
        &self,
        operation: &str,
        schema: &str,
        table: &str,
        statement: Statement,
    ) -> DbResult<WriteDataOutput> {
        let result = self
            .executor
            .execute_write(&statement.sql, &statement.params)
            .await?;
        let table = qualified_table(schema, table);

        info!(
            operation = operation,
            table = %table,
            affected_rows = result.affected_rows,
            duration_ms = result.duration_ms,
            "Write operation executed"
        );

        Ok(WriteDataOutput {
            operation: operation.to_string(),
            table,
            affected_rows: result.affected_rows,
            duration_ms: result.duration_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueryPolicy;
    use crate::db::memory::CallKind;
    use crate::db::params::EngineType;
    use crate::db::{InMemoryDriver, ResponseBuilder};
    use crate::error::DbError;
    use crate::models::ParamValue;
    use serde_json::json;
    use std::sync::Arc;

    fn handler(driver: InMemoryDriver, read_only: bool) -> (WriteToolHandler, Arc<InMemoryDriver>) {
        let driver = Arc::new(driver);
        let executor = QueryExecutor::new(driver.clone(), QueryPolicy { read_only });
        (WriteToolHandler::new(executor), driver)
    }

    fn object(value: JsonValue) -> JsonObject {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_update_input_deserialization() {
        let json = r#"{
            "table_name": "Users",
            "values": {"Name": "Bob"},
            "where_clause": "Id = @id",
            "where_params": {"id": 7}
        }"#;
        let input: UpdateDataInput = serde_json::from_str(json).unwrap();
        assert!(input.schema.is_none());
        assert_eq!(input.where_clause, "Id = @id");
    }

    #[tokio::test]
    async fn test_insert_binds_values() {
        let response = ResponseBuilder::new().rows_affected(&[1, 1]).build();
        let (handler, driver) = handler(InMemoryDriver::new().with_response(response), false);

        let output = handler
            .insert_data(InsertDataInput {
                table_name: "Users".into(),
                schema: None,
                values: object(json!({"Name": "O'Brien", "Age": 41})),
            })
            .await
            .unwrap();

        assert_eq!(output.affected_rows, 1);
        assert_eq!(output.table, "[dbo].[Users]");

        let call = driver.last_call().unwrap();
        assert_eq!(call.kind, CallKind::Execute);
        assert!(!call.sql.contains("O'Brien"));
        let age = call.params.iter().find(|p| p.name == "Age").unwrap();
        assert_eq!(age.engine_type, EngineType::BigInt);
        assert_eq!(age.value, ParamValue::Int(41));
    }

    #[tokio::test]
    async fn test_delete_read_only_never_reaches_driver() {
        let (handler, driver) = handler(InMemoryDriver::new(), true);
        let err = handler
            .delete_data(DeleteDataInput {
                table_name: "Users".into(),
                schema: Some("dbo".into()),
                where_clause: "Id = @id".into(),
                where_params: Some(object(json!({"id": 7}))),
            })
            .await
            .unwrap_err();

        match err {
            DbError::ReadOnlyViolation { operation } => assert_eq!(operation, "DELETE"),
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(driver.call_count(), 0);
    }

    #[tokio::test]
    async fn test_update_requires_where() {
        let (handler, driver) = handler(InMemoryDriver::new(), false);
        let err = handler
            .update_data(UpdateDataInput {
                table_name: "Users".into(),
                schema: None,
                values: object(json!({"Name": "Bob"})),
                where_clause: "   ".into(),
                where_params: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::InvalidInput { .. }));
        assert_eq!(driver.call_count(), 0);
    }
}
