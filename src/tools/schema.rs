//! Schema introspection tools.
//!
//! This module implements the `list_tables`, `describe_table` and
//! `list_indexes` MCP tools.

use crate::config::RowLimits;
use crate::db::QueryExecutor;
use crate::db::schema::SchemaInspector;
use crate::error::DbResult;
use crate::models::{ColumnDefinition, ForeignKey, IndexInfo, TableInfo, TableSchema};
use crate::tools::{limit_warning, schema_or_default};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::info;

fn default_true() -> bool {
    true
}

/// Input for the list_tables tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ListTablesInput {
    /// Only list objects in this schema. Omit for all schemas.
    #[serde(default)]
    pub schema: Option<String>,
    /// Include views in the result. Default: true
    #[serde(default = "default_true")]
    pub include_views: bool,
    /// Maximum rows to return. Defaults to the server's configured default.
    #[serde(default)]
    pub limit: Option<u32>,
}

/// Output from the list_tables tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ListTablesOutput {
    /// List of tables/views with metadata
    pub tables: Vec<TableInfo>,
    /// Number of tables/views returned
    pub count: usize,
    pub row_count_total: usize,
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Input for the describe_table tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DescribeTableInput {
    /// Name of the table or view to describe
    pub table_name: String,
    /// Schema containing the table. Default: dbo
    #[serde(default)]
    pub schema: Option<String>,
}

/// Output from the describe_table tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct DescribeTableOutput {
    pub schema: String,
    pub table_name: String,
    /// Column definitions with types and constraints
    pub columns: Vec<ColumnDefinition>,
    /// Column names that form the primary key
    pub primary_key: Vec<String>,
    /// Foreign key relationships to other tables
    pub foreign_keys: Vec<ForeignKey>,
}

impl From<TableSchema> for DescribeTableOutput {
    fn from(schema: TableSchema) -> Self {
        let primary_key = schema
            .primary_key()
            .into_iter()
            .map(str::to_string)
            .collect();
        Self {
            schema: schema.schema_name,
            table_name: schema.table_name,
            columns: schema.columns,
            primary_key,
            foreign_keys: schema.foreign_keys,
        }
    }
}

/// Input for the list_indexes tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ListIndexesInput {
    pub table_name: String,
    /// Schema containing the table. Default: dbo
    #[serde(default)]
    pub schema: Option<String>,
}

/// Output from the list_indexes tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ListIndexesOutput {
    pub schema: String,
    pub table_name: String,
    pub indexes: Vec<IndexInfo>,
    pub count: usize,
}

pub struct SchemaToolHandler {
    executor: QueryExecutor,
    limits: RowLimits,
}

impl SchemaToolHandler {
    pub fn new(executor: QueryExecutor, limits: RowLimits) -> Self {
        Self { executor, limits }
    }

    fn inspector(&self) -> SchemaInspector<'_> {
        SchemaInspector::new(&self.executor, self.limits.ceiling)
    }

    pub async fn list_tables(&self, input: ListTablesInput) -> DbResult<ListTablesOutput> {
        let (limit, capped) = self.limits.resolve(input.limit);
        let schema = input
            .schema
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());

        let (tables, total) = self
            .inspector()
            .list_tables(schema, input.include_views, limit)
            .await?;
        let count = tables.len();

        info!(count = count, total = total, "Listed tables");

        Ok(ListTablesOutput {
            tables,
            count,
            row_count_total: total,
            truncated: total > count,
            warning: limit_warning(input.limit, capped, limit),
        })
    }

    pub async fn describe_table(&self, input: DescribeTableInput) -> DbResult<DescribeTableOutput> {
        let schema = schema_or_default(input.schema.as_deref());
        let table = self
            .inspector()
            .describe_table(schema, &input.table_name)
            .await?;

        info!(
            schema = %schema,
            table = %input.table_name,
            columns = table.columns.len(),
            "Described table"
        );

        Ok(table.into())
    }

    pub async fn list_indexes(&self, input: ListIndexesInput) -> DbResult<ListIndexesOutput> {
        let schema = schema_or_default(input.schema.as_deref());
        let indexes = self
            .inspector()
            .list_indexes(schema, &input.table_name)
            .await?;
        let count = indexes.len();

        info!(schema = %schema, table = %input.table_name, count = count, "Listed indexes");

        Ok(ListIndexesOutput {
            schema: schema.to_string(),
            table_name: input.table_name,
            indexes,
            count,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueryPolicy;
    use crate::db::memory::CallKind;
    use crate::db::{InMemoryDriver, ResponseBuilder};
    use crate::error::DbError;
    use crate::models::ParamValue;
    use serde_json::json;
    use std::sync::Arc;

    fn handler(driver: InMemoryDriver) -> (SchemaToolHandler, Arc<InMemoryDriver>) {
        let driver = Arc::new(driver);
        let executor = QueryExecutor::new(driver.clone(), QueryPolicy { read_only: true });
        (SchemaToolHandler::new(executor, RowLimits::default()), driver)
    }

    fn object_id(id: i64) -> crate::db::DriverResponse {
        ResponseBuilder::new()
            .columns(&[("object_id", "Int8")])
            .row(vec![json!(id)])
            .build()
    }

    #[test]
    fn test_list_tables_input_defaults() {
        let input: ListTablesInput = serde_json::from_str("{}").unwrap();
        assert!(input.include_views);
        assert!(input.schema.is_none());
        assert!(input.limit.is_none());
    }

    #[tokio::test]
    async fn test_list_tables_binds_filters() {
        let tables = ResponseBuilder::new()
            .columns(&[
                ("schema_name", "NVarchar"),
                ("table_name", "NVarchar"),
                ("table_type", "Varchar"),
                ("row_count", "Int8"),
            ])
            .row(vec![json!("sales"), json!("Orders"), json!("TABLE"), json!(12)])
            .build();
        let (handler, driver) = handler(InMemoryDriver::new().with_response(tables));

        let output = handler
            .list_tables(ListTablesInput {
                schema: Some("sales".into()),
                include_views: false,
                limit: None,
            })
            .await
            .unwrap();

        assert_eq!(output.count, 1);
        assert_eq!(output.tables[0].table_name, "Orders");
        assert!(!output.truncated);

        let call = driver.last_call().unwrap();
        assert!(call.sql.contains("sys.objects"));
        let schema = call.params.iter().find(|p| p.name == "schema").unwrap();
        assert_eq!(schema.value, ParamValue::String("sales".into()));
        let views = call.params.iter().find(|p| p.name == "include_views").unwrap();
        assert_eq!(views.value, ParamValue::Bool(false));
    }

    #[tokio::test]
    async fn test_describe_table_defaults_schema_and_collects_pk() {
        let columns = ResponseBuilder::new()
            .columns(&[
                ("column_id", "Int4"),
                ("column_name", "NVarchar"),
                ("data_type", "NVarchar"),
                ("max_length", "Int4"),
                ("precision", "Int4"),
                ("scale", "Int4"),
                ("is_nullable", "Bit"),
                ("is_identity", "Bit"),
                ("is_computed", "Bit"),
                ("is_primary_key", "Bit"),
                ("default_value", "NVarchar"),
            ])
            .row(vec![
                json!(1),
                json!("Id"),
                json!("int"),
                json!(4),
                json!(10),
                json!(0),
                json!(false),
                json!(true),
                json!(false),
                json!(true),
                json!(null),
            ])
            .row(vec![
                json!(2),
                json!("Email"),
                json!("nvarchar"),
                json!(512),
                json!(0),
                json!(0),
                json!(true),
                json!(false),
                json!(false),
                json!(false),
                json!(null),
            ])
            .build();
        let driver = InMemoryDriver::new()
            .with_response(object_id(901578250))
            .with_response(columns)
            .with_response(crate::db::DriverResponse::empty());
        let (handler, driver) = handler(driver);

        let output = handler
            .describe_table(DescribeTableInput {
                table_name: "Users".into(),
                schema: None,
            })
            .await
            .unwrap();

        assert_eq!(output.schema, "dbo");
        assert_eq!(output.primary_key, vec!["Id".to_string()]);
        assert_eq!(output.columns.len(), 2);
        assert!(output.foreign_keys.is_empty());

        let calls = driver.calls();
        assert_eq!(calls.len(), 3);
        assert!(calls.iter().all(|c| c.kind == CallKind::Fetch));
    }

    #[tokio::test]
    async fn test_describe_missing_table_is_schema_error() {
        let missing = ResponseBuilder::new()
            .columns(&[("object_id", "Int8")])
            .row(vec![json!(null)])
            .build();
        let (handler, driver) = handler(InMemoryDriver::new().with_response(missing));

        let err = handler
            .describe_table(DescribeTableInput {
                table_name: "Nope".into(),
                schema: Some("dbo".into()),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, DbError::Schema { .. }));
        assert_eq!(driver.call_count(), 1);
    }
}
