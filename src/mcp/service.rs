//! MCP service implementation using rmcp.
//!
//! This module defines the DbService struct with all SQL Server tools
//! exposed via the MCP protocol using the rmcp framework's macros.

use crate::config::RowLimits;
use crate::db::QueryExecutor;
use crate::tools::explain::{ExplainQueryInput, ExplainQueryOutput, ExplainToolHandler};
use crate::tools::monitor::{
    ActiveRequestsInput, ActiveRequestsOutput, IndexFragmentationInput, IndexFragmentationOutput,
    MonitorToolHandler,
};
use crate::tools::query::{
    QueryToolHandler, ReadDataInput, ReadDataOutput, ValidateQueryInput, ValidateQueryOutput,
};
use crate::tools::schema::{
    DescribeTableInput, DescribeTableOutput, ListIndexesInput, ListIndexesOutput, ListTablesInput,
    ListTablesOutput, SchemaToolHandler,
};
use crate::tools::write::{
    DeleteDataInput, InsertDataInput, UpdateDataInput, WriteDataOutput, WriteToolHandler,
};
use rmcp::Json;
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::{Implementation, ProtocolVersion, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
};

#[derive(Clone)]
pub struct DbService {
    /// Shared execution pipeline for all database operations
    executor: QueryExecutor,
    /// Row limits applied to every read tool
    limits: RowLimits,
    /// Tool router for MCP tool dispatch (auto-generated)
    tool_router: ToolRouter<Self>,
}

impl DbService {
    /// Create a new DbService instance.
    ///
    /// # Arguments
    ///
    /// * `executor` - Execution pipeline carrying the driver and the read-only policy
    /// * `limits` - Default and ceiling row limits for read tools
    pub fn new(executor: QueryExecutor, limits: RowLimits) -> Self {
        Self {
            executor,
            limits,
            tool_router: Self::tool_router(),
        }
    }

    fn query_handler(&self) -> QueryToolHandler {
        QueryToolHandler::new(self.executor.clone(), self.limits)
    }

    fn schema_handler(&self) -> SchemaToolHandler {
        SchemaToolHandler::new(self.executor.clone(), self.limits)
    }

    fn monitor_handler(&self) -> MonitorToolHandler {
        MonitorToolHandler::new(self.executor.clone(), self.limits)
    }

    fn write_handler(&self) -> WriteToolHandler {
        WriteToolHandler::new(self.executor.clone())
    }
}

#[tool_router]
impl DbService {
    #[tool(
        description = "Check a SQL statement against the read-only rules without running it.\nReturns valid, reason and queryType. Only SELECT and WITH ... SELECT statements pass."
    )]
    async fn validate_query(
        &self,
        Parameters(input): Parameters<ValidateQueryInput>,
    ) -> Json<ValidateQueryOutput> {
        Json(self.query_handler().validate_query(input))
    }

    #[tool(
        description = "Run a SELECT query and return rows.\nUse named parameters (@name) with the params object; never inline values.\nResults are capped by limit; truncated and row_count_total report what was dropped."
    )]
    async fn read_data(
        &self,
        Parameters(input): Parameters<ReadDataInput>,
    ) -> Result<Json<ReadDataOutput>, McpError> {
        self.query_handler()
            .read_data(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        description = "List user tables and views with their schema and row counts.\nCan filter by schema name."
    )]
    async fn list_tables(
        &self,
        Parameters(input): Parameters<ListTablesInput>,
    ) -> Result<Json<ListTablesOutput>, McpError> {
        self.schema_handler()
            .list_tables(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        description = "Get the columns, primary key and foreign keys of a table or view.\nSchema defaults to dbo."
    )]
    async fn describe_table(
        &self,
        Parameters(input): Parameters<DescribeTableInput>,
    ) -> Result<Json<DescribeTableOutput>, McpError> {
        self.schema_handler()
            .describe_table(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        description = "List the indexes of a table with key and included columns.\nSchema defaults to dbo."
    )]
    async fn list_indexes(
        &self,
        Parameters(input): Parameters<ListIndexesInput>,
    ) -> Result<Json<ListIndexesOutput>, McpError> {
        self.schema_handler()
            .list_indexes(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        description = "Report index fragmentation, most fragmented first, with a maintenance recommendation.\nREBUILD above 30%, REORGANIZE from 5% to 30%. Small indexes (min_pages, default 100) are skipped."
    )]
    async fn index_fragmentation(
        &self,
        Parameters(input): Parameters<IndexFragmentationInput>,
    ) -> Result<Json<IndexFragmentationOutput>, McpError> {
        self.monitor_handler()
            .index_fragmentation(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        description = "List requests currently running in user sessions, longest first.\nIncludes waits, blocking session ids, CPU time and statement text."
    )]
    async fn active_requests(
        &self,
        Parameters(input): Parameters<ActiveRequestsInput>,
    ) -> Result<Json<ActiveRequestsOutput>, McpError> {
        self.monitor_handler()
            .active_requests(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        description = "Show the estimated execution plan (ShowPlanXML) of a query without executing it.\nParameters are not supported; use literal values."
    )]
    async fn explain_query(
        &self,
        Parameters(input): Parameters<ExplainQueryInput>,
    ) -> Result<Json<ExplainQueryOutput>, McpError> {
        ExplainToolHandler::new(self.executor.clone())
            .explain_query(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        description = "Insert one row. Values are bound as parameters.\nRejected when the server runs in read-only mode."
    )]
    async fn insert_data(
        &self,
        Parameters(input): Parameters<InsertDataInput>,
    ) -> Result<Json<WriteDataOutput>, McpError> {
        self.write_handler()
            .insert_data(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        description = "Update rows matching a WHERE condition. A WHERE condition is required.\nReference where_params as @name. Rejected when the server runs in read-only mode."
    )]
    async fn update_data(
        &self,
        Parameters(input): Parameters<UpdateDataInput>,
    ) -> Result<Json<WriteDataOutput>, McpError> {
        self.write_handler()
            .update_data(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        description = "Delete rows matching a WHERE condition. A WHERE condition is required.\nReference where_params as @name. Rejected when the server runs in read-only mode."
    )]
    async fn delete_data(
        &self,
        Parameters(input): Parameters<DeleteDataInput>,
    ) -> Result<Json<WriteDataOutput>, McpError> {
        self.write_handler()
            .delete_data(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }
}

#[tool_handler]
impl ServerHandler for DbService {
    fn get_info(&self) -> ServerInfo {
        let mode = if self.executor.policy().read_only {
            "This server runs in READ-ONLY mode: insert_data, update_data and delete_data are rejected, \
            and read_data only accepts SELECT / WITH ... SELECT."
        } else {
            "This server runs in READ-WRITE mode: write tools are enabled."
        };

        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_03_26,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "mssql-mcp-server".to_owned(),
                title: Some("SQL Server MCP Server".to_owned()),
                version: env!("CARGO_PKG_VERSION").to_owned(),
                icons: None,
                website_url: None,
            },
            instructions: Some(format!(
                "Tools for exploring and querying one Microsoft SQL Server database.\n\
                \n\
                ## Workflow\n\
                1. `list_tables` to find tables, `describe_table` / `list_indexes` for structure\n\
                2. `validate_query` to pre-check a statement, `read_data` to run it\n\
                3. `explain_query` for the estimated plan of a slow query\n\
                4. `index_fragmentation` and `active_requests` for server health\n\
                \n\
                ## Parameters\n\
                Pass values through `params` / `where_params` and reference them as `@name`.\n\
                Do not inline user values into SQL text.\n\
                \n\
                ## Mode\n\
                {}",
                mode
            )),
        }
    }
}
