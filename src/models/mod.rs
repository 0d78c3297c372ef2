//! Data models for the MSSQL MCP Server.
//!
//! This module re-exports all model types used throughout the application.

pub mod query;
pub mod schema;

// Re-export commonly used types
pub use query::{
    ExecutionResult, FieldInfo, JsonRow, ParamMap, ParamValue, Statement, WriteResult,
    param_map_from_json,
};
pub use schema::{
    ActiveRequest, ColumnDefinition, ForeignKey, FragmentationRow, IndexInfo, IndexMaintenance,
    TableInfo, TableSchema,
};
