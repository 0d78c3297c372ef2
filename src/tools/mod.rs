//! MCP tool implementations.
//!
//! This module contains all database tool handlers:
//! - `query`: `validate_query` and `read_data`
//! - `schema`: `list_tables`, `describe_table`, `list_indexes`
//! - `monitor`: `index_fragmentation`, `active_requests`
//! - `explain`: `explain_query`
//! - `write`: `insert_data`, `update_data`, `delete_data`
//! - `builders`: parameterized INSERT/UPDATE/DELETE construction
//! - `sql_validator`: SQL statement validation for read-only enforcement

pub mod builders;
pub mod explain;
pub mod monitor;
pub mod query;
pub mod schema;
pub mod sql_validator;
pub mod write;

pub use explain::{ExplainQueryInput, ExplainQueryOutput, ExplainToolHandler};
pub use monitor::{
    ActiveRequestsInput, ActiveRequestsOutput, IndexFragmentationInput, IndexFragmentationOutput,
    MonitorToolHandler,
};
pub use query::{
    QueryToolHandler, ReadDataInput, ReadDataOutput, ValidateQueryInput, ValidateQueryOutput,
};
pub use schema::{
    DescribeTableInput, DescribeTableOutput, ListIndexesInput, ListIndexesOutput, ListTablesInput,
    ListTablesOutput, SchemaToolHandler,
};
pub use write::{
    DeleteDataInput, InsertDataInput, UpdateDataInput, WriteDataOutput, WriteToolHandler,
};

/// Schema used when a tool call names none.
pub const DEFAULT_SCHEMA: &str = "dbo";

/// Warning reported when a caller's row limit exceeded the ceiling.
pub(crate) fn limit_warning(requested: Option<u32>, capped: bool, limit: u32) -> Option<String> {
    match requested {
        Some(requested) if capped => Some(format!(
            "Requested limit {} exceeds maximum allowed ({}). Results capped to {} rows.",
            requested, limit, limit
        )),
        _ => None,
    }
}

/// Resolve an optional schema name, treating blank as absent.
pub(crate) fn schema_or_default(schema: Option<&str>) -> &str {
    match schema.map(str::trim) {
        Some(s) if !s.is_empty() => s,
        _ => DEFAULT_SCHEMA,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_warning_only_when_capped() {
        assert!(limit_warning(None, false, 100).is_none());
        assert!(limit_warning(Some(50), false, 50).is_none());
        let warning = limit_warning(Some(50_000), true, 10_000).unwrap();
        assert!(warning.contains("50000"));
        assert!(warning.contains("10000"));
    }

    #[test]
    fn test_schema_defaults_to_dbo() {
        assert_eq!(schema_or_default(None), "dbo");
        assert_eq!(schema_or_default(Some("  ")), "dbo");
        assert_eq!(schema_or_default(Some("sales")), "sales");
    }
}
