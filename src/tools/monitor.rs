//! Server monitoring tools.
//!
//! This module implements the `index_fragmentation` and `active_requests`
//! MCP tools on top of SQL Server's dynamic management views.

use crate::config::RowLimits;
use crate::db::QueryExecutor;
use crate::db::schema::SchemaInspector;
use crate::error::DbResult;
use crate::models::{ActiveRequest, FragmentationRow, IndexMaintenance};
use crate::tools::limit_warning;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::info;

/// SQL Server data page size in bytes.
pub const PAGE_SIZE_BYTES: u64 = 8192;

/// Indexes smaller than this are skipped by default; fragmentation on a
/// handful of pages says nothing about performance.
pub const DEFAULT_MIN_PAGES: i64 = 100;

/// Format bytes as human-readable size string.
///
/// Uses binary units (1 KB = 1024 bytes), via `humansize` with the WINDOWS
/// preset.
///
/// # Examples
///
/// ```
/// use mssql_mcp_server::tools::monitor::format_size;
///
/// assert_eq!(format_size(512), "512 B");
/// assert_eq!(format_size(8192), "8 kB");
/// assert_eq!(format_size(1048576), "1 MB");
/// ```
pub fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::WINDOWS)
}

/// Input for the index_fragmentation tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct IndexFragmentationInput {
    /// Only report indexes in this schema
    #[serde(default)]
    pub schema: Option<String>,
    /// Only report indexes on this table
    #[serde(default)]
    pub table_name: Option<String>,
    /// Skip indexes with fewer pages than this. Default: 100
    #[serde(default)]
    pub min_pages: Option<i64>,
    /// Maximum rows to return. Defaults to the server's configured default.
    #[serde(default)]
    pub limit: Option<u32>,
}

/// One index with its fragmentation and recommended maintenance.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct IndexFragmentationEntry {
    pub schema_name: String,
    pub table_name: String,
    /// Absent for heaps
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_name: Option<String>,
    pub index_type: String,
    pub fragmentation_percent: f64,
    pub page_count: i64,
    /// page_count * 8 KB, human readable
    pub size_formatted: String,
    /// REBUILD above 30%, REORGANIZE from 5% to 30%, otherwise NONE
    pub recommendation: IndexMaintenance,
}

impl From<FragmentationRow> for IndexFragmentationEntry {
    fn from(row: FragmentationRow) -> Self {
        let pages = u64::try_from(row.page_count).unwrap_or(0);
        Self {
            recommendation: IndexMaintenance::for_fragmentation(row.fragmentation_percent),
            size_formatted: format_size(pages.saturating_mul(PAGE_SIZE_BYTES)),
            schema_name: row.schema_name,
            table_name: row.table_name,
            index_name: row.index_name,
            index_type: row.index_type,
            fragmentation_percent: (row.fragmentation_percent * 100.0).round() / 100.0,
            page_count: row.page_count,
        }
    }
}

/// Output from the index_fragmentation tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct IndexFragmentationOutput {
    /// Most fragmented first
    pub indexes: Vec<IndexFragmentationEntry>,
    pub count: usize,
    /// Number of indexes recommended for REBUILD
    pub rebuild_count: usize,
    /// Number of indexes recommended for REORGANIZE
    pub reorganize_count: usize,
    pub row_count_total: usize,
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

/// Input for the active_requests tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ActiveRequestsInput {
    /// Maximum rows to return. Defaults to the server's configured default.
    #[serde(default)]
    pub limit: Option<u32>,
}

/// Output from the active_requests tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ActiveRequestsOutput {
    /// Longest running first
    pub requests: Vec<ActiveRequest>,
    pub count: usize,
    /// Session ids that are blocking at least one other request
    pub blocking_sessions: Vec<i32>,
    pub row_count_total: usize,
    pub truncated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

pub struct MonitorToolHandler {
    executor: QueryExecutor,
    limits: RowLimits,
}

impl MonitorToolHandler {
    pub fn new(executor: QueryExecutor, limits: RowLimits) -> Self {
        Self { executor, limits }
    }

    pub async fn index_fragmentation(
        &self,
        input: IndexFragmentationInput,
    ) -> DbResult<IndexFragmentationOutput> {
        let (limit, capped) = self.limits.resolve(input.limit);
        let min_pages = input.min_pages.unwrap_or(DEFAULT_MIN_PAGES).max(0);
        let inspector = SchemaInspector::new(&self.executor, limit);

        let (rows, total) = inspector
            .index_fragmentation(
                non_blank(input.schema.as_deref()),
                non_blank(input.table_name.as_deref()),
                min_pages,
                limit,
            )
            .await?;

        let indexes: Vec<IndexFragmentationEntry> = rows.into_iter().map(Into::into).collect();
        let tally = |m: IndexMaintenance| indexes.iter().filter(|i| i.recommendation == m).count();
        let rebuild_count = tally(IndexMaintenance::Rebuild);
        let reorganize_count = tally(IndexMaintenance::Reorganize);
        let count = indexes.len();

        info!(
            count = count,
            rebuild = rebuild_count,
            reorganize = reorganize_count,
            "Checked index fragmentation"
        );

        Ok(IndexFragmentationOutput {
            indexes,
            count,
            rebuild_count,
            reorganize_count,
            row_count_total: total,
            truncated: total > count,
            warning: limit_warning(input.limit, capped, limit),
        })
    }

    pub async fn active_requests(
        &self,
        input: ActiveRequestsInput,
    ) -> DbResult<ActiveRequestsOutput> {
        let (limit, capped) = self.limits.resolve(input.limit);
        let inspector = SchemaInspector::new(&self.executor, limit);
        let (requests, total) = inspector.active_requests(limit).await?;

        let mut blocking_sessions: Vec<i32> = requests
            .iter()
            .map(|r| r.blocking_session_id)
            .filter(|id| *id != 0)
            .collect();
        blocking_sessions.sort_unstable();
        blocking_sessions.dedup();

        let count = requests.len();
        info!(
            count = count,
            blocking = blocking_sessions.len(),
            "Listed active requests"
        );

        Ok(ActiveRequestsOutput {
            requests,
            count,
            blocking_sessions,
            row_count_total: total,
            truncated: total > count,
            warning: limit_warning(input.limit, capped, limit),
        })
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueryPolicy;
    use crate::db::{InMemoryDriver, ResponseBuilder};
    use crate::models::ParamValue;
    use serde_json::json;
    use std::sync::Arc;

    fn handler(driver: InMemoryDriver) -> (MonitorToolHandler, Arc<InMemoryDriver>) {
        let driver = Arc::new(driver);
        let executor = QueryExecutor::new(driver.clone(), QueryPolicy { read_only: true });
        (MonitorToolHandler::new(executor, RowLimits::default()), driver)
    }

    #[test]
    fn test_format_size_bytes() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1023), "1023 B");
    }

    #[test]
    fn test_format_size_pages() {
        assert_eq!(format_size(PAGE_SIZE_BYTES), "8 kB");
        assert_eq!(format_size(128 * PAGE_SIZE_BYTES), "1 MB");
        assert_eq!(format_size(192 * PAGE_SIZE_BYTES), "1.50 MB");
        assert_eq!(format_size(131_072 * PAGE_SIZE_BYTES), "1 GB");
    }

    #[test]
    fn test_entry_from_row() {
        let entry: IndexFragmentationEntry = FragmentationRow {
            schema_name: "dbo".into(),
            table_name: "Orders".into(),
            index_name: Some("IX_Orders_Date".into()),
            index_type: "NONCLUSTERED INDEX".into(),
            fragmentation_percent: 42.1234,
            page_count: 1280,
        }
        .into();

        assert_eq!(entry.recommendation, IndexMaintenance::Rebuild);
        assert_eq!(entry.fragmentation_percent, 42.12);
        assert_eq!(entry.size_formatted, "10 MB");
    }

    #[tokio::test]
    async fn test_index_fragmentation_counts_recommendations() {
        let response = ResponseBuilder::new()
            .columns(&[
                ("schema_name", "NVarchar"),
                ("table_name", "NVarchar"),
                ("index_name", "NVarchar"),
                ("index_type", "NVarchar"),
                ("fragmentation_percent", "Float8"),
                ("page_count", "Int8"),
            ])
            .row(vec![json!("dbo"), json!("A"), json!("IX_A"), json!("CLUSTERED INDEX"), json!(55.0), json!(900)])
            .row(vec![json!("dbo"), json!("B"), json!("IX_B"), json!("NONCLUSTERED INDEX"), json!(12.5), json!(400)])
            .row(vec![json!("dbo"), json!("C"), json!("IX_C"), json!("NONCLUSTERED INDEX"), json!(1.0), json!(300)])
            .build();
        let (handler, driver) = handler(InMemoryDriver::new().with_response(response));

        let output = handler
            .index_fragmentation(IndexFragmentationInput {
                schema: Some(" ".into()),
                table_name: None,
                min_pages: None,
                limit: None,
            })
            .await
            .unwrap();

        assert_eq!(output.count, 3);
        assert_eq!(output.rebuild_count, 1);
        assert_eq!(output.reorganize_count, 1);
        assert_eq!(output.indexes[2].recommendation, IndexMaintenance::None);

        let call = driver.last_call().unwrap();
        assert!(call.sql.contains("dm_db_index_physical_stats"));
        let schema = call.params.iter().find(|p| p.name == "schema").unwrap();
        assert!(matches!(schema.value, ParamValue::Null));
        let pages = call.params.iter().find(|p| p.name == "min_pages").unwrap();
        assert_eq!(pages.value, ParamValue::Int(DEFAULT_MIN_PAGES));
    }

    #[tokio::test]
    async fn test_active_requests_collects_blockers() {
        let cols = [
            ("session_id", "Int2"),
            ("status", "NVarchar"),
            ("command", "NVarchar"),
            ("database_name", "NVarchar"),
            ("wait_type", "NVarchar"),
            ("wait_time_ms", "Int8"),
            ("blocking_session_id", "Int2"),
            ("elapsed_ms", "Int8"),
            ("cpu_ms", "Int8"),
            ("logical_reads", "Int8"),
            ("sql_text", "NVarchar"),
        ];
        let request = |id: i32, blocker: i32| {
            vec![
                json!(id),
                json!("suspended"),
                json!("SELECT"),
                json!("Shop"),
                json!("LCK_M_S"),
                json!(1500),
                json!(blocker),
                json!(1600),
                json!(3),
                json!(40),
                json!("SELECT * FROM dbo.Orders"),
            ]
        };
        let response = ResponseBuilder::new()
            .columns(&cols)
            .row(request(61, 55))
            .row(request(62, 55))
            .row(request(63, 0))
            .build();
        let (handler, _) = handler(InMemoryDriver::new().with_response(response));

        let output = handler
            .active_requests(ActiveRequestsInput { limit: Some(10) })
            .await
            .unwrap();

        assert_eq!(output.count, 3);
        assert_eq!(output.blocking_sessions, vec![55]);
        assert!(!output.truncated);
    }
}
