//! Schema-related data models.
//!
//! This module defines the catalog and monitoring rows returned by the
//! introspection queries. Field names match the column aliases of those
//! queries, so rows deserialize straight from the JSON row form.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TableInfo {
    pub schema_name: String,
    pub table_name: String,
    /// "TABLE" or "VIEW"
    pub table_type: String,
    /// Rows in the heap or clustered index; absent for views
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_count: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ColumnDefinition {
    pub column_id: i32,
    pub column_name: String,
    pub data_type: String,
    /// Bytes; -1 for MAX types
    pub max_length: i32,
    pub precision: i32,
    pub scale: i32,
    #[serde(default)]
    pub is_nullable: Option<bool>,
    pub is_identity: bool,
    pub is_computed: bool,
    pub is_primary_key: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ForeignKey {
    pub constraint_name: String,
    pub column_name: String,
    pub referenced_schema: String,
    pub referenced_table: String,
    pub referenced_column: String,
    /// e.g. "NO_ACTION", "CASCADE"
    pub on_delete: String,
    pub on_update: String,
}

/// Full description of a table: columns plus outgoing foreign keys.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct TableSchema {
    pub schema_name: String,
    pub table_name: String,
    pub columns: Vec<ColumnDefinition>,
    pub foreign_keys: Vec<ForeignKey>,
}

impl TableSchema {
    /// Names of the primary-key columns, in column order.
    pub fn primary_key(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.is_primary_key)
            .map(|c| c.column_name.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct IndexInfo {
    pub index_name: String,
    /// CLUSTERED, NONCLUSTERED, COLUMNSTORE, ...
    pub index_type: String,
    pub is_unique: bool,
    pub is_primary_key: bool,
    pub is_disabled: bool,
    #[serde(default)]
    pub key_columns: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub included_columns: Option<String>,
}

/// Fragmentation of one index as reported by the physical-stats DMV.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct FragmentationRow {
    pub schema_name: String,
    pub table_name: String,
    pub index_name: Option<String>,
    pub index_type: String,
    pub fragmentation_percent: f64,
    pub page_count: i64,
}

/// Maintenance an index would benefit from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum IndexMaintenance {
    /// Fragmentation above 30%
    Rebuild,
    /// Fragmentation between 5% and 30%
    Reorganize,
    None,
}

impl IndexMaintenance {
    pub const REBUILD_THRESHOLD: f64 = 30.0;
    pub const REORGANIZE_THRESHOLD: f64 = 5.0;

    pub fn for_fragmentation(percent: f64) -> Self {
        if percent > Self::REBUILD_THRESHOLD {
            Self::Rebuild
        } else if percent >= Self::REORGANIZE_THRESHOLD {
            Self::Reorganize
        } else {
            Self::None
        }
    }
}

/// A request currently executing on the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ActiveRequest {
    pub session_id: i32,
    pub status: String,
    pub command: String,
    #[serde(default)]
    pub database_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_type: Option<String>,
    pub wait_time_ms: i64,
    /// 0 when not blocked
    pub blocking_session_id: i32,
    pub elapsed_ms: i64,
    pub cpu_ms: i64,
    pub logical_reads: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql_text: Option<String>,
}
