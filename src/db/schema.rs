//! Schema introspection module.
//!
//! Catalog and monitoring queries for SQL Server. Every query here goes
//! through the [`QueryExecutor`] like any caller-supplied query, so each one
//! must pass the read-only validator: no comments, no `INTO`, and catalog
//! column names only where they are not whole blocked words.

use crate::db::executor::QueryExecutor;
use crate::error::{DbError, DbResult};
use crate::models::{
    ActiveRequest, ForeignKey, FragmentationRow, IndexInfo, JsonRow, ParamMap,
    ParamValue, TableInfo, TableSchema,
};
use serde::de::DeserializeOwned;
use tracing::debug;

/// Schema inspector for database introspection.
pub struct SchemaInspector<'a> {
    executor: &'a QueryExecutor,
    row_limit: u32,
}

impl<'a> SchemaInspector<'a> {
    /// `row_limit` caps catalog results that are not limited by the caller.
    pub fn new(executor: &'a QueryExecutor, row_limit: u32) -> Self {
        Self {
            executor,
            row_limit,
        }
    }

    /// List tables (and optionally views), optionally within one schema.
    ///
    /// Returns the rows and the untruncated count.
    pub async fn list_tables(
        &self,
        schema: Option<&str>,
        include_views: bool,
        limit: u32,
    ) -> DbResult<(Vec<TableInfo>, usize)> {
        let mut params = ParamMap::new();
        params.insert("schema".into(), opt_string(schema));
        params.insert("include_views".into(), ParamValue::Bool(include_views));

        let result = self
            .executor
            .execute_query(queries::LIST_TABLES, &params, limit)
            .await?;
        let total = result.row_count_total;
        Ok((decode_rows(result.rows)?, total))
    }

    /// Object id of `[schema].[table]`, or `None` if it does not exist.
    pub async fn object_id(&self, schema: &str, table: &str) -> DbResult<Option<i64>> {
        self.executor
            .execute_scalar(queries::OBJECT_ID, &table_params(schema, table))
            .await
    }

    async fn require_table(&self, schema: &str, table: &str) -> DbResult<()> {
        match self.object_id(schema, table).await? {
            Some(_) => Ok(()),
            None => Err(DbError::schema(
                "Table or view not found",
                format!("{}.{}", schema, table),
            )),
        }
    }

    /// Describe a table's columns and foreign keys.
    pub async fn describe_table(&self, schema: &str, table: &str) -> DbResult<TableSchema> {
        self.require_table(schema, table).await?;
        let params = table_params(schema, table);

        let columns = self
            .executor
            .execute_query(queries::DESCRIBE_COLUMNS, &params, self.row_limit)
            .await?;
        let foreign_keys = self
            .executor
            .execute_query(queries::FOREIGN_KEYS, &params, self.row_limit)
            .await?;

        debug!(
            schema = %schema,
            table = %table,
            columns = columns.row_count(),
            "Described table"
        );

        Ok(TableSchema {
            schema_name: schema.to_string(),
            table_name: table.to_string(),
            columns: decode_rows(columns.rows)?,
            foreign_keys: decode_rows::<ForeignKey>(foreign_keys.rows)?,
        })
    }

    /// List the indexes of a table.
    pub async fn list_indexes(&self, schema: &str, table: &str) -> DbResult<Vec<IndexInfo>> {
        self.require_table(schema, table).await?;
        let result = self
            .executor
            .execute_query(
                queries::LIST_INDEXES,
                &table_params(schema, table),
                self.row_limit,
            )
            .await?;
        decode_rows(result.rows)
    }

    /// Fragmentation of indexes with at least `min_pages` pages, worst first.
    pub async fn index_fragmentation(
        &self,
        schema: Option<&str>,
        table: Option<&str>,
        min_pages: i64,
        limit: u32,
    ) -> DbResult<(Vec<FragmentationRow>, usize)> {
        let mut params = ParamMap::new();
        params.insert("schema".into(), opt_string(schema));
        params.insert("table".into(), opt_string(table));
        params.insert("min_pages".into(), ParamValue::Int(min_pages));

        let result = self
            .executor
            .execute_query(queries::INDEX_FRAGMENTATION, &params, limit)
            .await?;
        let total = result.row_count_total;
        Ok((decode_rows(result.rows)?, total))
    }

    /// Requests currently executing in user sessions, longest-running first.
    pub async fn active_requests(&self, limit: u32) -> DbResult<(Vec<ActiveRequest>, usize)> {
        let result = self
            .executor
            .execute_query(queries::ACTIVE_REQUESTS, &ParamMap::new(), limit)
            .await?;
        let total = result.row_count_total;
        Ok((decode_rows(result.rows)?, total))
    }
}

fn opt_string(value: Option<&str>) -> ParamValue {
    value
        .map(|s| ParamValue::String(s.to_string()))
        .unwrap_or(ParamValue::Null)
}

fn table_params(schema: &str, table: &str) -> ParamMap {
    let mut params = ParamMap::new();
    params.insert("schema".into(), ParamValue::String(schema.to_string()));
    params.insert("table".into(), ParamValue::String(table.to_string()));
    params
}

fn decode_rows<T: DeserializeOwned>(rows: Vec<JsonRow>) -> DbResult<Vec<T>> {
    rows.into_iter()
        .map(|row| {
            serde_json::from_value(serde_json::Value::Object(row))
                .map_err(|e| DbError::internal(format!("Unexpected catalog row shape: {}", e)))
        })
        .collect()
}

// =============================================================================
// SQL Query Templates
// =============================================================================

pub(crate) mod queries {
    pub const LIST_TABLES: &str = r#"
        SELECT
            s.name AS schema_name,
            o.name AS table_name,
            CASE o.type WHEN 'U' THEN 'TABLE' ELSE 'VIEW' END AS table_type,
            (SELECT SUM(p.rows) FROM sys.partitions p
              WHERE p.object_id = o.object_id AND p.index_id IN (0, 1)) AS row_count
        FROM sys.objects o
        JOIN sys.schemas s ON s.schema_id = o.schema_id
        WHERE o.type IN ('U', 'V')
          AND o.is_ms_shipped = 0
          AND (@include_views = 1 OR o.type = 'U')
          AND (@schema IS NULL OR s.name = @schema)
        ORDER BY s.name, o.name
        "#;

    pub const OBJECT_ID: &str =
        "SELECT CAST(OBJECT_ID(QUOTENAME(@schema) + '.' + QUOTENAME(@table)) AS BIGINT) AS object_id";

    pub const DESCRIBE_COLUMNS: &str = r#"
        SELECT
            c.column_id,
            c.name AS column_name,
            t.name AS data_type,
            CAST(c.max_length AS INT) AS max_length,
            CAST(c.precision AS INT) AS precision,
            CAST(c.scale AS INT) AS scale,
            c.is_nullable,
            ISNULL(c.is_identity, 0) AS is_identity,
            ISNULL(c.is_computed, 0) AS is_computed,
            CAST(CASE WHEN pk.column_id IS NULL THEN 0 ELSE 1 END AS BIT) AS is_primary_key,
            dc.definition AS default_value
        FROM sys.columns c
        JOIN sys.types t ON t.user_type_id = c.user_type_id
        LEFT JOIN sys.default_constraints dc ON dc.object_id = c.default_object_id
        LEFT JOIN (
            SELECT ic.object_id, ic.column_id
            FROM sys.indexes i
            JOIN sys.index_columns ic ON ic.object_id = i.object_id AND ic.index_id = i.index_id
            WHERE i.is_primary_key = 1
        ) pk ON pk.object_id = c.object_id AND pk.column_id = c.column_id
        WHERE c.object_id = OBJECT_ID(QUOTENAME(@schema) + '.' + QUOTENAME(@table))
        ORDER BY c.column_id
        "#;

    pub const FOREIGN_KEYS: &str = r#"
        SELECT
            fk.name AS constraint_name,
            pc.name AS column_name,
            rs.name AS referenced_schema,
            rt.name AS referenced_table,
            rc.name AS referenced_column,
            fk.delete_referential_action_desc AS on_delete,
            fk.update_referential_action_desc AS on_update
        FROM sys.foreign_keys fk
        JOIN sys.foreign_key_columns fkc ON fkc.constraint_object_id = fk.object_id
        JOIN sys.columns pc
          ON pc.object_id = fkc.parent_object_id AND pc.column_id = fkc.parent_column_id
        JOIN sys.objects rt ON rt.object_id = fkc.referenced_object_id
        JOIN sys.schemas rs ON rs.schema_id = rt.schema_id
        JOIN sys.columns rc
          ON rc.object_id = fkc.referenced_object_id AND rc.column_id = fkc.referenced_column_id
        WHERE fk.parent_object_id = OBJECT_ID(QUOTENAME(@schema) + '.' + QUOTENAME(@table))
        ORDER BY fk.name, fkc.constraint_column_id
        "#;

    pub const LIST_INDEXES: &str = r#"
        SELECT
            i.name AS index_name,
            i.type_desc AS index_type,
            ISNULL(i.is_unique, 0) AS is_unique,
            ISNULL(i.is_primary_key, 0) AS is_primary_key,
            ISNULL(i.is_disabled, 0) AS is_disabled,
            STRING_AGG(CASE WHEN ic.is_included_column = 0 THEN c.name END, ', ')
                WITHIN GROUP (ORDER BY ic.key_ordinal) AS key_columns,
            STRING_AGG(CASE WHEN ic.is_included_column = 1 THEN c.name END, ', ')
                AS included_columns
        FROM sys.indexes i
        JOIN sys.index_columns ic ON ic.object_id = i.object_id AND ic.index_id = i.index_id
        JOIN sys.columns c ON c.object_id = ic.object_id AND c.column_id = ic.column_id
        WHERE i.object_id = OBJECT_ID(QUOTENAME(@schema) + '.' + QUOTENAME(@table))
          AND i.index_id > 0
        GROUP BY i.name, i.type_desc, i.is_unique, i.is_primary_key, i.is_disabled
        ORDER BY i.is_primary_key DESC, i.name
        "#;

    pub const INDEX_FRAGMENTATION: &str = r#"
        SELECT
            s.name AS schema_name,
            o.name AS table_name,
            i.name AS index_name,
            ps.index_type_desc AS index_type,
            ISNULL(ps.avg_fragmentation_in_percent, 0) AS fragmentation_percent,
            ps.page_count
        FROM sys.dm_db_index_physical_stats(DB_ID(), NULL, NULL, NULL, 'LIMITED') ps
        JOIN sys.indexes i ON i.object_id = ps.object_id AND i.index_id = ps.index_id
        JOIN sys.objects o ON o.object_id = ps.object_id
        JOIN sys.schemas s ON s.schema_id = o.schema_id
        WHERE ps.index_id > 0
          AND ps.alloc_unit_type_desc = 'IN_ROW_DATA'
          AND ps.page_count >= @min_pages
          AND o.is_ms_shipped = 0
          AND (@schema IS NULL OR s.name = @schema)
          AND (@table IS NULL OR o.name = @table)
        ORDER BY ps.avg_fragmentation_in_percent DESC
        "#;

    pub const ACTIVE_REQUESTS: &str = r#"
        SELECT
            r.session_id,
            r.status,
            r.command,
            DB_NAME(r.database_id) AS database_name,
            r.wait_type,
            CAST(r.wait_time AS BIGINT) AS wait_time_ms,
            CAST(r.blocking_session_id AS INT) AS blocking_session_id,
            CAST(r.total_elapsed_time AS BIGINT) AS elapsed_ms,
            CAST(r.cpu_time AS BIGINT) AS cpu_ms,
            r.logical_reads,
            SUBSTRING(t.text, 1, 4000) AS sql_text
        FROM sys.dm_exec_requests r
        JOIN sys.dm_exec_sessions s ON s.session_id = r.session_id
        OUTER APPLY sys.dm_exec_sql_text(r.sql_handle) t
        WHERE s.is_user_process = 1
          AND r.session_id <> @@SPID
        ORDER BY r.total_elapsed_time DESC
        "#;
}
