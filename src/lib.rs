//! MSSQL MCP Server Library
//!
//! This library exposes a Microsoft SQL Server database to AI assistants
//! as MCP (Model Context Protocol) tools, behind a governed execution
//! pipeline: lexical read-only validation, bound parameters, row limits and
//! sanitized error reporting.

pub mod config;
pub mod db;
pub mod error;
pub mod mcp;
pub mod models;
pub mod tools;
pub mod transport;

pub use config::{Config, QueryPolicy, RowLimits};
pub use db::QueryExecutor;
pub use error::{DbError, DbResult};
pub use mcp::DbService;
