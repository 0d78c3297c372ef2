//! Configuration handling for the MSSQL MCP Server.
//!
//! This module provides configuration management via CLI arguments and environment variables.

use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser};
use std::fmt;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 1433;
pub const DEFAULT_QUERY_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 15;
pub const DEFAULT_MAX_ROWS: u32 = 100;
pub const DEFAULT_MAX_ROWS_CEILING: u32 = 10_000;

// Pool configuration defaults
pub const DEFAULT_POOL_MIN: u32 = 0;
pub const DEFAULT_POOL_MAX: u32 = 10;

/// Policy the execution pipeline enforces on every call.
///
/// Built once from [`Config`] at startup and copied into the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryPolicy {
    pub read_only: bool,
}

/// Row limits applied by the tool layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowLimits {
    /// Used when the caller gives no limit
    pub default: u32,
    /// Hard upper bound on any caller limit
    pub ceiling: u32,
}

impl RowLimits {
    /// Resolve a caller's limit: `requested.unwrap_or(default)` clamped to
    /// `1..=ceiling`. The flag is true when the request exceeded the ceiling.
    pub fn resolve(&self, requested: Option<u32>) -> (u32, bool) {
        let wanted = requested.unwrap_or(self.default);
        (wanted.clamp(1, self.ceiling.max(1)), wanted > self.ceiling)
    }
}

impl Default for RowLimits {
    fn default() -> Self {
        Self {
            default: DEFAULT_MAX_ROWS,
            ceiling: DEFAULT_MAX_ROWS_CEILING,
        }
    }
}

/// Configuration for the MSSQL MCP Server.
#[derive(Clone, Parser)]
#[command(
    name = "mssql-mcp-server",
    about = "MCP server for Microsoft SQL Server - governed, read-only-by-choice query access for AI assistants",
    version,
    author
)]
pub struct Config {
    /// SQL Server host name or address
    #[arg(long, env = "MSSQL_SERVER")]
    pub server: String,

    /// SQL Server TCP port
    #[arg(long, default_value_t = DEFAULT_PORT, env = "MSSQL_PORT")]
    pub port: u16,

    /// Database to connect to
    #[arg(long, env = "MSSQL_DATABASE")]
    pub database: String,

    /// SQL login name
    #[arg(long, env = "MSSQL_USER")]
    pub user: String,

    /// SQL login password (sensitive - never logged)
    #[arg(long, env = "MSSQL_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// Restrict the server to validated read-only queries.
    /// Must be set explicitly (true/false); there is no default.
    #[arg(
        long,
        env = "MSSQL_READ_ONLY",
        required = true,
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    pub read_only: bool,

    /// Accept the server certificate without validation
    #[arg(long, env = "MSSQL_TRUST_SERVER_CERTIFICATE")]
    pub trust_server_certificate: bool,

    /// Per-request query timeout in milliseconds
    #[arg(
        long,
        default_value_t = DEFAULT_QUERY_TIMEOUT_MS,
        env = "MSSQL_QUERY_TIMEOUT_MS"
    )]
    pub query_timeout_ms: u64,

    /// Connection timeout in seconds
    #[arg(
        long,
        default_value_t = DEFAULT_CONNECT_TIMEOUT_SECS,
        env = "MSSQL_CONNECT_TIMEOUT"
    )]
    pub connect_timeout_secs: u64,

    /// Row limit applied when a tool call does not pass one
    #[arg(long, default_value_t = DEFAULT_MAX_ROWS, env = "MSSQL_MAX_ROWS_DEFAULT")]
    pub max_rows_default: u32,

    /// Upper bound for any requested row limit
    #[arg(
        long,
        default_value_t = DEFAULT_MAX_ROWS_CEILING,
        env = "MSSQL_MAX_ROWS_CEILING"
    )]
    pub max_rows_ceiling: u32,

    /// Idle connections the pool keeps open
    #[arg(long, default_value_t = DEFAULT_POOL_MIN, env = "MSSQL_POOL_MIN")]
    pub pool_min: u32,

    /// Maximum pooled connections
    #[arg(long, default_value_t = DEFAULT_POOL_MAX, env = "MSSQL_POOL_MAX")]
    pub pool_max: u32,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "MCP_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "MCP_JSON_LOGS")]
    pub json_logs: bool,

    /// Enable logging output (disabled by default to avoid interfering with stdio transport)
    #[arg(long, env = "MCP_ENABLE_LOGS")]
    pub enable_logs: bool,
}

impl Config {
    /// Parse configuration from command line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// The policy handed to the query executor.
    pub fn policy(&self) -> QueryPolicy {
        QueryPolicy {
            read_only: self.read_only,
        }
    }

    /// Get the query timeout as a Duration.
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    /// Get the connection timeout as a Duration.
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Row limits callers' requests are resolved against.
    pub fn row_limits(&self) -> RowLimits {
        RowLimits {
            default: self.max_rows_default,
            ceiling: self.max_rows_ceiling,
        }
    }

    /// Validate settings and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.server.trim().is_empty() {
            return Err("server must not be empty".to_string());
        }
        if self.database.trim().is_empty() {
            return Err("database must not be empty".to_string());
        }
        if self.pool_max == 0 {
            return Err("pool_max must be greater than 0".to_string());
        }
        if self.pool_min > self.pool_max {
            return Err(format!(
                "pool_min ({}) cannot exceed pool_max ({})",
                self.pool_min, self.pool_max
            ));
        }
        if self.query_timeout_ms == 0 {
            return Err("query_timeout_ms must be greater than 0".to_string());
        }
        if self.connect_timeout_secs == 0 {
            return Err("connect_timeout_secs must be greater than 0".to_string());
        }
        if self.max_rows_ceiling == 0 {
            return Err("max_rows_ceiling must be greater than 0".to_string());
        }
        if self.max_rows_default > self.max_rows_ceiling {
            return Err(format!(
                "max_rows_default ({}) cannot exceed max_rows_ceiling ({})",
                self.max_rows_default, self.max_rows_ceiling
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &crate::error::REDACTED)
            .field("read_only", &self.read_only)
            .field("trust_server_certificate", &self.trust_server_certificate)
            .field("query_timeout_ms", &self.query_timeout_ms)
            .field("connect_timeout_secs", &self.connect_timeout_secs)
            .field("max_rows_default", &self.max_rows_default)
            .field("max_rows_ceiling", &self.max_rows_ceiling)
            .field("pool_min", &self.pool_min)
            .field("pool_max", &self.pool_max)
            .finish_non_exhaustive()
    }
}
