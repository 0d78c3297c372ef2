//! MSSQL MCP Server - Main entry point.
//!
//! Connects to one SQL Server database and serves the MCP tools over stdio.

use mssql_mcp_server::config::Config;
use mssql_mcp_server::db::{QueryExecutor, TiberiusDriver};
use mssql_mcp_server::mcp::DbService;
use mssql_mcp_server::transport::{StdioTransport, Transport};
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber for logging.
///
/// Logs go to stderr; stdout carries the MCP protocol.
fn init_tracing(config: &Config) {
    if !config.enable_logs {
        return;
    }

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_ansi(false),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse configuration from command line and environment
    let config = Config::parse_args();

    init_tracing(&config);

    if let Err(message) = config.validate() {
        error!(error = %message, "Invalid configuration");
        eprintln!("Error: {}", message);
        std::process::exit(2);
    }

    info!(
        server = %config.server,
        database = %config.database,
        read_only = config.read_only,
        "Starting MSSQL MCP Server v{}",
        env!("CARGO_PKG_VERSION")
    );

    let driver = match TiberiusDriver::connect(&config).await {
        Ok(driver) => Arc::new(driver),
        Err(e) => {
            error!(error = %e, "Failed to create connection pool");
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let executor = QueryExecutor::new(driver.clone(), config.policy());

    // Fail fast when the server is unreachable or the login is rejected.
    if let Err(e) = executor
        .execute_scalar::<i32>("SELECT 1 AS ok", &Default::default())
        .await
    {
        error!(error = %e, "Startup connectivity check failed");
        eprintln!("Error: {}", e);
        if let Some(suggestion) = e.suggestion() {
            eprintln!("Hint: {}", suggestion);
        }
        driver.close();
        std::process::exit(1);
    }
    info!("Database connection verified");

    let service = DbService::new(executor, config.row_limits());
    let transport = StdioTransport::new(service).with_pool(driver);
    info!(transport = transport.name(), "Serving MCP tools");

    if let Err(e) = transport.run().await {
        error!(error = %e, "Server error");
        return Err(e.into());
    }

    info!("Server shutdown complete");
    Ok(())
}
