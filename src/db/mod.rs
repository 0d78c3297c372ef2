//! Database abstraction layer.
//!
//! This module provides database access functionality:
//! - The `Driver` seam and its tiberius-backed implementation
//! - Query execution through the governed pipeline
//! - Parameter binding and placeholder rewriting
//! - Schema and monitoring introspection
//! - Type mappings from TDS values to JSON
//! - An in-memory recording driver for tests

pub mod driver;
pub mod executor;
pub mod memory;
pub mod params;
pub mod pool;
pub mod schema;
pub mod types;

pub use driver::{Driver, DriverError, DriverErrorKind, DriverResponse};
pub use executor::QueryExecutor;
pub use memory::{InMemoryDriver, ResponseBuilder};
pub use pool::TiberiusDriver;
pub use schema::SchemaInspector;
