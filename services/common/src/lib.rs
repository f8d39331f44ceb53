//! Shared building blocks for the movie ranking ETL services.
//!
//! - `model`: typed records flowing between stages
//! - `raw_file`: gzip CSV codec for the raw extraction archive
//! - `warehouse`: star-schema store (Postgres + in-memory)
//! - `config` / `logging`: environment configuration and tracing setup

pub mod config;
pub mod error;
pub mod logging;
pub mod model;
pub mod raw_file;
pub mod warehouse;

pub use config::Config;
pub use error::{RawFileError, WarehouseError};
pub use warehouse::{MemoryWarehouse, PgWarehouse, TableCounts, Warehouse};
