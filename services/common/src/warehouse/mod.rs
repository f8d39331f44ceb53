//! Warehouse Store: staging table, day/movie dimensions and the
//! performance fact table.
//!
//! Novelty is computed by callers from the tuple sets returned here; the
//! store only reads, appends, replaces staging and backfills keys.

mod memory;
mod postgres;

pub use memory::{MemoryTables, MemoryWarehouse};
pub use postgres::PgWarehouse;

use async_trait::async_trait;

use crate::error::WarehouseError;
use crate::model::{DayDimRow, FactDeltaKey, FactRow, MovieAttributes, MovieDimRow, StagingRow, TimeAttributes};

pub const STAGING_TABLE: &str = "movie_performance_staging";
pub const DAY_DIM_TABLE: &str = "day_dim";
pub const MOVIE_DIM_TABLE: &str = "movie_dim";
pub const FACT_TABLE: &str = "movie_performance_fact";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableCounts {
    pub staging: i64,
    pub day_dim: i64,
    pub movie_dim: i64,
    pub facts: i64,
}

#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Create missing tables
    async fn ensure_schema(&self) -> Result<(), WarehouseError>;

    /// Replace staging contents wholesale. Returns rows written.
    async fn replace_staging(&self, rows: &[StagingRow]) -> Result<u64, WarehouseError>;

    async fn staging_rows(&self) -> Result<Vec<StagingRow>, WarehouseError>;

    async fn movie_dim(&self) -> Result<Vec<MovieDimRow>, WarehouseError>;

    /// Append new movie tuples; surrogate keys are assigned by the store.
    async fn append_movie_dim(&self, rows: &[MovieAttributes]) -> Result<u64, WarehouseError>;

    /// Set staging `movie_key` by joining on the full movie tuple.
    async fn backfill_movie_keys(&self) -> Result<u64, WarehouseError>;

    /// Distinct delta tuples already present in the fact table.
    async fn fact_keys(&self) -> Result<Vec<FactDeltaKey>, WarehouseError>;

    async fn day_dim(&self) -> Result<Vec<DayDimRow>, WarehouseError>;

    async fn append_day_dim(&self, rows: &[TimeAttributes]) -> Result<u64, WarehouseError>;

    /// Set staging `day_key` by joining on (capture_date, month_code, quarter_code, year).
    async fn backfill_day_keys(&self) -> Result<u64, WarehouseError>;

    async fn append_facts(&self, rows: &[FactRow]) -> Result<u64, WarehouseError>;

    async fn table_counts(&self) -> Result<TableCounts, WarehouseError>;
}

/// Connection string with credentials and query parameters removed, for logs.
pub fn redact_target(db_url: &str) -> String {
    let Some((scheme, rest)) = db_url.split_once("://") else {
        return "<unparsed connection string>".to_string();
    };
    let authority_end = rest.find('/').unwrap_or(rest.len());
    let (authority, path) = rest.split_at(authority_end);
    let host = authority
        .rsplit_once('@')
        .map(|(_, host)| host)
        .unwrap_or(authority);
    let path = path.split('?').next().unwrap_or("");
    format!("{}://{}{}", scheme, host, path)
}
