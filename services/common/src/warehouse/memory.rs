//! In-process warehouse with the same append/replace/backfill semantics as
//! the Postgres store. Keys start at 1 and grow with each append.

use async_trait::async_trait;
use std::sync::{Mutex, MutexGuard};

use super::{TableCounts, Warehouse};
use crate::error::WarehouseError;
use crate::model::{DayDimRow, FactDeltaKey, FactRow, MovieAttributes, MovieDimRow, StagingRow, TimeAttributes};

#[derive(Debug, Clone, Default)]
pub struct MemoryTables {
    pub staging: Vec<StagingRow>,
    pub day_dim: Vec<DayDimRow>,
    pub movie_dim: Vec<MovieDimRow>,
    pub facts: Vec<FactRow>,
}

#[derive(Debug, Default)]
pub struct MemoryWarehouse {
    tables: Mutex<MemoryTables>,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tables(tables: MemoryTables) -> Self {
        Self {
            tables: Mutex::new(tables),
        }
    }

    /// Copy of every table
    pub fn snapshot(&self) -> MemoryTables {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryTables> {
        self.tables.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Warehouse for MemoryWarehouse {
    async fn ensure_schema(&self) -> Result<(), WarehouseError> {
        Ok(())
    }

    async fn replace_staging(&self, rows: &[StagingRow]) -> Result<u64, WarehouseError> {
        let mut tables = self.lock();
        tables.staging = rows.to_vec();
        Ok(rows.len() as u64)
    }

    async fn staging_rows(&self) -> Result<Vec<StagingRow>, WarehouseError> {
        Ok(self.lock().staging.clone())
    }

    async fn movie_dim(&self) -> Result<Vec<MovieDimRow>, WarehouseError> {
        Ok(self.lock().movie_dim.clone())
    }

    async fn append_movie_dim(&self, rows: &[MovieAttributes]) -> Result<u64, WarehouseError> {
        let mut tables = self.lock();
        for attributes in rows {
            let movie_key = tables.movie_dim.len() as i64 + 1;
            tables.movie_dim.push(MovieDimRow {
                movie_key,
                attributes: attributes.clone(),
            });
        }
        Ok(rows.len() as u64)
    }

    async fn backfill_movie_keys(&self) -> Result<u64, WarehouseError> {
        let mut tables = self.lock();
        let MemoryTables {
            staging, movie_dim, ..
        } = &mut *tables;

        let mut updated = 0;
        for row in staging.iter_mut() {
            if let Some(dim) = movie_dim.iter().find(|d| d.attributes == row.movie) {
                row.movie_key = Some(dim.movie_key);
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn fact_keys(&self) -> Result<Vec<FactDeltaKey>, WarehouseError> {
        let tables = self.lock();
        let mut keys: Vec<FactDeltaKey> = Vec::new();
        for fact in &tables.facts {
            let key = fact.delta_key();
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        Ok(keys)
    }

    async fn day_dim(&self) -> Result<Vec<DayDimRow>, WarehouseError> {
        Ok(self.lock().day_dim.clone())
    }

    async fn append_day_dim(&self, rows: &[TimeAttributes]) -> Result<u64, WarehouseError> {
        let mut tables = self.lock();
        for attributes in rows {
            let day_key = tables.day_dim.len() as i64 + 1;
            tables.day_dim.push(DayDimRow {
                day_key,
                attributes: *attributes,
            });
        }
        Ok(rows.len() as u64)
    }

    async fn backfill_day_keys(&self) -> Result<u64, WarehouseError> {
        let mut tables = self.lock();
        let MemoryTables { staging, day_dim, .. } = &mut *tables;

        let mut updated = 0;
        for row in staging.iter_mut() {
            if let Some(dim) = day_dim.iter().find(|d| d.attributes == row.time) {
                row.day_key = Some(dim.day_key);
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn append_facts(&self, rows: &[FactRow]) -> Result<u64, WarehouseError> {
        let mut tables = self.lock();
        tables.facts.extend_from_slice(rows);
        Ok(rows.len() as u64)
    }

    async fn table_counts(&self) -> Result<TableCounts, WarehouseError> {
        let tables = self.lock();
        Ok(TableCounts {
            staging: tables.staging.len() as i64,
            day_dim: tables.day_dim.len() as i64,
            movie_dim: tables.movie_dim.len() as i64,
            facts: tables.facts.len() as i64,
        })
    }
}
