//! Parser Service - Transforms raw top 50 extracts into the staging table
//!
//! Responsibilities:
//! - Read every raw extract left in the raw data directory
//! - Merge per-category duplicates into one observation per movie
//! - Type and derive warehouse columns (external id, runtime, calendar)
//! - Replace the staging table wholesale
//!
//! Same raw files = same staging rows.

pub mod transform;

use anyhow::{Context, Result};
use common::model::RawBatch;
use common::raw_file::{list_raw_files, read_raw_file};
use common::Warehouse;
use std::path::Path;
use tracing::{error, info, warn};

pub use transform::{transform_staging, TransformError};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StagingSummary {
    pub files: usize,
    pub raw_records: usize,
    pub staging_rows: u64,
}

/// Read every raw file in `raw_dir`, oldest name first.
pub fn load_raw_batches(raw_dir: &Path) -> Result<Vec<RawBatch>> {
    let files = list_raw_files(raw_dir)?;
    let mut batches = Vec::with_capacity(files.len());
    for path in &files {
        let batch = read_raw_file(path)
            .inspect_err(|e| error!(file = %path.display(), error = %e, "Failed to read raw file"))
            .with_context(|| format!("Failed to read raw file {}", path.display()))?;
        info!(file = %batch.source_file, records = batch.records.len(), "Read raw file");
        batches.push(batch);
    }
    Ok(batches)
}

/// Re-derive staging from every raw file and replace the staging table.
/// With no raw files the staging table is left untouched.
pub async fn ingest_new_staging_data<W>(raw_dir: &Path, warehouse: &W) -> Result<StagingSummary>
where
    W: Warehouse + ?Sized,
{
    let batches = load_raw_batches(raw_dir)?;
    if batches.is_empty() {
        warn!(dir = %raw_dir.display(), "No raw files found, staging left unchanged");
        return Ok(StagingSummary::default());
    }

    let raw_records = batches.iter().map(|b| b.records.len()).sum();
    let rows = transform_staging(&batches)
        .inspect_err(|e| error!(error = %e, "Staging transformation failed"))
        .context("Staging transformation failed")?;
    info!(raw_records, staging_rows = rows.len(), "Staging transformations completed");

    let staging_rows = warehouse
        .replace_staging(&rows)
        .await
        .context("Failed to replace staging table")?;
    info!(staging_rows, "Staging data is loaded");

    Ok(StagingSummary {
        files: batches.len(),
        raw_records,
        staging_rows,
    })
}
