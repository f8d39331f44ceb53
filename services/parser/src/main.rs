//! Parser binary - re-derives the staging table from the raw data directory.
//!
//! Usage:
//!   cargo run --bin parser
//!   cargo run --bin parser -- --raw-dir ./raw_data --dry-run

use anyhow::{Context, Result};
use clap::Parser;
use common::{Config, PgWarehouse, Warehouse};
use parser::{ingest_new_staging_data, load_raw_batches, transform_staging};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "parser", about = "Transforms raw top 50 extracts into the staging table")]
struct Args {
    /// Raw data directory (defaults to RAW_DATA_PATH)
    #[arg(long)]
    raw_dir: Option<PathBuf>,

    /// Dry run - transform only, don't touch the warehouse
    #[arg(long, default_value = "false")]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    let config = Config::from_env()?;
    common::logging::init(config.log_file.as_deref())?;

    let raw_dir = args.raw_dir.unwrap_or_else(|| config.raw_data_path.clone());

    println!("=== Movie Staging Parser ===");
    println!("Raw data: {}", raw_dir.display());
    println!("Mode: {}", if args.dry_run { "dry-run" } else { "live" });

    if args.dry_run {
        let batches = load_raw_batches(&raw_dir)?;
        let rows = transform_staging(&batches)
            .inspect_err(|e| tracing::error!(error = %e, "Staging transformation failed"))
            .context("Staging transformation failed")?;

        for (i, row) in rows.iter().take(3).enumerate() {
            println!(
                "  [{}] {} ({}) | {} | ranks {} | votes {:?}",
                i + 1,
                row.movie.title,
                row.movie.release_year,
                row.movie.imdb_id,
                row.metrics.imdb_rank,
                row.metrics.num_votes
            );
        }
        if rows.len() > 3 {
            println!("  ... and {} more", rows.len() - 3);
        }

        println!("\nDry run - {} staging rows from {} files, nothing written", rows.len(), batches.len());
        return Ok(());
    }

    let warehouse = PgWarehouse::connect(config.require_db_url()?).await?;
    warehouse.ensure_schema().await?;

    let summary = ingest_new_staging_data(&raw_dir, &warehouse).await?;

    println!("\n=== Staging Complete ===");
    println!("Files read: {}", summary.files);
    println!("Raw records: {}", summary.raw_records);
    println!("Staging rows: {}", summary.staging_rows);

    Ok(())
}
