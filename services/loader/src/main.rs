//! Loader binary - populates day_dim, movie_dim and the fact table from staging.
//!
//! Usage:
//!   cargo run --bin loader

use anyhow::Result;
use clap::Parser;
use common::{Config, PgWarehouse, TableCounts, Warehouse};
use loader::populate_schema;

#[derive(Parser, Debug)]
#[command(name = "loader", about = "Delta-loads the star schema from the staging table")]
struct Args {
    /// Warehouse connection string (defaults to DB_URL)
    #[arg(long)]
    db_url: Option<String>,
}

fn print_counts(label: &str, counts: &TableCounts) {
    println!("{}:", label);
    println!("  staging:   {}", counts.staging);
    println!("  day_dim:   {}", counts.day_dim);
    println!("  movie_dim: {}", counts.movie_dim);
    println!("  facts:     {}", counts.facts);
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    let config = Config::from_env()?;
    common::logging::init(config.log_file.as_deref())?;

    let db_url = match &args.db_url {
        Some(url) => url.as_str(),
        None => config.require_db_url()?,
    };

    println!("=== Movie Schema Loader ===");

    let warehouse = PgWarehouse::connect(db_url).await?;
    println!("Warehouse: {}", warehouse.target());
    warehouse.ensure_schema().await?;

    let before = warehouse.table_counts().await?;
    print_counts("Before", &before);

    let report = populate_schema(&warehouse).await?;

    let after = warehouse.table_counts().await?;
    println!("\n=== Load Complete ===");
    print_counts("After", &after);
    println!(
        "Stages run: {}",
        report.stages_run.iter().map(|s| s.name()).collect::<Vec<_>>().join(" -> ")
    );
    if let Some(stage) = report.halted_at {
        println!("Stopped early at {}: nothing new to load", stage.name());
    }
    println!(
        "Added: {} movies, {} days, {} facts",
        report.movies_added, report.days_added, report.facts_added
    );

    Ok(())
}
