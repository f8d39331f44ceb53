//! Collector binary - scrapes the top 50 lists into a new raw extract.
//!
//! Usage:
//!   cargo run --bin collector
//!   cargo run --bin collector -- --dry-run --limit 2

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use collector::{export_archived_file, fetch_category_list, fetch_category_records, http_client};
use common::Config;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "collector", about = "Scrapes per-category top 50 movie lists")]
struct Args {
    /// Genre index page (defaults to IMDB_GENRE_URL)
    #[arg(long)]
    genre_url: Option<String>,

    /// Dry run - scrape and print, don't archive or write files
    #[arg(long, default_value = "false")]
    dry_run: bool,

    /// Only scrape the first N categories in dry-run mode
    #[arg(long)]
    limit: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    let mut config = Config::from_env()?;
    common::logging::init(config.log_file.as_deref())?;

    if let Some(url) = args.genre_url {
        config.genre_url = url;
    }

    println!("=== Top 50 Movie Collector ===");
    println!("Genre index: {}", config.genre_url);
    println!("Rate limit: {}ms", config.rate_limit_ms);

    if args.dry_run {
        let client = http_client().context("Failed to build HTTP client")?;
        let delay = Duration::from_millis(config.rate_limit_ms);
        let timestamp = Utc::now().naive_utc();

        let categories = fetch_category_list(&client, &config.genre_url, delay).await?;
        let take = args.limit.unwrap_or(categories.len());
        println!("\nCategories: {} (scraping {})", categories.len(), take.min(categories.len()));

        for category in categories.iter().take(take) {
            let records = fetch_category_records(&client, category, timestamp, delay).await?;
            println!("  [{}] {} movies", category.label, records.len());
            if let Some(first) = records.first() {
                println!("      #{} {} {}", first.rank, first.title, first.release_year);
            }
        }

        println!("\nDry run - nothing archived or written");
        return Ok(());
    }

    let summary = export_archived_file(&config).await?;

    println!("\n=== Collection Complete ===");
    println!("Archived: {} old file(s)", summary.archived);
    println!("Categories: {}", summary.categories);
    println!("Records: {}", summary.records);
    println!("File: {}", summary.path.display());
    println!("Size: {} bytes", summary.size_bytes);
    println!("Hash: {}", summary.content_hash);

    Ok(())
}
