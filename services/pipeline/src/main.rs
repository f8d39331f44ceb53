//! Pipeline binary - runs extract, staging and schema population in order,
//! asking before each step.
//!
//! Usage:
//!   cargo run --bin pipeline
//!   cargo run --bin pipeline -- --assume-yes

use anyhow::{Context, Result};
use clap::Parser;
use common::{Config, PgWarehouse, Warehouse};
use std::io::{self, BufRead, Write};
use tracing::{info, info_span, Instrument};
use uuid::Uuid;

const EXPORT_PROMPT: &str = "Export new top 50 data?: (y or n) ";
const STAGING_PROMPT: &str = "\nUpdate staging table?: (y or n) ";
const POPULATE_PROMPT: &str = "\nPopulate schema?: (y or n) ";

#[derive(Parser, Debug)]
#[command(name = "pipeline", about = "Scrape, stage and load the top 50 movie warehouse")]
struct Args {
    /// Answer yes to every prompt (unattended runs)
    #[arg(long, default_value = "false")]
    assume_yes: bool,
}

/// Print `prompt` and read one line. Only an exact `y` proceeds; end of
/// input counts as no.
fn confirm<R, W>(input: &mut R, output: &mut W, prompt: &str) -> io::Result<bool>
where
    R: BufRead,
    W: Write,
{
    write!(output, "{}", prompt)?;
    output.flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;
    let answer = line.trim_end_matches(['\r', '\n']);
    info!(prompt = prompt.trim(), answer, "User input");
    Ok(answer == "y")
}

struct Steps {
    assume_yes: bool,
    warehouse: Option<PgWarehouse>,
}

impl Steps {
    fn ask(&self, prompt: &str) -> Result<bool> {
        if self.assume_yes {
            info!(prompt = prompt.trim(), "Assuming yes");
            return Ok(true);
        }
        let stdin = io::stdin();
        confirm(&mut stdin.lock(), &mut io::stdout(), prompt).context("Failed to read answer")
    }

    async fn warehouse(&mut self, config: &Config) -> Result<&PgWarehouse> {
        if self.warehouse.is_none() {
            let warehouse = PgWarehouse::connect(config.require_db_url()?).await?;
            warehouse.ensure_schema().await?;
            self.warehouse = Some(warehouse);
        }
        self.warehouse.as_ref().context("warehouse connection missing")
    }
}

async fn run(args: Args, config: Config) -> Result<()> {
    info!("Program start");
    let mut steps = Steps {
        assume_yes: args.assume_yes,
        warehouse: None,
    };

    if steps.ask(EXPORT_PROMPT)? {
        let summary = collector::export_archived_file(&config).await?;
        println!(
            "Exported {} records from {} categories to {}",
            summary.records,
            summary.categories,
            summary.path.display()
        );
    }

    if steps.ask(STAGING_PROMPT)? {
        let warehouse = steps.warehouse(&config).await?;
        let summary = parser::ingest_new_staging_data(&config.raw_data_path, warehouse).await?;
        println!(
            "Staged {} rows from {} raw records in {} file(s)",
            summary.staging_rows, summary.raw_records, summary.files
        );
    }

    if steps.ask(POPULATE_PROMPT)? {
        let warehouse = steps.warehouse(&config).await?;
        let report = loader::populate_schema(warehouse).await?;
        println!(
            "Added {} movies, {} days, {} facts",
            report.movies_added, report.days_added, report.facts_added
        );
    }

    info!("Program end");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();
    let config = Config::from_env()?;
    common::logging::init(config.log_file.as_deref())?;

    println!("=== Top 50 Movie Pipeline ===");

    let span = info_span!("pipeline", run_id = %Uuid::new_v4());
    run(args, config).instrument(span).await
}
