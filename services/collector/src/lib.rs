//! Collector Service - Scrapes the per-category top 50 lists into a raw file
//!
//! Responsibilities:
//! - Discover category list URLs from the genre index page
//! - Fetch each list with a fixed delay between requests
//! - Archive previous raw files, then write one new gzip CSV extract
//! - Log the new file's size and content hash

pub mod archive;
pub mod extract;

use chrono::{Local, NaiveDateTime, Utc};
use common::model::RawMovieRecord;
use common::raw_file::{raw_file_name, write_raw_file};
use common::{Config, RawFileError};
use reqwest::{Client, Url};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{error, info};

pub use archive::{archive_old_files, create_folders_if_missing};
pub use extract::{parse_category_links, parse_movie_list, Category};

const USER_AGENT: &str = "top50-movies-etl/0.1 (scheduled ranking snapshot)";

#[derive(Debug, Error)]
pub enum CollectError {
    #[error("request to {url} failed: {source}")]
    Fetch {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("unexpected markup on {page}: {detail}")]
    Markup { page: String, detail: String },

    #[error("filesystem operation on {path} failed: {source}")]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    RawFile(#[from] RawFileError),
}

impl CollectError {
    /// Markup errors are logged where they are raised, with the page they came from.
    pub(crate) fn markup(page: &str, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        error!(page, detail = %detail, "Unexpected markup");
        CollectError::Markup {
            page: page.to_string(),
            detail,
        }
    }
}

/// Result of one extraction run
#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub path: PathBuf,
    pub archived: usize,
    pub categories: usize,
    pub records: usize,
    pub size_bytes: u64,
    pub content_hash: String,
}

pub fn http_client() -> reqwest::Result<Client> {
    Client::builder()
        .timeout(Duration::from_secs(120))
        .user_agent(USER_AGENT)
        .build()
}

async fn fetch_page(client: &Client, url: &str, delay: Duration) -> Result<String, CollectError> {
    let fetch_err = |source| {
        error!(url, error = %source, "Fetch failed");
        CollectError::Fetch {
            url: url.to_string(),
            source,
        }
    };

    sleep(delay).await;
    info!(url, "Fetching");
    client
        .get(url)
        .send()
        .await
        .and_then(|resp| resp.error_for_status())
        .map_err(fetch_err)?
        .text()
        .await
        .map_err(fetch_err)
}

/// Category lists linked from the genre index page.
pub async fn fetch_category_list(
    client: &Client,
    genre_url: &str,
    delay: Duration,
) -> Result<Vec<Category>, CollectError> {
    let base = Url::parse(genre_url)
        .map_err(|e| CollectError::markup(genre_url, format!("not an absolute url: {}", e)))?;
    let html = fetch_page(client, genre_url, delay).await?;
    let categories = parse_category_links(&html, &base)?;
    info!(count = categories.len(), "Found category lists");
    Ok(categories)
}

pub async fn fetch_category_records(
    client: &Client,
    category: &Category,
    timestamp: NaiveDateTime,
    delay: Duration,
) -> Result<Vec<RawMovieRecord>, CollectError> {
    let html = fetch_page(client, &category.url, delay).await?;
    let records = parse_movie_list(&html, &category.label, timestamp)?;
    info!(category = %category.label, records = records.len(), "Scraped category");
    Ok(records)
}

/// Archive the previous extract, scrape every category with one shared UTC
/// capture timestamp and write the result as a new raw file.
pub async fn export_archived_file(config: &Config) -> Result<ExportSummary, CollectError> {
    let raw_dir = config.raw_data_path.as_path();
    let archive_dir = config.raw_data_archive_path.as_path();

    create_folders_if_missing(&[raw_dir, archive_dir])?;
    let archived = archive_old_files(raw_dir, archive_dir)?;

    let client = http_client().map_err(|source| {
        error!(error = %source, "Failed to build HTTP client");
        CollectError::Fetch {
            url: config.genre_url.clone(),
            source,
        }
    })?;
    let delay = Duration::from_millis(config.rate_limit_ms);

    let categories = fetch_category_list(&client, &config.genre_url, delay).await?;
    let timestamp = Utc::now().naive_utc();

    let mut records = Vec::new();
    for category in &categories {
        records.extend(fetch_category_records(&client, category, timestamp, delay).await?);
    }

    let written = write_extract(raw_dir, Local::now().naive_local(), &records)?;

    Ok(ExportSummary {
        path: written.path,
        archived: archived.len(),
        categories: categories.len(),
        records: records.len(),
        size_bytes: written.size_bytes,
        content_hash: written.content_hash,
    })
}

/// A raw file as written to disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WrittenExtract {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub content_hash: String,
}

/// Write `records` as a new raw file named after `created` and hash it.
pub fn write_extract(
    raw_dir: &Path,
    created: NaiveDateTime,
    records: &[RawMovieRecord],
) -> Result<WrittenExtract, CollectError> {
    let path = raw_dir.join(raw_file_name(created));
    let size_bytes = write_raw_file(&path, records).inspect_err(|e| {
        error!(path = %path.display(), error = %e, "Failed to write raw file");
    })?;

    let bytes = std::fs::read(&path).map_err(|source| {
        error!(path = %path.display(), error = %source, "Failed to read back raw file");
        CollectError::Filesystem {
            path: path.clone(),
            source,
        }
    })?;
    let content_hash = format!("sha256:{:x}", Sha256::digest(&bytes));

    info!(
        path = %path.display(),
        records = records.len(),
        size_bytes,
        hash = %content_hash,
        "Zipped file created"
    );

    Ok(WrittenExtract {
        path,
        size_bytes,
        content_hash,
    })
}
