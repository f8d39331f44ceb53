//! Environment configuration shared by every service binary.

use anyhow::{Context, Result};
use std::path::PathBuf;

pub const DEFAULT_GENRE_URL: &str = "https://www.imdb.com/feature/genre/";

#[derive(Debug, Clone)]
pub struct Config {
    /// Only required by the stages that touch the warehouse
    pub db_url: Option<String>,
    pub genre_url: String,
    pub raw_data_path: PathBuf,
    pub raw_data_archive_path: PathBuf,
    pub rate_limit_ms: u64,
    pub log_file: Option<PathBuf>,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let rate_limit_ms = match lookup("RATE_LIMIT_MS") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("RATE_LIMIT_MS is not a number: {}", raw))?,
            None => 1000,
        };

        Ok(Self {
            db_url: lookup("DB_URL").filter(|s| !s.trim().is_empty()),
            genre_url: lookup("IMDB_GENRE_URL").unwrap_or_else(|| DEFAULT_GENRE_URL.to_string()),
            raw_data_path: PathBuf::from(
                lookup("RAW_DATA_PATH").unwrap_or_else(|| "./raw_data".to_string()),
            ),
            raw_data_archive_path: PathBuf::from(
                lookup("RAW_DATA_ARCHIVE_PATH").unwrap_or_else(|| "./raw_data_archive".to_string()),
            ),
            rate_limit_ms,
            log_file: lookup("LOG_FILE")
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
        })
    }

    pub fn require_db_url(&self) -> Result<&str> {
        self.db_url.as_deref().context("DB_URL env var missing")
    }
}
