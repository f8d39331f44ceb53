//! Raw extraction archive: one gzip-compressed CSV file per scrape run.
//!
//! Absent optional values are empty cells. List cells are JSON arrays so that
//! a null list (empty cell) and an empty list (`[]`) survive the round trip.

use chrono::NaiveDateTime;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::RawFileError;
use crate::model::{encode_list, RawBatch, RawMovieRecord};

pub const RAW_FILE_PREFIX: &str = "top50movies";
pub const RAW_FILE_SUFFIX: &str = ".csv.gz";
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

#[derive(Debug, Serialize, Deserialize)]
struct RawCsvRow {
    title: String,
    url: String,
    category: String,
    rank: String,
    release_year: String,
    mpaa_rating: Option<String>,
    runtime: Option<String>,
    genres: Option<String>,
    imdb_rating: Option<String>,
    metascore_rating: Option<String>,
    actors: Option<String>,
    directors: Option<String>,
    summary: String,
    num_votes: Option<String>,
    gross_earnings: Option<String>,
    timestamp: String,
}

/// `top50movies20240131-142501.csv.gz`
pub fn raw_file_name(created: NaiveDateTime) -> String {
    format!(
        "{}{}{}",
        RAW_FILE_PREFIX,
        created.format("%Y%m%d-%H%M%S"),
        RAW_FILE_SUFFIX
    )
}

pub fn format_timestamp(ts: NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

fn decode_list(path: &Path, cell: Option<String>) -> Result<Option<Vec<String>>, RawFileError> {
    match cell {
        None => Ok(None),
        Some(text) => serde_json::from_str(&text)
            .map(Some)
            .map_err(|source| RawFileError::List {
                path: path.to_path_buf(),
                cell: text,
                source,
            }),
    }
}

/// Write records as a new gzip CSV file. Returns the number of bytes written.
pub fn write_raw_file(path: &Path, records: &[RawMovieRecord]) -> Result<u64, RawFileError> {
    let io_err = |source| RawFileError::Io {
        path: path.to_path_buf(),
        source,
    };
    let csv_err = |source| RawFileError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let file = File::create(path).map_err(io_err)?;
    let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    let mut writer = csv::Writer::from_writer(encoder);

    for record in records {
        writer
            .serialize(RawCsvRow {
                title: record.title.clone(),
                url: record.url.clone(),
                category: record.category.clone(),
                rank: record.rank.clone(),
                release_year: record.release_year.clone(),
                mpaa_rating: record.mpaa_rating.clone(),
                runtime: record.runtime.clone(),
                genres: encode_list(&record.genres),
                imdb_rating: record.imdb_rating.clone(),
                metascore_rating: record.metascore_rating.clone(),
                actors: encode_list(&record.actors),
                directors: encode_list(&record.directors),
                summary: record.summary.clone(),
                num_votes: record.num_votes.clone(),
                gross_earnings: record.gross_earnings.clone(),
                timestamp: record.timestamp.clone(),
            })
            .map_err(csv_err)?;
    }

    let encoder = writer
        .into_inner()
        .map_err(|e| io_err(e.into_error()))?;
    let mut buffered = encoder.finish().map_err(io_err)?;
    buffered.flush().map_err(io_err)?;

    std::fs::metadata(path).map(|m| m.len()).map_err(io_err)
}

/// Read one raw file; `source_file` is the file's base name.
pub fn read_raw_file(path: &Path) -> Result<RawBatch, RawFileError> {
    let file = File::open(path).map_err(|source| RawFileError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(GzDecoder::new(BufReader::new(file)));

    // a corrupt stream fails here instead of reading as an empty file
    reader.headers().map_err(|source| RawFileError::Csv {
        path: path.to_path_buf(),
        source,
    })?;

    let mut records = Vec::new();
    for result in reader.deserialize::<RawCsvRow>() {
        let row = result.map_err(|source| RawFileError::Csv {
            path: path.to_path_buf(),
            source,
        })?;
        records.push(RawMovieRecord {
            title: row.title,
            url: row.url,
            category: row.category,
            rank: row.rank,
            release_year: row.release_year,
            mpaa_rating: row.mpaa_rating,
            runtime: row.runtime,
            genres: decode_list(path, row.genres)?,
            imdb_rating: row.imdb_rating,
            metascore_rating: row.metascore_rating,
            actors: decode_list(path, row.actors)?,
            directors: decode_list(path, row.directors)?,
            summary: row.summary,
            num_votes: row.num_votes,
            gross_earnings: row.gross_earnings,
            timestamp: row.timestamp,
        });
    }

    let source_file = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    Ok(RawBatch {
        source_file,
        records,
    })
}

/// All `*.csv.gz` files directly inside `dir`, sorted by name.
/// A missing directory yields an empty list.
pub fn list_raw_files(dir: &Path) -> Result<Vec<PathBuf>, RawFileError> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(RawFileError::Io {
                path: dir.to_path_buf(),
                source,
            })
        }
    };

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| RawFileError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
        let path = entry.path();
        let is_raw = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.ends_with(RAW_FILE_SUFFIX))
            .unwrap_or(false);
        if is_raw && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}
