use std::path::PathBuf;
use thiserror::Error;

/// Failure reading or writing a raw extraction file.
#[derive(Debug, Error)]
pub enum RawFileError {
    #[error("raw file io failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("raw file {path} is not valid csv: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("raw file {path} has an invalid list cell '{cell}': {source}")]
    List {
        path: PathBuf,
        cell: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Failure talking to the warehouse. Carries the statement and the
/// (credential-free) connection target for the log line.
#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error("cannot connect to warehouse {target}: {source}")]
    Connect {
        target: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("warehouse statement failed on {target}: {statement}: {source}")]
    Statement {
        target: String,
        statement: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("warehouse column {column} holds an invalid list: {source}")]
    Decode {
        column: &'static str,
        #[source]
        source: serde_json::Error,
    },
}
