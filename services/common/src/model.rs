//! Typed records for each stage of the pipeline:
//! `RawMovieRecord` (scraped) -> `StagingRow` (normalized) ->
//! `MovieDimRow` / `DayDimRow` / `FactRow` (warehouse).
//!
//! Dimension and fact novelty is decided by full-tuple equality, so every
//! tuple type here derives `Eq + Hash`.

use chrono::{NaiveDate, NaiveDateTime};
use std::hash::{Hash, Hasher};

/// One movie as scraped from one category list.
///
/// Optional fields stay `None` when the page omits them. List fields are
/// sorted by the extractor; `None` and `Some(vec![])` are different values.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RawMovieRecord {
    pub title: String,
    /// Detail page path, `/title/<external_id>/...`
    pub url: String,
    pub category: String,
    pub rank: String,
    pub release_year: String,
    pub mpaa_rating: Option<String>,
    pub runtime: Option<String>,
    pub genres: Option<Vec<String>>,
    pub imdb_rating: Option<String>,
    pub metascore_rating: Option<String>,
    pub actors: Option<Vec<String>>,
    pub directors: Option<Vec<String>>,
    pub summary: String,
    pub num_votes: Option<String>,
    pub gross_earnings: Option<String>,
    /// Capture timestamp text, `%Y-%m-%d %H:%M:%S%.6f`
    pub timestamp: String,
}

/// All records read from one raw file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBatch {
    pub source_file: String,
    pub records: Vec<RawMovieRecord>,
}

/// IMDB-style rating. Compared bitwise so it can take part in tuple sets.
#[derive(Debug, Clone, Copy)]
pub struct Rating(pub f64);

impl Rating {
    fn canonical_bits(self) -> u64 {
        // -0.0 and 0.0 are the same rating
        if self.0 == 0.0 {
            0.0f64.to_bits()
        } else {
            self.0.to_bits()
        }
    }
}

impl PartialEq for Rating {
    fn eq(&self, other: &Self) -> bool {
        self.canonical_bits() == other.canonical_bits()
    }
}

impl Eq for Rating {}

impl Hash for Rating {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical_bits().hash(state);
    }
}

/// Movie dimension tuple
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MovieAttributes {
    pub imdb_id: String,
    pub title: String,
    pub release_year: i32,
    pub runtime_minutes: Option<i32>,
    pub mpaa_rating: Option<String>,
    pub genres: Option<Vec<String>>,
    pub summary: String,
    pub actors: Option<Vec<String>>,
    pub directors: Option<Vec<String>>,
}

/// Time dimension tuple
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeAttributes {
    pub capture_date: NaiveDate,
    pub month_code: i32,
    pub quarter_code: i32,
    pub year: i32,
}

/// A movie's metric snapshot. `imdb_rank` holds every category rank of the
/// observation, comma-joined in first-seen order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Metrics {
    pub imdb_rank: String,
    pub gross_earnings: Option<i64>,
    pub imdb_rating: Option<Rating>,
    pub metascore_rating: Option<i32>,
    pub num_votes: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagingRow {
    pub movie: MovieAttributes,
    pub time: TimeAttributes,
    pub metrics: Metrics,
    pub source_file: String,
    pub timestamp: NaiveDateTime,
    pub day_key: Option<i64>,
    pub movie_key: Option<i64>,
}

impl StagingRow {
    /// Fact delta tuple, available once the movie key is backfilled.
    pub fn fact_delta_key(&self) -> Option<FactDeltaKey> {
        self.movie_key.map(|movie_key| FactDeltaKey {
            movie_key,
            metrics: self.metrics.clone(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MovieDimRow {
    pub movie_key: i64,
    pub attributes: MovieAttributes,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayDimRow {
    pub day_key: i64,
    pub attributes: TimeAttributes,
}

/// (movie_key, rank, gross, imdb_rating, metascore, votes)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FactDeltaKey {
    pub movie_key: i64,
    pub metrics: Metrics,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FactRow {
    pub day_key: i64,
    pub movie_key: i64,
    pub metrics: Metrics,
    pub source_file: String,
    pub timestamp: NaiveDateTime,
}

impl FactRow {
    pub fn delta_key(&self) -> FactDeltaKey {
        FactDeltaKey {
            movie_key: self.movie_key,
            metrics: self.metrics.clone(),
        }
    }
}

/// Canonical JSON text for a list column; `None` stays `None`.
pub(crate) fn encode_list(list: &Option<Vec<String>>) -> Option<String> {
    list.as_ref()
        .map(|items| serde_json::Value::from(items.clone()).to_string())
}

/// Calendar quarter for a month number (1-12).
pub fn quarter_of(month: u32) -> i32 {
    match month {
        0..=3 => 1,
        4..=6 => 2,
        7..=9 => 3,
        _ => 4,
    }
}
