//! Set-difference helpers. A row is new when its full attribute tuple is
//! absent from the target table; outputs keep staging's first-seen order.

use common::model::{
    DayDimRow, FactDeltaKey, FactRow, MovieAttributes, MovieDimRow, StagingRow, TimeAttributes,
};
use std::collections::HashSet;

/// Staging movie tuples missing from the movie dimension
pub fn novel_movies(staging: &[StagingRow], existing: &[MovieDimRow]) -> Vec<MovieAttributes> {
    let mut seen: HashSet<&MovieAttributes> = existing.iter().map(|d| &d.attributes).collect();
    let mut novel = Vec::new();
    for row in staging {
        if seen.insert(&row.movie) {
            novel.push(row.movie.clone());
        }
    }
    novel
}

/// Staging time tuples missing from the day dimension
pub fn novel_days(staging: &[StagingRow], existing: &[DayDimRow]) -> Vec<TimeAttributes> {
    let mut seen: HashSet<TimeAttributes> = existing.iter().map(|d| d.attributes).collect();
    let mut novel = Vec::new();
    for row in staging {
        if seen.insert(row.time) {
            novel.push(row.time);
        }
    }
    novel
}

/// (movie_key, metrics) tuples present in staging but not in the fact table.
/// Rows without a movie key cannot form a tuple and are ignored.
pub fn fact_delta(staging: &[StagingRow], existing: &[FactDeltaKey]) -> HashSet<FactDeltaKey> {
    let existing: HashSet<&FactDeltaKey> = existing.iter().collect();
    staging
        .iter()
        .filter_map(StagingRow::fact_delta_key)
        .filter(|key| !existing.contains(key))
        .collect()
}

/// Distinct fact rows for the staging rows whose delta tuple is in `delta`.
pub fn select_fact_rows(staging: &[StagingRow], delta: &HashSet<FactDeltaKey>) -> Vec<FactRow> {
    let mut seen: HashSet<FactRow> = HashSet::new();
    let mut rows = Vec::new();
    for row in staging {
        let (Some(day_key), Some(key)) = (row.day_key, row.fact_delta_key()) else {
            continue;
        };
        if !delta.contains(&key) {
            continue;
        }
        let fact = FactRow {
            day_key,
            movie_key: key.movie_key,
            metrics: key.metrics,
            source_file: row.source_file.clone(),
            timestamp: row.timestamp,
        };
        if seen.insert(fact.clone()) {
            rows.push(fact);
        }
    }
    rows
}
