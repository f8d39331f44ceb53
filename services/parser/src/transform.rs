//! Staging transformation: raw scraped records -> one typed staging row per
//! distinct movie observation.
//!
//! The pipeline is a chain of pure functions. Nothing here touches the
//! warehouse, so the same raw input always yields the same staging rows.

use chrono::{Datelike, NaiveDateTime};
use common::model::{
    quarter_of, Metrics, MovieAttributes, RawBatch, RawMovieRecord, Rating, StagingRow,
    TimeAttributes,
};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransformError {
    #[error("malformed title url '{url}': expected /title/<external_id>/...")]
    MalformedUrl { url: String },

    #[error("release year '{raw}' has no usable digits")]
    InvalidYear { raw: String },

    #[error("capture timestamp '{raw}' is not a valid date and time")]
    InvalidTimestamp { raw: String },
}

/// A movie observation after its per-category ranks have been merged.
/// `attributes` keeps every raw field except `category` and `rank`, which are cleared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedRecord {
    pub source_file: String,
    pub attributes: RawMovieRecord,
    pub ranks: Vec<String>,
}

impl MergedRecord {
    pub fn joined_ranks(&self) -> String {
        self.ranks.join(",")
    }
}

/// Group records by every attribute except category and rank, collecting the
/// ranks of each group in first-seen order. Groups keep first-seen order too.
pub fn merge_category_ranks(batches: &[RawBatch]) -> Vec<MergedRecord> {
    let mut merged: Vec<MergedRecord> = Vec::new();
    let mut index: HashMap<(String, RawMovieRecord), usize> = HashMap::new();

    for batch in batches {
        for record in &batch.records {
            let mut attributes = record.clone();
            attributes.category.clear();
            attributes.rank.clear();

            let key = (batch.source_file.clone(), attributes);
            match index.get(&key) {
                Some(&pos) => merged[pos].ranks.push(record.rank.clone()),
                None => {
                    index.insert(key.clone(), merged.len());
                    merged.push(MergedRecord {
                        source_file: key.0,
                        attributes: key.1,
                        ranks: vec![record.rank.clone()],
                    });
                }
            }
        }
    }

    merged
}

/// `/title/tt0111161/?ref_=adv_li_tt` -> `tt0111161`.
/// Absolute URLs are reduced to their path first.
pub fn parse_external_id(url: &str) -> Result<String, TransformError> {
    let malformed = || TransformError::MalformedUrl {
        url: url.to_string(),
    };

    let path = match url.split_once("://") {
        Some((_, rest)) => rest.find('/').map(|i| &rest[i..]).ok_or_else(malformed)?,
        None => url,
    };

    let segments: Vec<&str> = path.split('/').collect();
    if segments.len() < 3 || segments[1] != "title" || segments[2].trim().is_empty() {
        return Err(malformed());
    }
    Ok(segments[2].trim().to_string())
}

/// `"142 min"` -> 142. Absent or unparsable runtimes are `None`.
pub fn parse_runtime(raw: Option<&str>) -> Option<i32> {
    let text = raw?.trim();
    let number = text.strip_suffix("min").unwrap_or(text).trim();
    number.replace(',', "").parse().ok()
}

/// `"(2020)"` or `"(I) (2020)"` -> 2020. Only the first digit run counts,
/// so a span like `"(2019–2023)"` gives its start year.
pub fn parse_release_year(raw: &str) -> Result<i32, TransformError> {
    let digits: String = raw
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .collect();
    if digits.is_empty() {
        return Err(TransformError::InvalidYear {
            raw: raw.to_string(),
        });
    }
    digits.parse().map_err(|_| TransformError::InvalidYear {
        raw: raw.to_string(),
    })
}

/// Votes and gross earnings. Thousands separators are stripped.
pub fn parse_count(raw: Option<&str>) -> Option<i64> {
    let cleaned = raw?.trim().replace(',', "");
    if let Ok(n) = cleaned.parse::<i64>() {
        return Some(n);
    }
    cleaned
        .parse::<f64>()
        .ok()
        .filter(|f| f.is_finite() && f.fract() == 0.0 && f.abs() < i64::MAX as f64)
        .map(|f| f as i64)
}

pub fn parse_metascore(raw: Option<&str>) -> Option<i32> {
    raw?.trim().parse().ok()
}

pub fn parse_rating(raw: Option<&str>) -> Option<Rating> {
    raw?.trim()
        .parse::<f64>()
        .ok()
        .filter(|f| f.is_finite())
        .map(Rating)
}

pub fn parse_capture_timestamp(raw: &str) -> Result<NaiveDateTime, TransformError> {
    let text = raw.trim();
    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f"))
        .map_err(|_| TransformError::InvalidTimestamp {
            raw: raw.to_string(),
        })
}

pub fn calendar_attributes(ts: NaiveDateTime) -> TimeAttributes {
    let date = ts.date();
    TimeAttributes {
        capture_date: date,
        month_code: date.month() as i32,
        quarter_code: quarter_of(date.month()),
        year: date.year(),
    }
}

/// Type one merged record. Keys stay unset until the load phase.
pub fn derive_staging_row(merged: &MergedRecord) -> Result<StagingRow, TransformError> {
    let raw = &merged.attributes;
    let timestamp = parse_capture_timestamp(&raw.timestamp)?;

    Ok(StagingRow {
        movie: MovieAttributes {
            imdb_id: parse_external_id(&raw.url)?,
            title: raw.title.clone(),
            release_year: parse_release_year(&raw.release_year)?,
            runtime_minutes: parse_runtime(raw.runtime.as_deref()),
            mpaa_rating: raw.mpaa_rating.clone(),
            genres: raw.genres.clone(),
            summary: raw.summary.clone(),
            actors: raw.actors.clone(),
            directors: raw.directors.clone(),
        },
        time: calendar_attributes(timestamp),
        metrics: Metrics {
            imdb_rank: merged.joined_ranks(),
            gross_earnings: parse_count(raw.gross_earnings.as_deref()),
            imdb_rating: parse_rating(raw.imdb_rating.as_deref()),
            metascore_rating: parse_metascore(raw.metascore_rating.as_deref()),
            num_votes: parse_count(raw.num_votes.as_deref()),
        },
        source_file: merged.source_file.clone(),
        timestamp,
        day_key: None,
        movie_key: None,
    })
}

pub fn transform_staging(batches: &[RawBatch]) -> Result<Vec<StagingRow>, TransformError> {
    merge_category_ranks(batches)
        .iter()
        .map(derive_staging_row)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn record(category: &str, rank: &str) -> RawMovieRecord {
        RawMovieRecord {
            title: "Oppenheimer".to_string(),
            url: "/title/tt15398776/?ref_=adv_li_tt".to_string(),
            category: category.to_string(),
            rank: rank.to_string(),
            release_year: "(2023)".to_string(),
            mpaa_rating: Some("R".to_string()),
            runtime: Some("180 min".to_string()),
            genres: Some(vec!["Biography".to_string(), "Drama".to_string(), "History".to_string()]),
            imdb_rating: Some("8.3".to_string()),
            metascore_rating: Some("90".to_string()),
            actors: Some(vec!["Cillian Murphy".to_string(), "Emily Blunt".to_string()]),
            directors: Some(vec!["Christopher Nolan".to_string()]),
            summary: "The story of J. Robert Oppenheimer.".to_string(),
            num_votes: Some("812,002".to_string()),
            gross_earnings: Some("326,086,055".to_string()),
            timestamp: "2024-04-15 09:30:00.250000".to_string(),
        }
    }

    fn batch(records: Vec<RawMovieRecord>) -> RawBatch {
        RawBatch {
            source_file: "top50movies20240415-093000.csv.gz".to_string(),
            records,
        }
    }

    // -------------------------------------------------------------------------
    // RANK MERGE TESTS
    // -------------------------------------------------------------------------

    #[test]
    fn test_movie_in_two_categories_yields_one_row() {
        let rows = transform_staging(&[batch(vec![
            record("Top 50 Biography", "3"),
            record("Top 50 Drama", "7"),
        ])])
        .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].metrics.imdb_rank, "3,7");
    }

    #[test]
    fn test_ranks_keep_first_seen_order() {
        let rows = transform_staging(&[batch(vec![
            record("Top 50 History", "12"),
            record("Top 50 Biography", "3"),
            record("Top 50 Drama", "7"),
        ])])
        .unwrap();
        assert_eq!(rows[0].metrics.imdb_rank, "12,3,7");
    }

    #[test]
    fn test_differing_attribute_keeps_rows_apart() {
        let mut other = record("Top 50 Drama", "7");
        other.num_votes = Some("812,003".to_string());
        let rows = transform_staging(&[batch(vec![record("Top 50 Biography", "3"), other])]).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].metrics.imdb_rank, "3");
        assert_eq!(rows[1].metrics.imdb_rank, "7");
    }

    #[test]
    fn test_null_and_empty_lists_group_separately() {
        let mut null_genres = record("Top 50 Drama", "7");
        null_genres.genres = None;
        let mut empty_genres = record("Top 50 History", "9");
        empty_genres.genres = Some(vec![]);

        let merged = merge_category_ranks(&[batch(vec![null_genres, empty_genres])]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].attributes.genres, None);
        assert_eq!(merged[1].attributes.genres, Some(vec![]));
    }

    #[test]
    fn test_same_movie_in_two_files_stays_two_observations() {
        let first = batch(vec![record("Top 50 Drama", "7")]);
        let mut second = batch(vec![record("Top 50 Drama", "7")]);
        second.source_file = "top50movies20240416-093000.csv.gz".to_string();

        let rows = transform_staging(&[first, second]).unwrap();
        assert_eq!(rows.len(), 2);
        assert_ne!(rows[0].source_file, rows[1].source_file);
        assert_eq!(rows[0].movie, rows[1].movie);
    }

    #[test]
    fn test_transform_is_deterministic() {
        let input = vec![batch(vec![
            record("Top 50 Biography", "3"),
            record("Top 50 Drama", "7"),
        ])];
        let baseline = transform_staging(&input).unwrap();
        for _ in 0..5 {
            assert_eq!(transform_staging(&input).unwrap(), baseline);
        }
    }

    // -------------------------------------------------------------------------
    // DERIVED COLUMN TESTS
    // -------------------------------------------------------------------------

    #[test]
    fn test_derived_columns() {
        let rows = transform_staging(&[batch(vec![record("Top 50 Drama", "7")])]).unwrap();
        let row = &rows[0];

        assert_eq!(row.movie.imdb_id, "tt15398776");
        assert_eq!(row.movie.release_year, 2023);
        assert_eq!(row.movie.runtime_minutes, Some(180));
        assert_eq!(row.metrics.num_votes, Some(812_002));
        assert_eq!(row.metrics.gross_earnings, Some(326_086_055));
        assert_eq!(row.metrics.metascore_rating, Some(90));
        assert_eq!(row.metrics.imdb_rating, Some(Rating(8.3)));
        assert_eq!(row.time.capture_date, NaiveDate::from_ymd_opt(2024, 4, 15).unwrap());
        assert_eq!(row.time.month_code, 4);
        assert_eq!(row.time.quarter_code, 2);
        assert_eq!(row.time.year, 2024);
        assert_eq!(row.day_key, None);
        assert_eq!(row.movie_key, None);
    }

    #[test]
    fn test_malformed_url_fails_transform() {
        let mut bad = record("Top 50 Drama", "7");
        bad.url = "/tt15398776".to_string();
        let err = transform_staging(&[batch(vec![bad])]).unwrap_err();
        assert!(matches!(err, TransformError::MalformedUrl { .. }));
    }

    #[test]
    fn test_year_without_digits_fails_transform() {
        let mut bad = record("Top 50 Drama", "7");
        bad.release_year = "(TV Special)".to_string();
        let err = transform_staging(&[batch(vec![bad])]).unwrap_err();
        assert_eq!(
            err,
            TransformError::InvalidYear {
                raw: "(TV Special)".to_string()
            }
        );
    }

    // -------------------------------------------------------------------------
    // FIELD PARSER TESTS
    // -------------------------------------------------------------------------

    #[test]
    fn test_parse_external_id() {
        assert_eq!(parse_external_id("/title/tt0111161/").unwrap(), "tt0111161");
        assert_eq!(
            parse_external_id("/title/tt0111161/?ref_=adv_li_tt").unwrap(),
            "tt0111161"
        );
        assert_eq!(
            parse_external_id("https://www.imdb.com/title/tt0111161/").unwrap(),
            "tt0111161"
        );
        assert!(parse_external_id("").is_err());
        assert!(parse_external_id("/title").is_err());
        assert!(parse_external_id("/title//").is_err());
        assert!(parse_external_id("/name/nm0000138/").is_err());
    }

    #[test]
    fn test_parse_runtime() {
        assert_eq!(parse_runtime(Some("142 min")), Some(142));
        assert_eq!(parse_runtime(Some(" 95 min ")), Some(95));
        assert_eq!(parse_runtime(Some("1,020 min")), Some(1020));
        assert_eq!(parse_runtime(Some("N/A")), None);
        assert_eq!(parse_runtime(Some("")), None);
        assert_eq!(parse_runtime(None), None);
    }

    #[test]
    fn test_parse_release_year() {
        assert_eq!(parse_release_year("(2020)").unwrap(), 2020);
        assert_eq!(parse_release_year("(I) (2019)").unwrap(), 2019);
        assert_eq!(parse_release_year("(2019–2023)").unwrap(), 2019);
        assert_eq!(parse_release_year("(2021– )").unwrap(), 2021);
        assert!(parse_release_year("()").is_err());
        assert!(parse_release_year("").is_err());
    }

    #[test]
    fn test_parse_count_is_permissive() {
        assert_eq!(parse_count(Some("1,234,567")), Some(1_234_567));
        assert_eq!(parse_count(Some("42")), Some(42));
        assert_eq!(parse_count(Some("1500000.0")), Some(1_500_000));
        assert_eq!(parse_count(Some("$12.5M")), None);
        assert_eq!(parse_count(Some("")), None);
        assert_eq!(parse_count(Some("99,999,999,999,999,999,999")), None);
        assert_eq!(parse_count(Some("1e30")), None);
        assert_eq!(parse_count(Some("-1e30")), None);
        assert_eq!(parse_count(None), None);
    }

    #[test]
    fn test_parse_scores_are_permissive() {
        assert_eq!(parse_metascore(Some(" 74 ")), Some(74));
        assert_eq!(parse_metascore(Some("tbd")), None);
        assert_eq!(parse_rating(Some("7.9")), Some(Rating(7.9)));
        assert_eq!(parse_rating(Some("NaN")), None);
        assert_eq!(parse_rating(None), None);
    }

    #[test]
    fn test_parse_capture_timestamp() {
        let ts = parse_capture_timestamp("2024-03-31 23:59:59.999999").unwrap();
        assert_eq!(ts.date(), NaiveDate::from_ymd_opt(2024, 3, 31).unwrap());

        assert!(parse_capture_timestamp("2024-03-31 23:59:59").is_ok());
        assert!(parse_capture_timestamp("2024-03-31T23:59:59.5").is_ok());
        assert!(parse_capture_timestamp("last tuesday").is_err());
    }

    #[test]
    fn test_calendar_quarter_boundaries() {
        let quarter = |m: u32| {
            let ts = NaiveDate::from_ymd_opt(2024, m, 1)
                .unwrap()
                .and_hms_opt(12, 0, 0)
                .unwrap();
            calendar_attributes(ts).quarter_code
        };
        assert_eq!(quarter(3), 1);
        assert_eq!(quarter(4), 2);
        assert_eq!(quarter(9), 3);
        assert_eq!(quarter(10), 4);
    }
}
