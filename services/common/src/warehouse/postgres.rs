//! sqlx/Postgres warehouse.
//!
//! Each statement commits on its own; only the staging replace runs in a
//! transaction (truncate + insert). List columns hold canonical JSON text.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{error, info};

use super::{redact_target, TableCounts, Warehouse};
use crate::error::WarehouseError;
use crate::model::{
    encode_list, DayDimRow, FactDeltaKey, FactRow, Metrics, MovieAttributes, MovieDimRow, Rating,
    StagingRow, TimeAttributes,
};

const SCHEMA_SQL: &str = include_str!("schema.sql");

/// Rows per multi-row INSERT (stays well under the bind parameter limit)
const INSERT_BATCH: usize = 1000;

const TRUNCATE_STAGING: &str = "TRUNCATE TABLE movie_performance_staging";

const INSERT_STAGING: &str = r#"INSERT INTO movie_performance_staging
    (title, imdb_rank, release_year, mpaa_rating, runtime_minutes, genres, imdb_rating,
     metascore_rating, actors, directors, summary, num_votes, gross_earnings, file_name,
     "timestamp", day_key, capture_date, month_code, quarter_code, year, movie_key, imdb_id) "#;

const SELECT_STAGING: &str = r#"
    SELECT title, imdb_rank, release_year, mpaa_rating, runtime_minutes, genres, imdb_rating,
           metascore_rating, actors, directors, summary, num_votes, gross_earnings, file_name,
           "timestamp", day_key, capture_date, month_code, quarter_code, year, movie_key, imdb_id
    FROM movie_performance_staging
"#;

const SELECT_MOVIE_DIM: &str = r#"
    SELECT movie_key, imdb_id, title, release_year, runtime_minutes, mpaa_rating, genres,
           summary, actors, directors
    FROM movie_dim
    ORDER BY movie_key
"#;

const INSERT_MOVIE_DIM: &str = r#"INSERT INTO movie_dim
    (imdb_id, title, release_year, runtime_minutes, mpaa_rating, genres, summary, actors, directors) "#;

const BACKFILL_MOVIE_KEYS: &str = r#"
    UPDATE movie_performance_staging AS s
    SET movie_key = d.movie_key
    FROM movie_dim AS d
    WHERE s.imdb_id = d.imdb_id
      AND s.title = d.title
      AND s.release_year = d.release_year
      AND s.runtime_minutes IS NOT DISTINCT FROM d.runtime_minutes
      AND s.mpaa_rating IS NOT DISTINCT FROM d.mpaa_rating
      AND s.genres IS NOT DISTINCT FROM d.genres
      AND s.summary = d.summary
      AND s.actors IS NOT DISTINCT FROM d.actors
      AND s.directors IS NOT DISTINCT FROM d.directors
"#;

const SELECT_FACT_KEYS: &str = r#"
    SELECT DISTINCT movie_key, imdb_rank, gross_earnings, imdb_rating, metascore_rating, num_votes
    FROM movie_performance_fact
"#;

const SELECT_DAY_DIM: &str = r#"
    SELECT day_key, capture_date, month_code, quarter_code, year
    FROM day_dim
    ORDER BY day_key
"#;

const INSERT_DAY_DIM: &str = "INSERT INTO day_dim (capture_date, month_code, quarter_code, year) ";

const BACKFILL_DAY_KEYS: &str = r#"
    UPDATE movie_performance_staging AS s
    SET day_key = d.day_key
    FROM day_dim AS d
    WHERE s.capture_date = d.capture_date
      AND s.month_code = d.month_code
      AND s.quarter_code = d.quarter_code
      AND s.year = d.year
"#;

const INSERT_FACTS: &str = r#"INSERT INTO movie_performance_fact
    (day_key, movie_key, imdb_rank, gross_earnings, imdb_rating, metascore_rating, num_votes,
     file_name, "timestamp") "#;

const COUNT_TABLES: &str = r#"
    SELECT
        (SELECT COUNT(*) FROM movie_performance_staging),
        (SELECT COUNT(*) FROM day_dim),
        (SELECT COUNT(*) FROM movie_dim),
        (SELECT COUNT(*) FROM movie_performance_fact)
"#;

#[derive(Debug, sqlx::FromRow)]
struct StagingRecord {
    title: String,
    imdb_rank: String,
    release_year: i32,
    mpaa_rating: Option<String>,
    runtime_minutes: Option<i32>,
    genres: Option<String>,
    imdb_rating: Option<f64>,
    metascore_rating: Option<i32>,
    actors: Option<String>,
    directors: Option<String>,
    summary: String,
    num_votes: Option<i64>,
    gross_earnings: Option<i64>,
    file_name: String,
    timestamp: NaiveDateTime,
    day_key: Option<i64>,
    capture_date: NaiveDate,
    month_code: i32,
    quarter_code: i32,
    year: i32,
    movie_key: Option<i64>,
    imdb_id: String,
}

#[derive(Debug, sqlx::FromRow)]
struct MovieDimRecord {
    movie_key: i64,
    imdb_id: String,
    title: String,
    release_year: i32,
    runtime_minutes: Option<i32>,
    mpaa_rating: Option<String>,
    genres: Option<String>,
    summary: String,
    actors: Option<String>,
    directors: Option<String>,
}

#[derive(Debug, sqlx::FromRow)]
struct FactKeyRecord {
    movie_key: i64,
    imdb_rank: String,
    gross_earnings: Option<i64>,
    imdb_rating: Option<f64>,
    metascore_rating: Option<i32>,
    num_votes: Option<i64>,
}

#[derive(Debug, sqlx::FromRow)]
struct DayDimRecord {
    day_key: i64,
    capture_date: NaiveDate,
    month_code: i32,
    quarter_code: i32,
    year: i32,
}

fn decode_list(column: &'static str, cell: Option<String>) -> Result<Option<Vec<String>>, WarehouseError> {
    match cell {
        None => Ok(None),
        Some(text) => serde_json::from_str(&text)
            .map(Some)
            .map_err(|source| WarehouseError::Decode { column, source }),
    }
}

impl TryFrom<StagingRecord> for StagingRow {
    type Error = WarehouseError;

    fn try_from(r: StagingRecord) -> Result<Self, Self::Error> {
        Ok(StagingRow {
            movie: MovieAttributes {
                imdb_id: r.imdb_id,
                title: r.title,
                release_year: r.release_year,
                runtime_minutes: r.runtime_minutes,
                mpaa_rating: r.mpaa_rating,
                genres: decode_list("genres", r.genres)?,
                summary: r.summary,
                actors: decode_list("actors", r.actors)?,
                directors: decode_list("directors", r.directors)?,
            },
            time: TimeAttributes {
                capture_date: r.capture_date,
                month_code: r.month_code,
                quarter_code: r.quarter_code,
                year: r.year,
            },
            metrics: Metrics {
                imdb_rank: r.imdb_rank,
                gross_earnings: r.gross_earnings,
                imdb_rating: r.imdb_rating.map(Rating),
                metascore_rating: r.metascore_rating,
                num_votes: r.num_votes,
            },
            source_file: r.file_name,
            timestamp: r.timestamp,
            day_key: r.day_key,
            movie_key: r.movie_key,
        })
    }
}

impl TryFrom<MovieDimRecord> for MovieDimRow {
    type Error = WarehouseError;

    fn try_from(r: MovieDimRecord) -> Result<Self, Self::Error> {
        Ok(MovieDimRow {
            movie_key: r.movie_key,
            attributes: MovieAttributes {
                imdb_id: r.imdb_id,
                title: r.title,
                release_year: r.release_year,
                runtime_minutes: r.runtime_minutes,
                mpaa_rating: r.mpaa_rating,
                genres: decode_list("genres", r.genres)?,
                summary: r.summary,
                actors: decode_list("actors", r.actors)?,
                directors: decode_list("directors", r.directors)?,
            },
        })
    }
}

impl From<FactKeyRecord> for FactDeltaKey {
    fn from(r: FactKeyRecord) -> Self {
        FactDeltaKey {
            movie_key: r.movie_key,
            metrics: Metrics {
                imdb_rank: r.imdb_rank,
                gross_earnings: r.gross_earnings,
                imdb_rating: r.imdb_rating.map(Rating),
                metascore_rating: r.metascore_rating,
                num_votes: r.num_votes,
            },
        }
    }
}

impl From<DayDimRecord> for DayDimRow {
    fn from(r: DayDimRecord) -> Self {
        DayDimRow {
            day_key: r.day_key,
            attributes: TimeAttributes {
                capture_date: r.capture_date,
                month_code: r.month_code,
                quarter_code: r.quarter_code,
                year: r.year,
            },
        }
    }
}

pub struct PgWarehouse {
    pool: PgPool,
    target: String,
}

impl PgWarehouse {
    pub async fn connect(db_url: &str) -> Result<Self, WarehouseError> {
        let target = redact_target(db_url);
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(db_url)
            .await
            .map_err(|source| {
                error!(warehouse = %target, error = %source, "Failed to connect to warehouse");
                WarehouseError::Connect {
                    target: target.clone(),
                    source,
                }
            })?;

        info!(warehouse = %target, "Connected to warehouse");
        Ok(Self { pool, target })
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    fn statement_error(&self, statement: &str, source: sqlx::Error) -> WarehouseError {
        error!(
            warehouse = %self.target,
            statement = statement.trim(),
            error = %source,
            "Warehouse statement failed"
        );
        WarehouseError::Statement {
            target: self.target.clone(),
            statement: statement.trim().to_string(),
            source,
        }
    }
}

#[async_trait]
impl Warehouse for PgWarehouse {
    async fn ensure_schema(&self) -> Result<(), WarehouseError> {
        sqlx::raw_sql(SCHEMA_SQL)
            .execute(&self.pool)
            .await
            .map_err(|e| self.statement_error(SCHEMA_SQL, e))?;
        Ok(())
    }

    async fn replace_staging(&self, rows: &[StagingRow]) -> Result<u64, WarehouseError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| self.statement_error("BEGIN", e))?;

        sqlx::query(TRUNCATE_STAGING)
            .execute(&mut *tx)
            .await
            .map_err(|e| self.statement_error(TRUNCATE_STAGING, e))?;

        let mut written = 0;
        for chunk in rows.chunks(INSERT_BATCH) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(INSERT_STAGING);
            builder.push_values(chunk, |mut b, row| {
                b.push_bind(&row.movie.title)
                    .push_bind(&row.metrics.imdb_rank)
                    .push_bind(row.movie.release_year)
                    .push_bind(&row.movie.mpaa_rating)
                    .push_bind(row.movie.runtime_minutes)
                    .push_bind(encode_list(&row.movie.genres))
                    .push_bind(row.metrics.imdb_rating.map(|r| r.0))
                    .push_bind(row.metrics.metascore_rating)
                    .push_bind(encode_list(&row.movie.actors))
                    .push_bind(encode_list(&row.movie.directors))
                    .push_bind(&row.movie.summary)
                    .push_bind(row.metrics.num_votes)
                    .push_bind(row.metrics.gross_earnings)
                    .push_bind(&row.source_file)
                    .push_bind(row.timestamp)
                    .push_bind(row.day_key)
                    .push_bind(row.time.capture_date)
                    .push_bind(row.time.month_code)
                    .push_bind(row.time.quarter_code)
                    .push_bind(row.time.year)
                    .push_bind(row.movie_key)
                    .push_bind(&row.movie.imdb_id);
            });
            let result = builder
                .build()
                .execute(&mut *tx)
                .await
                .map_err(|e| self.statement_error(INSERT_STAGING, e))?;
            written += result.rows_affected();
        }

        tx.commit()
            .await
            .map_err(|e| self.statement_error("COMMIT", e))?;

        Ok(written)
    }

    async fn staging_rows(&self) -> Result<Vec<StagingRow>, WarehouseError> {
        let records: Vec<StagingRecord> = sqlx::query_as(SELECT_STAGING)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| self.statement_error(SELECT_STAGING, e))?;
        records.into_iter().map(StagingRow::try_from).collect()
    }

    async fn movie_dim(&self) -> Result<Vec<MovieDimRow>, WarehouseError> {
        let records: Vec<MovieDimRecord> = sqlx::query_as(SELECT_MOVIE_DIM)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| self.statement_error(SELECT_MOVIE_DIM, e))?;
        records.into_iter().map(MovieDimRow::try_from).collect()
    }

    async fn append_movie_dim(&self, rows: &[MovieAttributes]) -> Result<u64, WarehouseError> {
        let mut written = 0;
        for chunk in rows.chunks(INSERT_BATCH) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(INSERT_MOVIE_DIM);
            builder.push_values(chunk, |mut b, movie| {
                b.push_bind(&movie.imdb_id)
                    .push_bind(&movie.title)
                    .push_bind(movie.release_year)
                    .push_bind(movie.runtime_minutes)
                    .push_bind(&movie.mpaa_rating)
                    .push_bind(encode_list(&movie.genres))
                    .push_bind(&movie.summary)
                    .push_bind(encode_list(&movie.actors))
                    .push_bind(encode_list(&movie.directors));
            });
            let result = builder
                .build()
                .execute(&self.pool)
                .await
                .map_err(|e| self.statement_error(INSERT_MOVIE_DIM, e))?;
            written += result.rows_affected();
        }
        Ok(written)
    }

    async fn backfill_movie_keys(&self) -> Result<u64, WarehouseError> {
        let result = sqlx::query(BACKFILL_MOVIE_KEYS)
            .execute(&self.pool)
            .await
            .map_err(|e| self.statement_error(BACKFILL_MOVIE_KEYS, e))?;
        Ok(result.rows_affected())
    }

    async fn fact_keys(&self) -> Result<Vec<FactDeltaKey>, WarehouseError> {
        let records: Vec<FactKeyRecord> = sqlx::query_as(SELECT_FACT_KEYS)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| self.statement_error(SELECT_FACT_KEYS, e))?;
        Ok(records.into_iter().map(FactDeltaKey::from).collect())
    }

    async fn day_dim(&self) -> Result<Vec<DayDimRow>, WarehouseError> {
        let records: Vec<DayDimRecord> = sqlx::query_as(SELECT_DAY_DIM)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| self.statement_error(SELECT_DAY_DIM, e))?;
        Ok(records.into_iter().map(DayDimRow::from).collect())
    }

    async fn append_day_dim(&self, rows: &[TimeAttributes]) -> Result<u64, WarehouseError> {
        let mut written = 0;
        for chunk in rows.chunks(INSERT_BATCH) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(INSERT_DAY_DIM);
            builder.push_values(chunk, |mut b, day| {
                b.push_bind(day.capture_date)
                    .push_bind(day.month_code)
                    .push_bind(day.quarter_code)
                    .push_bind(day.year);
            });
            let result = builder
                .build()
                .execute(&self.pool)
                .await
                .map_err(|e| self.statement_error(INSERT_DAY_DIM, e))?;
            written += result.rows_affected();
        }
        Ok(written)
    }

    async fn backfill_day_keys(&self) -> Result<u64, WarehouseError> {
        let result = sqlx::query(BACKFILL_DAY_KEYS)
            .execute(&self.pool)
            .await
            .map_err(|e| self.statement_error(BACKFILL_DAY_KEYS, e))?;
        Ok(result.rows_affected())
    }

    async fn append_facts(&self, rows: &[FactRow]) -> Result<u64, WarehouseError> {
        let mut written = 0;
        for chunk in rows.chunks(INSERT_BATCH) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(INSERT_FACTS);
            builder.push_values(chunk, |mut b, fact| {
                b.push_bind(fact.day_key)
                    .push_bind(fact.movie_key)
                    .push_bind(&fact.metrics.imdb_rank)
                    .push_bind(fact.metrics.gross_earnings)
                    .push_bind(fact.metrics.imdb_rating.map(|r| r.0))
                    .push_bind(fact.metrics.metascore_rating)
                    .push_bind(fact.metrics.num_votes)
                    .push_bind(&fact.source_file)
                    .push_bind(fact.timestamp);
            });
            let result = builder
                .build()
                .execute(&self.pool)
                .await
                .map_err(|e| self.statement_error(INSERT_FACTS, e))?;
            written += result.rows_affected();
        }
        Ok(written)
    }

    async fn table_counts(&self) -> Result<TableCounts, WarehouseError> {
        let (staging, day_dim, movie_dim, facts): (i64, i64, i64, i64) = sqlx::query_as(COUNT_TABLES)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| self.statement_error(COUNT_TABLES, e))?;
        Ok(TableCounts {
            staging,
            day_dim,
            movie_dim,
            facts,
        })
    }
}
