//! Loader Service - Populates the star schema from the staging table
//!
//! Stages run in a fixed order, each gated on the previous one:
//!
//! 1. `NewMovies`   - append staging movie tuples missing from movie_dim
//! 2. `MovieKeys`   - backfill staging.movie_key from movie_dim
//! 3. `FactDelta`   - staging metric tuples missing from the fact table;
//!    an empty delta ends the run here
//! 4. `NewDays`     - append staging time tuples missing from day_dim
//! 5. `DayKeys`     - backfill staging.day_key from day_dim
//! 6. `AppendFacts` - append the delta rows to movie_performance_fact
//!
//! Statements commit individually. A failure mid-run leaves earlier appends
//! in place; the next run recomputes the same deltas and catches up.

pub mod delta;

use common::model::{FactDeltaKey, StagingRow};
use common::{Warehouse, WarehouseError};
use std::collections::HashSet;
use thiserror::Error;
use tracing::{error, info, warn};

pub use delta::{fact_delta, novel_days, novel_movies, select_fact_rows};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error(transparent)]
    Warehouse(#[from] WarehouseError),

    #[error("{count} staging rows have no {key} after backfill (first: {imdb_id})")]
    UnresolvedKey {
        key: &'static str,
        count: usize,
        imdb_id: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    NewMovies,
    MovieKeys,
    FactDelta,
    NewDays,
    DayKeys,
    AppendFacts,
}

impl Stage {
    pub const ORDER: [Stage; 6] = [
        Stage::NewMovies,
        Stage::MovieKeys,
        Stage::FactDelta,
        Stage::NewDays,
        Stage::DayKeys,
        Stage::AppendFacts,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stage::NewMovies => "new_movies",
            Stage::MovieKeys => "movie_keys",
            Stage::FactDelta => "fact_delta",
            Stage::NewDays => "new_days",
            Stage::DayKeys => "day_keys",
            Stage::AppendFacts => "append_facts",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub movies_added: u64,
    pub days_added: u64,
    pub facts_added: u64,
    pub stages_run: Vec<Stage>,
    /// Stage that ended the run early, if any
    pub halted_at: Option<Stage>,
}

impl LoadReport {
    pub fn is_noop(&self) -> bool {
        self.movies_added == 0 && self.days_added == 0 && self.facts_added == 0
    }
}

enum Flow {
    Continue,
    Halt,
}

#[derive(Default)]
struct LoadState {
    staging: Vec<StagingRow>,
    delta: HashSet<FactDeltaKey>,
    report: LoadReport,
}

/// Bring day_dim, movie_dim and the fact table up to date with staging.
pub async fn populate_schema<W>(warehouse: &W) -> Result<LoadReport, LoadError>
where
    W: Warehouse + ?Sized,
{
    let mut state = LoadState::default();

    for stage in Stage::ORDER {
        let flow = run_stage(stage, warehouse, &mut state).await?;
        state.report.stages_run.push(stage);
        if let Flow::Halt = flow {
            state.report.halted_at = Some(stage);
            break;
        }
    }

    info!(
        movies_added = state.report.movies_added,
        days_added = state.report.days_added,
        facts_added = state.report.facts_added,
        "Schema population finished"
    );
    Ok(state.report)
}

async fn run_stage<W>(stage: Stage, warehouse: &W, state: &mut LoadState) -> Result<Flow, LoadError>
where
    W: Warehouse + ?Sized,
{
    match stage {
        Stage::NewMovies => {
            let staging = warehouse.staging_rows().await?;
            let existing = warehouse.movie_dim().await?;
            let novel = novel_movies(&staging, &existing);
            if novel.is_empty() {
                warn!("No data added to movie_dim");
            } else {
                state.report.movies_added = warehouse.append_movie_dim(&novel).await?;
                info!(rows = state.report.movies_added, "Added data to movie_dim");
            }
            state.staging = staging;
        }
        Stage::MovieKeys => {
            let updated = warehouse.backfill_movie_keys().await?;
            state.staging = warehouse.staging_rows().await?;
            require_key(&state.staging, "movie_key", |row| row.movie_key)?;
            info!(updated, "Populated movie_key in staging");
        }
        Stage::FactDelta => {
            let existing = warehouse.fact_keys().await?;
            state.delta = fact_delta(&state.staging, &existing);
            if state.delta.is_empty() {
                warn!("No new facts populated");
                return Ok(Flow::Halt);
            }
            info!(tuples = state.delta.len(), "Fact delta detected");
        }
        Stage::NewDays => {
            let existing = warehouse.day_dim().await?;
            let novel = novel_days(&state.staging, &existing);
            if novel.is_empty() {
                warn!("No data added to day_dim");
            } else {
                state.report.days_added = warehouse.append_day_dim(&novel).await?;
                info!(rows = state.report.days_added, "Added data to day_dim");
            }
        }
        Stage::DayKeys => {
            let updated = warehouse.backfill_day_keys().await?;
            state.staging = warehouse.staging_rows().await?;
            require_key(&state.staging, "day_key", |row| row.day_key)?;
            info!(updated, "Populated day_key in staging");
        }
        Stage::AppendFacts => {
            let facts = select_fact_rows(&state.staging, &state.delta);
            state.report.facts_added = warehouse.append_facts(&facts).await?;
            info!(rows = state.report.facts_added, "Movie performance fact table populated");
        }
    }

    Ok(Flow::Continue)
}

fn require_key<F>(staging: &[StagingRow], key: &'static str, get: F) -> Result<(), LoadError>
where
    F: Fn(&StagingRow) -> Option<i64>,
{
    let missing: Vec<&StagingRow> = staging.iter().filter(|row| get(row).is_none()).collect();
    match missing.first() {
        None => Ok(()),
        Some(first) => {
            error!(
                key,
                count = missing.len(),
                imdb_id = %first.movie.imdb_id,
                "Staging rows left without a key after backfill"
            );
            Err(LoadError::UnresolvedKey {
                key,
                count: missing.len(),
                imdb_id: first.movie.imdb_id.clone(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use common::model::{
        DayDimRow, FactRow, Metrics, MovieAttributes, MovieDimRow, Rating, TimeAttributes,
    };
    use common::logging::capture;
    use common::{MemoryWarehouse, TableCounts};

    fn staging(id: &str, votes: i64, day: u32) -> StagingRow {
        let date = NaiveDate::from_ymd_opt(2024, 3, day).unwrap();
        StagingRow {
            movie: MovieAttributes {
                imdb_id: id.to_string(),
                title: format!("Title {}", id),
                release_year: 2019,
                runtime_minutes: Some(95),
                mpaa_rating: Some("R".to_string()),
                genres: Some(vec!["Comedy".to_string(), "Drama".to_string()]),
                summary: "Things happen.".to_string(),
                actors: Some(vec!["A. Actor".to_string()]),
                directors: Some(vec!["D. Rector".to_string()]),
            },
            time: TimeAttributes {
                capture_date: date,
                month_code: 3,
                quarter_code: 1,
                year: 2024,
            },
            metrics: Metrics {
                imdb_rank: "2,17".to_string(),
                gross_earnings: Some(1_500_000),
                imdb_rating: Some(Rating(7.3)),
                metascore_rating: Some(61),
                num_votes: Some(votes),
            },
            source_file: format!("top50movies202403{:02}-120000.csv.gz", day),
            timestamp: date.and_hms_opt(12, 0, 0).unwrap(),
            day_key: None,
            movie_key: None,
        }
    }

    async fn first_load(wh: &MemoryWarehouse) -> LoadReport {
        wh.replace_staging(&[staging("tt1", 100, 1), staging("tt2", 50, 1)])
            .await
            .unwrap();
        populate_schema(wh).await.unwrap()
    }

    /// Delegates to a memory warehouse with optional injected faults
    #[derive(Default)]
    struct FaultyWarehouse {
        inner: MemoryWarehouse,
        fail_facts: bool,
        skip_movie_backfill: bool,
    }

    #[async_trait]
    impl Warehouse for FaultyWarehouse {
        async fn ensure_schema(&self) -> Result<(), WarehouseError> {
            self.inner.ensure_schema().await
        }
        async fn replace_staging(&self, rows: &[StagingRow]) -> Result<u64, WarehouseError> {
            self.inner.replace_staging(rows).await
        }
        async fn staging_rows(&self) -> Result<Vec<StagingRow>, WarehouseError> {
            self.inner.staging_rows().await
        }
        async fn movie_dim(&self) -> Result<Vec<MovieDimRow>, WarehouseError> {
            self.inner.movie_dim().await
        }
        async fn append_movie_dim(&self, rows: &[MovieAttributes]) -> Result<u64, WarehouseError> {
            self.inner.append_movie_dim(rows).await
        }
        async fn backfill_movie_keys(&self) -> Result<u64, WarehouseError> {
            if self.skip_movie_backfill {
                return Ok(0);
            }
            self.inner.backfill_movie_keys().await
        }
        async fn fact_keys(&self) -> Result<Vec<FactDeltaKey>, WarehouseError> {
            self.inner.fact_keys().await
        }
        async fn day_dim(&self) -> Result<Vec<DayDimRow>, WarehouseError> {
            self.inner.day_dim().await
        }
        async fn append_day_dim(&self, rows: &[TimeAttributes]) -> Result<u64, WarehouseError> {
            self.inner.append_day_dim(rows).await
        }
        async fn backfill_day_keys(&self) -> Result<u64, WarehouseError> {
            self.inner.backfill_day_keys().await
        }
        async fn append_facts(&self, rows: &[FactRow]) -> Result<u64, WarehouseError> {
            if self.fail_facts {
                return Err(WarehouseError::Statement {
                    target: "memory".to_string(),
                    statement: "append_facts".to_string(),
                    source: sqlx::Error::PoolClosed,
                });
            }
            self.inner.append_facts(rows).await
        }
        async fn table_counts(&self) -> Result<TableCounts, WarehouseError> {
            self.inner.table_counts().await
        }
    }

    // ------------------------------------------------------------------
    // Happy path
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_first_load_populates_everything() {
        let wh = MemoryWarehouse::new();
        let report = first_load(&wh).await;

        assert_eq!(report.movies_added, 2);
        assert_eq!(report.days_added, 1);
        assert_eq!(report.facts_added, 2);
        assert_eq!(report.stages_run, Stage::ORDER.to_vec());
        assert_eq!(report.halted_at, None);

        let tables = wh.snapshot();
        assert!(tables.staging.iter().all(|r| r.movie_key.is_some() && r.day_key.is_some()));
        assert_eq!(tables.facts[0].day_key, 1);
        assert_eq!(tables.facts[0].source_file, "top50movies20240301-120000.csv.gz");
    }

    #[tokio::test]
    async fn test_rerun_is_idempotent() {
        let wh = MemoryWarehouse::new();
        first_load(&wh).await;
        let before = wh.table_counts().await.unwrap();

        // parser re-run resets staging keys
        wh.replace_staging(&[staging("tt1", 100, 1), staging("tt2", 50, 1)])
            .await
            .unwrap();
        let report = populate_schema(&wh).await.unwrap();

        assert!(report.is_noop());
        assert_eq!(report.halted_at, Some(Stage::FactDelta));
        assert_eq!(report.stages_run.len(), 3);
        assert_eq!(wh.table_counts().await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_votes_change_appends_one_fact() {
        let wh = MemoryWarehouse::new();
        first_load(&wh).await;

        wh.replace_staging(&[staging("tt1", 140, 2), staging("tt2", 50, 2)])
            .await
            .unwrap();
        let report = populate_schema(&wh).await.unwrap();

        assert_eq!(report.movies_added, 0);
        assert_eq!(report.days_added, 1);
        assert_eq!(report.facts_added, 1);

        let tables = wh.snapshot();
        let newest = tables.facts.last().unwrap();
        assert_eq!(newest.movie_key, 1);
        assert_eq!(newest.day_key, 2);
        assert_eq!(newest.metrics.num_votes, Some(140));
        assert_eq!(tables.facts.len(), 3);
    }

    #[tokio::test]
    async fn test_unchanged_metrics_on_new_date_add_nothing() {
        let wh = MemoryWarehouse::new();
        first_load(&wh).await;

        wh.replace_staging(&[staging("tt1", 100, 5)]).await.unwrap();
        let report = populate_schema(&wh).await.unwrap();

        assert!(report.is_noop());
        assert_eq!(report.halted_at, Some(Stage::FactDelta));
        assert_eq!(wh.snapshot().day_dim.len(), 1);
    }

    #[tokio::test]
    async fn test_changed_movie_attribute_gets_new_movie_key() {
        let wh = MemoryWarehouse::new();
        first_load(&wh).await;

        let mut retitled = staging("tt1", 100, 2);
        retitled.movie.title = "Title tt1 (Director's Cut)".to_string();
        wh.replace_staging(&[retitled]).await.unwrap();
        let report = populate_schema(&wh).await.unwrap();

        assert_eq!(report.movies_added, 1);
        assert_eq!(report.facts_added, 1);
        assert_eq!(wh.snapshot().facts.last().unwrap().movie_key, 3);
    }

    // ------------------------------------------------------------------
    // Failures
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_failed_fact_append_keeps_dimensions_and_recovers() {
        let wh = FaultyWarehouse {
            fail_facts: true,
            ..Default::default()
        };
        wh.replace_staging(&[staging("tt1", 100, 1), staging("tt2", 50, 1)])
            .await
            .unwrap();

        let err = populate_schema(&wh).await.unwrap_err();
        assert!(matches!(err, LoadError::Warehouse(WarehouseError::Statement { .. })));

        let tables = wh.inner.snapshot();
        assert_eq!(tables.movie_dim.len(), 2);
        assert_eq!(tables.day_dim.len(), 1);
        assert!(tables.facts.is_empty());

        let report = populate_schema(&wh.inner).await.unwrap();
        assert_eq!(report.movies_added, 0);
        assert_eq!(report.days_added, 0);
        assert_eq!(report.facts_added, 2);
    }

    #[tokio::test]
    async fn test_unresolved_movie_key_is_an_error() {
        let wh = FaultyWarehouse {
            skip_movie_backfill: true,
            ..Default::default()
        };
        wh.replace_staging(&[staging("tt1", 100, 1), staging("tt2", 50, 1)])
            .await
            .unwrap();

        let (_guard, logs) = capture();
        match populate_schema(&wh).await {
            Err(LoadError::UnresolvedKey { key, count, imdb_id }) => {
                assert_eq!(key, "movie_key");
                assert_eq!(count, 2);
                assert_eq!(imdb_id, "tt1");
            }
            other => panic!("expected UnresolvedKey, got {:?}", other),
        }
        assert!(wh.inner.snapshot().facts.is_empty());

        let logged = logs.contents();
        assert!(logged.contains("ERROR"));
        assert!(logged.contains("Staging rows left without a key after backfill"));
        assert!(logged.contains("tt1"));
    }

    #[tokio::test]
    async fn test_empty_staging_halts_at_fact_delta() {
        let wh = MemoryWarehouse::new();
        let report = populate_schema(&wh).await.unwrap();
        assert!(report.is_noop());
        assert_eq!(report.halted_at, Some(Stage::FactDelta));
    }
}
