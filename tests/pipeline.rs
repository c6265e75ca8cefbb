use chrono::{NaiveDate, NaiveDateTime};

use matchday_predictor::fixtures::SplitRecord;
use matchday_predictor::store::{DatasetFilter, MemoryStore};
use matchday_predictor::{
    FeaturePipeline, Fixture, PipelineConfig, PredictorError, StandingEntry, StandingSource,
};

fn at(day: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, day)
        .unwrap()
        .and_hms_opt(15, 0, 0)
        .unwrap()
}

fn standing(team_id: u32, rank: u32, points: i32, played: u32, as_of: NaiveDateTime) -> StandingEntry {
    StandingEntry {
        league_id: 39,
        season: 2023,
        team_id,
        rank,
        points,
        goals_diff: 0,
        all: SplitRecord {
            played,
            ..SplitRecord::default()
        },
        home: SplitRecord::default(),
        away: SplitRecord::default(),
        form: None,
        as_of,
        source: StandingSource::Derived,
    }
}

fn feed_standing(team_id: u32, rank: u32, as_of: NaiveDateTime) -> StandingEntry {
    StandingEntry {
        source: StandingSource::Feed,
        ..standing(team_id, rank, 0, 4, as_of)
    }
}

/// Teams 1 and 2 meet on day 20 (fixture 100). Both have four earlier results and one
/// previous meeting.
fn season_store() -> MemoryStore {
    let mut store = MemoryStore::new();
    store.upsert_fixture(Fixture::new(1, 39, 2023, at(1), 1, 3).finished(2, 0));
    store.upsert_fixture(Fixture::new(2, 39, 2023, at(2), 4, 2).finished(1, 1));
    store.upsert_fixture(Fixture::new(3, 39, 2023, at(5), 1, 2).finished(1, 0));
    store.upsert_fixture(Fixture::new(4, 39, 2023, at(8), 5, 1).finished(0, 3));
    store.upsert_fixture(Fixture::new(5, 39, 2023, at(9), 2, 6).finished(2, 2));
    store.upsert_fixture(Fixture::new(6, 39, 2023, at(12), 3, 1).finished(1, 1));
    store.upsert_fixture(Fixture::new(7, 39, 2023, at(13), 2, 3).finished(0, 1));
    store.upsert_fixture(Fixture::new(100, 39, 2023, at(20), 1, 2));
    // Played after the target fixture; must never leak into its features.
    store.upsert_fixture(Fixture::new(200, 39, 2023, at(25), 1, 2).finished(0, 5));
    store
}

#[test]
fn compute_is_idempotent() {
    let store = season_store();
    let pipeline = FeaturePipeline::new(&store, PipelineConfig::default());
    let first = pipeline.compute(100).unwrap();
    let second = pipeline.compute(100).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.features.len(), pipeline.catalog().len());
}

#[test]
fn later_results_do_not_leak() {
    let store = season_store();
    let pipeline = FeaturePipeline::new(&store, PipelineConfig::default());
    let row = pipeline.compute(100).unwrap();
    assert_eq!(row.cutoff, at(20));
    assert_eq!(row.home_history, 4);
    assert_eq!(row.away_history, 4);
    assert_eq!(row.h2h_meetings, 1);
    assert_eq!(row.target, None);
    assert_eq!(row.features.get_named("h2h_home_wins"), Some(1.0));
    assert_eq!(row.features.get_named("h2h_no_history"), Some(0.0));
    // 1-0 vs 2, 2-0 vs 3, 1-1 vs 3, 3-0 at 5: ten points.
    assert_eq!(row.features.get_named("home_points_last_5"), Some(10.0));
}

#[test]
fn explicit_cutoff_narrows_history() {
    let store = season_store();
    let pipeline = FeaturePipeline::new(&store, PipelineConfig::default());
    let row = pipeline.compute_with_cutoff(100, at(5)).unwrap();
    assert_eq!(row.home_history, 1);
    assert_eq!(row.h2h_meetings, 0);
    assert_eq!(row.features.get_named("h2h_no_history"), Some(1.0));
    assert_eq!(row.features.get_named("home_form_insufficient"), Some(1.0));
}

#[test]
fn missing_standings_are_imputed_and_flagged() {
    let store = season_store();
    let pipeline = FeaturePipeline::new(&store, PipelineConfig::default());
    let row = pipeline.compute(100).unwrap();
    assert!(!row.standings_found);
    assert_eq!(row.features.get_named("standings_missing"), Some(1.0));
    assert_eq!(row.features.get_named("home_position"), Some(0.0));
    assert_eq!(row.features.get_named("diff_points"), Some(0.0));
    assert_eq!(row.features.get_named("position_advantage"), Some(0.0));
    assert!(row.imputed_count() > 0);
}

#[test]
fn standings_snapshot_before_kickoff_is_used() {
    let mut store = season_store();
    store.upsert_standing(standing(1, 2, 10, 4, at(14)));
    store.upsert_standing(standing(2, 7, 5, 4, at(14)));
    // Snapshot taken after kickoff is ignored.
    store.upsert_standing(standing(1, 1, 13, 5, at(21)));

    let pipeline = FeaturePipeline::new(&store, PipelineConfig::default());
    let row = pipeline.compute(100).unwrap();
    assert!(row.standings_found);
    assert_eq!(row.features.get_named("standings_missing"), Some(0.0));
    assert_eq!(row.features.get_named("home_position"), Some(2.0));
    assert_eq!(row.features.get_named("diff_position"), Some(5.0));
    assert_eq!(row.features.get_named("position_advantage"), Some(5.0));
    assert_eq!(row.features.get_named("diff_points"), Some(5.0));
    assert_eq!(row.features.get_named("home_ppg"), Some(2.5));
}

#[test]
fn feed_standings_do_not_replace_derived_ranks() {
    let mut store = season_store();
    store.upsert_standing(standing(1, 2, 10, 4, at(14)));
    store.upsert_standing(standing(2, 7, 5, 4, at(14)));
    // A provider refresh closer to kickoff, ranked by its own rules.
    store.upsert_standing(feed_standing(1, 6, at(19)));
    store.upsert_standing(feed_standing(2, 3, at(19)));

    let derived = FeaturePipeline::new(&store, PipelineConfig::default())
        .compute(100)
        .unwrap();
    assert_eq!(derived.features.get_named("away_position"), Some(7.0));
    assert_eq!(derived.features.get_named("diff_position"), Some(5.0));

    let config = PipelineConfig {
        standings_source: StandingSource::Feed,
        ..PipelineConfig::default()
    };
    let feed = FeaturePipeline::new(&store, config).compute(100).unwrap();
    assert_eq!(feed.features.get_named("away_position"), Some(3.0));
    assert_eq!(feed.features.get_named("diff_position"), Some(-3.0));

    // Training rows read the same source as scoring.
    let rows = FeaturePipeline::new(&store, PipelineConfig::default())
        .training_dataset(&DatasetFilter::default())
        .unwrap();
    let replay = rows.iter().find(|r| r.fixture_id == 200).unwrap();
    assert_eq!(replay.features.get_named("diff_position"), Some(5.0));
}

#[test]
fn predictable_needs_min_history_on_both_sides() {
    let store = season_store();
    let pipeline = FeaturePipeline::new(&store, PipelineConfig::default());

    let row = pipeline.compute(100).unwrap();
    assert_eq!((row.home_history, row.away_history), (4, 4));
    assert!(row.is_predictable(4));
    assert!(!row.is_predictable(5));

    let early = pipeline.compute_with_cutoff(100, at(5)).unwrap();
    assert_eq!((early.home_history, early.away_history), (1, 1));
    assert!(early.is_predictable(1));
    assert!(!early.is_predictable(2));
    assert!(!early.is_predictable(pipeline.config().min_history));
}

#[test]
fn one_sided_standings_count_as_missing() {
    let mut store = season_store();
    store.upsert_standing(standing(1, 2, 10, 4, at(14)));
    let pipeline = FeaturePipeline::new(&store, PipelineConfig::default());
    let row = pipeline.compute(100).unwrap();
    assert!(!row.standings_found);
    assert_eq!(row.features.get_named("home_position"), Some(0.0));
}

#[test]
fn unknown_fixture_is_reported() {
    let store = season_store();
    let pipeline = FeaturePipeline::new(&store, PipelineConfig::default());
    assert!(matches!(
        pipeline.compute(404),
        Err(PredictorError::FixtureNotFound(404))
    ));
}

#[test]
fn malformed_fixture_is_reported() {
    let mut store = season_store();
    store.upsert_fixture(Fixture::new(300, 39, 2023, at(22), 7, 7));
    let pipeline = FeaturePipeline::new(&store, PipelineConfig::default());
    assert!(matches!(
        pipeline.compute(300),
        Err(PredictorError::MalformedFixture { fixture_id: 300, .. })
    ));
}

#[test]
fn compute_many_skips_fixture_failures_and_keeps_order() {
    let mut store = season_store();
    store.upsert_fixture(Fixture::new(300, 39, 2023, at(22), 7, 7));
    let pipeline = FeaturePipeline::new(&store, PipelineConfig::default());
    let rows = pipeline.compute_many(&[100, 404, 300, 5]).unwrap();
    let ids: Vec<u32> = rows.iter().map(|r| r.fixture_id).collect();
    assert_eq!(ids, vec![100, 5]);
}

#[test]
fn training_dataset_excludes_draws_unless_asked() {
    let store = season_store();
    let pipeline = FeaturePipeline::new(&store, PipelineConfig::default());

    let rows = pipeline.training_dataset(&DatasetFilter::default()).unwrap();
    let ids: Vec<u32> = rows.iter().map(|r| r.fixture_id).collect();
    assert_eq!(ids, vec![1, 3, 4, 7, 200]);
    assert!(rows.iter().all(|r| r.target.is_some()));
    assert_eq!(rows[0].target, Some(1));
    assert_eq!(rows[2].target, Some(0));

    let with_draws = pipeline
        .training_dataset(&DatasetFilter {
            include_draws: true,
            ..DatasetFilter::default()
        })
        .unwrap();
    assert_eq!(with_draws.len(), 8);
    assert!(with_draws.iter().any(|r| r.target.is_none()));
}

#[test]
fn single_window_config_drops_momentum_columns() {
    let store = season_store();
    let config = PipelineConfig {
        windows: vec![5],
        ..PipelineConfig::default()
    };
    let pipeline = FeaturePipeline::new(&store, config);
    let row = pipeline.compute(100).unwrap();
    assert_eq!(row.features.get_named("home_momentum"), None);
    assert_eq!(row.features.get_named("home_points_last_10"), None);
    assert!(row.features.get_named("diff_form_points_5").is_some());
    assert_eq!(row.features.len(), pipeline.catalog().len());
}
