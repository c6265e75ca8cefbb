use chrono::{NaiveDate, NaiveDateTime};

use matchday_predictor::league_table;
use matchday_predictor::sqlite_store::{SqliteStore, VerifySummary};
use matchday_predictor::store::{DatasetFilter, MatchStore, MemoryStore, Venue};
use matchday_predictor::{
    FeaturePipeline, Fixture, PipelineConfig, PredictedClass, PredictionResult, StandingEntry,
    StandingSource,
};

fn at(day: u32, hour: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 9, day)
        .unwrap()
        .and_hms_opt(hour, 30, 0)
        .unwrap()
}

fn season() -> Vec<Fixture> {
    vec![
        Fixture::new(1, 39, 2024, at(1, 14), 1, 2).finished(2, 1),
        Fixture::new(2, 39, 2024, at(1, 17), 3, 4).finished(0, 0),
        Fixture::new(3, 39, 2024, at(8, 14), 2, 3).finished(1, 3),
        Fixture::new(4, 39, 2024, at(8, 17), 4, 1).finished(2, 2),
        Fixture::new(5, 39, 2024, at(15, 14), 1, 3).finished(0, 1),
        Fixture::new(6, 39, 2024, at(15, 17), 2, 4).finished(4, 0),
        Fixture::new(7, 39, 2024, at(22, 14), 2, 1),
        Fixture::new(8, 39, 2024, at(22, 17), 4, 3),
        Fixture::new(9, 140, 2024, at(22, 20), 11, 12),
    ]
}

fn both_stores() -> (MemoryStore, SqliteStore) {
    let fixtures = season();
    let snapshots = league_table::matchday_snapshots(&fixtures, 39, 2024);

    let mut memory = MemoryStore::new();
    for f in &fixtures {
        memory.upsert_fixture(f.clone());
    }
    for s in &snapshots {
        memory.upsert_standing(s.clone());
    }

    let sqlite = SqliteStore::in_memory().unwrap();
    sqlite.upsert_fixtures(&fixtures).unwrap();
    sqlite.upsert_standings(&snapshots).unwrap();
    (memory, sqlite)
}

fn ids(rows: &[Fixture]) -> Vec<u32> {
    rows.iter().map(|f| f.id).collect()
}

#[test]
fn queries_match_the_memory_store() {
    let (memory, sqlite) = both_stores();
    let cutoff = at(22, 14);

    for venue in [Venue::Any, Venue::HomeOnly, Venue::AwayOnly] {
        for limit in [None, Some(2)] {
            assert_eq!(
                ids(&memory.team_fixtures_before(1, cutoff, venue, limit).unwrap()),
                ids(&sqlite.team_fixtures_before(1, cutoff, venue, limit).unwrap()),
                "{venue:?} {limit:?}"
            );
        }
    }
    assert_eq!(
        ids(&memory.head_to_head_before(2, 1, cutoff, None).unwrap()),
        ids(&sqlite.head_to_head_before(2, 1, cutoff, None).unwrap())
    );
    let day = NaiveDate::from_ymd_opt(2024, 9, 22).unwrap();
    assert_eq!(
        ids(&memory.fixtures_on(day).unwrap()),
        ids(&sqlite.fixtures_on(day).unwrap())
    );
    assert_eq!(ids(&sqlite.fixtures_on(day).unwrap()), vec![7, 8, 9]);
    // Draws (2 and 4) carry no stored outcome.
    assert_eq!(
        ids(&sqlite.finished_fixtures(&DatasetFilter::default()).unwrap()),
        vec![1, 3, 5, 6]
    );
    for filter in [
        DatasetFilter::default(),
        DatasetFilter {
            include_draws: true,
            ..DatasetFilter::default()
        },
        DatasetFilter {
            league_ids: vec![140],
            ..DatasetFilter::default()
        },
    ] {
        assert_eq!(
            ids(&memory.finished_fixtures(&filter).unwrap()),
            ids(&sqlite.finished_fixtures(&filter).unwrap())
        );
    }
    for source in [StandingSource::Derived, StandingSource::Feed] {
        assert_eq!(
            memory.standing_as_of(39, 2024, 3, cutoff, source).unwrap(),
            sqlite.standing_as_of(39, 2024, 3, cutoff, source).unwrap()
        );
    }
}

#[test]
fn feed_and_derived_standings_are_kept_apart() {
    let (mut memory, sqlite) = both_stores();
    let midnight = NaiveDate::from_ymd_opt(2024, 9, 22)
        .unwrap()
        .and_hms_opt(0, 0, 0)
        .unwrap();
    let derived = sqlite
        .standing_as_of(39, 2024, 3, at(22, 14), StandingSource::Derived)
        .unwrap()
        .unwrap();
    assert_eq!(derived.as_of, midnight);

    // Same snapshot time plus a later refresh, both ranked differently by the provider.
    let feed_rows: Vec<StandingEntry> = [midnight, at(22, 8)]
        .into_iter()
        .map(|as_of| StandingEntry {
            rank: derived.rank + 1,
            as_of,
            source: StandingSource::Feed,
            ..derived.clone()
        })
        .collect();
    sqlite.upsert_standings(&feed_rows).unwrap();
    for row in &feed_rows {
        memory.upsert_standing(row.clone());
    }

    for store in [&memory as &dyn MatchStore, &sqlite as &dyn MatchStore] {
        let kept = store
            .standing_as_of(39, 2024, 3, at(22, 14), StandingSource::Derived)
            .unwrap();
        assert_eq!(kept.as_ref(), Some(&derived));
        let feed = store
            .standing_as_of(39, 2024, 3, at(22, 14), StandingSource::Feed)
            .unwrap()
            .unwrap();
        assert_eq!(feed.as_of, at(22, 8));
        assert_eq!(feed.rank, derived.rank + 1);
        assert_eq!(feed.source, StandingSource::Feed);
    }

    let row = FeaturePipeline::new(&sqlite, PipelineConfig::default())
        .compute(8)
        .unwrap();
    assert_eq!(row.features.get_named("away_position"), Some(f64::from(derived.rank)));
}

#[test]
fn pipeline_output_is_store_independent() {
    let (memory, sqlite) = both_stores();
    let from_memory = FeaturePipeline::new(&memory, PipelineConfig::default())
        .compute_many(&[7, 8])
        .unwrap();
    let from_sqlite = FeaturePipeline::new(&sqlite, PipelineConfig::default())
        .compute_many(&[7, 8])
        .unwrap();
    assert_eq!(from_memory.len(), 2);
    for (a, b) in from_memory.iter().zip(&from_sqlite) {
        assert_eq!(a.features, b.features);
        assert!(a.standings_found && b.standings_found);
    }
}

#[test]
fn upsert_replaces_scores() {
    let (_, sqlite) = both_stores();
    let played = Fixture::new(7, 39, 2024, at(22, 14), 2, 1).finished(1, 0);
    sqlite.upsert_fixtures(&[played.clone()]).unwrap();
    let stored = sqlite.fixture(7).unwrap().unwrap();
    assert!(stored.is_finished());
    assert_eq!(stored.score(), Some((1, 0)));
    assert_eq!(sqlite.league_seasons().unwrap(), vec![(39, 2024), (140, 2024)]);
    assert_eq!(sqlite.season_fixtures(140, 2024).unwrap().len(), 1);
}

fn prediction(fixture_id: u32, class: PredictedClass, p_home: f64) -> PredictionResult {
    PredictionResult {
        fixture_id,
        predicted_class: class,
        probability_home: p_home,
        probability_away: 1.0 - p_home,
        confidence: p_home.max(1.0 - p_home),
    }
}

#[test]
fn predictions_are_verified_once_results_arrive() {
    let (_, sqlite) = both_stores();
    let home_pick = prediction(7, PredictedClass::HomeWin, 0.82);
    let away_pick = prediction(8, PredictedClass::AwayWin, 0.40);
    let draw_pick = prediction(9, PredictedClass::HomeWin, 0.55);
    for p in [&home_pick, &away_pick, &draw_pick] {
        sqlite.save_prediction("blend", p).unwrap();
    }
    assert_eq!(sqlite.prediction(7).unwrap(), Some(home_pick));
    assert_eq!(sqlite.prediction(99).unwrap(), None);

    // Nothing has been played yet.
    let summary = sqlite.verify_predictions().unwrap();
    assert_eq!(
        summary,
        VerifySummary {
            checked: 3,
            verified: 0,
            correct: 0
        }
    );

    sqlite
        .upsert_fixtures(&[
            Fixture::new(7, 39, 2024, at(22, 14), 2, 1).finished(2, 0),
            Fixture::new(8, 39, 2024, at(22, 17), 4, 3).finished(3, 1),
            Fixture::new(9, 140, 2024, at(22, 20), 11, 12).finished(1, 1),
        ])
        .unwrap();
    let summary = sqlite.verify_predictions().unwrap();
    assert_eq!(summary.checked, 3);
    assert_eq!(summary.verified, 3);
    assert_eq!(summary.correct, 1);

    // Already settled.
    assert_eq!(sqlite.verify_predictions().unwrap().checked, 0);

    let stats = sqlite.accuracy_stats(0.75).unwrap();
    assert_eq!(stats.total, 3);
    // The draw carries no verdict.
    assert_eq!(stats.verified, 2);
    assert_eq!(stats.correct, 1);
    assert!((stats.accuracy - 0.5).abs() < 1e-12);
    assert_eq!(stats.high_confidence_verified, 1);
    assert_eq!(stats.high_confidence_correct, 1);
    assert!((stats.high_confidence_accuracy - 1.0).abs() < 1e-12);
}

#[test]
fn ingest_runs_are_recorded() {
    let sqlite = SqliteStore::in_memory().unwrap();
    sqlite
        .record_ingest_run("fixtures.json", 12, 0, &["fixture 4: missing teams".to_string()])
        .unwrap();
}
