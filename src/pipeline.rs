use chrono::NaiveDateTime;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{DEFAULT_FORM_WINDOWS, DEFAULT_MIN_HISTORY};
use crate::error::{PredictorError, Result};
use crate::features::{
    DerivedStat, DiffStat, Feature, FeatureCatalog, FeatureVector, Flag, FormStat, Side,
    VENUE_WINDOW,
};
use crate::fixtures::{Fixture, StandingSource};
use crate::form::{FormCalculator, FormReport};
use crate::h2h::{DEFAULT_RECENT_MEETINGS, HeadToHeadCalculator};
use crate::standings::StandingsCalculator;
use crate::store::{DatasetFilter, MatchStore, Venue};

#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub windows: Vec<usize>,
    /// Meetings in the recency-weighted head-to-head block.
    pub h2h_recent: usize,
    /// Cap on head-to-head meetings read; `None` reads them all.
    pub h2h_lookback: Option<usize>,
    pub min_history: usize,
    /// Standings rows read at training and at inference time alike.
    pub standings_source: StandingSource,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            windows: DEFAULT_FORM_WINDOWS.to_vec(),
            h2h_recent: DEFAULT_RECENT_MEETINGS,
            h2h_lookback: None,
            min_history: DEFAULT_MIN_HISTORY,
            standings_source: StandingSource::Derived,
        }
    }
}

/// Features for one fixture plus the context callers use to decide whether to trust them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchFeatures {
    pub fixture_id: u32,
    pub league_id: u32,
    pub season: i32,
    pub date: NaiveDateTime,
    pub cutoff: NaiveDateTime,
    pub home_team_id: u32,
    pub away_team_id: u32,
    pub home_history: usize,
    pub away_history: usize,
    pub standings_found: bool,
    pub h2h_meetings: u32,
    /// 1 = home win, 0 = away win; `None` for draws and unplayed fixtures.
    pub target: Option<u8>,
    pub features: FeatureVector,
}

impl MatchFeatures {
    pub fn is_predictable(&self, min_history: usize) -> bool {
        self.home_history >= min_history && self.away_history >= min_history
    }

    pub fn imputed_count(&self) -> usize {
        self.features.imputed().count()
    }
}

pub struct FeaturePipeline<'a, S: ?Sized> {
    store: &'a S,
    config: PipelineConfig,
    catalog: FeatureCatalog,
}

impl<'a, S: MatchStore + ?Sized> FeaturePipeline<'a, S> {
    pub fn new(store: &'a S, config: PipelineConfig) -> Self {
        let catalog = FeatureCatalog::new(&config.windows);
        Self {
            store,
            config,
            catalog,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn catalog(&self) -> &FeatureCatalog {
        &self.catalog
    }

    /// Features for `fixture_id` as of its kickoff. Every calculator reads strictly before the
    /// cutoff; standings snapshots at or before it.
    pub fn compute(&self, fixture_id: u32) -> Result<MatchFeatures> {
        let fixture = self.load(fixture_id)?;
        self.compute_for_fixture(&fixture, fixture.date)
    }

    /// Features for `fixture_id` with every calculator reading strictly before `cutoff`.
    pub fn compute_with_cutoff(
        &self,
        fixture_id: u32,
        cutoff: NaiveDateTime,
    ) -> Result<MatchFeatures> {
        let fixture = self.load(fixture_id)?;
        self.compute_for_fixture(&fixture, cutoff)
    }

    fn load(&self, fixture_id: u32) -> Result<Fixture> {
        self.store
            .fixture(fixture_id)?
            .ok_or(PredictorError::FixtureNotFound(fixture_id))
    }

    pub fn compute_for_fixture(
        &self,
        fixture: &Fixture,
        cutoff: NaiveDateTime,
    ) -> Result<MatchFeatures> {
        let (home, away) = fixture.teams()?;
        let windows = self.catalog.windows();

        let form = FormCalculator::new(self.store);
        let home_form = form.team_form(home, cutoff, windows, Venue::Any)?;
        let away_form = form.team_form(away, cutoff, windows, Venue::Any)?;
        let home_venue = form.team_form(home, cutoff, &[VENUE_WINDOW], Venue::HomeOnly)?;
        let away_venue = form.team_form(away, cutoff, &[VENUE_WINDOW], Venue::AwayOnly)?;

        let standings = StandingsCalculator::with_source(self.store, self.config.standings_source)
            .compare(home, away, fixture.league_id, fixture.season, cutoff)?;
        let h2h = HeadToHeadCalculator::new(self.store).summary(
            home,
            away,
            cutoff,
            self.config.h2h_lookback,
            self.config.h2h_recent,
        )?;

        let mut features = FeatureVector::new();
        features.extend(home_form.features(Side::Home));
        features.extend(away_form.features(Side::Away));
        features.extend(home_venue.venue_features(Side::Home));
        features.extend(away_venue.venue_features(Side::Away));
        if let Some(standings) = &standings {
            features.extend(standings.features());
            // Same quantity as diff_position, under the older column name.
            features.insert(
                Feature::Derived(DerivedStat::PositionAdvantage),
                standings.diff(DiffStat::Position),
            );
        }
        features.extend(h2h.features());
        features.extend(derived_features(&home_form, &away_form));

        let min_history = self.config.min_history;
        features.extend([
            (
                Feature::Flag(Flag::FormInsufficient(Side::Home)),
                flag(home_form.history_len < min_history),
            ),
            (
                Feature::Flag(Flag::FormInsufficient(Side::Away)),
                flag(away_form.history_len < min_history),
            ),
            (Feature::Flag(Flag::StandingsMissing), flag(standings.is_none())),
            (Feature::Flag(Flag::H2hNoHistory), flag(!h2h.has_history())),
        ]);

        let dropped = features.restrict_to(&self.catalog);
        if !dropped.is_empty() {
            warn!(
                fixture_id = fixture.id,
                dropped = dropped.len(),
                "dropped features outside the catalog"
            );
        }
        let imputed = features.impute(&self.catalog);
        debug!(
            fixture_id = fixture.id,
            home,
            away,
            features = features.len(),
            imputed,
            "features computed"
        );

        Ok(MatchFeatures {
            fixture_id: fixture.id,
            league_id: fixture.league_id,
            season: fixture.season,
            date: fixture.date,
            cutoff,
            home_team_id: home,
            away_team_id: away,
            home_history: home_form.history_len,
            away_history: away_form.history_len,
            standings_found: standings.is_some(),
            h2h_meetings: h2h.total_matches,
            target: fixture.target(),
            features,
        })
    }
}

impl<'a, S: MatchStore + Sync + ?Sized> FeaturePipeline<'a, S> {
    /// Computes fixtures in parallel, in input order. Fixture-scoped failures are logged and
    /// skipped; store failures abort.
    pub fn compute_many(&self, fixture_ids: &[u32]) -> Result<Vec<MatchFeatures>> {
        let results: Vec<Result<MatchFeatures>> =
            fixture_ids.par_iter().map(|id| self.compute(*id)).collect();
        collect_skipping(results)
    }

    pub fn training_dataset(&self, filter: &DatasetFilter) -> Result<Vec<MatchFeatures>> {
        let fixtures = self.store.finished_fixtures(filter)?;
        let results: Vec<Result<MatchFeatures>> = fixtures
            .par_iter()
            .map(|f| self.compute_for_fixture(f, f.date))
            .collect();
        let rows = collect_skipping(results)?;
        info!(
            candidates = fixtures.len(),
            rows = rows.len(),
            include_draws = filter.include_draws,
            "training dataset built"
        );
        Ok(rows)
    }
}

fn collect_skipping(results: Vec<Result<MatchFeatures>>) -> Result<Vec<MatchFeatures>> {
    let mut out = Vec::with_capacity(results.len());
    for result in results {
        match result {
            Ok(row) => out.push(row),
            Err(err) if err.is_fixture_scoped() => {
                warn!(error = %err, "skipping fixture");
            }
            Err(err) => return Err(err),
        }
    }
    Ok(out)
}

fn flag(on: bool) -> f64 {
    if on { 1.0 } else { 0.0 }
}

fn momentum(report: &FormReport) -> Option<f64> {
    let short = report.window(5)?.points;
    let long = report.window(10)?.points;
    if long == 0 {
        return Some(1.0);
    }
    Some(f64::from(short) / (f64::from(long) / 2.0))
}

fn derived_features(home: &FormReport, away: &FormReport) -> Vec<(Feature, f64)> {
    let mut out = Vec::new();
    if let (Some(h5), Some(a5)) = (home.window(5), away.window(5)) {
        let h = |stat: FormStat| h5.value(stat);
        let a = |stat: FormStat| a5.value(stat);
        out.push((
            Feature::Derived(DerivedStat::DiffFormPoints5),
            h(FormStat::PointsLast) - a(FormStat::PointsLast),
        ));
        out.push((
            Feature::Derived(DerivedStat::DiffAttackStrength),
            h(FormStat::GoalsForAvg) - a(FormStat::GoalsForAvg),
        ));
        out.push((
            Feature::Derived(DerivedStat::DiffDefenseStrength),
            a(FormStat::GoalsAgainstAvg) - h(FormStat::GoalsAgainstAvg),
        ));
        out.push((
            Feature::Derived(DerivedStat::HomeAttackVsAwayDefense),
            h(FormStat::GoalsForAvg) - a(FormStat::GoalsAgainstAvg),
        ));
        out.push((
            Feature::Derived(DerivedStat::AwayAttackVsHomeDefense),
            a(FormStat::GoalsForAvg) - h(FormStat::GoalsAgainstAvg),
        ));
    }
    if let Some(m) = momentum(home) {
        out.push((Feature::Derived(DerivedStat::HomeMomentum), m));
    }
    if let Some(m) = momentum(away) {
        out.push((Feature::Derived(DerivedStat::AwayMomentum), m));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::summarize;
    use chrono::NaiveDate;

    fn day(d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, d)
            .unwrap()
            .and_hms_opt(15, 0, 0)
            .unwrap()
    }

    #[test]
    fn momentum_is_neutral_without_long_window_points() {
        let report = summarize(1, &[], &[5, 10]);
        assert_eq!(momentum(&report), Some(1.0));
        let report = summarize(1, &[], &[5]);
        assert_eq!(momentum(&report), None);
    }

    #[test]
    fn momentum_compares_short_form_to_half_the_long_window() {
        let history: Vec<Fixture> = (1..=4)
            .rev()
            .map(|d| Fixture::new(d, 39, 2023, day(d), 1, 2).finished(1, 0))
            .collect();
        let report = summarize(1, &history, &[5, 10]);
        // 12 points in both windows: 12 / (12 / 2).
        assert_eq!(momentum(&report), Some(2.0));
    }
}
