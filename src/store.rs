use chrono::{NaiveDate, NaiveDateTime};

use crate::error::Result;
use crate::fixtures::{Fixture, StandingEntry, StandingSource};

/// Which of a team's fixtures count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Venue {
    Any,
    HomeOnly,
    AwayOnly,
}

impl Venue {
    pub fn admits(self, fixture: &Fixture, team_id: u32) -> bool {
        match self {
            Venue::Any => fixture.involves(team_id),
            Venue::HomeOnly => fixture.home_team_id == team_id,
            Venue::AwayOnly => fixture.away_team_id == team_id,
        }
    }
}

/// Which finished fixtures feed a training dataset.
#[derive(Debug, Clone, Default)]
pub struct DatasetFilter {
    pub league_ids: Vec<u32>,
    pub season: Option<i32>,
    pub include_draws: bool,
}

impl DatasetFilter {
    pub fn admits(&self, fixture: &Fixture) -> bool {
        if !fixture.is_finished() {
            return false;
        }
        if !self.league_ids.is_empty() && !self.league_ids.contains(&fixture.league_id) {
            return false;
        }
        if self.season.is_some_and(|s| s != fixture.season) {
            return false;
        }
        self.include_draws || fixture.target().is_some()
    }
}

/// Read contract the calculators depend on. Everything returned is a detached value.
pub trait MatchStore {
    fn fixture(&self, fixture_id: u32) -> Result<Option<Fixture>>;

    /// Finished fixtures of `team_id` dated strictly before `before`, most recent first.
    fn team_fixtures_before(
        &self,
        team_id: u32,
        before: NaiveDateTime,
        venue: Venue,
        limit: Option<usize>,
    ) -> Result<Vec<Fixture>>;

    /// Latest `source` snapshot for (league, season, team) taken at or before `as_of`.
    fn standing_as_of(
        &self,
        league_id: u32,
        season: i32,
        team_id: u32,
        as_of: NaiveDateTime,
        source: StandingSource,
    ) -> Result<Option<StandingEntry>>;

    /// Finished meetings between the unordered pair, dated strictly before `before`, most
    /// recent first.
    fn head_to_head_before(
        &self,
        team_a: u32,
        team_b: u32,
        before: NaiveDateTime,
        limit: Option<usize>,
    ) -> Result<Vec<Fixture>>;

    /// Every fixture scheduled on `day`, in kickoff order.
    fn fixtures_on(&self, day: NaiveDate) -> Result<Vec<Fixture>>;

    /// Finished fixtures admitted by `filter`, oldest first.
    fn finished_fixtures(&self, filter: &DatasetFilter) -> Result<Vec<Fixture>>;
}

#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    fixtures: Vec<Fixture>,
    standings: Vec<StandingEntry>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert_fixture(&mut self, fixture: Fixture) {
        if let Some(existing) = self.fixtures.iter_mut().find(|f| f.id == fixture.id) {
            *existing = fixture;
        } else {
            self.fixtures.push(fixture);
        }
    }

    /// Inserts or replaces by (league, season, team, as_of, source).
    pub fn upsert_standing(&mut self, entry: StandingEntry) {
        if let Some(existing) = self.standings.iter_mut().find(|s| {
            s.league_id == entry.league_id
                && s.season == entry.season
                && s.team_id == entry.team_id
                && s.as_of == entry.as_of
                && s.source == entry.source
        }) {
            *existing = entry;
        } else {
            self.standings.push(entry);
        }
    }

    pub fn fixtures(&self) -> &[Fixture] {
        &self.fixtures
    }

    fn recent_first(mut rows: Vec<Fixture>, limit: Option<usize>) -> Vec<Fixture> {
        rows.sort_by(|a, b| b.date.cmp(&a.date).then(b.id.cmp(&a.id)));
        if let Some(limit) = limit {
            rows.truncate(limit);
        }
        rows
    }
}

impl MatchStore for MemoryStore {
    fn fixture(&self, fixture_id: u32) -> Result<Option<Fixture>> {
        Ok(self.fixtures.iter().find(|f| f.id == fixture_id).cloned())
    }

    fn team_fixtures_before(
        &self,
        team_id: u32,
        before: NaiveDateTime,
        venue: Venue,
        limit: Option<usize>,
    ) -> Result<Vec<Fixture>> {
        let rows = self
            .fixtures
            .iter()
            .filter(|f| f.is_finished() && f.date < before && venue.admits(f, team_id))
            .cloned()
            .collect();
        Ok(Self::recent_first(rows, limit))
    }

    fn standing_as_of(
        &self,
        league_id: u32,
        season: i32,
        team_id: u32,
        as_of: NaiveDateTime,
        source: StandingSource,
    ) -> Result<Option<StandingEntry>> {
        Ok(self
            .standings
            .iter()
            .filter(|s| {
                s.league_id == league_id
                    && s.season == season
                    && s.team_id == team_id
                    && s.source == source
                    && s.as_of <= as_of
            })
            .max_by_key(|s| s.as_of)
            .cloned())
    }

    fn head_to_head_before(
        &self,
        team_a: u32,
        team_b: u32,
        before: NaiveDateTime,
        limit: Option<usize>,
    ) -> Result<Vec<Fixture>> {
        let rows = self
            .fixtures
            .iter()
            .filter(|f| {
                f.is_finished()
                    && f.date < before
                    && ((f.home_team_id == team_a && f.away_team_id == team_b)
                        || (f.home_team_id == team_b && f.away_team_id == team_a))
            })
            .cloned()
            .collect();
        Ok(Self::recent_first(rows, limit))
    }

    fn fixtures_on(&self, day: NaiveDate) -> Result<Vec<Fixture>> {
        let mut rows: Vec<Fixture> = self
            .fixtures
            .iter()
            .filter(|f| f.date.date() == day)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.date.cmp(&b.date).then(a.id.cmp(&b.id)));
        Ok(rows)
    }

    fn finished_fixtures(&self, filter: &DatasetFilter) -> Result<Vec<Fixture>> {
        let mut rows: Vec<Fixture> = self
            .fixtures
            .iter()
            .filter(|f| filter.admits(f))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.date.cmp(&b.date).then(a.id.cmp(&b.id)));
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn day(d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, d)
            .unwrap()
            .and_hms_opt(15, 0, 0)
            .unwrap()
    }

    #[test]
    fn team_fixtures_are_strictly_before_and_recent_first() {
        let mut store = MemoryStore::new();
        store.upsert_fixture(Fixture::new(1, 39, 2023, day(1), 10, 20).finished(1, 0));
        store.upsert_fixture(Fixture::new(2, 39, 2023, day(8), 30, 10).finished(2, 2));
        store.upsert_fixture(Fixture::new(3, 39, 2023, day(15), 10, 40).finished(0, 1));
        store.upsert_fixture(Fixture::new(4, 39, 2023, day(22), 10, 50));

        let rows = store
            .team_fixtures_before(10, day(15), Venue::Any, None)
            .unwrap();
        let ids: Vec<u32> = rows.iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![2, 1]);

        let rows = store
            .team_fixtures_before(10, day(30), Venue::HomeOnly, Some(1))
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].id, 3);
    }

    #[test]
    fn dataset_filter_excludes_draws_by_default() {
        let filter = DatasetFilter::default();
        assert!(!filter.admits(&Fixture::new(1, 39, 2023, day(1), 10, 20).finished(1, 1)));
        assert!(filter.admits(&Fixture::new(2, 39, 2023, day(1), 10, 20).finished(2, 1)));
        let filter = DatasetFilter {
            league_ids: vec![140],
            ..DatasetFilter::default()
        };
        assert!(!filter.admits(&Fixture::new(3, 39, 2023, day(1), 10, 20).finished(2, 1)));
    }
}
