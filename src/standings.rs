use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::debug;

use crate::error::Result;
use crate::features::{DiffStat, Feature, Side, StandingStat};
use crate::fixtures::{SplitRecord, StandingEntry, StandingSource};
use crate::store::MatchStore;

fn per_game(total: f64, played: u32) -> f64 {
    if played == 0 {
        0.0
    } else {
        total / f64::from(played)
    }
}

fn split_ppg(split: &SplitRecord) -> f64 {
    per_game(f64::from(split.points()), split.played)
}

/// Value of one per-team standings stat. Per-game ratios are 0 when nothing has been played.
pub fn stat_value(entry: &StandingEntry, stat: StandingStat) -> f64 {
    let all = &entry.all;
    match stat {
        StandingStat::Position => f64::from(entry.rank),
        StandingStat::Points => f64::from(entry.points),
        StandingStat::GoalDiff => f64::from(entry.goals_diff),
        StandingStat::Ppg => per_game(f64::from(entry.points), all.played),
        StandingStat::Played => f64::from(all.played),
        StandingStat::Wins => f64::from(all.win),
        StandingStat::Draws => f64::from(all.draw),
        StandingStat::Losses => f64::from(all.lose),
        StandingStat::GoalsFor => f64::from(all.goals_for),
        StandingStat::GoalsAgainst => f64::from(all.goals_against),
        StandingStat::WinRatio => per_game(f64::from(all.win), all.played),
        StandingStat::GoalsPerGame => per_game(f64::from(all.goals_for), all.played),
        StandingStat::ConcededPerGame => per_game(f64::from(all.goals_against), all.played),
        StandingStat::HomeWins => f64::from(entry.home.win),
        StandingStat::HomePpg => split_ppg(&entry.home),
        StandingStat::HomeGoalsPerGame => {
            per_game(f64::from(entry.home.goals_for), entry.home.played)
        }
        StandingStat::AwayWins => f64::from(entry.away.win),
        StandingStat::AwayPpg => split_ppg(&entry.away),
        StandingStat::AwayGoalsPerGame => {
            per_game(f64::from(entry.away.goals_for), entry.away.played)
        }
    }
}

/// Both teams' snapshots. Only built when both exist.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StandingsComparison {
    pub home: StandingEntry,
    pub away: StandingEntry,
}

impl StandingsComparison {
    /// Positive favours the home side. A better (lower) home rank gives a positive position diff.
    pub fn diff(&self, stat: DiffStat) -> f64 {
        let (h, a) = (&self.home, &self.away);
        match stat {
            DiffStat::Position => f64::from(a.rank) - f64::from(h.rank),
            DiffStat::Points => f64::from(h.points) - f64::from(a.points),
            DiffStat::GoalDiff => f64::from(h.goals_diff) - f64::from(a.goals_diff),
            DiffStat::Ppg => stat_value(h, StandingStat::Ppg) - stat_value(a, StandingStat::Ppg),
            DiffStat::WinRatio => {
                stat_value(h, StandingStat::WinRatio) - stat_value(a, StandingStat::WinRatio)
            }
        }
    }

    pub fn swapped(&self) -> Self {
        Self {
            home: self.away.clone(),
            away: self.home.clone(),
        }
    }

    pub fn features(&self) -> Vec<(Feature, f64)> {
        let mut out = Vec::with_capacity(StandingStat::ALL.len() * 2 + DiffStat::ALL.len());
        for side in Side::BOTH {
            let entry = match side {
                Side::Home => &self.home,
                Side::Away => &self.away,
            };
            for stat in StandingStat::ALL {
                out.push((Feature::Standing { side, stat }, stat_value(entry, stat)));
            }
        }
        for stat in DiffStat::ALL {
            out.push((Feature::StandingDiff(stat), self.diff(stat)));
        }
        out
    }
}

pub struct StandingsCalculator<'a, S: ?Sized> {
    store: &'a S,
    source: StandingSource,
}

impl<'a, S: MatchStore + ?Sized> StandingsCalculator<'a, S> {
    /// Reads derived snapshots only.
    pub fn new(store: &'a S) -> Self {
        Self::with_source(store, StandingSource::Derived)
    }

    pub fn with_source(store: &'a S, source: StandingSource) -> Self {
        Self { store, source }
    }

    /// `None` when either team has no snapshot for the league season at or before `cutoff`.
    pub fn compare(
        &self,
        home_team_id: u32,
        away_team_id: u32,
        league_id: u32,
        season: i32,
        cutoff: NaiveDateTime,
    ) -> Result<Option<StandingsComparison>> {
        let home = self
            .store
            .standing_as_of(league_id, season, home_team_id, cutoff, self.source)?;
        let away = self
            .store
            .standing_as_of(league_id, season, away_team_id, cutoff, self.source)?;
        let out = match (home, away) {
            (Some(home), Some(away)) => Some(StandingsComparison { home, away }),
            (home, away) => {
                debug!(
                    league_id,
                    season,
                    home_found = home.is_some(),
                    away_found = away.is_some(),
                    "standings snapshot missing"
                );
                None
            }
        };
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn entry(team_id: u32, rank: u32, played: u32, win: u32, points: i32) -> StandingEntry {
        StandingEntry {
            league_id: 39,
            season: 2023,
            team_id,
            rank,
            points,
            goals_diff: 0,
            all: SplitRecord {
                played,
                win,
                ..SplitRecord::default()
            },
            home: SplitRecord::default(),
            away: SplitRecord::default(),
            form: None,
            as_of: NaiveDate::from_ymd_opt(2024, 1, 1)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap(),
            source: StandingSource::Derived,
        }
    }

    #[test]
    fn zero_played_ratios_are_zero() {
        let e = entry(1, 1, 0, 0, 0);
        assert_eq!(stat_value(&e, StandingStat::Ppg), 0.0);
        assert_eq!(stat_value(&e, StandingStat::WinRatio), 0.0);
        assert_eq!(stat_value(&e, StandingStat::HomePpg), 0.0);
    }

    #[test]
    fn higher_placed_home_gives_positive_position_diff() {
        let cmp = StandingsComparison {
            home: entry(1, 2, 10, 7, 22),
            away: entry(2, 9, 10, 3, 12),
        };
        assert_eq!(cmp.diff(DiffStat::Position), 7.0);
        assert_eq!(cmp.diff(DiffStat::Points), 10.0);
        assert!((cmp.diff(DiffStat::WinRatio) - 0.4).abs() < 1e-12);
    }
}
