use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDateTime;

use crate::fixtures::{Fixture, SplitRecord, StandingEntry, StandingSource};

/// Letters kept in the snapshot's `form` string, most recent first.
const FORM_LEN: usize = 5;

#[derive(Default)]
struct Row {
    all: SplitRecord,
    home: SplitRecord,
    away: SplitRecord,
    // (kickoff, fixture id, letter) so the form string can be sorted.
    results: Vec<(NaiveDateTime, u32, char)>,
}

impl Row {
    fn points(&self) -> i32 {
        self.all.points() as i32
    }

    fn goal_diff(&self) -> i32 {
        self.all.goals_for as i32 - self.all.goals_against as i32
    }
}

// Points, goal difference, goals scored, away goals scored, then team id.
fn rank_order(a: (&u32, &Row), b: (&u32, &Row)) -> Ordering {
    let (id_a, ra) = a;
    let (id_b, rb) = b;
    rb.points()
        .cmp(&ra.points())
        .then(rb.goal_diff().cmp(&ra.goal_diff()))
        .then(rb.all.goals_for.cmp(&ra.all.goals_for))
        .then(rb.away.goals_for.cmp(&ra.away.goals_for))
        .then(id_a.cmp(id_b))
}

/// Table for one league season from finished fixtures dated strictly before `as_of`.
pub fn build_table(
    fixtures: &[Fixture],
    league_id: u32,
    season: i32,
    as_of: NaiveDateTime,
) -> Vec<StandingEntry> {
    let mut rows: HashMap<u32, Row> = HashMap::new();
    for f in fixtures
        .iter()
        .filter(|f| f.league_id == league_id && f.season == season)
    {
        for team in [f.home_team_id, f.away_team_id] {
            if team != 0 {
                rows.entry(team).or_default();
            }
        }
        if !f.is_finished() || f.date >= as_of || f.teams().is_err() {
            continue;
        }
        for team in [f.home_team_id, f.away_team_id] {
            let (Some(result), Some((gf, ga))) = (f.result_for(team), f.goals_for_team(team))
            else {
                continue;
            };
            let row = rows.entry(team).or_default();
            row.all.record(result, gf, ga);
            if team == f.home_team_id {
                row.home.record(result, gf, ga);
            } else {
                row.away.record(result, gf, ga);
            }
            row.results.push((f.date, f.id, result.letter()));
        }
    }

    let mut ordered: Vec<(&u32, &Row)> = rows.iter().collect();
    ordered.sort_by(|a, b| rank_order(*a, *b));

    ordered
        .into_iter()
        .enumerate()
        .map(|(i, (team_id, row))| {
            let mut results = row.results.clone();
            results.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.cmp(&a.1)));
            let form: String = results.iter().take(FORM_LEN).map(|r| r.2).collect();
            StandingEntry {
                league_id,
                season,
                team_id: *team_id,
                rank: (i + 1) as u32,
                points: row.points(),
                goals_diff: row.goal_diff(),
                all: row.all,
                home: row.home,
                away: row.away,
                form: (!form.is_empty()).then_some(form),
                as_of,
                source: StandingSource::Derived,
            }
        })
        .collect()
}

/// One snapshot per distinct match day, taken at midnight. Days before the first result are skipped.
pub fn matchday_snapshots(
    fixtures: &[Fixture],
    league_id: u32,
    season: i32,
) -> Vec<StandingEntry> {
    let season_fixtures: Vec<&Fixture> = fixtures
        .iter()
        .filter(|f| f.league_id == league_id && f.season == season)
        .collect();
    let days: BTreeSet<NaiveDateTime> = season_fixtures
        .iter()
        .filter_map(|f| f.date.date().and_hms_opt(0, 0, 0))
        .collect();

    let mut out = Vec::new();
    for as_of in days {
        let any_result = season_fixtures
            .iter()
            .any(|f| f.is_finished() && f.date < as_of);
        if !any_result {
            continue;
        }
        out.extend(build_table(fixtures, league_id, season, as_of));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn day(d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 8, d)
            .unwrap()
            .and_hms_opt(15, 0, 0)
            .unwrap()
    }

    #[test]
    fn ties_fall_through_to_away_goals_then_id() {
        // 1 and 2 both win 2-1 (1 at home, 2 away). Equal points, GD and GF.
        let fixtures = vec![
            Fixture::new(1, 39, 2024, day(10), 1, 3).finished(2, 1),
            Fixture::new(2, 39, 2024, day(10), 4, 2).finished(1, 2),
        ];
        let table = build_table(&fixtures, 39, 2024, day(11));
        let order: Vec<u32> = table.iter().map(|e| e.team_id).collect();
        assert_eq!(order, vec![2, 1, 3, 4]);
        assert_eq!(table[0].rank, 1);
        assert_eq!(table[3].rank, 4);
        assert_eq!(table[0].away.win, 1);
        assert_eq!(table[0].form.as_deref(), Some("W"));
    }

    #[test]
    fn snapshots_exclude_same_day_results() {
        let fixtures = vec![
            Fixture::new(1, 39, 2024, day(10), 1, 2).finished(1, 0),
            Fixture::new(2, 39, 2024, day(17), 2, 1).finished(3, 0),
        ];
        let snaps = matchday_snapshots(&fixtures, 39, 2024);
        // Only the 17th has a result before it.
        assert_eq!(snaps.len(), 2);
        assert!(snaps.iter().all(|s| s.all.played == 1));
    }
}
