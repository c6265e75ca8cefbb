use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::debug;

use crate::error::Result;
use crate::features::{Feature, FormStat, Side, StreakStat, VENUE_WINDOW, VenueStat};
use crate::fixtures::{Fixture, TeamResult};
use crate::store::{MatchStore, Venue};

/// Results folded into the streak code and the sequence string.
pub const SEQUENCE_LEN: usize = 5;

/// Totals over the most recent `window` matches (or fewer, see `matches_used`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct WindowStats {
    pub window: usize,
    pub matches_used: usize,
    pub points: u32,
    pub wins: u32,
    pub draws: u32,
    pub losses: u32,
    pub goals_for: u32,
    pub goals_against: u32,
    pub clean_sheets: u32,
    pub failed_to_score: u32,
}

impl WindowStats {
    fn per_match(&self, total: u32) -> f64 {
        if self.matches_used == 0 {
            0.0
        } else {
            f64::from(total) / self.matches_used as f64
        }
    }

    pub fn points_avg(&self) -> f64 {
        self.per_match(self.points)
    }

    pub fn goals_for_avg(&self) -> f64 {
        self.per_match(self.goals_for)
    }

    pub fn goals_against_avg(&self) -> f64 {
        self.per_match(self.goals_against)
    }

    pub fn win_rate(&self) -> f64 {
        self.per_match(self.wins)
    }

    pub fn goal_diff(&self) -> i64 {
        i64::from(self.goals_for) - i64::from(self.goals_against)
    }

    pub fn value(&self, stat: FormStat) -> f64 {
        match stat {
            FormStat::PointsLast => f64::from(self.points),
            FormStat::PointsAvg => self.points_avg(),
            FormStat::GoalsForLast => f64::from(self.goals_for),
            FormStat::GoalsAgainstLast => f64::from(self.goals_against),
            FormStat::GoalsForAvg => self.goals_for_avg(),
            FormStat::GoalsAgainstAvg => self.goals_against_avg(),
            FormStat::GoalDiff => self.goal_diff() as f64,
            FormStat::WinsLast => f64::from(self.wins),
            FormStat::DrawsLast => f64::from(self.draws),
            FormStat::LossesLast => f64::from(self.losses),
            FormStat::WinRate => self.win_rate(),
            FormStat::CleanSheets => f64::from(self.clean_sheets),
            FormStat::FailedToScore => f64::from(self.failed_to_score),
            FormStat::MatchesUsed => self.matches_used as f64,
        }
    }
}

/// Current runs, counted from the most recent match backwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Streaks {
    pub win_streak: u32,
    pub unbeaten_streak: u32,
    pub winless_streak: u32,
    /// Up to five letters, most recent first ("LWW").
    pub sequence: String,
    /// `sequence` as base-4 digits, W=3 D=2 L=1, padded with 0.
    pub code: u32,
}

impl Streaks {
    pub fn value(&self, stat: StreakStat) -> f64 {
        match stat {
            StreakStat::WinStreak => f64::from(self.win_streak),
            StreakStat::UnbeatenStreak => f64::from(self.unbeaten_streak),
            StreakStat::WinlessStreak => f64::from(self.winless_streak),
            StreakStat::RecentResultsCode => f64::from(self.code),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormReport {
    pub team_id: u32,
    /// Matches seen in the largest window.
    pub history_len: usize,
    pub windows: Vec<WindowStats>,
    pub streaks: Streaks,
}

impl FormReport {
    pub fn window(&self, window: usize) -> Option<&WindowStats> {
        self.windows.iter().find(|w| w.window == window)
    }

    pub fn features(&self, side: Side) -> Vec<(Feature, f64)> {
        let mut out = Vec::with_capacity(self.windows.len() * FormStat::ALL.len() + 4);
        for w in &self.windows {
            for stat in FormStat::ALL {
                out.push((
                    Feature::Form {
                        side,
                        stat,
                        window: w.window,
                    },
                    w.value(stat),
                ));
            }
        }
        for stat in StreakStat::ALL {
            out.push((Feature::Streak { side, stat }, self.streaks.value(stat)));
        }
        out
    }

    /// Venue block, read from the `VENUE_WINDOW` stats of a home-only or away-only report.
    pub fn venue_features(&self, side: Side) -> Vec<(Feature, f64)> {
        let stats = self.window(VENUE_WINDOW).copied().unwrap_or(WindowStats {
            window: VENUE_WINDOW,
            ..WindowStats::default()
        });
        VenueStat::ALL
            .into_iter()
            .map(|stat| {
                let value = match stat {
                    VenueStat::Points => f64::from(stats.points),
                    VenueStat::GoalsAvg => stats.goals_for_avg(),
                    VenueStat::Matches => stats.matches_used as f64,
                };
                (Feature::Venue { side, stat }, value)
            })
            .collect()
    }
}

/// Folds `history` (most recent first) into per-window stats and streaks.
pub fn summarize(team_id: u32, history: &[Fixture], windows: &[usize]) -> FormReport {
    let results: Vec<(TeamResult, u8, u8)> = history
        .iter()
        .filter_map(|f| {
            let result = f.result_for(team_id)?;
            let (gf, ga) = f.goals_for_team(team_id)?;
            Some((result, gf, ga))
        })
        .collect();

    let mut stats = Vec::with_capacity(windows.len());
    for &window in windows {
        let mut w = WindowStats {
            window,
            ..WindowStats::default()
        };
        for &(result, gf, ga) in results.iter().take(window) {
            w.matches_used += 1;
            w.points += result.points();
            match result {
                TeamResult::Win => w.wins += 1,
                TeamResult::Draw => w.draws += 1,
                TeamResult::Loss => w.losses += 1,
            }
            w.goals_for += u32::from(gf);
            w.goals_against += u32::from(ga);
            if ga == 0 {
                w.clean_sheets += 1;
            }
            if gf == 0 {
                w.failed_to_score += 1;
            }
        }
        stats.push(w);
    }

    let largest = windows.iter().copied().max().unwrap_or(0);
    let considered: Vec<TeamResult> = results.iter().take(largest).map(|r| r.0).collect();

    FormReport {
        team_id,
        history_len: considered.len(),
        windows: stats,
        streaks: streaks(&considered),
    }
}

fn streaks(results: &[TeamResult]) -> Streaks {
    let run = |pred: fn(TeamResult) -> bool| results.iter().take_while(|r| pred(**r)).count() as u32;

    let recent: Vec<TeamResult> = results.iter().take(SEQUENCE_LEN).copied().collect();
    let sequence = recent.iter().map(|r| r.letter()).collect::<String>();
    let mut code = 0u32;
    for i in 0..SEQUENCE_LEN {
        let digit = match recent.get(i) {
            Some(TeamResult::Win) => 3,
            Some(TeamResult::Draw) => 2,
            Some(TeamResult::Loss) => 1,
            None => 0,
        };
        code = code * 4 + digit;
    }

    Streaks {
        win_streak: run(|r| r == TeamResult::Win),
        unbeaten_streak: run(|r| r != TeamResult::Loss),
        winless_streak: run(|r| r != TeamResult::Win),
        sequence,
        code,
    }
}

pub struct FormCalculator<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S: MatchStore + ?Sized> FormCalculator<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Form of `team_id` from finished fixtures strictly before `cutoff`.
    pub fn team_form(
        &self,
        team_id: u32,
        cutoff: NaiveDateTime,
        windows: &[usize],
        venue: Venue,
    ) -> Result<FormReport> {
        let largest = windows.iter().copied().max().unwrap_or(0);
        let history = if largest == 0 {
            Vec::new()
        } else {
            self.store
                .team_fixtures_before(team_id, cutoff, venue, Some(largest))?
        };
        let report = summarize(team_id, &history, windows);
        debug!(
            team_id,
            ?venue,
            matches = report.history_len,
            sequence = %report.streaks.sequence,
            "form computed"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn day(d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 2, d)
            .unwrap()
            .and_hms_opt(15, 0, 0)
            .unwrap()
    }

    #[test]
    fn empty_history_is_neutral() {
        let report = summarize(10, &[], &[3, 5]);
        assert_eq!(report.history_len, 0);
        assert_eq!(report.window(5).unwrap().matches_used, 0);
        assert_eq!(report.window(5).unwrap().points_avg(), 0.0);
        assert_eq!(report.streaks, Streaks::default());
    }

    #[test]
    fn code_pads_absent_results() {
        let history = vec![
            Fixture::new(2, 39, 2023, day(9), 10, 20).finished(0, 2),
            Fixture::new(1, 39, 2023, day(2), 30, 10).finished(1, 3),
        ];
        let report = summarize(10, &history, &[5]);
        assert_eq!(report.streaks.sequence, "LW");
        assert_eq!(report.streaks.code, 256 + 3 * 64);
        assert_eq!(report.streaks.winless_streak, 1);
    }

    #[test]
    fn draws_extend_unbeaten_but_not_win_streak() {
        let history = vec![
            Fixture::new(3, 39, 2023, day(16), 10, 20).finished(1, 1),
            Fixture::new(2, 39, 2023, day(9), 10, 30).finished(2, 0),
            Fixture::new(1, 39, 2023, day(2), 40, 10).finished(1, 0),
        ];
        let s = summarize(10, &history, &[3]).streaks;
        assert_eq!(s.win_streak, 0);
        assert_eq!(s.unbeaten_streak, 2);
        assert_eq!(s.winless_streak, 1);
        assert_eq!(s.sequence, "DWL");
    }
}
