use chrono::NaiveDateTime;
use serde::Serialize;
use tracing::debug;

use crate::error::Result;
use crate::features::{Feature, H2hStat};
use crate::fixtures::{Fixture, TeamResult};
use crate::store::MatchStore;

/// Meetings folded into the recency-weighted block.
pub const DEFAULT_RECENT_MEETINGS: usize = 5;
/// Per-meeting decay of the recency weights, latest meeting weighted 1.
pub const RECENT_DECAY: f64 = 0.85;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HeadToHeadSummary {
    pub home_team_id: u32,
    pub away_team_id: u32,
    pub total_matches: u32,
    pub home_wins: u32,
    pub away_wins: u32,
    pub draws: u32,
    pub home_goals: u32,
    pub away_goals: u32,
    pub recent_considered: u32,
    pub recent_home_wins: u32,
    pub recent_weighted_form: f64,
    pub last_meeting_id: Option<u32>,
    pub last_meeting_date: Option<NaiveDateTime>,
}

impl HeadToHeadSummary {
    pub fn has_history(&self) -> bool {
        self.total_matches > 0
    }

    fn rate(&self, count: u32) -> f64 {
        if self.total_matches == 0 {
            0.0
        } else {
            f64::from(count) / f64::from(self.total_matches)
        }
    }

    /// (home wins - away wins) / total, in [-1, 1]; 0 without history.
    pub fn dominance(&self) -> f64 {
        if self.total_matches == 0 {
            return 0.0;
        }
        let raw = (f64::from(self.home_wins) - f64::from(self.away_wins))
            / f64::from(self.total_matches);
        raw.clamp(-1.0, 1.0)
    }

    pub fn value(&self, stat: H2hStat) -> f64 {
        match stat {
            H2hStat::TotalMatches => f64::from(self.total_matches),
            H2hStat::HomeWins => f64::from(self.home_wins),
            H2hStat::AwayWins => f64::from(self.away_wins),
            H2hStat::Draws => f64::from(self.draws),
            H2hStat::HomeWinRate => self.rate(self.home_wins),
            H2hStat::AwayWinRate => self.rate(self.away_wins),
            H2hStat::DrawRate => self.rate(self.draws),
            H2hStat::HomeGoalsAvg => self.rate(self.home_goals),
            H2hStat::AwayGoalsAvg => self.rate(self.away_goals),
            H2hStat::TotalGoalsAvg => self.rate(self.home_goals + self.away_goals),
            H2hStat::Dominance => self.dominance(),
            H2hStat::RecentHomeWins => f64::from(self.recent_home_wins),
            H2hStat::RecentHomeRate => {
                if self.recent_considered == 0 {
                    0.0
                } else {
                    f64::from(self.recent_home_wins) / f64::from(self.recent_considered)
                }
            }
            H2hStat::RecentWeightedForm => self.recent_weighted_form,
        }
    }

    pub fn features(&self) -> Vec<(Feature, f64)> {
        H2hStat::ALL
            .into_iter()
            .map(|stat| (Feature::H2h(stat), self.value(stat)))
            .collect()
    }
}

/// Folds `meetings` (most recent first) from the point of view of today's home team.
pub fn summarize(
    home_team_id: u32,
    away_team_id: u32,
    meetings: &[Fixture],
    recent: usize,
) -> HeadToHeadSummary {
    let mut out = HeadToHeadSummary {
        home_team_id,
        away_team_id,
        ..HeadToHeadSummary::default()
    };

    let mut weighted = 0.0;
    let mut weight_sum = 0.0;
    for m in meetings {
        let is_pair = (m.home_team_id == home_team_id && m.away_team_id == away_team_id)
            || (m.home_team_id == away_team_id && m.away_team_id == home_team_id);
        if !is_pair {
            continue;
        }
        let (Some(result), Some((gf, ga))) =
            (m.result_for(home_team_id), m.goals_for_team(home_team_id))
        else {
            continue;
        };

        if out.last_meeting_id.is_none() {
            out.last_meeting_id = Some(m.id);
            out.last_meeting_date = Some(m.date);
        }
        out.total_matches += 1;
        out.home_goals += u32::from(gf);
        out.away_goals += u32::from(ga);
        match result {
            TeamResult::Win => out.home_wins += 1,
            TeamResult::Loss => out.away_wins += 1,
            TeamResult::Draw => out.draws += 1,
        }

        if (out.recent_considered as usize) < recent {
            let w = RECENT_DECAY.powi(out.recent_considered as i32);
            let score = match result {
                TeamResult::Win => 1.0,
                TeamResult::Draw => 0.0,
                TeamResult::Loss => -1.0,
            };
            weighted += w * score;
            weight_sum += w;
            if result == TeamResult::Win {
                out.recent_home_wins += 1;
            }
            out.recent_considered += 1;
        }
    }

    if weight_sum > 0.0 {
        out.recent_weighted_form = weighted / weight_sum;
    }
    out
}

pub struct HeadToHeadCalculator<'a, S: ?Sized> {
    store: &'a S,
}

impl<'a, S: MatchStore + ?Sized> HeadToHeadCalculator<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Meetings strictly before `cutoff`; `lookback` caps how many of the latest are read.
    pub fn summary(
        &self,
        home_team_id: u32,
        away_team_id: u32,
        cutoff: NaiveDateTime,
        lookback: Option<usize>,
        recent: usize,
    ) -> Result<HeadToHeadSummary> {
        let meetings =
            self.store
                .head_to_head_before(home_team_id, away_team_id, cutoff, lookback)?;
        let out = summarize(home_team_id, away_team_id, &meetings, recent);
        debug!(
            home_team_id,
            away_team_id,
            meetings = out.total_matches,
            dominance = out.dominance(),
            "head-to-head computed"
        );
        Ok(out)
    }
}
