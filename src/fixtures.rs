use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::error::{PredictorError, Result};

/// Storage format for kickoff and snapshot timestamps. Sorts lexicographically.
pub const DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

pub fn format_date(date: NaiveDateTime) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn parse_date(raw: &str) -> Option<NaiveDateTime> {
    let trimmed = raw.trim();
    if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, DATE_FORMAT) {
        return Some(dt);
    }
    // API payloads carry an offset ("2024-08-16T19:00:00+00:00").
    chrono::DateTime::parse_from_rfc3339(trimmed)
        .ok()
        .map(|dt| dt.naive_utc())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FixtureStatus {
    NotStarted,
    Finished,
    Postponed,
    Other(String),
}

impl FixtureStatus {
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_ascii_uppercase().as_str() {
            "NS" | "TBD" => FixtureStatus::NotStarted,
            "FT" | "AET" | "PEN" => FixtureStatus::Finished,
            "PST" => FixtureStatus::Postponed,
            other => FixtureStatus::Other(other.to_string()),
        }
    }

    pub fn code(&self) -> &str {
        match self {
            FixtureStatus::NotStarted => "NS",
            FixtureStatus::Finished => "FT",
            FixtureStatus::Postponed => "PST",
            FixtureStatus::Other(code) => code.as_str(),
        }
    }
}

/// Derived result used as the training target. Draws and unplayed fixtures share one variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchOutcome {
    HomeWin,
    AwayWin,
    DrawOrUnplayed,
}

/// One match, as a detached value read from the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fixture {
    pub id: u32,
    pub league_id: u32,
    pub season: i32,
    pub round: Option<String>,
    pub date: NaiveDateTime,
    /// 0 when the source did not carry a team.
    pub home_team_id: u32,
    pub away_team_id: u32,
    pub status: FixtureStatus,
    home_goals: Option<u8>,
    away_goals: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeamResult {
    Win,
    Draw,
    Loss,
}

impl TeamResult {
    pub fn points(self) -> u32 {
        match self {
            TeamResult::Win => 3,
            TeamResult::Draw => 1,
            TeamResult::Loss => 0,
        }
    }

    pub fn letter(self) -> char {
        match self {
            TeamResult::Win => 'W',
            TeamResult::Draw => 'D',
            TeamResult::Loss => 'L',
        }
    }
}

impl Fixture {
    pub fn new(
        id: u32,
        league_id: u32,
        season: i32,
        date: NaiveDateTime,
        home_team_id: u32,
        away_team_id: u32,
    ) -> Self {
        Self {
            id,
            league_id,
            season,
            round: None,
            date,
            home_team_id,
            away_team_id,
            status: FixtureStatus::NotStarted,
            home_goals: None,
            away_goals: None,
        }
    }

    /// Goals are kept as a pair: a lone side is discarded.
    pub fn with_score(mut self, score: Option<(u8, u8)>) -> Self {
        self.set_score(score);
        self
    }

    pub fn finished(self, home_goals: u8, away_goals: u8) -> Self {
        let mut out = self.with_score(Some((home_goals, away_goals)));
        out.status = FixtureStatus::Finished;
        out
    }

    pub fn set_score(&mut self, score: Option<(u8, u8)>) {
        match score {
            Some((h, a)) => {
                self.home_goals = Some(h);
                self.away_goals = Some(a);
            }
            None => {
                self.home_goals = None;
                self.away_goals = None;
            }
        }
    }

    pub fn score(&self) -> Option<(u8, u8)> {
        match (self.home_goals, self.away_goals) {
            (Some(h), Some(a)) => Some((h, a)),
            _ => None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status == FixtureStatus::Finished && self.score().is_some()
    }

    pub fn result(&self) -> MatchOutcome {
        if !self.is_finished() {
            return MatchOutcome::DrawOrUnplayed;
        }
        match self.score() {
            Some((h, a)) if h > a => MatchOutcome::HomeWin,
            Some((h, a)) if h < a => MatchOutcome::AwayWin,
            _ => MatchOutcome::DrawOrUnplayed,
        }
    }

    /// Binary training target: 1 = home win, 0 = away win.
    pub fn target(&self) -> Option<u8> {
        match self.result() {
            MatchOutcome::HomeWin => Some(1),
            MatchOutcome::AwayWin => Some(0),
            MatchOutcome::DrawOrUnplayed => None,
        }
    }

    pub fn involves(&self, team_id: u32) -> bool {
        self.home_team_id == team_id || self.away_team_id == team_id
    }

    /// (goals for, goals against) from `team_id`'s side.
    pub fn goals_for_team(&self, team_id: u32) -> Option<(u8, u8)> {
        let (h, a) = self.score()?;
        if team_id == self.home_team_id {
            Some((h, a))
        } else if team_id == self.away_team_id {
            Some((a, h))
        } else {
            None
        }
    }

    pub fn result_for(&self, team_id: u32) -> Option<TeamResult> {
        if !self.is_finished() {
            return None;
        }
        let (gf, ga) = self.goals_for_team(team_id)?;
        Some(match gf.cmp(&ga) {
            std::cmp::Ordering::Greater => TeamResult::Win,
            std::cmp::Ordering::Equal => TeamResult::Draw,
            std::cmp::Ordering::Less => TeamResult::Loss,
        })
    }

    /// Checks the identifiers the pipeline needs and returns (home, away).
    pub fn teams(&self) -> Result<(u32, u32)> {
        if self.home_team_id == 0 || self.away_team_id == 0 {
            return Err(PredictorError::MalformedFixture {
                fixture_id: self.id,
                reason: "missing team id".to_string(),
            });
        }
        if self.home_team_id == self.away_team_id {
            return Err(PredictorError::MalformedFixture {
                fixture_id: self.id,
                reason: format!("home and away are both team {}", self.home_team_id),
            });
        }
        if self.league_id == 0 {
            return Err(PredictorError::MalformedFixture {
                fixture_id: self.id,
                reason: "missing league id".to_string(),
            });
        }
        Ok((self.home_team_id, self.away_team_id))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitRecord {
    pub played: u32,
    pub win: u32,
    pub draw: u32,
    pub lose: u32,
    pub goals_for: u32,
    pub goals_against: u32,
}

impl SplitRecord {
    pub fn points(&self) -> u32 {
        self.win * 3 + self.draw
    }

    pub fn record(&mut self, result: TeamResult, goals_for: u8, goals_against: u8) {
        self.played += 1;
        match result {
            TeamResult::Win => self.win += 1,
            TeamResult::Draw => self.draw += 1,
            TeamResult::Loss => self.lose += 1,
        }
        self.goals_for += u32::from(goals_for);
        self.goals_against += u32::from(goals_against);
    }
}

/// Where a standings row came from. Reads are restricted to one source so that every fixture,
/// trained or scored, sees ranks produced by the same tie-break.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StandingSource {
    /// Built from stored results by `league_table`.
    #[default]
    Derived,
    /// Taken from a provider's standings payload, ranked by the provider.
    Feed,
}

impl StandingSource {
    pub fn code(self) -> &'static str {
        match self {
            StandingSource::Derived => "derived",
            StandingSource::Feed => "feed",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_lowercase().as_str() {
            "derived" => Some(StandingSource::Derived),
            "feed" | "api" => Some(StandingSource::Feed),
            _ => None,
        }
    }
}

/// League-table row for one team as of a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandingEntry {
    pub league_id: u32,
    pub season: i32,
    pub team_id: u32,
    pub rank: u32,
    pub points: i32,
    pub goals_diff: i32,
    pub all: SplitRecord,
    pub home: SplitRecord,
    pub away: SplitRecord,
    pub form: Option<String>,
    pub as_of: NaiveDateTime,
    pub source: StandingSource,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn kickoff() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 2)
            .unwrap()
            .and_hms_opt(15, 0, 0)
            .unwrap()
    }

    #[test]
    fn result_requires_finished_status() {
        let f = Fixture::new(1, 39, 2023, kickoff(), 10, 20).with_score(Some((2, 0)));
        assert_eq!(f.result(), MatchOutcome::DrawOrUnplayed);
        assert_eq!(f.target(), None);

        let f = f.finished(2, 0);
        assert_eq!(f.result(), MatchOutcome::HomeWin);
        assert_eq!(f.target(), Some(1));
        assert_eq!(f.result_for(20), Some(TeamResult::Loss));
        assert_eq!(f.goals_for_team(20), Some((0, 2)));
        assert_eq!(f.result_for(99), None);
    }

    #[test]
    fn draw_has_no_target() {
        let f = Fixture::new(1, 39, 2023, kickoff(), 10, 20).finished(1, 1);
        assert_eq!(f.result(), MatchOutcome::DrawOrUnplayed);
        assert_eq!(f.target(), None);
    }

    #[test]
    fn teams_rejects_missing_ids() {
        let f = Fixture::new(5, 39, 2023, kickoff(), 0, 20);
        assert!(matches!(
            f.teams(),
            Err(PredictorError::MalformedFixture { fixture_id: 5, .. })
        ));
        let f = Fixture::new(6, 39, 2023, kickoff(), 20, 20);
        assert!(f.teams().is_err());
    }

    #[test]
    fn status_codes_map() {
        assert_eq!(FixtureStatus::from_code("ft"), FixtureStatus::Finished);
        assert_eq!(FixtureStatus::from_code("PEN"), FixtureStatus::Finished);
        assert_eq!(FixtureStatus::from_code("NS"), FixtureStatus::NotStarted);
        assert_eq!(FixtureStatus::from_code("PST"), FixtureStatus::Postponed);
        assert_eq!(
            FixtureStatus::from_code("1H"),
            FixtureStatus::Other("1H".to_string())
        );
    }

    #[test]
    fn standing_source_codes() {
        assert_eq!(StandingSource::from_code(" API "), Some(StandingSource::Feed));
        assert_eq!(
            StandingSource::from_code(StandingSource::Derived.code()),
            Some(StandingSource::Derived)
        );
        assert_eq!(StandingSource::from_code("table"), None);
    }

    #[test]
    fn parse_date_accepts_offsets() {
        let dt = parse_date("2024-03-02T15:00:00+00:00").unwrap();
        assert_eq!(dt, kickoff());
        assert_eq!(parse_date(&format_date(kickoff())), Some(kickoff()));
        assert_eq!(parse_date("not a date"), None);
    }
}
