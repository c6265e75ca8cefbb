use chrono::NaiveDateTime;
use serde_json::Value;

use crate::error::Result;
use crate::fixtures::{
    Fixture, FixtureStatus, SplitRecord, StandingEntry, StandingSource, parse_date,
};

#[derive(Debug, Clone)]
pub struct Parsed<T> {
    pub rows: Vec<T>,
    pub skipped: Vec<String>,
}

impl<T> Default for Parsed<T> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            skipped: Vec::new(),
        }
    }
}

fn response_items(root: &Value) -> &[Value] {
    if let Some(arr) = root.as_array() {
        return arr;
    }
    root.get("response")
        .and_then(|x| x.as_array())
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn parse_root(raw: &str) -> Result<Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "null" {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(trimmed)?)
}

pub fn parse_fixtures_json(raw: &str) -> Result<Parsed<Fixture>> {
    let root = parse_root(raw)?;
    let mut out = Parsed::default();
    for (i, item) in response_items(&root).iter().enumerate() {
        match parse_fixture(item) {
            Some(f) => out.rows.push(f),
            None => out.skipped.push(format!(
                "fixture entry {i} (id {}) is incomplete",
                item.get("fixture")
                    .and_then(|x| x.get("id"))
                    .and_then(as_u64_any)
                    .map(|id| id.to_string())
                    .unwrap_or_else(|| "?".to_string())
            )),
        }
    }
    Ok(out)
}

fn parse_fixture(v: &Value) -> Option<Fixture> {
    let fixture = v.get("fixture")?;
    let id = as_u32_any(fixture.get("id")?)?;
    let date = parse_date(fixture.get("date")?.as_str()?)?;
    let status = fixture
        .get("status")
        .and_then(|s| s.get("short"))
        .and_then(|x| x.as_str())
        .map(FixtureStatus::from_code)
        .unwrap_or(FixtureStatus::NotStarted);

    let league = v.get("league")?;
    let league_id = as_u32_any(league.get("id")?)?;
    let season = league.get("season").and_then(as_i32_any)?;
    let round = league
        .get("round")
        .and_then(|x| x.as_str())
        .map(|s| s.to_string());

    let teams = v.get("teams")?;
    let home_team_id = teams
        .get("home")
        .and_then(|t| t.get("id"))
        .and_then(as_u32_any)
        .unwrap_or(0);
    let away_team_id = teams
        .get("away")
        .and_then(|t| t.get("id"))
        .and_then(as_u32_any)
        .unwrap_or(0);

    let goals = v.get("goals");
    let home_goals = goals.and_then(|g| g.get("home")).and_then(as_u8_any);
    let away_goals = goals.and_then(|g| g.get("away")).and_then(as_u8_any);
    let score = match (home_goals, away_goals) {
        (Some(h), Some(a)) => Some((h, a)),
        _ => None,
    };

    let mut out = Fixture::new(id, league_id, season, date, home_team_id, away_team_id)
        .with_score(score);
    out.round = round;
    out.status = status;
    Some(out)
}

/// Parses a standings payload. Entries without an `update` timestamp take `fallback_as_of`.
pub fn parse_standings_json(
    raw: &str,
    fallback_as_of: NaiveDateTime,
) -> Result<Parsed<StandingEntry>> {
    let root = parse_root(raw)?;
    let mut out = Parsed::default();
    for item in response_items(&root) {
        let Some(league) = item.get("league") else {
            out.skipped.push("standings entry without league".to_string());
            continue;
        };
        let (Some(league_id), Some(season)) = (
            league.get("id").and_then(as_u32_any),
            league.get("season").and_then(as_i32_any),
        ) else {
            out.skipped
                .push("standings entry without league id or season".to_string());
            continue;
        };
        // Grouped leagues carry one table per group.
        let groups = league
            .get("standings")
            .and_then(|x| x.as_array())
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        for group in groups {
            let rows = group.as_array().map(Vec::as_slice).unwrap_or(&[]);
            for row in rows {
                match parse_standing_row(row, league_id, season, fallback_as_of) {
                    Some(entry) => out.rows.push(entry),
                    None => out.skipped.push(format!(
                        "standings row in league {league_id} season {season} is incomplete"
                    )),
                }
            }
        }
    }
    Ok(out)
}

fn parse_standing_row(
    v: &Value,
    league_id: u32,
    season: i32,
    fallback_as_of: NaiveDateTime,
) -> Option<StandingEntry> {
    let team_id = v.get("team").and_then(|t| t.get("id")).and_then(as_u32_any)?;
    let rank = v.get("rank").and_then(as_u32_any)?;
    let points = v.get("points").and_then(as_i32_any)?;
    let all = parse_split(v.get("all"))?;
    let goals_diff = v
        .get("goalsDiff")
        .and_then(as_i32_any)
        .unwrap_or(all.goals_for as i32 - all.goals_against as i32);
    let as_of = v
        .get("update")
        .and_then(|x| x.as_str())
        .and_then(parse_date)
        .unwrap_or(fallback_as_of);
    let form = v
        .get("form")
        .and_then(|x| x.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    Some(StandingEntry {
        league_id,
        season,
        team_id,
        rank,
        points,
        goals_diff,
        all,
        home: parse_split(v.get("home")).unwrap_or_default(),
        away: parse_split(v.get("away")).unwrap_or_default(),
        form,
        as_of,
        source: StandingSource::Feed,
    })
}

fn parse_split(v: Option<&Value>) -> Option<SplitRecord> {
    let v = v?;
    let count = |key: &str| v.get(key).and_then(as_u32_any).unwrap_or(0);
    let goals = v.get("goals");
    let goal_count = |key: &str| {
        goals
            .and_then(|g| g.get(key))
            .and_then(as_u32_any)
            .unwrap_or(0)
    };
    Some(SplitRecord {
        played: v.get("played").and_then(as_u32_any)?,
        win: count("win"),
        draw: count("draw"),
        lose: count("lose"),
        goals_for: goal_count("for"),
        goals_against: goal_count("against"),
    })
}

fn as_u64_any(v: &Value) -> Option<u64> {
    if let Some(n) = v.as_u64() {
        return Some(n);
    }
    v.as_str()?.trim().parse::<u64>().ok()
}

fn as_u32_any(v: &Value) -> Option<u32> {
    let n = as_u64_any(v)?;
    u32::try_from(n).ok()
}

fn as_u8_any(v: &Value) -> Option<u8> {
    let n = as_u64_any(v)?;
    u8::try_from(n).ok()
}

fn as_i64_any(v: &Value) -> Option<i64> {
    if let Some(n) = v.as_i64() {
        return Some(n);
    }
    v.as_str()?.trim().parse::<i64>().ok()
}

fn as_i32_any(v: &Value) -> Option<i32> {
    let n = as_i64_any(v)?;
    i32::try_from(n).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn numeric_strings_are_accepted() {
        assert_eq!(as_u32_any(&json!("39")), Some(39));
        assert_eq!(as_i32_any(&json!(-4)), Some(-4));
        assert_eq!(as_u8_any(&json!(300)), None);
        assert_eq!(as_u64_any(&json!(null)), None);
    }

    #[test]
    fn missing_goals_leave_fixture_unscored() {
        let raw = json!([{
            "fixture": {"id": 9, "date": "2024-08-16T19:00:00+00:00", "status": {"short": "NS"}},
            "league": {"id": 39, "season": 2024},
            "teams": {"home": {"id": 1}, "away": {"id": 2}},
            "goals": {"home": null, "away": null}
        }])
        .to_string();
        let parsed = parse_fixtures_json(&raw).unwrap();
        assert_eq!(parsed.rows.len(), 1);
        assert_eq!(parsed.rows[0].score(), None);
        assert_eq!(parsed.rows[0].status, FixtureStatus::NotStarted);
    }

    #[test]
    fn empty_payload_is_not_an_error() {
        assert!(parse_fixtures_json("  ").unwrap().rows.is_empty());
        assert!(parse_fixtures_json("{\"response\": []}").unwrap().rows.is_empty());
    }
}
