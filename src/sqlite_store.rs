use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{NaiveDate, NaiveDateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::debug;

use crate::error::{PredictorError, Result};
use crate::fixtures::{
    DATE_FORMAT, Fixture, FixtureStatus, SplitRecord, StandingEntry, StandingSource, format_date,
};
use crate::predictor::{PredictedClass, PredictionResult};
use crate::store::{DatasetFilter, MatchStore, Venue};

const FIXTURE_COLUMNS: &str = "fixture_id, league_id, season, round, kickoff, \
     home_team_id, away_team_id, status, home_goals, away_goals";

const STANDING_COLUMNS: &str = "league_id, season, team_id, as_of, rank, points, goals_diff, \
     played, win, draw, lose, goals_for, goals_against, \
     home_played, home_win, home_draw, home_lose, home_goals_for, home_goals_against, \
     away_played, away_win, away_draw, away_lose, away_goals_for, away_goals_against, form, source";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VerifySummary {
    pub checked: usize,
    pub verified: usize,
    pub correct: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PredictionAccuracy {
    pub total: usize,
    pub verified: usize,
    pub correct: usize,
    pub accuracy: f64,
    pub high_confidence_verified: usize,
    pub high_confidence_correct: usize,
    pub high_confidence_accuracy: f64,
}

/// SQLite-backed fixture, standings and prediction store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        debug!(db = %path.display(), "opened sqlite store");
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| PredictorError::StoreLock)
    }

    pub fn upsert_fixtures(&self, rows: &[Fixture]) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        for row in rows {
            upsert_fixture(&tx, row)?;
        }
        tx.commit()?;
        Ok(rows.len())
    }

    pub fn upsert_standings(&self, rows: &[StandingEntry]) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        for row in rows {
            upsert_standing(&tx, row)?;
        }
        tx.commit()?;
        Ok(rows.len())
    }

    pub fn record_ingest_run(
        &self,
        source: &str,
        fixtures_upserted: usize,
        standings_upserted: usize,
        errors: &[String],
    ) -> Result<()> {
        let errors_json = serde_json::to_string(errors)?;
        self.conn()?.execute(
            "INSERT INTO ingest_runs(finished_at, source, fixtures_upserted, standings_upserted, errors_json)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                Utc::now().to_rfc3339(),
                source,
                fixtures_upserted as i64,
                standings_upserted as i64,
                errors_json
            ],
        )?;
        Ok(())
    }

    /// Every fixture of one league season, oldest first.
    pub fn season_fixtures(&self, league_id: u32, season: i32) -> Result<Vec<Fixture>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {FIXTURE_COLUMNS} FROM fixtures
             WHERE league_id = ?1 AND season = ?2
             ORDER BY kickoff ASC, fixture_id ASC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![league_id as i64, season], fixture_from_row)?;
        collect_rows(rows)
    }

    /// Distinct (league, season) pairs present in the fixtures table.
    pub fn league_seasons(&self) -> Result<Vec<(u32, i32)>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT DISTINCT league_id, season FROM fixtures ORDER BY league_id ASC, season ASC",
        )?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, u32>(0)?, row.get::<_, i32>(1)?)))?;
        collect_rows(rows)
    }

    pub fn save_prediction(&self, model_name: &str, result: &PredictionResult) -> Result<()> {
        self.conn()?.execute(
            r#"
            INSERT INTO predictions (
                fixture_id, model_name, predicted_class, probability_home, probability_away,
                confidence, created_at, verified, correct
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, NULL)
            ON CONFLICT(fixture_id) DO UPDATE SET
                model_name = excluded.model_name,
                predicted_class = excluded.predicted_class,
                probability_home = excluded.probability_home,
                probability_away = excluded.probability_away,
                confidence = excluded.confidence,
                created_at = excluded.created_at,
                verified = 0,
                correct = NULL
            "#,
            params![
                result.fixture_id as i64,
                model_name,
                result.predicted_class.code(),
                result.probability_home,
                result.probability_away,
                result.confidence,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn prediction(&self, fixture_id: u32) -> Result<Option<PredictionResult>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT fixture_id, predicted_class, probability_home, probability_away, confidence
                 FROM predictions WHERE fixture_id = ?1",
                params![fixture_id as i64],
                |row| {
                    let code: String = row.get(1)?;
                    Ok((
                        row.get::<_, u32>(0)?,
                        code,
                        row.get::<_, f64>(2)?,
                        row.get::<_, f64>(3)?,
                        row.get::<_, f64>(4)?,
                    ))
                },
            )
            .optional()?;
        let Some((fixture_id, code, probability_home, probability_away, confidence)) = row else {
            return Ok(None);
        };
        let Some(predicted_class) = PredictedClass::from_code(&code) else {
            return Err(PredictorError::Config(format!(
                "stored prediction for fixture {fixture_id} has unknown class {code:?}"
            )));
        };
        Ok(Some(PredictionResult {
            fixture_id,
            predicted_class,
            probability_home,
            probability_away,
            confidence,
        }))
    }

    /// Settles stored predictions whose fixture has finished. Draws are marked verified without
    /// a verdict because the model never predicts them.
    pub fn verify_predictions(&self) -> Result<VerifySummary> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let pending = {
            let sql = format!(
                "SELECT p.predicted_class, {} FROM predictions p
                 JOIN fixtures f ON f.fixture_id = p.fixture_id
                 WHERE p.verified = 0",
                FIXTURE_COLUMNS
                    .split(", ")
                    .map(|c| format!("f.{}", c.trim()))
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            let mut stmt = tx.prepare(&sql)?;
            let rows = stmt.query_map([], |row| {
                let code: String = row.get(0)?;
                let fixture = fixture_from_row_offset(row, 1)?;
                Ok((code, fixture))
            })?;
            collect_rows(rows)?
        };

        let mut summary = VerifySummary {
            checked: pending.len(),
            ..VerifySummary::default()
        };
        for (code, fixture) in pending {
            if !fixture.is_finished() {
                continue;
            }
            let correct = match (PredictedClass::from_code(&code), fixture.target()) {
                (Some(class), Some(target)) => Some(class.target() == target),
                _ => None,
            };
            tx.execute(
                "UPDATE predictions SET verified = 1, correct = ?1 WHERE fixture_id = ?2",
                params![correct.map(bool_to_i64), fixture.id as i64],
            )?;
            summary.verified += 1;
            if correct == Some(true) {
                summary.correct += 1;
            }
        }
        tx.commit()?;
        Ok(summary)
    }

    pub fn accuracy_stats(&self, confidence_threshold: f64) -> Result<PredictionAccuracy> {
        let conn = self.conn()?;
        let (total, verified, correct, hc_verified, hc_correct) = conn.query_row(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(CASE WHEN verified = 1 AND correct IS NOT NULL THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN correct = 1 THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN verified = 1 AND correct IS NOT NULL AND confidence >= ?1 THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN correct = 1 AND confidence >= ?1 THEN 1 ELSE 0 END), 0)
            FROM predictions
            "#,
            params![confidence_threshold],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                    row.get::<_, i64>(4)?,
                ))
            },
        )?;
        Ok(PredictionAccuracy {
            total: total as usize,
            verified: verified as usize,
            correct: correct as usize,
            accuracy: ratio(correct, verified),
            high_confidence_verified: hc_verified as usize,
            high_confidence_correct: hc_correct as usize,
            high_confidence_accuracy: ratio(hc_correct, hc_verified),
        })
    }
}

impl MatchStore for SqliteStore {
    fn fixture(&self, fixture_id: u32) -> Result<Option<Fixture>> {
        let conn = self.conn()?;
        let sql = format!("SELECT {FIXTURE_COLUMNS} FROM fixtures WHERE fixture_id = ?1");
        Ok(conn
            .query_row(&sql, params![fixture_id as i64], fixture_from_row)
            .optional()?)
    }

    fn team_fixtures_before(
        &self,
        team_id: u32,
        before: NaiveDateTime,
        venue: Venue,
        limit: Option<usize>,
    ) -> Result<Vec<Fixture>> {
        let team_clause = match venue {
            Venue::Any => "(home_team_id = ?1 OR away_team_id = ?1)",
            Venue::HomeOnly => "home_team_id = ?1",
            Venue::AwayOnly => "away_team_id = ?1",
        };
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {FIXTURE_COLUMNS} FROM fixtures
             WHERE {team_clause}
               AND kickoff < ?2
               AND status = 'FT'
               AND home_goals IS NOT NULL
               AND away_goals IS NOT NULL
             ORDER BY kickoff DESC, fixture_id DESC
             LIMIT ?3"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![team_id as i64, format_date(before), sql_limit(limit)],
            fixture_from_row,
        )?;
        collect_rows(rows)
    }

    fn standing_as_of(
        &self,
        league_id: u32,
        season: i32,
        team_id: u32,
        as_of: NaiveDateTime,
        source: StandingSource,
    ) -> Result<Option<StandingEntry>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {STANDING_COLUMNS} FROM standings
             WHERE league_id = ?1 AND season = ?2 AND team_id = ?3 AND as_of <= ?4
               AND source = ?5
             ORDER BY as_of DESC
             LIMIT 1"
        );
        Ok(conn
            .query_row(
                &sql,
                params![
                    league_id as i64,
                    season,
                    team_id as i64,
                    format_date(as_of),
                    source.code()
                ],
                standing_from_row,
            )
            .optional()?)
    }

    fn head_to_head_before(
        &self,
        team_a: u32,
        team_b: u32,
        before: NaiveDateTime,
        limit: Option<usize>,
    ) -> Result<Vec<Fixture>> {
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {FIXTURE_COLUMNS} FROM fixtures
             WHERE ((home_team_id = ?1 AND away_team_id = ?2)
                 OR (home_team_id = ?2 AND away_team_id = ?1))
               AND kickoff < ?3
               AND status = 'FT'
               AND home_goals IS NOT NULL
               AND away_goals IS NOT NULL
             ORDER BY kickoff DESC, fixture_id DESC
             LIMIT ?4"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![
                team_a as i64,
                team_b as i64,
                format_date(before),
                sql_limit(limit)
            ],
            fixture_from_row,
        )?;
        collect_rows(rows)
    }

    fn fixtures_on(&self, day: NaiveDate) -> Result<Vec<Fixture>> {
        let Some(next) = day.succ_opt() else {
            return Ok(Vec::new());
        };
        let start = format_date(day.and_time(chrono::NaiveTime::MIN));
        let end = format_date(next.and_time(chrono::NaiveTime::MIN));
        let conn = self.conn()?;
        let sql = format!(
            "SELECT {FIXTURE_COLUMNS} FROM fixtures
             WHERE kickoff >= ?1 AND kickoff < ?2
             ORDER BY kickoff ASC, fixture_id ASC"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![start, end], fixture_from_row)?;
        collect_rows(rows)
    }

    fn finished_fixtures(&self, filter: &DatasetFilter) -> Result<Vec<Fixture>> {
        let conn = self.conn()?;
        let mut sql = format!(
            "SELECT {FIXTURE_COLUMNS} FROM fixtures
             WHERE status = 'FT' AND home_goals IS NOT NULL AND away_goals IS NOT NULL"
        );
        if let Some(season) = filter.season {
            sql.push_str(&format!(" AND season = {season}"));
        }
        if !filter.league_ids.is_empty() {
            let ids = filter
                .league_ids
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            sql.push_str(&format!(" AND league_id IN ({ids})"));
        }
        if !filter.include_draws {
            sql.push_str(" AND outcome IS NOT NULL");
        }
        sql.push_str(" ORDER BY kickoff ASC, fixture_id ASC");
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map([], fixture_from_row)?;
        collect_rows(rows)
    }
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        CREATE TABLE IF NOT EXISTS fixtures (
            fixture_id INTEGER PRIMARY KEY,
            league_id INTEGER NOT NULL,
            season INTEGER NOT NULL,
            round TEXT NULL,
            kickoff TEXT NOT NULL,
            home_team_id INTEGER NOT NULL,
            away_team_id INTEGER NOT NULL,
            status TEXT NOT NULL,
            home_goals INTEGER NULL,
            away_goals INTEGER NULL,
            outcome INTEGER NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_fixtures_kickoff ON fixtures(kickoff);
        CREATE INDEX IF NOT EXISTS idx_fixtures_league_season ON fixtures(league_id, season);
        CREATE INDEX IF NOT EXISTS idx_fixtures_home ON fixtures(home_team_id, kickoff);
        CREATE INDEX IF NOT EXISTS idx_fixtures_away ON fixtures(away_team_id, kickoff);

        CREATE TABLE IF NOT EXISTS standings (
            league_id INTEGER NOT NULL,
            season INTEGER NOT NULL,
            team_id INTEGER NOT NULL,
            as_of TEXT NOT NULL,
            rank INTEGER NOT NULL,
            points INTEGER NOT NULL,
            goals_diff INTEGER NOT NULL,
            played INTEGER NOT NULL,
            win INTEGER NOT NULL,
            draw INTEGER NOT NULL,
            lose INTEGER NOT NULL,
            goals_for INTEGER NOT NULL,
            goals_against INTEGER NOT NULL,
            home_played INTEGER NOT NULL,
            home_win INTEGER NOT NULL,
            home_draw INTEGER NOT NULL,
            home_lose INTEGER NOT NULL,
            home_goals_for INTEGER NOT NULL,
            home_goals_against INTEGER NOT NULL,
            away_played INTEGER NOT NULL,
            away_win INTEGER NOT NULL,
            away_draw INTEGER NOT NULL,
            away_lose INTEGER NOT NULL,
            away_goals_for INTEGER NOT NULL,
            away_goals_against INTEGER NOT NULL,
            form TEXT NULL,
            source TEXT NOT NULL DEFAULT 'derived',
            PRIMARY KEY (league_id, season, team_id, as_of, source)
        );

        CREATE TABLE IF NOT EXISTS predictions (
            fixture_id INTEGER PRIMARY KEY,
            model_name TEXT NOT NULL,
            predicted_class TEXT NOT NULL,
            probability_home REAL NOT NULL,
            probability_away REAL NOT NULL,
            confidence REAL NOT NULL,
            created_at TEXT NOT NULL,
            verified INTEGER NOT NULL,
            correct INTEGER NULL
        );

        CREATE TABLE IF NOT EXISTS ingest_runs (
            run_id INTEGER PRIMARY KEY AUTOINCREMENT,
            finished_at TEXT NOT NULL,
            source TEXT NOT NULL,
            fixtures_upserted INTEGER NOT NULL,
            standings_upserted INTEGER NOT NULL,
            errors_json TEXT NOT NULL
        );
        "#,
    )?;
    Ok(())
}

fn upsert_fixture(tx: &rusqlite::Transaction<'_>, f: &Fixture) -> Result<()> {
    let (home_goals, away_goals) = match f.score() {
        Some((h, a)) => (Some(i64::from(h)), Some(i64::from(a))),
        None => (None, None),
    };
    tx.execute(
        r#"
        INSERT INTO fixtures (
            fixture_id, league_id, season, round, kickoff,
            home_team_id, away_team_id, status, home_goals, away_goals,
            outcome, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
        ON CONFLICT(fixture_id) DO UPDATE SET
            league_id = excluded.league_id,
            season = excluded.season,
            round = excluded.round,
            kickoff = excluded.kickoff,
            home_team_id = excluded.home_team_id,
            away_team_id = excluded.away_team_id,
            status = excluded.status,
            home_goals = excluded.home_goals,
            away_goals = excluded.away_goals,
            outcome = excluded.outcome,
            updated_at = excluded.updated_at
        "#,
        params![
            f.id as i64,
            f.league_id as i64,
            f.season,
            f.round,
            format_date(f.date),
            f.home_team_id as i64,
            f.away_team_id as i64,
            f.status.code(),
            home_goals,
            away_goals,
            f.target().map(i64::from),
            Utc::now().to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn upsert_standing(tx: &rusqlite::Transaction<'_>, s: &StandingEntry) -> Result<()> {
    let sql = format!(
        "INSERT OR REPLACE INTO standings ({STANDING_COLUMNS}) VALUES (
            ?1, ?2, ?3, ?4, ?5, ?6, ?7,
            ?8, ?9, ?10, ?11, ?12, ?13,
            ?14, ?15, ?16, ?17, ?18, ?19,
            ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27
        )"
    );
    tx.execute(
        &sql,
        params![
            s.league_id as i64,
            s.season,
            s.team_id as i64,
            format_date(s.as_of),
            s.rank,
            s.points,
            s.goals_diff,
            s.all.played,
            s.all.win,
            s.all.draw,
            s.all.lose,
            s.all.goals_for,
            s.all.goals_against,
            s.home.played,
            s.home.win,
            s.home.draw,
            s.home.lose,
            s.home.goals_for,
            s.home.goals_against,
            s.away.played,
            s.away.win,
            s.away.draw,
            s.away.lose,
            s.away.goals_for,
            s.away.goals_against,
            s.form,
            s.source.code(),
        ],
    )?;
    Ok(())
}

fn fixture_from_row(row: &Row<'_>) -> rusqlite::Result<Fixture> {
    fixture_from_row_offset(row, 0)
}

fn fixture_from_row_offset(row: &Row<'_>, base: usize) -> rusqlite::Result<Fixture> {
    let kickoff: String = row.get(base + 4)?;
    let date = parse_stored_date(&kickoff, base + 4)?;
    let status: String = row.get(base + 7)?;
    let home_goals: Option<i64> = row.get(base + 8)?;
    let away_goals: Option<i64> = row.get(base + 9)?;
    let score = match (home_goals, away_goals) {
        (Some(h), Some(a)) => u8::try_from(h).ok().zip(u8::try_from(a).ok()),
        _ => None,
    };

    let mut fixture = Fixture::new(
        row.get(base)?,
        row.get(base + 1)?,
        row.get(base + 2)?,
        date,
        row.get(base + 5)?,
        row.get(base + 6)?,
    )
    .with_score(score);
    fixture.round = row.get(base + 3)?;
    fixture.status = FixtureStatus::from_code(&status);
    Ok(fixture)
}

fn standing_from_row(row: &Row<'_>) -> rusqlite::Result<StandingEntry> {
    let as_of: String = row.get(3)?;
    let source: String = row.get(26)?;
    let source = StandingSource::from_code(&source).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            26,
            Type::Text,
            format!("unknown standings source {source:?}").into(),
        )
    })?;
    let split = |start: usize| -> rusqlite::Result<SplitRecord> {
        Ok(SplitRecord {
            played: row.get(start)?,
            win: row.get(start + 1)?,
            draw: row.get(start + 2)?,
            lose: row.get(start + 3)?,
            goals_for: row.get(start + 4)?,
            goals_against: row.get(start + 5)?,
        })
    };
    Ok(StandingEntry {
        league_id: row.get(0)?,
        season: row.get(1)?,
        team_id: row.get(2)?,
        as_of: parse_stored_date(&as_of, 3)?,
        rank: row.get(4)?,
        points: row.get(5)?,
        goals_diff: row.get(6)?,
        all: split(7)?,
        home: split(13)?,
        away: split(19)?,
        form: row.get(25)?,
        source,
    })
}

fn parse_stored_date(raw: &str, idx: usize) -> rusqlite::Result<NaiveDateTime> {
    NaiveDateTime::parse_from_str(raw, DATE_FORMAT)
        .map_err(|err| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err)))
}

fn collect_rows<T>(
    rows: impl Iterator<Item = rusqlite::Result<T>>,
) -> Result<Vec<T>> {
    let mut out = Vec::new();
    for row in rows {
        out.push(row?);
    }
    Ok(out)
}

/// SQLite treats a negative LIMIT as unbounded.
fn sql_limit(limit: Option<usize>) -> i64 {
    limit.map(|n| n as i64).unwrap_or(-1)
}

fn bool_to_i64(v: bool) -> i64 {
    if v { 1 } else { 0 }
}

fn ratio(num: i64, den: i64) -> f64 {
    if den <= 0 { 0.0 } else { num as f64 / den as f64 }
}
