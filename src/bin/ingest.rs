use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use chrono::{NaiveDateTime, Utc};

use matchday_predictor::cli;
use matchday_predictor::config::{self, Settings};
use matchday_predictor::fixtures::parse_date;
use matchday_predictor::ingest;
use matchday_predictor::league_table;
use matchday_predictor::sqlite_store::SqliteStore;
use matchday_predictor::StandingSource;

fn main() -> Result<()> {
    config::load_dotenv();
    let settings = Settings::from_env();
    config::init_tracing(&settings.log_level);

    let args = cli::args();
    let fixture_files: Vec<PathBuf> = cli::arg_values(&args, "fixtures")
        .into_iter()
        .map(PathBuf::from)
        .collect();
    let standings_files: Vec<PathBuf> = cli::arg_values(&args, "standings")
        .into_iter()
        .map(PathBuf::from)
        .collect();
    let derive = cli::has_flag(&args, "derive-standings");
    if fixture_files.is_empty() && standings_files.is_empty() && !derive {
        return Err(anyhow!(
            "usage: ingest [--db=PATH] [--fixtures=FILE ...] [--standings=FILE ...] \
             [--as-of=YYYY-MM-DDTHH:MM:SS] [--derive-standings]"
        ));
    }

    let db_path = cli::path_arg(&args, "db")
        .or_else(|| settings.db_path.clone())
        .context("unable to resolve sqlite path")?;
    let fallback_as_of: NaiveDateTime = match cli::arg_value(&args, "as-of") {
        Some(raw) => parse_date(&raw).ok_or_else(|| anyhow!("invalid --as-of {raw}"))?,
        None => Utc::now().naive_utc(),
    };

    let store = SqliteStore::open(&db_path)
        .with_context(|| format!("open sqlite db {}", db_path.display()))?;

    let mut errors: Vec<String> = Vec::new();
    let mut fixtures_upserted = 0usize;
    for path in &fixture_files {
        let raw =
            fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let parsed = ingest::parse_fixtures_json(&raw)
            .with_context(|| format!("parse fixtures {}", path.display()))?;
        fixtures_upserted += store.upsert_fixtures(&parsed.rows)?;
        errors.extend(
            parsed
                .skipped
                .into_iter()
                .map(|e| format!("{}: {e}", path.display())),
        );
    }

    let mut standings_upserted = 0usize;
    for path in &standings_files {
        let raw =
            fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let parsed = ingest::parse_standings_json(&raw, fallback_as_of)
            .with_context(|| format!("parse standings {}", path.display()))?;
        standings_upserted += store.upsert_standings(&parsed.rows)?;
        errors.extend(
            parsed
                .skipped
                .into_iter()
                .map(|e| format!("{}: {e}", path.display())),
        );
    }

    let mut derived = 0usize;
    if derive {
        for (league_id, season) in store.league_seasons()? {
            let fixtures = store.season_fixtures(league_id, season)?;
            let snapshots = league_table::matchday_snapshots(&fixtures, league_id, season);
            derived += store.upsert_standings(&snapshots)?;
            println!(
                "league {league_id} season {season}: fixtures={} snapshot rows={}",
                fixtures.len(),
                snapshots.len()
            );
        }
    }

    let source = fixture_files
        .iter()
        .chain(&standings_files)
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(",");
    store.record_ingest_run(
        if source.is_empty() { "derive" } else { source.as_str() },
        fixtures_upserted,
        standings_upserted + derived,
        &errors,
    )?;

    println!("Ingest complete");
    println!("DB: {}", db_path.display());
    println!("Fixtures upserted: {fixtures_upserted}");
    println!("Standings upserted: {standings_upserted}");
    if standings_upserted > 0 && settings.standings_source != StandingSource::Feed {
        println!("  (feed rows; the pipeline reads them only with APP_STANDINGS_SOURCE=feed)");
    }
    if derive {
        println!("Derived standings rows: {derived}");
    }
    if !errors.is_empty() {
        println!("Skipped entries: {}", errors.len());
        for err in errors.iter().take(6) {
            println!("  - {err}");
        }
    }
    Ok(())
}
