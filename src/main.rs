use std::collections::HashMap;

use anyhow::{Context, Result, anyhow};
use chrono::{NaiveDate, Utc};
use tracing::info;

use matchday_predictor::cli;
use matchday_predictor::config::{self, Settings};
use matchday_predictor::sqlite_store::SqliteStore;
use matchday_predictor::store::MatchStore;
use matchday_predictor::{FeaturePipeline, MatchFeatures, Predictor};

const USAGE: &str = "usage: matchday [--date=YYYY-MM-DD | --fixture=ID ...] [--db=PATH] [--model=PATH] \
[--min-confidence=0.75] [--top=5] [--all] [--save] [--json]";

fn main() -> Result<()> {
    config::load_dotenv();
    let settings = Settings::from_env();
    config::init_tracing(&settings.log_level);

    let args = cli::args();
    if cli::has_flag(&args, "help") {
        println!("{USAGE}");
        return Ok(());
    }

    let db_path = cli::path_arg(&args, "db")
        .or_else(|| settings.db_path.clone())
        .context("unable to resolve sqlite path")?;
    let model_path = cli::path_arg(&args, "model")
        .or_else(|| settings.model_path.clone())
        .context("unable to resolve model path")?;
    let min_confidence = match cli::arg_value(&args, "min-confidence") {
        Some(raw) => config::parse_confidence(&raw)
            .ok_or_else(|| anyhow!("invalid --min-confidence {raw}"))?,
        None => settings.confidence_threshold,
    };
    let top = match cli::arg_value(&args, "top") {
        Some(raw) => raw
            .parse::<usize>()
            .with_context(|| format!("invalid --top {raw}"))?,
        None => settings.top_predictions,
    };

    let store = SqliteStore::open(&db_path)
        .with_context(|| format!("open sqlite db {}", db_path.display()))?;
    let pipeline = FeaturePipeline::new(&store, settings.pipeline_config());
    let predictor = Predictor::load(&model_path, pipeline.catalog())
        .with_context(|| format!("load model {}", model_path.display()))?;

    let fixture_ids = resolve_fixture_ids(&args, &store)?;
    if fixture_ids.is_empty() {
        println!("No fixtures to score.");
        return Ok(());
    }

    let rows = pipeline.compute_many(&fixture_ids)?;
    let (predictable, thin): (Vec<MatchFeatures>, Vec<MatchFeatures>) = rows
        .into_iter()
        .partition(|r| r.is_predictable(settings.min_history));
    if !thin.is_empty() {
        info!(
            skipped = thin.len(),
            min_history = settings.min_history,
            "fixtures with too little history"
        );
    }

    let results = predictor.score_all(&predictable);
    if cli::has_flag(&args, "save") {
        for result in &results {
            store
                .save_prediction(predictor.name(), result)
                .with_context(|| format!("save prediction {}", result.fixture_id))?;
        }
        info!(saved = results.len(), "predictions stored");
    }

    let shown = if cli::has_flag(&args, "all") {
        Predictor::rank(results.clone(), 0.0, results.len())
    } else {
        Predictor::rank(results.clone(), min_confidence, top)
    };

    if cli::has_flag(&args, "json") {
        println!("{}", serde_json::to_string_pretty(&shown)?);
        return Ok(());
    }

    let teams: HashMap<u32, (u32, u32)> = predictable
        .iter()
        .map(|r| (r.fixture_id, (r.home_team_id, r.away_team_id)))
        .collect();
    println!(
        "Model: {} v{}  scored {}/{}  shown {} (min confidence {:.2})",
        predictor.name(),
        predictor.version(),
        results.len(),
        fixture_ids.len(),
        shown.len(),
        min_confidence
    );
    println!(
        "{:>10}  {:>6}  {:>6}  {:<9}  {:>7}  {:>7}  {:>6}",
        "fixture", "home", "away", "pick", "p_home", "p_away", "conf"
    );
    for r in &shown {
        let (home, away) = teams.get(&r.fixture_id).copied().unwrap_or((0, 0));
        println!(
            "{:>10}  {:>6}  {:>6}  {:<9}  {:>6.1}%  {:>6.1}%  {:>5.1}%",
            r.fixture_id,
            home,
            away,
            r.predicted_class.label(),
            r.probability_home * 100.0,
            r.probability_away * 100.0,
            r.confidence * 100.0
        );
    }
    Ok(())
}

fn resolve_fixture_ids(args: &[String], store: &SqliteStore) -> Result<Vec<u32>> {
    let explicit = cli::arg_values(args, "fixture")
        .iter()
        .flat_map(|raw| cli::parse_ids(raw))
        .collect::<Vec<_>>();
    if !explicit.is_empty() {
        return Ok(explicit);
    }

    let day = match cli::arg_value(args, "date") {
        Some(raw) => NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
            .map_err(|err| anyhow!("invalid --date {raw}: {err}"))?,
        None => Utc::now().date_naive(),
    };
    let fixtures = store
        .fixtures_on(day)
        .with_context(|| format!("load fixtures for {day}"))?;
    info!(%day, fixtures = fixtures.len(), "slate loaded");
    Ok(fixtures.into_iter().map(|f| f.id).collect())
}
