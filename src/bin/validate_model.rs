use anyhow::{Context, Result, anyhow};
use tracing::warn;

use matchday_predictor::cli;
use matchday_predictor::config::{self, Settings};
use matchday_predictor::evaluation;
use matchday_predictor::sqlite_store::SqliteStore;
use matchday_predictor::store::DatasetFilter;
use matchday_predictor::{FeaturePipeline, Predictor};

fn main() -> Result<()> {
    config::load_dotenv();
    let settings = Settings::from_env();
    config::init_tracing(&settings.log_level);

    let args = cli::args();
    let db_path = cli::path_arg(&args, "db")
        .or_else(|| settings.db_path.clone())
        .context("unable to resolve sqlite path")?;
    let store = SqliteStore::open(&db_path)
        .with_context(|| format!("open sqlite db {}", db_path.display()))?;
    let threshold = match cli::arg_value(&args, "min-confidence") {
        Some(raw) => config::parse_confidence(&raw)
            .ok_or_else(|| anyhow!("invalid --min-confidence {raw}"))?,
        None => settings.confidence_threshold,
    };

    if cli::has_flag(&args, "verify") {
        let summary = store.verify_predictions()?;
        let stats = store.accuracy_stats(threshold)?;
        println!(
            "Verified {}/{} pending predictions ({} correct)",
            summary.verified, summary.checked, summary.correct
        );
        println!(
            "Stored: total={} verified={} correct={} accuracy={:.3}",
            stats.total, stats.verified, stats.correct, stats.accuracy
        );
        println!(
            "Confidence >= {:.2}: verified={} correct={} accuracy={:.3}",
            threshold,
            stats.high_confidence_verified,
            stats.high_confidence_correct,
            stats.high_confidence_accuracy
        );
        return Ok(());
    }

    let model_path = cli::path_arg(&args, "model")
        .or_else(|| settings.model_path.clone())
        .context("unable to resolve model path")?;
    let filter = DatasetFilter {
        league_ids: cli::arg_value(&args, "league-ids")
            .map(|raw| cli::parse_ids(&raw))
            .unwrap_or_default(),
        season: match cli::arg_value(&args, "season") {
            Some(raw) => Some(
                raw.parse::<i32>()
                    .with_context(|| format!("invalid --season {raw}"))?,
            ),
            None => None,
        },
        include_draws: false,
    };
    let bins = cli::arg_value(&args, "bins")
        .and_then(|raw| raw.parse::<usize>().ok())
        .unwrap_or(10);

    let pipeline = FeaturePipeline::new(&store, settings.pipeline_config());
    let predictor = Predictor::load(&model_path, pipeline.catalog())
        .with_context(|| format!("load model {}", model_path.display()))?;
    let rows = pipeline
        .training_dataset(&filter)
        .context("compute features for finished fixtures")?;

    let mut probs = Vec::with_capacity(rows.len());
    let mut outcomes = Vec::with_capacity(rows.len());
    for row in &rows {
        let Some(target) = row.target else {
            continue;
        };
        let result = match predictor.score_features(row) {
            Ok(result) => result,
            Err(err) => {
                warn!(fixture_id = row.fixture_id, error = %err, "fixture not scored");
                continue;
            }
        };
        probs.push(result.probability_home);
        outcomes.push(target == 1);
    }

    if probs.len() < rows.len() {
        warn!(
            rows = rows.len(),
            scored = probs.len(),
            "some finished fixtures were left out of the metrics"
        );
    }
    let metrics = evaluation::evaluate(&probs, &outcomes);
    let calibration = evaluation::calibration_bins(&probs, &outcomes, bins);
    let confident = evaluation::accuracy_above(&probs, &outcomes, threshold);

    println!("Model: {} v{}", predictor.name(), predictor.version());
    println!(
        "samples={} brier={:.4} log_loss={:.4} accuracy={:.3} ece={:.4}",
        metrics.samples,
        metrics.brier,
        metrics.log_loss,
        metrics.accuracy,
        evaluation::expected_calibration_error(&calibration)
    );
    println!(
        "confidence >= {:.2}: {} picks, {} correct, accuracy={:.3}, coverage={:.3}",
        confident.threshold,
        confident.count,
        confident.correct,
        confident.accuracy,
        confident.coverage
    );
    for bin in calibration.iter().filter(|b| b.count > 0) {
        println!(
            "  [{:.1}, {:.1}) n={:<5} pred={:.3} actual={:.3}",
            bin.bucket_start, bin.bucket_end, bin.count, bin.avg_pred, bin.actual_rate
        );
    }
    Ok(())
}
