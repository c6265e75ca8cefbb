use std::path::PathBuf;

use anyhow::{Context, Result};

use matchday_predictor::cli;
use matchday_predictor::config::{self, Settings};
use matchday_predictor::dataset_export;
use matchday_predictor::sqlite_store::SqliteStore;
use matchday_predictor::store::DatasetFilter;
use matchday_predictor::FeaturePipeline;

fn main() -> Result<()> {
    config::load_dotenv();
    let settings = Settings::from_env();
    config::init_tracing(&settings.log_level);

    let args = cli::args();
    let db_path = cli::path_arg(&args, "db")
        .or_else(|| settings.db_path.clone())
        .context("unable to resolve sqlite path")?;
    let out_path = cli::path_arg(&args, "out").unwrap_or_else(|| PathBuf::from("dataset.xlsx"));
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
        include_draws: cli::has_flag(&args, "include-draws"),
    };

    let store = SqliteStore::open(&db_path)
        .with_context(|| format!("open sqlite db {}", db_path.display()))?;
    let pipeline = FeaturePipeline::new(&store, settings.pipeline_config());
    let rows = pipeline
        .training_dataset(&filter)
        .context("build training dataset")?;
    let report = dataset_export::write_xlsx(&out_path, pipeline.catalog(), &rows)
        .with_context(|| format!("write workbook {}", out_path.display()))?;

    let home_wins = rows.iter().filter(|r| r.target == Some(1)).count();
    let thin = rows
        .iter()
        .filter(|r| !r.is_predictable(settings.min_history))
        .count();
    println!("Dataset written: {}", out_path.display());
    println!("Rows: {}  Columns: {}", report.rows, report.columns);
    println!(
        "Home wins: {home_wins}  Away wins: {}",
        rows.iter().filter(|r| r.target == Some(0)).count()
    );
    println!(
        "Rows below {} matches of history: {thin}  Imputed cells: {}",
        settings.min_history, report.imputed_cells
    );
    Ok(())
}
