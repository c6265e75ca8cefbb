use std::path::PathBuf;

use tracing_subscriber::{EnvFilter, fmt};

use crate::fixtures::StandingSource;
use crate::pipeline::PipelineConfig;

const DATA_DIR: &str = "matchday_predictor";

pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.75;
pub const DEFAULT_TOP_PREDICTIONS: usize = 5;
pub const DEFAULT_FORM_WINDOWS: &[usize] = &[3, 5, 10];
pub const DEFAULT_MIN_HISTORY: usize = 3;

/// Runtime settings resolved from the environment (and `.env` files via [`load_dotenv`]).
#[derive(Debug, Clone)]
pub struct Settings {
    pub db_path: Option<PathBuf>,
    pub model_path: Option<PathBuf>,
    pub confidence_threshold: f64,
    pub top_predictions: usize,
    pub form_windows: Vec<usize>,
    pub h2h_lookback: Option<usize>,
    pub min_history: usize,
    pub standings_source: StandingSource,
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: app_data_dir().map(|dir| dir.join("matches.sqlite")),
            model_path: app_data_dir().map(|dir| dir.join("model.json")),
            confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
            top_predictions: DEFAULT_TOP_PREDICTIONS,
            form_windows: DEFAULT_FORM_WINDOWS.to_vec(),
            h2h_lookback: None,
            min_history: DEFAULT_MIN_HISTORY,
            standings_source: StandingSource::Derived,
            log_level: "info".to_string(),
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolves settings through `lookup`, so tests need not touch the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let db_path = non_empty("APP_DB_PATH")
            .map(|v| PathBuf::from(v.trim()))
            .or(defaults.db_path);
        let model_path = non_empty("APP_MODEL_PATH")
            .map(|v| PathBuf::from(v.trim()))
            .or(defaults.model_path);
        let confidence_threshold = non_empty("APP_CONFIDENCE_THRESHOLD")
            .and_then(|v| parse_confidence(&v))
            .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD);
        let top_predictions = non_empty("APP_TOP_PREDICTIONS")
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(DEFAULT_TOP_PREDICTIONS)
            .max(1);
        let form_windows = non_empty("APP_FORM_WINDOWS")
            .map(|v| parse_windows(&v))
            .filter(|w| !w.is_empty())
            .unwrap_or(defaults.form_windows);
        let h2h_lookback = non_empty("APP_H2H_LOOKBACK")
            .and_then(|v| v.trim().parse::<usize>().ok())
            .filter(|n| *n > 0);
        let min_history = non_empty("APP_MIN_HISTORY")
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(DEFAULT_MIN_HISTORY);
        let standings_source = non_empty("APP_STANDINGS_SOURCE")
            .and_then(|v| StandingSource::from_code(&v))
            .unwrap_or(defaults.standings_source);
        let log_level = non_empty("APP_LOG_LEVEL")
            .map(|v| v.trim().to_string())
            .unwrap_or(defaults.log_level);

        Self {
            db_path,
            model_path,
            confidence_threshold,
            top_predictions,
            form_windows,
            h2h_lookback,
            min_history,
            standings_source,
            log_level,
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            windows: self.form_windows.clone(),
            h2h_lookback: self.h2h_lookback,
            min_history: self.min_history,
            standings_source: self.standings_source,
            ..PipelineConfig::default()
        }
    }
}

pub fn load_dotenv() {
    let _ = dotenvy::from_filename(".env.local");
    let _ = dotenvy::from_filename(".env");
}

/// Installs the global fmt subscriber. `RUST_LOG` wins over the configured level.
pub fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

pub fn app_data_dir() -> Option<PathBuf> {
    if let Ok(base) = std::env::var("XDG_CACHE_HOME") {
        if !base.trim().is_empty() {
            return Some(PathBuf::from(base).join(DATA_DIR));
        }
    }
    let home = std::env::var("HOME").ok()?;
    if home.trim().is_empty() {
        return None;
    }
    Some(PathBuf::from(home).join(".cache").join(DATA_DIR))
}

/// Parses a confidence threshold, clamped to [0.5, 1.0]. `None` when not a finite number.
pub fn parse_confidence(raw: &str) -> Option<f64> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(|v| v.clamp(0.5, 1.0))
}

/// Parses "3,5,10" into sorted, deduplicated non-zero window sizes.
pub fn parse_windows(raw: &str) -> Vec<usize> {
    let mut out = raw
        .split(|ch: char| ch == ',' || ch.is_whitespace())
        .filter_map(|s| s.trim().parse::<usize>().ok())
        .filter(|n| *n > 0)
        .collect::<Vec<_>>();
    out.sort_unstable();
    out.dedup();
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Settings {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let s = settings(&[]);
        assert_eq!(s.confidence_threshold, DEFAULT_CONFIDENCE_THRESHOLD);
        assert_eq!(s.top_predictions, DEFAULT_TOP_PREDICTIONS);
        assert_eq!(s.form_windows, vec![3, 5, 10]);
        assert_eq!(s.h2h_lookback, None);
        assert_eq!(s.standings_source, StandingSource::Derived);
        assert_eq!(s.log_level, "info");
    }

    #[test]
    fn invalid_values_fall_back() {
        let s = settings(&[
            ("APP_CONFIDENCE_THRESHOLD", "abc"),
            ("APP_TOP_PREDICTIONS", "0"),
            ("APP_FORM_WINDOWS", "x,y"),
            ("APP_H2H_LOOKBACK", "0"),
            ("APP_STANDINGS_SOURCE", "website"),
        ]);
        assert_eq!(s.confidence_threshold, DEFAULT_CONFIDENCE_THRESHOLD);
        assert_eq!(s.top_predictions, 1);
        assert_eq!(s.form_windows, vec![3, 5, 10]);
        assert_eq!(s.h2h_lookback, None);
        assert_eq!(s.standings_source, StandingSource::Derived);
    }

    #[test]
    fn confidence_is_clamped() {
        assert_eq!(parse_confidence("0.1"), Some(0.5));
        assert_eq!(parse_confidence(" 0.8 "), Some(0.8));
        assert_eq!(parse_confidence("7"), Some(1.0));
        assert_eq!(parse_confidence("NaN"), None);
        assert_eq!(parse_confidence("high"), None);
    }

    #[test]
    fn overrides_are_parsed() {
        let s = settings(&[
            ("APP_DB_PATH", "/tmp/x.sqlite"),
            ("APP_CONFIDENCE_THRESHOLD", "0.3"),
            ("APP_FORM_WINDOWS", "10, 5 5"),
            ("APP_H2H_LOOKBACK", "10"),
            ("APP_STANDINGS_SOURCE", "feed"),
        ]);
        assert_eq!(s.db_path, Some(PathBuf::from("/tmp/x.sqlite")));
        assert_eq!(s.confidence_threshold, 0.5);
        assert_eq!(s.form_windows, vec![5, 10]);
        assert_eq!(s.h2h_lookback, Some(10));
        assert_eq!(s.pipeline_config().windows, vec![5, 10]);
        assert_eq!(s.pipeline_config().standings_source, StandingSource::Feed);
    }
}
