use std::cmp::Ordering;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{PredictorError, Result};
use crate::features::{Feature, FeatureCatalog, FeatureVector};
use crate::model::ModelArtifact;
use crate::pipeline::MatchFeatures;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PredictedClass {
    HomeWin,
    AwayWin,
}

impl PredictedClass {
    pub fn code(self) -> &'static str {
        match self {
            PredictedClass::HomeWin => "home_win",
            PredictedClass::AwayWin => "away_win",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "home_win" => Some(PredictedClass::HomeWin),
            "away_win" => Some(PredictedClass::AwayWin),
            _ => None,
        }
    }

    /// Same encoding as the training target: 1 = home win.
    pub fn target(self) -> u8 {
        match self {
            PredictedClass::HomeWin => 1,
            PredictedClass::AwayWin => 0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PredictedClass::HomeWin => "Home win",
            PredictedClass::AwayWin => "Away win",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub fixture_id: u32,
    pub predicted_class: PredictedClass,
    pub probability_home: f64,
    pub probability_away: f64,
    /// max(probability_home, probability_away)
    pub confidence: f64,
}

#[derive(Debug, Clone)]
pub struct Predictor {
    artifact: ModelArtifact,
    columns: Vec<Feature>,
}

impl Predictor {
    /// Validates the artifact and resolves every column against `catalog`.
    pub fn from_artifact(artifact: ModelArtifact, catalog: &FeatureCatalog) -> Result<Self> {
        artifact.validate()?;
        let mut columns = Vec::with_capacity(artifact.feature_names.len());
        for name in &artifact.feature_names {
            let feature = catalog.resolve(name).ok_or_else(|| {
                PredictorError::InvalidModel(format!("unknown feature column {name}"))
            })?;
            columns.push(feature);
        }
        debug!(
            model = %artifact.name,
            version = %artifact.version,
            columns = columns.len(),
            "model loaded"
        );
        Ok(Self { artifact, columns })
    }

    pub fn load(path: &Path, catalog: &FeatureCatalog) -> Result<Self> {
        Self::from_artifact(ModelArtifact::from_path(path)?, catalog)
    }

    pub fn name(&self) -> &str {
        &self.artifact.name
    }

    pub fn version(&self) -> &str {
        &self.artifact.version
    }

    pub fn columns(&self) -> &[Feature] {
        &self.columns
    }

    pub fn threshold(&self) -> f64 {
        self.artifact.threshold
    }

    pub fn artifact(&self) -> &ModelArtifact {
        &self.artifact
    }

    /// Orders `features` by the trained columns. Absent columns take their imputation default;
    /// keys the model does not use are ignored. Returns the row and how many columns were present.
    pub fn align(&self, features: &FeatureVector) -> (Vec<f64>, usize) {
        let mut present = 0usize;
        let row = self
            .columns
            .iter()
            .map(|c| match features.get(c) {
                Some(v) => {
                    present += 1;
                    v
                }
                None => c.default_value(),
            })
            .collect();
        (row, present)
    }

    pub fn score(&self, fixture_id: u32, features: &FeatureVector) -> Result<PredictionResult> {
        let (row, present) = self.align(features);
        if present == 0 {
            return Err(PredictorError::ModelMismatch(format!(
                "fixture {fixture_id}: none of the {} model columns are present",
                self.columns.len()
            )));
        }
        let probability_home = self.artifact.probability(&row);
        let probability_away = 1.0 - probability_home;
        let predicted_class = if probability_home >= self.artifact.threshold {
            PredictedClass::HomeWin
        } else {
            PredictedClass::AwayWin
        };
        Ok(PredictionResult {
            fixture_id,
            predicted_class,
            probability_home,
            probability_away,
            confidence: probability_home.max(probability_away),
        })
    }

    pub fn score_features(&self, features: &MatchFeatures) -> Result<PredictionResult> {
        self.score(features.fixture_id, &features.features)
    }

    /// Scores every row, logging and skipping those the model cannot use.
    pub fn score_all(&self, rows: &[MatchFeatures]) -> Vec<PredictionResult> {
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            match self.score_features(row) {
                Ok(result) => out.push(result),
                Err(err) => warn!(fixture_id = row.fixture_id, error = %err, "skipping fixture"),
            }
        }
        out
    }

    /// Keeps results at or above `min_confidence`, most confident first (fixture id breaks
    /// ties), at most `top_n`.
    pub fn rank(
        results: Vec<PredictionResult>,
        min_confidence: f64,
        top_n: usize,
    ) -> Vec<PredictionResult> {
        let mut kept: Vec<PredictionResult> = results
            .into_iter()
            .filter(|r| r.confidence >= min_confidence)
            .collect();
        kept.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(Ordering::Equal)
                .then(a.fixture_id.cmp(&b.fixture_id))
        });
        kept.truncate(top_n);
        kept
    }
}
