use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{PredictorError, Result};

pub const DEFAULT_THRESHOLD: f64 = 0.5;

fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD
}

fn default_version() -> String {
    "1".to_string()
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

fn logit(p: f64) -> f64 {
    let p = p.clamp(1e-12, 1.0 - 1e-12);
    (p / (1.0 - p)).ln()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub name: String,
    #[serde(default = "default_version")]
    pub version: String,
    /// Trained column order. Component inputs are indexed by position in this list.
    pub feature_names: Vec<String>,
    /// Home-win probability at or above which the home side is predicted.
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    pub components: Vec<Component>,
    #[serde(default)]
    pub calibration: Option<Calibration>,
    #[serde(default)]
    pub metrics: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Component {
    pub weight: f64,
    #[serde(flatten)]
    pub model: ComponentModel,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentModel {
    Logistic(LogisticModel),
    TreeEnsemble(TreeEnsemble),
}

impl ComponentModel {
    /// Home-win probability for one ordered input row.
    pub fn probability(&self, x: &[f64]) -> f64 {
        match self {
            ComponentModel::Logistic(m) => m.probability(x),
            ComponentModel::TreeEnsemble(m) => m.probability(x),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticModel {
    pub intercept: f64,
    pub coefficients: Vec<f64>,
    #[serde(default)]
    pub scaler: Option<StandardScaler>,
}

impl LogisticModel {
    pub fn probability(&self, x: &[f64]) -> f64 {
        let mut z = self.intercept;
        for (i, (coef, value)) in self.coefficients.iter().zip(x).enumerate() {
            let value = match &self.scaler {
                Some(s) => {
                    let mean = s.mean.get(i).copied().unwrap_or(0.0);
                    let scale = s.scale.get(i).copied().filter(|v| *v != 0.0).unwrap_or(1.0);
                    (value - mean) / scale
                }
                None => *value,
            };
            z += coef * value;
        }
        sigmoid(z)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeEnsemble {
    #[serde(default)]
    pub base_margin: f64,
    pub trees: Vec<Tree>,
}

impl TreeEnsemble {
    pub fn probability(&self, x: &[f64]) -> f64 {
        let margin: f64 = self.base_margin + self.trees.iter().map(|t| t.leaf_value(x)).sum::<f64>();
        sigmoid(margin)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<TreeNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeNode {
    /// Goes left when `x[feature] < threshold`; a NaN input follows `default_left`.
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
        #[serde(default)]
        default_left: bool,
    },
    Leaf {
        value: f64,
    },
}

impl Tree {
    /// Children always point forward, so the walk is bounded by the node count.
    pub fn leaf_value(&self, x: &[f64]) -> f64 {
        let mut idx = 0usize;
        for _ in 0..self.nodes.len() {
            match self.nodes.get(idx) {
                Some(TreeNode::Leaf { value }) => return *value,
                Some(TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    default_left,
                }) => {
                    let v = x.get(*feature).copied().unwrap_or(f64::NAN);
                    let go_left = if v.is_nan() { *default_left } else { v < *threshold };
                    idx = if go_left { *left } else { *right };
                }
                None => return 0.0,
            }
        }
        0.0
    }

    fn validate(&self, n_features: usize) -> std::result::Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }
        for (i, node) in self.nodes.iter().enumerate() {
            match node {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    if *feature >= n_features {
                        return Err(format!("node {i} splits on unknown feature {feature}"));
                    }
                    if !threshold.is_finite() {
                        return Err(format!("node {i} has a non-finite threshold"));
                    }
                    for child in [left, right] {
                        if *child <= i || *child >= self.nodes.len() {
                            return Err(format!("node {i} has out-of-range child {child}"));
                        }
                    }
                }
                TreeNode::Leaf { value } => {
                    if !value.is_finite() {
                        return Err(format!("leaf {i} is not finite"));
                    }
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Calibration {
    /// `sigmoid(a * logit(p) + b)`.
    Platt { a: f64, b: f64 },
    /// Piecewise-linear through (x, y), flat beyond the end points.
    Isotonic { x: Vec<f64>, y: Vec<f64> },
}

impl Calibration {
    pub fn apply(&self, p: f64) -> f64 {
        match self {
            Calibration::Platt { a, b } => sigmoid(a * logit(p) + b),
            Calibration::Isotonic { x, y } => interpolate(x, y, p),
        }
    }

    fn validate(&self) -> std::result::Result<(), String> {
        match self {
            Calibration::Platt { a, b } => {
                if !a.is_finite() || !b.is_finite() {
                    return Err("platt parameters must be finite".to_string());
                }
            }
            Calibration::Isotonic { x, y } => {
                if x.len() != y.len() || x.len() < 2 {
                    return Err("isotonic map needs matching x/y with at least two points".into());
                }
                if x.windows(2).any(|w| !(w[0] <= w[1])) {
                    return Err("isotonic x must be non-decreasing".to_string());
                }
                if y.iter().any(|v| !(0.0..=1.0).contains(v)) {
                    return Err("isotonic y must lie in [0, 1]".to_string());
                }
            }
        }
        Ok(())
    }
}

fn interpolate(xs: &[f64], ys: &[f64], p: f64) -> f64 {
    let (Some(first), Some(last), Some(y_first), Some(y_last)) =
        (xs.first(), xs.last(), ys.first(), ys.last())
    else {
        return p;
    };
    if p <= *first {
        return *y_first;
    }
    if p >= *last {
        return *y_last;
    }
    for i in 1..xs.len().min(ys.len()) {
        if p <= xs[i] {
            let (x0, x1) = (xs[i - 1], xs[i]);
            let (y0, y1) = (ys[i - 1], ys[i]);
            if x1 == x0 {
                return y1;
            }
            return y0 + (y1 - y0) * (p - x0) / (x1 - x0);
        }
    }
    *y_last
}

impl ModelArtifact {
    pub fn from_json(raw: &str) -> Result<Self> {
        let artifact: ModelArtifact = serde_json::from_str(raw)?;
        artifact.validate()?;
        Ok(artifact)
    }

    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Structural checks. Feature names are resolved against a catalog separately.
    pub fn validate(&self) -> Result<()> {
        self.check().map_err(PredictorError::InvalidModel)
    }

    fn check(&self) -> std::result::Result<(), String> {
        let n = self.feature_names.len();
        if n == 0 {
            return Err("no feature names".to_string());
        }
        let mut seen = HashSet::new();
        for name in &self.feature_names {
            if !seen.insert(name.trim()) {
                return Err(format!("duplicate feature name {name}"));
            }
        }
        if !(self.threshold > 0.0 && self.threshold < 1.0) {
            return Err(format!("threshold {} outside (0, 1)", self.threshold));
        }
        if self.components.is_empty() {
            return Err("no components".to_string());
        }

        let mut total_weight = 0.0;
        for (i, c) in self.components.iter().enumerate() {
            if !c.weight.is_finite() || c.weight < 0.0 {
                return Err(format!("component {i} has invalid weight {}", c.weight));
            }
            total_weight += c.weight;
            match &c.model {
                ComponentModel::Logistic(m) => {
                    if m.coefficients.len() != n {
                        return Err(format!(
                            "component {i}: {} coefficients for {n} features",
                            m.coefficients.len()
                        ));
                    }
                    if let Some(s) = &m.scaler
                        && (s.mean.len() != n || s.scale.len() != n)
                    {
                        return Err(format!("component {i}: scaler length mismatch"));
                    }
                }
                ComponentModel::TreeEnsemble(m) => {
                    if m.trees.is_empty() {
                        return Err(format!("component {i}: tree ensemble has no trees"));
                    }
                    for (t, tree) in m.trees.iter().enumerate() {
                        tree.validate(n)
                            .map_err(|e| format!("component {i} tree {t}: {e}"))?;
                    }
                }
            }
        }
        if total_weight <= 0.0 {
            return Err("component weights sum to zero".to_string());
        }
        if let Some(cal) = &self.calibration {
            cal.validate()?;
        }
        Ok(())
    }

    /// Calibrated home-win probability for one row ordered like `feature_names`.
    pub fn probability(&self, x: &[f64]) -> f64 {
        let mut weighted = 0.0;
        let mut total = 0.0;
        for c in &self.components {
            weighted += c.weight * c.model.probability(x);
            total += c.weight;
        }
        let raw = if total > 0.0 { weighted / total } else { 0.5 };
        let p = match &self.calibration {
            Some(cal) => cal.apply(raw),
            None => raw,
        };
        if p.is_finite() { p.clamp(0.0, 1.0) } else { 0.5 }
    }
}
