pub mod cli;
pub mod config;
pub mod dataset_export;
pub mod error;
pub mod evaluation;
pub mod features;
pub mod fixtures;
pub mod form;
pub mod h2h;
pub mod ingest;
pub mod league_table;
pub mod model;
pub mod pipeline;
pub mod predictor;
pub mod sqlite_store;
pub mod standings;
pub mod store;

pub use error::{PredictorError, Result};
pub use features::{Feature, FeatureCatalog, FeatureVector};
pub use fixtures::{Fixture, FixtureStatus, MatchOutcome, StandingEntry, StandingSource};
pub use pipeline::{FeaturePipeline, MatchFeatures, PipelineConfig};
pub use predictor::{PredictedClass, PredictionResult, Predictor};
pub use store::{MatchStore, MemoryStore};
