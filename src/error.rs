use thiserror::Error;

/// Errors surfaced by the feature pipeline, the predictor and the store.
#[derive(Debug, Error)]
pub enum PredictorError {
    #[error("fixture {0} not found")]
    FixtureNotFound(u32),

    #[error("fixture {fixture_id} is malformed: {reason}")]
    MalformedFixture { fixture_id: u32, reason: String },

    #[error("cannot score fixture: {0}")]
    ModelMismatch(String),

    #[error("invalid model artifact: {0}")]
    InvalidModel(String),

    #[error("store error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("store connection lock poisoned")]
    StoreLock,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("xlsx error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error("configuration error: {0}")]
    Config(String),
}

impl PredictorError {
    /// True when the failure belongs to a single fixture and a batch caller should skip it
    /// rather than abort.
    pub fn is_fixture_scoped(&self) -> bool {
        matches!(
            self,
            PredictorError::FixtureNotFound(_)
                | PredictorError::MalformedFixture { .. }
                | PredictorError::ModelMismatch(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, PredictorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixture_scoped_errors_are_skippable() {
        assert!(PredictorError::FixtureNotFound(7).is_fixture_scoped());
        assert!(
            PredictorError::MalformedFixture {
                fixture_id: 7,
                reason: "missing teams".to_string()
            }
            .is_fixture_scoped()
        );
        assert!(PredictorError::ModelMismatch("empty".to_string()).is_fixture_scoped());
        assert!(!PredictorError::StoreLock.is_fixture_scoped());
        assert!(!PredictorError::Config("bad".to_string()).is_fixture_scoped());
    }
}
