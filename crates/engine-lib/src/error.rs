//! Error taxonomy for the training and serving engine
//!
//! Serving-path errors never reach the caller of `predict`; they are turned
//! into warning tags by [`EngineError::warning_tags`] and the fallback chain
//! moves on to the next step.

use crate::models::Candidate;
use thiserror::Error;

pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("feature derivation substituted a default for {field}")]
    FeatureDerivation { field: &'static str },

    #[error("model {candidate} is not loaded")]
    ModelUnavailable { candidate: Candidate },

    #[error("model {candidate} failed to predict: {reason}")]
    PredictionExecution { candidate: Candidate, reason: String },

    #[error("no ensemble member produced a prediction")]
    EnsembleUnavailable,

    #[error("ensemble incomplete: {}", .failures.iter().map(|f| f.to_string()).collect::<Vec<_>>().join("; "))]
    EnsembleIncomplete { failures: Vec<EngineError> },

    #[error("feature schema mismatch: pipeline fitted on {expected:?}, got {actual:?}")]
    SchemaMismatch {
        candidate: Option<Candidate>,
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error("artifact {artifact} is unreadable: {reason}")]
    ArtifactCorruption { artifact: String, reason: String },

    #[error("training step failed: {0}")]
    TrainingStep(String),

    #[error("event sink failure: {0}")]
    Sink(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("job {0} not found")]
    JobNotFound(String),

    #[error("invalid job transition {from} -> {to}")]
    InvalidTransition { from: String, to: String },
}

impl EngineError {
    /// Stable tags recorded in `PredictionResult::warnings`.
    pub fn warning_tags(&self) -> Vec<String> {
        match self {
            EngineError::FeatureDerivation { field } => vec![format!("DEFAULTED:{}", field)],
            EngineError::ModelUnavailable { candidate } => vec![format!("{}_MISSING", candidate)],
            EngineError::PredictionExecution { candidate, reason } => {
                vec![format!("{}_FAIL:{}", candidate, reason)]
            }
            EngineError::EnsembleUnavailable => vec!["AB_MISSING".to_string()],
            EngineError::EnsembleIncomplete { failures } => {
                failures.iter().flat_map(|f| f.warning_tags()).collect()
            }
            EngineError::SchemaMismatch { candidate, .. } => match candidate {
                Some(c) => vec![format!("SCHEMA_MISMATCH:{}", c)],
                None => vec!["SCHEMA_MISMATCH".to_string()],
            },
            EngineError::ArtifactCorruption { artifact, .. } => {
                vec![format!("ARTIFACT_CORRUPT:{}", artifact)]
            }
            other => vec![format!("ERROR:{}", other)],
        }
    }

    /// Errors the caller of the HTTP boundary should see as a rejected request
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidRequest(_) | EngineError::JobNotFound(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_model_tag() {
        let err = EngineError::ModelUnavailable {
            candidate: Candidate::A,
        };
        assert_eq!(err.warning_tags(), vec!["A_MISSING".to_string()]);
    }

    #[test]
    fn test_incomplete_ensemble_flattens_tags() {
        let err = EngineError::EnsembleIncomplete {
            failures: vec![
                EngineError::ModelUnavailable {
                    candidate: Candidate::A,
                },
                EngineError::PredictionExecution {
                    candidate: Candidate::B,
                    reason: "boom".to_string(),
                },
            ],
        };
        assert_eq!(
            err.warning_tags(),
            vec!["A_MISSING".to_string(), "B_FAIL:boom".to_string()]
        );
    }

    #[test]
    fn test_client_errors() {
        assert!(EngineError::InvalidRequest("k".into()).is_client_error());
        assert!(!EngineError::EnsembleUnavailable.is_client_error());
    }
}
