//! Error taxonomy shared by the feature pipeline, training and scoring.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Closed set of failures the pipeline can report.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Required field(s) missing, mistyped or out of range.
    #[error("schema error: {detail} (fields: {})", fields.join(", "))]
    Schema { fields: Vec<String>, detail: String },

    /// Categorical value absent from the fitted vocabulary.
    #[error("unknown category '{value}' for field '{field}'")]
    UnknownCategory { field: String, value: String },

    /// An artifact of the bundle is missing, corrupt or mismatched.
    #[error("failed to load artifact '{artifact}': {reason}")]
    ArtifactLoad { artifact: String, reason: String },

    /// Writing an artifact of the bundle failed; nothing was published.
    #[error("failed to persist artifact '{artifact}': {reason}")]
    ArtifactPersist { artifact: String, reason: String },

    /// The training data cannot produce a classifier.
    #[error("degenerate dataset: {0}")]
    DegenerateDataset(String),

    /// The dataset could not be opened or streamed.
    #[error("cannot read dataset {path}: {reason}")]
    DatasetRead { path: String, reason: String },

    /// Non-finite values or other numeric failure.
    #[error("computation error: {0}")]
    Computation(String),
}

/// Discriminant of [`PipelineError`], used by callers to branch and on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    SchemaError,
    UnknownCategory,
    ArtifactLoadError,
    ArtifactPersistError,
    DegenerateDataset,
    DatasetReadError,
    ComputationError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::SchemaError => "schema_error",
            ErrorKind::UnknownCategory => "unknown_category",
            ErrorKind::ArtifactLoadError => "artifact_load_error",
            ErrorKind::ArtifactPersistError => "artifact_persist_error",
            ErrorKind::DegenerateDataset => "degenerate_dataset",
            ErrorKind::DatasetReadError => "dataset_read_error",
            ErrorKind::ComputationError => "computation_error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Schema { .. } => ErrorKind::SchemaError,
            PipelineError::UnknownCategory { .. } => ErrorKind::UnknownCategory,
            PipelineError::ArtifactLoad { .. } => ErrorKind::ArtifactLoadError,
            PipelineError::ArtifactPersist { .. } => ErrorKind::ArtifactPersistError,
            PipelineError::DegenerateDataset(_) => ErrorKind::DegenerateDataset,
            PipelineError::DatasetRead { .. } => ErrorKind::DatasetReadError,
            PipelineError::Computation(_) => ErrorKind::ComputationError,
        }
    }

    pub(crate) fn schema(fields: Vec<String>, detail: impl Into<String>) -> Self {
        PipelineError::Schema {
            fields,
            detail: detail.into(),
        }
    }

    pub(crate) fn artifact_load(artifact: &str, reason: impl fmt::Display) -> Self {
        PipelineError::ArtifactLoad {
            artifact: artifact.to_string(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn artifact_persist(artifact: &str, reason: impl fmt::Display) -> Self {
        PipelineError::ArtifactPersist {
            artifact: artifact.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        let err = PipelineError::UnknownCategory {
            field: "type".to_string(),
            value: "UNKNOWN_TYPE_XYZ".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::UnknownCategory);
        assert!(err.to_string().contains("UNKNOWN_TYPE_XYZ"));
    }

    #[test]
    fn test_schema_message_lists_fields() {
        let err = PipelineError::schema(
            vec!["amount".to_string(), "type".to_string()],
            "missing required field(s)",
        );
        assert_eq!(err.to_string(), "schema error: missing required field(s) (fields: amount, type)");
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::ArtifactLoadError).unwrap();
        assert_eq!(json, "\"artifact_load_error\"");
        assert_eq!(ErrorKind::ArtifactLoadError.as_str(), "artifact_load_error");
    }
}
