//! Scoring outcomes and their wire representation

use crate::error::{ErrorKind, PipelineError};
use serde::{Deserialize, Serialize};

/// Inclusive decision threshold applied to the fraud probability.
pub const DEFAULT_THRESHOLD: f64 = 0.5;

/// Apply the decision threshold (`probability >= threshold` is fraud).
pub fn is_fraudulent(probability: f64, threshold: f64) -> bool {
    probability >= threshold
}

/// Successful scoring response
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreResponse {
    /// Probability of the fraud class (0.0 - 1.0)
    pub fraud_probability: f64,
    /// Decision after applying the threshold
    pub is_fraudulent: bool,
}

impl ScoreResponse {
    pub fn new(fraud_probability: f64, threshold: f64) -> Self {
        Self {
            fraud_probability,
            is_fraudulent: is_fraudulent(fraud_probability, threshold),
        }
    }
}

/// Failed scoring response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable message
    pub error: String,
    /// Error kind callers can branch on
    pub kind: ErrorKind,
}

impl From<&PipelineError> for ErrorResponse {
    fn from(err: &PipelineError) -> Self {
        Self {
            error: err.to_string(),
            kind: err.kind(),
        }
    }
}

/// Reply body sent back to the requester
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScoreReply {
    Scored(ScoreResponse),
    Failed(ErrorResponse),
}

impl ScoreReply {
    pub fn is_error(&self) -> bool {
        matches!(self, ScoreReply::Failed(_))
    }

    /// Reply for a request whose scoring task died before producing a result.
    pub fn aborted(reason: impl std::fmt::Display) -> Self {
        let err = PipelineError::Computation(format!("scoring aborted: {}", reason));
        ScoreReply::Failed(ErrorResponse::from(&err))
    }
}

impl From<crate::error::Result<ScoreResponse>> for ScoreReply {
    fn from(result: crate::error::Result<ScoreResponse>) -> Self {
        match result {
            Ok(response) => ScoreReply::Scored(response),
            Err(err) => ScoreReply::Failed(ErrorResponse::from(&err)),
        }
    }
}
