//! Scoring engine: feature pipeline + classifier + decision threshold

use crate::config::AppConfig;
use crate::error::{PipelineError, Result};
use crate::feature_extractor::{FeatureExtractor, FeatureVector};
use crate::models::bundle::ArtifactBundle;
use crate::models::forest::FraudClassifier;
use crate::models::store::ArtifactStore;
use crate::types::transaction::TransactionRecord;
use crate::types::verdict::{ScoreResponse, DEFAULT_THRESHOLD};
use std::sync::Arc;
use tracing::{debug, info};

/// Result of scoring one transaction
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreResult {
    /// Probability of the fraud class (0.0 - 1.0)
    pub fraud_probability: f64,
    /// `fraud_probability >= threshold`
    pub is_fraudulent: bool,
    /// Scaled feature vector the classifier saw
    pub features: FeatureVector,
}

impl ScoreResult {
    pub fn to_response(&self) -> ScoreResponse {
        ScoreResponse {
            fraud_probability: self.fraud_probability,
            is_fraudulent: self.is_fraudulent,
        }
    }
}

/// Scores transactions against one immutable artifact bundle.
///
/// Cheap to clone; the bundle is shared read-only.
#[derive(Debug, Clone)]
pub struct ScoringEngine {
    bundle: Arc<ArtifactBundle>,
    extractor: FeatureExtractor,
    threshold: f64,
}

impl ScoringEngine {
    /// Engine with the default 0.5 threshold.
    pub fn new(bundle: Arc<ArtifactBundle>) -> Self {
        Self::with_threshold(bundle, DEFAULT_THRESHOLD)
    }

    pub fn with_threshold(bundle: Arc<ArtifactBundle>, threshold: f64) -> Self {
        Self {
            bundle,
            extractor: FeatureExtractor::new(),
            threshold,
        }
    }

    /// Load the published bundle named by the configuration.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let store = ArtifactStore::new(&config.artifacts.dir);
        let bundle = store.load()?;

        info!(
            run_id = %bundle.metadata().run_id,
            threshold = config.detection.threshold,
            "Scoring engine initialized"
        );
        Ok(Self::with_threshold(
            Arc::new(bundle),
            config.detection.threshold,
        ))
    }

    pub fn bundle(&self) -> &ArtifactBundle {
        &self.bundle
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Score one transaction.
    pub fn score(&self, record: &TransactionRecord) -> Result<ScoreResult> {
        record.validate()?;

        let encoder = self.bundle.type_encoder()?;
        let features = self
            .extractor
            .transform(record, encoder, self.bundle.scaler())?;
        let fraud_probability = self.bundle.classifier().predict_proba(&features)?;

        if !(0.0..=1.0).contains(&fraud_probability) {
            return Err(PipelineError::Computation(format!(
                "probability {} outside [0, 1]",
                fraud_probability
            )));
        }

        let is_fraudulent = fraud_probability >= self.threshold;
        debug!(
            transaction_type = %record.transaction_type,
            fraud_probability = fraud_probability,
            is_fraudulent = is_fraudulent,
            "Transaction scored"
        );

        Ok(ScoreResult {
            fraud_probability,
            is_fraudulent,
            features,
        })
    }

    /// Score several transactions independently.
    pub fn score_batch(&self, records: &[TransactionRecord]) -> Vec<Result<ScoreResult>> {
        records.iter().map(|r| self.score(r)).collect()
    }
}
