//! Feature extraction shared by training and scoring.
//!
//! Both the trainer and the scoring engine go through [`FeatureExtractor`],
//! so the exact same transformation is applied on either side.

use crate::error::{PipelineError, Result};
use crate::preprocessing::{CategoryEncoder, StandardScaler};
use crate::types::transaction::TransactionRecord;

/// Number of features produced per transaction.
pub const FEATURE_COUNT: usize = 5;

/// Feature names, in column order.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "amount",
    "type_encoded",
    "oldbalanceOrg",
    "newbalanceOrig",
    "balance_change_ratio",
];

/// Stabiliser added to the old balance before dividing.
pub const RATIO_EPSILON: f64 = 1e-5;

/// One row of model input.
pub type FeatureVector = [f64; FEATURE_COUNT];

/// Transforms transactions into model input features.
///
/// Stateless: the fitted encoder and scaler are passed on every call.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureExtractor;

impl FeatureExtractor {
    /// Create a new feature extractor.
    pub fn new() -> Self {
        Self
    }

    /// `(new - old) / (old + epsilon)`; finite for a zero old balance.
    pub fn balance_change_ratio(old_balance: f64, new_balance: f64) -> f64 {
        (new_balance - old_balance) / (old_balance + RATIO_EPSILON)
    }

    /// Unscaled feature vector:
    /// `[amount, type_encoded, oldbalanceOrg, newbalanceOrig, balance_change_ratio]`.
    pub fn raw_features(
        &self,
        record: &TransactionRecord,
        encoder: &CategoryEncoder,
    ) -> Result<FeatureVector> {
        let type_encoded = encoder.encode(&record.transaction_type)? as f64;
        let ratio =
            Self::balance_change_ratio(record.old_balance_origin, record.new_balance_origin);

        let features = [
            record.amount,
            type_encoded,
            record.old_balance_origin,
            record.new_balance_origin,
            ratio,
        ];
        ensure_finite(&features, "raw")?;
        Ok(features)
    }

    /// Full transform: encode, derive the ratio, then apply the fitted scaler.
    pub fn transform(
        &self,
        record: &TransactionRecord,
        encoder: &CategoryEncoder,
        scaler: &StandardScaler,
    ) -> Result<FeatureVector> {
        let raw = self.raw_features(record, encoder)?;
        let scaled = scaler.transform(&raw);
        ensure_finite(&scaled, "scaled")?;
        Ok(scaled)
    }

    /// Transform a batch; fails on the first bad record.
    pub fn transform_batch(
        &self,
        records: &[TransactionRecord],
        encoder: &CategoryEncoder,
        scaler: &StandardScaler,
    ) -> Result<Vec<FeatureVector>> {
        records
            .iter()
            .map(|record| self.transform(record, encoder, scaler))
            .collect()
    }

    /// Get the number of features produced.
    pub fn feature_count(&self) -> usize {
        FEATURE_COUNT
    }

    /// Get feature names in column order.
    pub fn feature_names(&self) -> Vec<&'static str> {
        FEATURE_NAMES.to_vec()
    }
}

fn ensure_finite(features: &FeatureVector, stage: &str) -> Result<()> {
    match features.iter().position(|v| !v.is_finite()) {
        Some(i) => Err(PipelineError::Computation(format!(
            "{} feature '{}' is not finite",
            stage, FEATURE_NAMES[i]
        ))),
        None => Ok(()),
    }
}
