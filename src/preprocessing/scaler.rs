//! Standard scaler over the feature vector

use crate::error::{PipelineError, Result};
use crate::feature_extractor::{FeatureVector, FEATURE_COUNT, FEATURE_NAMES};
use serde::{Deserialize, Serialize};

/// Per-dimension standardisation: `(x - mean) / scale`.
///
/// Fitted once on the training partition and applied verbatim afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: FeatureVector,
    scale: FeatureVector,
    n_samples: usize,
}

impl StandardScaler {
    /// Fit mean and population standard deviation per dimension.
    /// Zero-variance dimensions get a scale of 1.0.
    pub fn fit(rows: &[FeatureVector]) -> Result<Self> {
        if rows.is_empty() {
            return Err(PipelineError::DegenerateDataset(
                "cannot fit scaler on zero rows".to_string(),
            ));
        }

        let n = rows.len() as f64;
        let mut mean = [0.0; FEATURE_COUNT];
        for row in rows {
            for (m, x) in mean.iter_mut().zip(row) {
                *m += x;
            }
        }
        for m in mean.iter_mut() {
            *m /= n;
        }

        let mut variance = [0.0; FEATURE_COUNT];
        for row in rows {
            for ((v, x), m) in variance.iter_mut().zip(row).zip(&mean) {
                *v += (x - m).powi(2);
            }
        }

        let mut scale = [1.0; FEATURE_COUNT];
        for (i, (s, v)) in scale.iter_mut().zip(&variance).enumerate() {
            let std_dev = (v / n).sqrt();
            if !std_dev.is_finite() || !mean[i].is_finite() {
                return Err(PipelineError::Computation(format!(
                    "non-finite statistics for feature '{}'",
                    FEATURE_NAMES[i]
                )));
            }
            if std_dev > 0.0 {
                *s = std_dev;
            }
        }

        Ok(Self {
            mean,
            scale,
            n_samples: rows.len(),
        })
    }

    /// Apply the fitted parameters. Never refits.
    pub fn transform(&self, row: &FeatureVector) -> FeatureVector {
        let mut out = [0.0; FEATURE_COUNT];
        for (i, o) in out.iter_mut().enumerate() {
            *o = (row[i] - self.mean[i]) / self.scale[i];
        }
        out
    }

    pub fn transform_batch(&self, rows: &[FeatureVector]) -> Vec<FeatureVector> {
        rows.iter().map(|row| self.transform(row)).collect()
    }

    pub fn mean(&self) -> &FeatureVector {
        &self.mean
    }

    pub fn scale(&self) -> &FeatureVector {
        &self.scale
    }

    pub fn n_samples(&self) -> usize {
        self.n_samples
    }

    /// Reject parameters that could not come from `fit` (used after loading).
    pub(crate) fn check_integrity(&self) -> std::result::Result<(), String> {
        for i in 0..FEATURE_COUNT {
            if !self.mean[i].is_finite() {
                return Err(format!("non-finite mean for '{}'", FEATURE_NAMES[i]));
            }
            if !self.scale[i].is_finite() || self.scale[i] <= 0.0 {
                return Err(format!("invalid scale for '{}'", FEATURE_NAMES[i]));
            }
        }
        Ok(())
    }
}
