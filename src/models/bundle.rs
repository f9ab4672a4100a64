//! Artifact bundle: encoder map, scaler and classifier from one training run

use crate::error::{PipelineError, Result};
use crate::feature_extractor::FEATURE_NAMES;
use crate::models::forest::RandomForest;
use crate::preprocessing::{CategoryEncoder, EncoderMap, StandardScaler, TYPE_ENCODER};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// On-disk format version understood by this build.
pub const BUNDLE_FORMAT_VERSION: u32 = 1;

/// Provenance of a bundle, written to its manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleMetadata {
    pub run_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub format_version: u32,
    pub seed: u64,
    pub sample_size: usize,
    pub training_rows: usize,
    pub test_rows: usize,
    pub feature_names: Vec<String>,
    /// Class value whose probability the classifier reports
    pub positive_class: u8,
}

impl BundleMetadata {
    pub fn new(seed: u64, sample_size: usize, training_rows: usize, test_rows: usize) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            created_at: Utc::now(),
            format_version: BUNDLE_FORMAT_VERSION,
            seed,
            sample_size,
            training_rows,
            test_rows,
            feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
            positive_class: 1,
        }
    }
}

/// The encoder, scaler and classifier trained together.
///
/// Immutable once built; shared read-only between scoring calls.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactBundle {
    metadata: BundleMetadata,
    encoders: EncoderMap,
    scaler: StandardScaler,
    classifier: RandomForest,
}

impl ArtifactBundle {
    pub fn new(
        metadata: BundleMetadata,
        type_encoder: CategoryEncoder,
        scaler: StandardScaler,
        classifier: RandomForest,
    ) -> Self {
        let mut encoders = EncoderMap::new();
        encoders.insert(TYPE_ENCODER.to_string(), type_encoder);
        Self {
            metadata,
            encoders,
            scaler,
            classifier,
        }
    }

    /// Assemble a bundle from loaded parts, checking they belong together.
    pub fn from_parts(
        metadata: BundleMetadata,
        encoders: EncoderMap,
        scaler: StandardScaler,
        classifier: RandomForest,
    ) -> Result<Self> {
        if metadata.format_version != BUNDLE_FORMAT_VERSION {
            return Err(PipelineError::artifact_load(
                "manifest",
                format!(
                    "format version {} is not supported (expected {})",
                    metadata.format_version, BUNDLE_FORMAT_VERSION
                ),
            ));
        }
        if metadata.feature_names != FEATURE_NAMES {
            return Err(PipelineError::artifact_load(
                "manifest",
                format!("feature layout {:?} does not match", metadata.feature_names),
            ));
        }
        if metadata.positive_class != 1 {
            return Err(PipelineError::artifact_load(
                "manifest",
                format!("unexpected positive class {}", metadata.positive_class),
            ));
        }

        let type_encoder = encoders.get(TYPE_ENCODER).ok_or_else(|| {
            PipelineError::artifact_load("encoder", format!("missing '{}'", TYPE_ENCODER))
        })?;
        type_encoder
            .check_integrity()
            .map_err(|e| PipelineError::artifact_load("encoder", e))?;
        scaler
            .check_integrity()
            .map_err(|e| PipelineError::artifact_load("scaler", e))?;
        classifier
            .check_integrity()
            .map_err(|e| PipelineError::artifact_load("classifier", e))?;

        Ok(Self {
            metadata,
            encoders,
            scaler,
            classifier,
        })
    }

    pub fn metadata(&self) -> &BundleMetadata {
        &self.metadata
    }

    pub fn encoders(&self) -> &EncoderMap {
        &self.encoders
    }

    /// The transaction type encoder; present in every valid bundle.
    pub fn type_encoder(&self) -> Result<&CategoryEncoder> {
        self.encoders.get(TYPE_ENCODER).ok_or_else(|| {
            PipelineError::artifact_load("encoder", format!("missing '{}'", TYPE_ENCODER))
        })
    }

    pub fn scaler(&self) -> &StandardScaler {
        &self.scaler
    }

    pub fn classifier(&self) -> &RandomForest {
        &self.classifier
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::constant_bundle;
    use super::*;
    use crate::error::ErrorKind;
    use crate::models::forest::ForestParams;

    #[test]
    fn test_metadata_defaults() {
        let metadata = BundleMetadata::new(42, 10_000, 8_000, 2_000);
        assert_eq!(metadata.format_version, BUNDLE_FORMAT_VERSION);
        assert_eq!(metadata.positive_class, 1);
        assert_eq!(metadata.feature_names, FEATURE_NAMES);
    }

    #[test]
    fn test_type_encoder_lookup() {
        let bundle = constant_bundle(0.5);
        assert_eq!(bundle.type_encoder().unwrap().len(), 4);
        assert!(bundle.encoders().contains_key(TYPE_ENCODER));
    }

    #[test]
    fn test_from_parts_requires_type_encoder() {
        let bundle = constant_bundle(0.5);
        let err = ArtifactBundle::from_parts(
            bundle.metadata().clone(),
            EncoderMap::new(),
            bundle.scaler().clone(),
            bundle.classifier().clone(),
        )
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ArtifactLoadError);
    }

    #[test]
    fn test_from_parts_rejects_version_mismatch() {
        let bundle = constant_bundle(0.5);
        let mut metadata = bundle.metadata().clone();
        metadata.format_version = BUNDLE_FORMAT_VERSION + 1;
        let err = ArtifactBundle::from_parts(
            metadata,
            bundle.encoders().clone(),
            bundle.scaler().clone(),
            bundle.classifier().clone(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("format version"));
    }

    #[test]
    fn test_from_parts_rejects_unfitted_classifier() {
        let bundle = constant_bundle(0.5);
        let err = ArtifactBundle::from_parts(
            bundle.metadata().clone(),
            bundle.encoders().clone(),
            bundle.scaler().clone(),
            RandomForest::new(ForestParams::default()),
        )
        .unwrap_err();
        match err {
            PipelineError::ArtifactLoad { artifact, .. } => assert_eq!(artifact, "classifier"),
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
