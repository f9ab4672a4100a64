//! Offline training run: sample, fit, evaluate, persist

use crate::config::TrainingConfig;
use crate::error::{PipelineError, Result};
use crate::feature_extractor::{FeatureExtractor, FeatureVector};
use crate::models::bundle::{ArtifactBundle, BundleMetadata};
use crate::models::forest::{FraudClassifier, RandomForest};
use crate::models::store::ArtifactStore;
use crate::preprocessing::{CategoryEncoder, StandardScaler};
use crate::training::dataset::sample_csv;
use crate::training::report::ClassificationReport;
use crate::training::split::stratified_split;
use crate::types::transaction::{LabeledTransaction, FIELD_TYPE};
use crate::types::verdict::DEFAULT_THRESHOLD;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

/// Everything a training run produces
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub bundle: ArtifactBundle,
    pub report: ClassificationReport,
    /// Usable rows in the source before sampling
    pub total_rows: usize,
    /// Malformed rows skipped while reading
    pub skipped_rows: usize,
}

/// Fits the encoder, scaler and classifier of one bundle.
pub struct Trainer {
    config: TrainingConfig,
    extractor: FeatureExtractor,
    threshold: f64,
}

impl Trainer {
    pub fn new(config: TrainingConfig) -> Self {
        Self::with_threshold(config, DEFAULT_THRESHOLD)
    }

    /// Trainer whose evaluation uses the serving threshold.
    pub fn with_threshold(config: TrainingConfig, threshold: f64) -> Self {
        Self {
            config,
            extractor: FeatureExtractor::new(),
            threshold,
        }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Train from a CSV transaction log.
    pub fn train<P: AsRef<Path>>(&self, dataset: P, sample_size: usize) -> Result<TrainingOutcome> {
        info!(
            dataset = %dataset.as_ref().display(),
            sample_size = sample_size,
            seed = self.config.seed,
            "Step 1: sampling dataset"
        );
        let sample = sample_csv(dataset, sample_size, self.config.seed)?;

        let mut outcome = self.train_rows(&sample.rows, sample_size)?;
        outcome.total_rows = sample.total_rows;
        outcome.skipped_rows = sample.skipped_rows;
        Ok(outcome)
    }

    /// Train from rows already in memory.
    pub fn train_rows(
        &self,
        rows: &[LabeledTransaction],
        sample_size: usize,
    ) -> Result<TrainingOutcome> {
        let started = Instant::now();
        if rows.is_empty() {
            return Err(PipelineError::DegenerateDataset(
                "no usable rows to train on".to_string(),
            ));
        }
        let labels: Vec<u8> = rows.iter().map(LabeledTransaction::label).collect();
        let fraud = labels.iter().filter(|&&l| l == 1).count();
        if fraud == 0 || fraud == labels.len() {
            return Err(PipelineError::DegenerateDataset(format!(
                "sample of {} rows contains a single class",
                rows.len()
            )));
        }

        let encoder = CategoryEncoder::fit(
            FIELD_TYPE,
            rows.iter().map(|r| r.record.transaction_type.as_str()),
        )?;
        info!(classes = ?encoder.classes(), "Step 2: fitted type encoder");

        info!(rows = rows.len(), fraud_rows = fraud, "Step 3: deriving features");
        let raw: Vec<FeatureVector> = rows
            .iter()
            .map(|r| self.extractor.raw_features(&r.record, &encoder))
            .collect::<Result<_>>()?;

        info!(test_fraction = self.config.test_fraction, "Step 4: stratified split");
        let split = stratified_split(&labels, self.config.test_fraction, self.config.seed)?;
        let gather = |indices: &[usize]| -> (Vec<FeatureVector>, Vec<u8>) {
            indices.iter().map(|&i| (raw[i], labels[i])).unzip()
        };
        let (x_train, y_train) = gather(&split.train);
        let (x_test, y_test) = gather(&split.test);

        info!(train_rows = x_train.len(), "Step 5: fitting scaler on training partition");
        let scaler = StandardScaler::fit(&x_train)?;
        let x_train = scaler.transform_batch(&x_train);
        let x_test = scaler.transform_batch(&x_test);

        info!(
            n_estimators = self.config.n_estimators,
            class_weight = ?self.config.class_weight,
            "Step 6: fitting classifier"
        );
        let mut classifier = RandomForest::new(self.config.forest_params());
        classifier.fit(&x_train, &y_train)?;

        info!(test_rows = x_test.len(), "Step 7: evaluating on test partition");
        let probabilities = classifier.predict_proba_batch(&x_test)?;
        let report = ClassificationReport::evaluate(&y_test, &probabilities, self.threshold)?;
        info!(
            accuracy = report.accuracy,
            fraud_precision = report.classes[1].precision,
            fraud_recall = report.classes[1].recall,
            roc_auc = ?report.roc_auc,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Evaluation complete"
        );

        let metadata = BundleMetadata::new(
            self.config.seed,
            sample_size,
            x_train.len(),
            x_test.len(),
        );
        let bundle = ArtifactBundle::new(metadata, encoder, scaler, classifier);

        Ok(TrainingOutcome {
            bundle,
            report,
            total_rows: rows.len(),
            skipped_rows: 0,
        })
    }

    /// Train, then publish the bundle; returns the published bundle directory.
    pub fn train_and_persist<P: AsRef<Path>>(
        &self,
        dataset: P,
        sample_size: usize,
        store: &ArtifactStore,
    ) -> Result<(TrainingOutcome, PathBuf)> {
        let outcome = self.train(dataset, sample_size)?;

        info!(root = %store.root().display(), "Step 8: persisting artifact bundle");
        let dir = store.save(&outcome.bundle)?;
        info!(
            run_id = %outcome.bundle.metadata().run_id,
            dir = %dir.display(),
            "Artifact bundle published"
        );
        Ok((outcome, dir))
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::{synthetic_rows, to_csv};
    use super::*;
    use crate::error::ErrorKind;
    use crate::types::transaction::TransactionRecord;
    use tempfile::TempDir;

    fn small_config() -> TrainingConfig {
        TrainingConfig {
            n_estimators: 10,
            ..TrainingConfig::default()
        }
    }

    #[test]
    fn test_train_rows_separates_synthetic_fraud() {
        let rows = synthetic_rows(400, 1);
        let outcome = Trainer::new(small_config()).train_rows(&rows, 400).unwrap();

        assert_eq!(outcome.bundle.metadata().training_rows, 320);
        assert_eq!(outcome.bundle.metadata().test_rows, 80);
        assert_eq!(outcome.bundle.classifier().trees().len(), 10);
        assert!(outcome.report.accuracy > 0.95);
        assert!(outcome.report.classes[1].recall > 0.9);
        assert_eq!(
            outcome.bundle.type_encoder().unwrap().classes(),
            ["CASH_IN", "CASH_OUT", "DEBIT", "PAYMENT", "TRANSFER"]
        );
    }

    #[test]
    fn test_training_is_reproducible() {
        let rows = synthetic_rows(200, 2);
        let trainer = Trainer::new(small_config());
        let a = trainer.train_rows(&rows, 200).unwrap();
        let b = trainer.train_rows(&rows, 200).unwrap();
        assert_eq!(a.bundle.classifier(), b.bundle.classifier());
        assert_eq!(a.bundle.scaler(), b.bundle.scaler());
        assert_eq!(a.report, b.report);
    }

    #[test]
    fn test_single_class_is_degenerate() {
        let rows: Vec<LabeledTransaction> = (0..20)
            .map(|i| {
                LabeledTransaction::new(
                    TransactionRecord::new(i as f64, "PAYMENT", 100.0, 90.0),
                    false,
                )
            })
            .collect();
        let err = Trainer::new(small_config()).train_rows(&rows, 20).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DegenerateDataset);
    }

    #[test]
    fn test_empty_sample_is_degenerate() {
        let err = Trainer::new(small_config()).train_rows(&[], 10).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DegenerateDataset);
    }

    #[test]
    fn test_train_and_persist_round_trip() {
        let dir = TempDir::new().unwrap();
        let dataset = dir.path().join("transactions.csv");
        std::fs::write(&dataset, to_csv(&synthetic_rows(300, 3))).unwrap();
        let store = ArtifactStore::new(dir.path().join("artifacts"));

        let (outcome, published) = Trainer::new(small_config())
            .train_and_persist(&dataset, 250, &store)
            .unwrap();

        assert_eq!(outcome.total_rows, 300);
        assert_eq!(outcome.bundle.metadata().sample_size, 250);
        assert_eq!(
            outcome.bundle.metadata().training_rows + outcome.bundle.metadata().test_rows,
            250
        );
        assert!(published.starts_with(store.root()));
        assert_eq!(store.load().unwrap(), outcome.bundle);
    }

    #[test]
    fn test_missing_dataset_fails() {
        let store = ArtifactStore::new(TempDir::new().unwrap().path());
        let err = Trainer::new(small_config())
            .train_and_persist("/nonexistent/log.csv", 10, &store)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DatasetReadError);
    }
}
