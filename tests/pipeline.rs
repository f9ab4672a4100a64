//! End-to-end: train from a CSV log, publish, then score through the service.

use fraud_scoring_pipeline::config::TrainingConfig;
use fraud_scoring_pipeline::feature_extractor::{FeatureExtractor, RATIO_EPSILON};
use fraud_scoring_pipeline::types::ScoreReply;
use fraud_scoring_pipeline::{
    ArtifactStore, BundleCache, ErrorKind, ScoringService, Trainer, TransactionRecord,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

fn write_log(dir: &Path, rows: usize, seed: u64) -> PathBuf {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut csv =
        String::from("step,type,amount,nameOrig,oldbalanceOrg,newbalanceOrig,nameDest,isFraud\n");
    for i in 0..rows {
        let line = if i % 8 == 0 {
            let balance = rng.gen_range(20_000.0..400_000.0_f64).round();
            let kind = if i % 16 == 0 { "TRANSFER" } else { "CASH_OUT" };
            format!("1,{kind},{balance},C{i},{balance},0.0,M{i},1\n")
        } else {
            let balance = rng.gen_range(0.0..30_000.0_f64).round();
            let amount = rng.gen_range(1.0..800.0_f64).round();
            let (kind, after) = match i % 4 {
                0 | 1 => ("PAYMENT", (balance - amount).max(0.0)),
                2 => ("CASH_IN", balance + amount),
                _ => ("TRANSFER", (balance - amount).max(0.0)),
            };
            format!("1,{kind},{amount},C{i},{balance},{after},M{i},0\n")
        };
        csv.push_str(&line);
    }
    // one malformed row that must be skipped
    csv.push_str("1,PAYMENT,not-a-number,C0,1.0,0.0,M0,0\n");

    let path = dir.join("transactions.csv");
    std::fs::write(&path, csv).unwrap();
    path
}

fn config() -> TrainingConfig {
    TrainingConfig {
        n_estimators: 15,
        ..TrainingConfig::default()
    }
}

#[test]
fn test_train_publish_and_score() {
    let dir = TempDir::new().unwrap();
    let dataset = write_log(dir.path(), 600, 11);
    let store = ArtifactStore::new(dir.path().join("artifacts"));

    let (outcome, _) = Trainer::new(config())
        .train_and_persist(&dataset, 10_000, &store)
        .unwrap();
    assert_eq!(outcome.total_rows, 600);
    assert_eq!(outcome.skipped_rows, 1);
    assert!(outcome.report.classes[1].recall > 0.8);
    assert!(outcome.report.roc_auc.unwrap() > 0.9);

    let service = ScoringService::new(BundleCache::new(store), 0.5);
    let engine = service.engine().unwrap();

    // raw features of the reference transaction
    let record = TransactionRecord::new(5000.0, "TRANSFER", 10000.0, 5000.0);
    let encoder = engine.bundle().type_encoder().unwrap();
    let raw = FeatureExtractor::new().raw_features(&record, encoder).unwrap();
    assert_eq!(raw[0], 5000.0);
    assert_eq!(raw[1], encoder.encode("TRANSFER").unwrap() as f64);
    assert_eq!(raw[2], 10000.0);
    assert_eq!(raw[3], 5000.0);
    assert_eq!(raw[4], -5000.0 / (10000.0 + RATIO_EPSILON));

    let scored = engine.score(&record).unwrap();
    assert!((0.0..=1.0).contains(&scored.fraud_probability));
    assert_eq!(scored.is_fraudulent, scored.fraud_probability >= 0.5);

    let drained = service
        .handle(&serde_json::to_vec(&json!({
            "amount": 250000.0,
            "type": "TRANSFER",
            "oldbalanceOrg": 250000.0,
            "newbalanceOrig": 0.0
        }))
        .unwrap());
    match drained {
        ScoreReply::Scored(response) => assert!(response.is_fraudulent),
        ScoreReply::Failed(e) => panic!("unexpected failure: {e:?}"),
    }

    let unknown = service.handle(
        &serde_json::to_vec(&json!({
            "amount": 10.0,
            "type": "UNKNOWN_TYPE_XYZ",
            "oldbalanceOrg": 0.0,
            "newbalanceOrig": 0.0
        }))
        .unwrap(),
    );
    match unknown {
        ScoreReply::Failed(e) => assert_eq!(e.kind, ErrorKind::UnknownCategory),
        ScoreReply::Scored(s) => panic!("expected failure, got {s:?}"),
    }
}

#[test]
fn test_retraining_supersedes_and_reloads_consistently() {
    let dir = TempDir::new().unwrap();
    let dataset = write_log(dir.path(), 300, 5);
    let store = ArtifactStore::new(dir.path().join("artifacts"));
    let trainer = Trainer::new(config());

    let (first, first_dir) = trainer.train_and_persist(&dataset, 200, &store).unwrap();
    let (second, second_dir) = trainer.train_and_persist(&dataset, 200, &store).unwrap();

    assert_ne!(first_dir, second_dir);
    assert!(first_dir.exists());
    let loaded = store.load().unwrap();
    assert_eq!(loaded.metadata().run_id, second.bundle.metadata().run_id);
    assert_ne!(loaded.metadata().run_id, first.bundle.metadata().run_id);

    // same seed, same data: identical models in both runs
    assert_eq!(first.bundle.classifier(), second.bundle.classifier());
    assert_eq!(first.report, second.report);
}

#[test]
fn test_service_serves_retrained_bundle_after_reload() {
    let dir = TempDir::new().unwrap();
    let dataset = write_log(dir.path(), 300, 3);
    let store = ArtifactStore::new(dir.path().join("artifacts"));
    let trainer = Trainer::new(config());

    let (first, _) = trainer.train_and_persist(&dataset, 200, &store).unwrap();
    let service = ScoringService::new(BundleCache::new(store.clone()), 0.5);
    let engine = service.engine().unwrap();
    assert_eq!(engine.bundle().metadata().run_id, first.bundle.metadata().run_id);

    let (second, _) = trainer.train_and_persist(&dataset, 200, &store).unwrap();
    assert!(service.cache().reload().unwrap());
    let engine = service.engine().unwrap();
    assert_eq!(engine.bundle().metadata().run_id, second.bundle.metadata().run_id);

    assert_eq!(store.prune(0).unwrap(), 1);
    assert!(!service.cache().reload().unwrap());
    assert!(!service
        .handle(br#"{"amount":10.0,"type":"PAYMENT","oldbalanceOrg":100.0,"newbalanceOrig":90.0}"#)
        .is_error());
}

#[test]
fn test_concurrent_first_requests_share_one_bundle() {
    let dir = TempDir::new().unwrap();
    let dataset = write_log(dir.path(), 200, 9);
    let store = ArtifactStore::new(dir.path().join("artifacts"));
    Trainer::new(config())
        .train_and_persist(&dataset, 200, &store)
        .unwrap();

    let service = Arc::new(ScoringService::new(BundleCache::new(store), 0.5));
    let handles: Vec<_> = (0..8)
        .map(|_| {
            let service = service.clone();
            std::thread::spawn(move || service.cache().get_or_load().unwrap())
        })
        .collect();
    let bundles: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert!(bundles.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
}

#[test]
fn test_dataset_without_fraud_is_degenerate() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("legit.csv");
    std::fs::write(
        &path,
        "type,amount,oldbalanceOrg,newbalanceOrig,isFraud\nPAYMENT,1.0,10.0,9.0,0\nCASH_IN,2.0,0.0,2.0,0\n",
    )
    .unwrap();

    let err = Trainer::new(config()).train(&path, 100).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DegenerateDataset);
}

#[test]
fn test_missing_columns_are_reported() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("partial.csv");
    std::fs::write(&path, "type,amount,isFraud\nPAYMENT,1.0,0\n").unwrap();

    let err = Trainer::new(config()).train(&path, 100).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SchemaError);
    let message = err.to_string();
    assert!(message.contains("oldbalanceOrg"));
    assert!(message.contains("newbalanceOrig"));
}
