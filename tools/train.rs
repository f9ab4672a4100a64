//! Offline Training Tool
//!
//! Samples a labelled transaction log, fits the encoder, scaler and random
//! forest, prints the hold-out evaluation and publishes the artifact bundle.
//!
//! Usage: train <dataset.csv> [sample_size] [artifacts_dir]

use anyhow::{Context, Result};
use fraud_scoring_pipeline::{
    config::{AppConfig, DEFAULT_CONFIG_PATH},
    logging,
    models::ArtifactStore,
    training::Trainer,
};
use std::path::Path;
use tracing::{info, warn};

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let Some(dataset) = args.get(1) else {
        eprintln!("Usage: train <dataset.csv> [sample_size] [artifacts_dir]");
        std::process::exit(2);
    };

    let config_path =
        std::env::var("FRAUD_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    let (config, config_error) = if Path::new(&config_path).exists() {
        (AppConfig::load_from_path(&config_path)?, None)
    } else {
        (AppConfig::default(), Some(config_path.clone()))
    };
    logging::init(&config.logging, "train")?;
    if let Some(path) = config_error {
        warn!(path = %path, "Configuration file not found, using defaults");
    }

    let sample_size = match args.get(2) {
        Some(raw) => raw
            .parse::<usize>()
            .with_context(|| format!("Invalid sample size: {}", raw))?,
        None => config.training.sample_size,
    };
    let artifacts_dir = args
        .get(3)
        .cloned()
        .unwrap_or_else(|| config.artifacts.dir.clone());

    info!(
        dataset = %dataset,
        sample_size = sample_size,
        artifacts = %artifacts_dir,
        "Starting training run"
    );

    let store = ArtifactStore::new(&artifacts_dir);
    let trainer = Trainer::with_threshold(config.training.clone(), config.detection.threshold);
    let (outcome, published) = trainer
        .train_and_persist(dataset, sample_size, &store)
        .with_context(|| format!("Training on {} failed", dataset))?;

    if let Err(e) = store.prune(config.artifacts.retain) {
        warn!(error = %e, "Pruning superseded bundles failed");
    }

    println!("{}", outcome.report);
    info!(
        run_id = %outcome.bundle.metadata().run_id,
        bundle = %published.display(),
        total_rows = outcome.total_rows,
        skipped_rows = outcome.skipped_rows,
        "Training complete"
    );

    Ok(())
}
