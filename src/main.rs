//! Fraud Scoring Service - Main Entry Point
//!
//! Answers NATS scoring requests with a fraud probability and decision,
//! using the artifact bundle most recently published by the `train` tool.

use anyhow::{Context, Result};
use fraud_scoring_pipeline::{
    config::AppConfig,
    consumer::ScoreRequestConsumer,
    logging,
    metrics::{MetricsReporter, ScoringMetrics},
    models::{ArtifactStore, BundleCache},
    producer::ReplyPublisher,
    service::ScoringService,
    types::ScoreReply,
};
use futures::StreamExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| fraud_scoring_pipeline::config::DEFAULT_CONFIG_PATH.to_string());
    let config = AppConfig::load_from_path(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path))?;
    logging::init(&config.logging, "fraud_scoring_pipeline")?;

    info!("Starting Fraud Scoring Service");
    info!(
        path = %config_path,
        threshold = config.detection.threshold,
        artifacts = %config.artifacts.dir,
        "Configuration loaded"
    );

    let metrics = Arc::new(ScoringMetrics::new());

    // A missing bundle is not fatal: requests report artifact_load_error
    // until a training run publishes one.
    let store = ArtifactStore::new(&config.artifacts.dir);
    let service = Arc::new(ScoringService::new(
        BundleCache::new(store),
        config.detection.threshold,
    ));
    match service.engine() {
        Ok(engine) => info!(
            run_id = %engine.bundle().metadata().run_id,
            trees = engine.bundle().classifier().trees().len(),
            "Artifact bundle loaded"
        ),
        Err(e) => warn!(error = %e, "No usable artifact bundle yet; will retry per request"),
    }

    if config.artifacts.reload_interval_secs > 0 {
        let service = service.clone();
        let period = Duration::from_secs(config.artifacts.reload_interval_secs);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            // first tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                let service = service.clone();
                match tokio::task::spawn_blocking(move || service.cache().reload()).await {
                    Ok(Ok(true)) => info!("Now serving the newly published artifact bundle"),
                    Ok(Ok(false)) => {}
                    Ok(Err(e)) => warn!(error = %e, "Artifact bundle reload failed"),
                    Err(e) => error!(error = %e, "Bundle reload task failed"),
                }
            }
        });
    }

    let client = async_nats::connect(&config.nats.url)
        .await
        .with_context(|| format!("Failed to connect to NATS at {}", config.nats.url))?;
    info!("Connected to NATS at {}", config.nats.url);

    let consumer = ScoreRequestConsumer::new(
        client.clone(),
        &config.nats.score_subject,
        &config.nats.queue_group,
    );
    let publisher = ReplyPublisher::new(client.clone());

    let num_workers = config.pipeline.workers;
    info!(workers = num_workers, "Starting request loop");

    let semaphore = Arc::new(Semaphore::new(num_workers));
    let handled_count = Arc::new(AtomicU64::new(0));

    let metrics_clone = metrics.clone();
    tokio::spawn(async move {
        let reporter = MetricsReporter::new(metrics_clone, 30);
        reporter.start().await;
    });

    let mut subscription = consumer.subscribe().await?;

    while let Some(message) = subscription.next().await {
        let permit = semaphore
            .clone()
            .acquire_owned()
            .await
            .context("Worker semaphore closed")?;

        let service = service.clone();
        let publisher = publisher.clone();
        let metrics = metrics.clone();
        let handled_count = handled_count.clone();

        tokio::spawn(async move {
            let start_time = Instant::now();
            let payload = message.payload;

            let reply = match tokio::task::spawn_blocking(move || service.handle(&payload)).await
            {
                Ok(reply) => reply,
                Err(e) => {
                    error!(error = %e, "Scoring task failed");
                    ScoreReply::aborted(e)
                }
            };
            let processing_time = start_time.elapsed();
            metrics.record_reply(&reply, processing_time);

            match message.reply {
                Some(reply_to) => {
                    if let Err(e) = publisher.publish(reply_to, &reply).await {
                        error!(error = %e, "Failed to publish scoring reply");
                    }
                }
                None => warn!("Scoring request without a reply subject; result dropped"),
            }

            let count = handled_count.fetch_add(1, Ordering::Relaxed) + 1;
            if count % 100 == 0 {
                let processing_stats = metrics.get_processing_stats();
                info!(
                    handled = count,
                    throughput = format!("{:.1} req/s", metrics.get_throughput()),
                    avg_latency_us = processing_stats.mean_us,
                    "Processing milestone"
                );
            }

            drop(permit);
        });
    }

    info!("Scoring service shutting down...");
    metrics.print_summary();

    Ok(())
}
