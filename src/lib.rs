//! Fraud Scoring Pipeline Library
//!
//! Trains a random-forest fraud classifier offline from labelled transaction
//! logs, publishes it as one atomic artifact bundle, and scores individual
//! transactions against that bundle.

pub mod config;
pub mod consumer;
pub mod error;
pub mod feature_extractor;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod preprocessing;
pub mod producer;
pub mod service;
pub mod training;
pub mod types;

pub use config::AppConfig;
pub use consumer::ScoreRequestConsumer;
pub use error::{ErrorKind, PipelineError};
pub use feature_extractor::FeatureExtractor;
pub use models::{ArtifactBundle, ArtifactStore, BundleCache, ScoringEngine};
pub use producer::ReplyPublisher;
pub use service::ScoringService;
pub use training::{ClassificationReport, Trainer, TrainingOutcome};
pub use types::{ScoreReply, TransactionRecord};
