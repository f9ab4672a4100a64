//! Classifier, artifact bundle lifecycle and scoring

pub mod bundle;
pub mod cache;
pub mod forest;
pub mod inference;
pub mod store;
pub mod tree;

pub use bundle::{ArtifactBundle, BundleMetadata};
pub use cache::BundleCache;
pub use forest::{ClassWeight, ForestParams, FraudClassifier, RandomForest};
pub use inference::{ScoreResult, ScoringEngine};
pub use store::ArtifactStore;
