//! Configuration management for the fraud scoring pipeline

use crate::models::forest::{ClassWeight, ForestParams};
use crate::types::verdict::DEFAULT_THRESHOLD;
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;

/// Default location of the configuration file
pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub nats: NatsConfig,
    pub artifacts: ArtifactsConfig,
    pub detection: DetectionConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

/// NATS connection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct NatsConfig {
    /// NATS server URL
    pub url: String,
    /// Subject scoring requests arrive on
    pub score_subject: String,
    /// Queue group shared by scoring workers
    #[serde(default = "default_queue_group")]
    pub queue_group: String,
}

fn default_queue_group() -> String {
    "fraud-scorers".to_string()
}

/// Artifact bundle location
#[derive(Debug, Clone, Deserialize)]
pub struct ArtifactsConfig {
    /// Root directory holding published bundles
    pub dir: String,
    /// Superseded bundles kept after a training run publishes a new one
    #[serde(default = "default_retain")]
    pub retain: usize,
    /// Seconds between checks of `CURRENT` by the scoring worker; 0 disables
    #[serde(default = "default_reload_interval")]
    pub reload_interval_secs: u64,
}

fn default_retain() -> usize {
    5
}

fn default_reload_interval() -> u64 {
    30
}

/// Detection configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DetectionConfig {
    /// Inclusive probability threshold for flagging fraud
    #[serde(default = "default_threshold")]
    pub threshold: f64,
}

fn default_threshold() -> f64 {
    DEFAULT_THRESHOLD
}

/// Offline training configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TrainingConfig {
    /// Maximum number of rows sampled from the dataset
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,
    /// Seed shared by sampling, splitting and the ensemble
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Fraction of the sample held out for evaluation
    #[serde(default = "default_test_fraction")]
    pub test_fraction: f64,
    /// Number of trees in the ensemble
    #[serde(default = "default_n_estimators")]
    pub n_estimators: usize,
    /// Maximum tree depth (unbounded when absent)
    #[serde(default)]
    pub max_depth: Option<usize>,
    #[serde(default = "default_min_samples_split")]
    pub min_samples_split: usize,
    #[serde(default = "default_min_samples_leaf")]
    pub min_samples_leaf: usize,
    /// "balanced" or "none"
    #[serde(default)]
    pub class_weight: ClassWeight,
}

fn default_sample_size() -> usize {
    10_000
}

fn default_seed() -> u64 {
    42
}

fn default_test_fraction() -> f64 {
    0.2
}

fn default_n_estimators() -> usize {
    100
}

fn default_min_samples_split() -> usize {
    2
}

fn default_min_samples_leaf() -> usize {
    1
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            sample_size: default_sample_size(),
            seed: default_seed(),
            test_fraction: default_test_fraction(),
            n_estimators: default_n_estimators(),
            max_depth: None,
            min_samples_split: default_min_samples_split(),
            min_samples_leaf: default_min_samples_leaf(),
            class_weight: ClassWeight::Balanced,
        }
    }
}

impl TrainingConfig {
    /// Ensemble parameters derived from this configuration
    pub fn forest_params(&self) -> ForestParams {
        ForestParams {
            n_estimators: self.n_estimators,
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            min_samples_leaf: self.min_samples_leaf,
            max_features: None,
            class_weight: self.class_weight,
            bootstrap: true,
            seed: self.seed,
        }
    }
}

/// Scoring worker configuration
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    /// Maximum concurrently scored requests
    pub workers: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl AppConfig {
    /// Load configuration from the default file
    pub fn load() -> Result<Self> {
        Self::load_from_path(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific path.
    ///
    /// `FRAUD__<SECTION>__<KEY>` environment variables override file values.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .add_source(Environment::with_prefix("FRAUD").separator("__"))
            .build()
            .context("Failed to build configuration")?;

        let config: Self = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.detection.threshold) {
            anyhow::bail!(
                "detection.threshold must be within [0, 1], got {}",
                self.detection.threshold
            );
        }
        if !(self.training.test_fraction > 0.0 && self.training.test_fraction < 1.0) {
            anyhow::bail!(
                "training.test_fraction must be within (0, 1), got {}",
                self.training.test_fraction
            );
        }
        if self.training.n_estimators == 0 {
            anyhow::bail!("training.n_estimators must be at least 1");
        }
        if self.pipeline.workers == 0 {
            anyhow::bail!("pipeline.workers must be at least 1");
        }
        Ok(())
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            nats: NatsConfig {
                url: "nats://localhost:4222".to_string(),
                score_subject: "fraud.score".to_string(),
                queue_group: default_queue_group(),
            },
            artifacts: ArtifactsConfig {
                dir: "artifacts".to_string(),
                retain: default_retain(),
                reload_interval_secs: default_reload_interval(),
            },
            detection: DetectionConfig {
                threshold: DEFAULT_THRESHOLD,
            },
            training: TrainingConfig::default(),
            pipeline: PipelineConfig { workers: 4 },
            logging: LoggingConfig {
                level: "info".to_string(),
                format: "pretty".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.nats.url, "nats://localhost:4222");
        assert_eq!(config.detection.threshold, 0.5);
        assert_eq!(config.training.sample_size, 10_000);
        assert_eq!(config.training.seed, 42);
        assert_eq!(config.training.class_weight, ClassWeight::Balanced);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_forest_params_from_training() {
        let params = TrainingConfig::default().forest_params();
        assert_eq!(params.n_estimators, 100);
        assert_eq!(params.seed, 42);
        assert!(params.bootstrap);
    }

    #[test]
    fn test_load_from_file_with_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[nats]
url = "nats://example:4222"
score_subject = "score"

[artifacts]
dir = "/tmp/artifacts"

[detection]
threshold = 0.6

[training]
n_estimators = 25
class_weight = "none"

[pipeline]
workers = 2

[logging]
level = "debug"
format = "json"
"#
        )
        .unwrap();

        let config = AppConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.nats.queue_group, "fraud-scorers");
        assert_eq!(config.detection.threshold, 0.6);
        assert_eq!(config.training.n_estimators, 25);
        assert_eq!(config.training.class_weight, ClassWeight::None);
        assert_eq!(config.training.sample_size, 10_000);
        assert_eq!(config.training.max_depth, None);
        assert_eq!(config.artifacts.retain, 5);
        assert_eq!(config.artifacts.reload_interval_secs, 30);
    }

    #[test]
    fn test_validate_rejects_bad_threshold() {
        let mut config = AppConfig::default();
        config.detection.threshold = 1.5;
        assert!(config.validate().is_err());
    }
}
