//! Random forest ensemble classifier

use crate::error::{PipelineError, Result};
use crate::feature_extractor::{FeatureVector, FEATURE_COUNT};
use crate::models::tree::{DecisionTree, TreeParams};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Fit / predict-probability contract the scoring path relies on.
///
/// `predict_proba` always returns the probability of class value 1 (fraud).
pub trait FraudClassifier {
    fn fit(&mut self, x: &[FeatureVector], y: &[u8]) -> Result<()>;

    fn predict_proba(&self, features: &FeatureVector) -> Result<f64>;

    fn predict_proba_batch(&self, rows: &[FeatureVector]) -> Result<Vec<f64>> {
        rows.iter().map(|row| self.predict_proba(row)).collect()
    }
}

/// Class weighting used to compensate for the rare fraud class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ClassWeight {
    /// `n_samples / (n_classes * count(class))`
    #[default]
    Balanced,
    /// Every sample weighs 1.0
    None,
}

/// Ensemble hyper-parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features examined per split (None = floor(sqrt(n_features)))
    pub max_features: Option<usize>,
    pub class_weight: ClassWeight,
    pub bootstrap: bool,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
            class_weight: ClassWeight::Balanced,
            bootstrap: true,
            seed: 42,
        }
    }
}

impl ForestParams {
    fn tree_params(&self) -> TreeParams {
        let max_features = self
            .max_features
            .unwrap_or_else(|| (FEATURE_COUNT as f64).sqrt().floor() as usize)
            .clamp(1, FEATURE_COUNT);

        TreeParams {
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split.max(2),
            min_samples_leaf: self.min_samples_leaf.max(1),
            max_features,
        }
    }
}

/// Bagged ensemble of weighted CART trees; probabilities are averaged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    params: ForestParams,
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    pub fn new(params: ForestParams) -> Self {
        Self {
            params,
            trees: Vec::new(),
        }
    }

    /// Assemble a forest from already grown trees.
    pub fn from_trees(params: ForestParams, trees: Vec<DecisionTree>) -> Self {
        Self { params, trees }
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    pub fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }

    /// Per-class weights for labels 0 and 1.
    pub fn class_weights(&self, y: &[u8]) -> [f64; 2] {
        match self.params.class_weight {
            ClassWeight::None => [1.0, 1.0],
            ClassWeight::Balanced => {
                let fraud = y.iter().filter(|&&l| l == 1).count() as f64;
                let legit = y.len() as f64 - fraud;
                let n = y.len() as f64;
                [n / (2.0 * legit), n / (2.0 * fraud)]
            }
        }
    }

    pub(crate) fn check_integrity(&self) -> std::result::Result<(), String> {
        if self.trees.is_empty() {
            return Err("forest has no trees".to_string());
        }
        for (i, tree) in self.trees.iter().enumerate() {
            tree.check_integrity()
                .map_err(|e| format!("tree {}: {}", i, e))?;
        }
        Ok(())
    }
}

impl FraudClassifier for RandomForest {
    fn fit(&mut self, x: &[FeatureVector], y: &[u8]) -> Result<()> {
        if x.is_empty() || x.len() != y.len() {
            return Err(PipelineError::DegenerateDataset(format!(
                "classifier needs matching non-empty inputs ({} rows, {} labels)",
                x.len(),
                y.len()
            )));
        }
        if let Some(bad) = y.iter().find(|&&l| l > 1) {
            return Err(PipelineError::DegenerateDataset(format!(
                "labels must be 0 or 1, found {}",
                bad
            )));
        }
        let fraud = y.iter().filter(|&&l| l == 1).count();
        if fraud == 0 || fraud == y.len() {
            return Err(PipelineError::DegenerateDataset(
                "training labels contain a single class".to_string(),
            ));
        }
        if self.params.n_estimators == 0 {
            return Err(PipelineError::Computation(
                "n_estimators must be at least 1".to_string(),
            ));
        }

        let class_weights = self.class_weights(y);
        let tree_params = self.params.tree_params();
        let mut master = StdRng::seed_from_u64(self.params.seed);
        let n = x.len();

        info!(
            n_estimators = self.params.n_estimators,
            rows = n,
            fraud_rows = fraud,
            max_features = tree_params.max_features,
            class_weight = ?self.params.class_weight,
            "Fitting random forest"
        );

        let mut trees = Vec::with_capacity(self.params.n_estimators);
        for t in 0..self.params.n_estimators {
            let mut rng = StdRng::seed_from_u64(master.gen());

            let mut counts = vec![0u32; n];
            if self.params.bootstrap {
                for _ in 0..n {
                    counts[rng.gen_range(0..n)] += 1;
                }
            } else {
                counts.iter_mut().for_each(|c| *c = 1);
            }

            let weights: Vec<f64> = counts
                .iter()
                .zip(y)
                .map(|(&c, &label)| c as f64 * class_weights[label as usize])
                .collect();
            let samples: Vec<usize> = (0..n).filter(|&i| counts[i] > 0).collect();

            let tree = DecisionTree::fit(x, y, &weights, samples, &tree_params, &mut rng);
            debug!(
                tree = t,
                nodes = tree.node_count(),
                depth = tree.depth(),
                "Tree grown"
            );
            trees.push(tree);
        }

        self.trees = trees;
        Ok(())
    }

    fn predict_proba(&self, features: &FeatureVector) -> Result<f64> {
        if self.trees.is_empty() {
            return Err(PipelineError::Computation(
                "classifier has not been fitted".to_string(),
            ));
        }
        let sum: f64 = self
            .trees
            .iter()
            .map(|tree| tree.predict_proba(features))
            .sum();
        let probability = sum / self.trees.len() as f64;
        if !probability.is_finite() {
            return Err(PipelineError::Computation(
                "classifier produced a non-finite probability".to_string(),
            ));
        }
        Ok(probability.clamp(0.0, 1.0))
    }
}
