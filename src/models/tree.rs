//! Weighted CART decision tree for binary fraud classification

use crate::feature_extractor::{FeatureVector, FEATURE_COUNT};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

/// Growth limits for a single tree
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TreeParams {
    /// Maximum depth (None = grow until leaves are pure)
    pub max_depth: Option<usize>,
    /// Minimum samples required to split a node
    pub min_samples_split: usize,
    /// Minimum samples in each child
    pub min_samples_leaf: usize,
    /// Non-constant features examined per split
    pub max_features: usize,
}

impl Default for TreeParams {
    fn default() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: FEATURE_COUNT,
        }
    }
}

/// Tree node stored in a flat arena; children always have larger indices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        /// Weighted fraction of the fraud class among training samples
        fraud_probability: f64,
        /// Total sample weight that reached the leaf
        weight: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

struct Candidate {
    feature: usize,
    threshold: f64,
    impurity: f64,
}

impl DecisionTree {
    /// Grow a tree on the samples listed in `samples`.
    ///
    /// `weights` is indexed by sample position in `x` and combines
    /// bootstrap multiplicity with class weights.
    pub fn fit(
        x: &[FeatureVector],
        y: &[u8],
        weights: &[f64],
        samples: Vec<usize>,
        params: &TreeParams,
        rng: &mut StdRng,
    ) -> Self {
        let mut nodes = vec![placeholder()];
        let mut stack = vec![(0usize, samples, 0usize)];

        while let Some((id, indices, depth)) = stack.pop() {
            let (w_legit, w_fraud) = class_weights(&indices, y, weights);
            let total = w_legit + w_fraud;
            let leaf = Node::Leaf {
                fraud_probability: if total > 0.0 { w_fraud / total } else { 0.0 },
                weight: total,
            };

            let depth_reached = params.max_depth.is_some_and(|max| depth >= max);
            if w_legit == 0.0
                || w_fraud == 0.0
                || depth_reached
                || indices.len() < params.min_samples_split
                || indices.len() < 2 * params.min_samples_leaf
            {
                nodes[id] = leaf;
                continue;
            }

            let Some(best) = best_split(x, y, weights, &indices, params, rng) else {
                nodes[id] = leaf;
                continue;
            };

            let (left_samples, right_samples): (Vec<usize>, Vec<usize>) = indices
                .into_iter()
                .partition(|&i| x[i][best.feature] <= best.threshold);

            let left = nodes.len();
            let right = left + 1;
            nodes.push(placeholder());
            nodes.push(placeholder());
            nodes[id] = Node::Split {
                feature: best.feature,
                threshold: best.threshold,
                left,
                right,
            };

            stack.push((right, right_samples, depth + 1));
            stack.push((left, left_samples, depth + 1));
        }

        Self { nodes }
    }

    /// Single-leaf tree returning a fixed probability.
    pub fn constant(fraud_probability: f64) -> Self {
        Self {
            nodes: vec![Node::Leaf {
                fraud_probability,
                weight: 1.0,
            }],
        }
    }

    /// Probability of the fraud class for one feature vector.
    pub fn predict_proba(&self, features: &FeatureVector) -> f64 {
        let mut id = 0;
        loop {
            match &self.nodes[id] {
                Node::Leaf {
                    fraud_probability, ..
                } => return *fraud_probability,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    id = if features[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn leaf_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf { .. }))
            .count()
    }

    pub fn depth(&self) -> usize {
        let mut max_depth = 0;
        let mut stack = vec![(0usize, 0usize)];
        while let Some((id, depth)) = stack.pop() {
            max_depth = max_depth.max(depth);
            if let Node::Split { left, right, .. } = &self.nodes[id] {
                stack.push((*left, depth + 1));
                stack.push((*right, depth + 1));
            }
        }
        max_depth
    }

    /// Structural checks for a deserialized tree; guarantees `predict_proba`
    /// terminates and stays in bounds.
    pub(crate) fn check_integrity(&self) -> Result<(), String> {
        if self.nodes.is_empty() {
            return Err("tree has no nodes".to_string());
        }
        for (id, node) in self.nodes.iter().enumerate() {
            match node {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if *feature >= FEATURE_COUNT {
                        return Err(format!("node {} splits on unknown feature {}", id, feature));
                    }
                    if !threshold.is_finite() {
                        return Err(format!("node {} has a non-finite threshold", id));
                    }
                    for child in [left, right] {
                        if *child <= id || *child >= self.nodes.len() {
                            return Err(format!("node {} has invalid child {}", id, child));
                        }
                    }
                }
                Node::Leaf {
                    fraud_probability, ..
                } => {
                    if !(0.0..=1.0).contains(fraud_probability) {
                        return Err(format!("leaf {} probability out of range", id));
                    }
                }
            }
        }
        Ok(())
    }
}

fn placeholder() -> Node {
    Node::Leaf {
        fraud_probability: 0.0,
        weight: 0.0,
    }
}

fn class_weights(indices: &[usize], y: &[u8], weights: &[f64]) -> (f64, f64) {
    indices.iter().fold((0.0, 0.0), |(legit, fraud), &i| {
        if y[i] == 1 {
            (legit, fraud + weights[i])
        } else {
            (legit + weights[i], fraud)
        }
    })
}

fn gini(w_legit: f64, w_fraud: f64) -> f64 {
    let total = w_legit + w_fraud;
    if total <= 0.0 {
        return 0.0;
    }
    let p_legit = w_legit / total;
    let p_fraud = w_fraud / total;
    1.0 - p_legit * p_legit - p_fraud * p_fraud
}

/// Search features in random order, stopping once `max_features`
/// non-constant features were examined and a valid split exists.
fn best_split(
    x: &[FeatureVector],
    y: &[u8],
    weights: &[f64],
    indices: &[usize],
    params: &TreeParams,
    rng: &mut StdRng,
) -> Option<Candidate> {
    let mut features: Vec<usize> = (0..FEATURE_COUNT).collect();
    features.shuffle(rng);

    let (total_legit, total_fraud) = class_weights(indices, y, weights);
    let mut sorted = indices.to_vec();
    let mut best: Option<Candidate> = None;
    let mut visited = 0;

    for feature in features {
        if visited >= params.max_features && best.is_some() {
            break;
        }

        sorted.sort_by(|&a, &b| x[a][feature].total_cmp(&x[b][feature]));
        let first = x[sorted[0]][feature];
        let last = x[sorted[sorted.len() - 1]][feature];
        if first == last {
            continue;
        }
        visited += 1;

        let (mut left_legit, mut left_fraud) = (0.0, 0.0);
        for pos in 0..sorted.len() - 1 {
            let i = sorted[pos];
            if y[i] == 1 {
                left_fraud += weights[i];
            } else {
                left_legit += weights[i];
            }

            let current = x[i][feature];
            let next = x[sorted[pos + 1]][feature];
            if current == next {
                continue;
            }
            let n_left = pos + 1;
            let n_right = sorted.len() - n_left;
            if n_left < params.min_samples_leaf || n_right < params.min_samples_leaf {
                continue;
            }

            let right_legit = total_legit - left_legit;
            let right_fraud = total_fraud - left_fraud;
            let impurity = (left_legit + left_fraud) * gini(left_legit, left_fraud)
                + (right_legit + right_fraud) * gini(right_legit, right_fraud);

            if best.as_ref().map_or(true, |b| impurity < b.impurity) {
                let mut threshold = current + (next - current) / 2.0;
                if threshold >= next || !threshold.is_finite() {
                    threshold = current;
                }
                best = Some(Candidate {
                    feature,
                    threshold,
                    impurity,
                });
            }
        }
    }

    best
}
