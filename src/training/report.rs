//! Hold-out evaluation: per-class metrics, confusion matrix and ROC AUC

use crate::error::{PipelineError, Result};
use crate::types::verdict::is_fraudulent;
use serde::Serialize;
use std::fmt;

/// Precision, recall and F1 for one class (or an average over classes)
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub support: usize,
}

/// Binary confusion matrix, rows are actual labels and columns predictions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ConfusionMatrix {
    pub true_negatives: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
    pub true_positives: usize,
}

impl ConfusionMatrix {
    pub fn from_predictions(y_true: &[u8], y_pred: &[u8]) -> Self {
        let mut matrix = Self::default();
        for (&actual, &predicted) in y_true.iter().zip(y_pred) {
            match (actual, predicted) {
                (0, 0) => matrix.true_negatives += 1,
                (0, _) => matrix.false_positives += 1,
                (_, 0) => matrix.false_negatives += 1,
                _ => matrix.true_positives += 1,
            }
        }
        matrix
    }

    pub fn total(&self) -> usize {
        self.true_negatives + self.false_positives + self.false_negatives + self.true_positives
    }

    /// Metrics for class 0 or class 1
    fn class_metrics(&self, class: u8) -> ClassMetrics {
        let (tp, fp, fn_) = if class == 1 {
            (self.true_positives, self.false_positives, self.false_negatives)
        } else {
            (self.true_negatives, self.false_negatives, self.false_positives)
        };
        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        let f1_score = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        ClassMetrics {
            precision,
            recall,
            f1_score,
            support: tp + fn_,
        }
    }
}

/// Undefined ratios count as 0.0.
fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Evaluation of a fitted classifier on the held-out partition.
///
/// Printed and logged after training; never persisted with the bundle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassificationReport {
    /// Indexed by class value
    pub classes: [ClassMetrics; 2],
    pub accuracy: f64,
    pub macro_avg: ClassMetrics,
    pub weighted_avg: ClassMetrics,
    pub confusion: ConfusionMatrix,
    /// None when the evaluated labels contain a single class
    pub roc_auc: Option<f64>,
    /// Decision threshold used for the predicted labels
    pub threshold: f64,
}

impl ClassificationReport {
    /// Evaluate fraud probabilities against true labels at `threshold`.
    pub fn evaluate(y_true: &[u8], probabilities: &[f64], threshold: f64) -> Result<Self> {
        if y_true.is_empty() || y_true.len() != probabilities.len() {
            return Err(PipelineError::Computation(format!(
                "evaluation needs matching non-empty inputs ({} labels, {} probabilities)",
                y_true.len(),
                probabilities.len()
            )));
        }
        if let Some(p) = probabilities.iter().find(|p| !p.is_finite()) {
            return Err(PipelineError::Computation(format!(
                "cannot evaluate non-finite probability {}",
                p
            )));
        }

        let y_pred: Vec<u8> = probabilities
            .iter()
            .map(|&p| u8::from(is_fraudulent(p, threshold)))
            .collect();
        let confusion = ConfusionMatrix::from_predictions(y_true, &y_pred);
        let classes = [confusion.class_metrics(0), confusion.class_metrics(1)];
        let total = confusion.total();

        let accuracy = ratio(
            confusion.true_negatives + confusion.true_positives,
            total,
        );
        let macro_avg = ClassMetrics {
            precision: (classes[0].precision + classes[1].precision) / 2.0,
            recall: (classes[0].recall + classes[1].recall) / 2.0,
            f1_score: (classes[0].f1_score + classes[1].f1_score) / 2.0,
            support: total,
        };
        let weight = |metric: fn(&ClassMetrics) -> f64| {
            classes
                .iter()
                .map(|c| metric(c) * c.support as f64)
                .sum::<f64>()
                / total as f64
        };
        let weighted_avg = ClassMetrics {
            precision: weight(|c: &ClassMetrics| c.precision),
            recall: weight(|c: &ClassMetrics| c.recall),
            f1_score: weight(|c: &ClassMetrics| c.f1_score),
            support: total,
        };

        Ok(Self {
            classes,
            accuracy,
            macro_avg,
            weighted_avg,
            confusion,
            roc_auc: roc_auc(y_true, probabilities),
            threshold,
        })
    }
}

/// Area under the ROC curve via the Mann-Whitney rank statistic.
///
/// Tied scores share their average rank.
pub fn roc_auc(y_true: &[u8], scores: &[f64]) -> Option<f64> {
    let positives = y_true.iter().filter(|&&l| l == 1).count();
    let negatives = y_true.len() - positives;
    if positives == 0 || negatives == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut positive_rank_sum = 0.0;
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && scores[order[end]] == scores[order[start]] {
            end += 1;
        }
        // ranks are 1-based; the tie group spans start+1..=end
        let average_rank = (start + 1 + end) as f64 / 2.0;
        let tied_positives = order[start..end]
            .iter()
            .filter(|&&i| y_true[i] == 1)
            .count();
        positive_rank_sum += average_rank * tied_positives as f64;
        start = end;
    }

    let p = positives as f64;
    let n = negatives as f64;
    Some((positive_rank_sum - p * (p + 1.0) / 2.0) / (p * n))
}

impl fmt::Display for ClassificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:>12} {:>9} {:>9} {:>9} {:>9}",
            "", "precision", "recall", "f1-score", "support"
        )?;
        writeln!(f)?;
        for (class, m) in self.classes.iter().enumerate() {
            write_row(f, &class.to_string(), m)?;
        }
        writeln!(f)?;
        writeln!(
            f,
            "{:>12} {:>9} {:>9} {:>9.2} {:>9}",
            "accuracy", "", "", self.accuracy, self.macro_avg.support
        )?;
        write_row(f, "macro avg", &self.macro_avg)?;
        write_row(f, "weighted avg", &self.weighted_avg)?;
        writeln!(f)?;
        writeln!(f, "Confusion matrix (threshold {:.2}):", self.threshold)?;
        writeln!(
            f,
            "  [[{:>7} {:>7}]",
            self.confusion.true_negatives, self.confusion.false_positives
        )?;
        writeln!(
            f,
            "   [{:>7} {:>7}]]",
            self.confusion.false_negatives, self.confusion.true_positives
        )?;
        match self.roc_auc {
            Some(auc) => write!(f, "ROC AUC: {:.4}", auc),
            None => write!(f, "ROC AUC: undefined (single class)"),
        }
    }
}

fn write_row(f: &mut fmt::Formatter<'_>, label: &str, m: &ClassMetrics) -> fmt::Result {
    writeln!(
        f,
        "{:>12} {:>9.2} {:>9.2} {:>9.2} {:>9}",
        label, m.precision, m.recall, m.f1_score, m.support
    )
}
