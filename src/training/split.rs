//! Seeded, label-stratified train/test split

use crate::error::{PipelineError, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Row indices of each partition
#[derive(Debug, Clone, PartialEq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

impl SplitIndices {
    /// Fraction of positive labels among `indices`
    pub fn positive_rate(labels: &[u8], indices: &[usize]) -> f64 {
        if indices.is_empty() {
            return 0.0;
        }
        let positives = indices.iter().filter(|&&i| labels[i] == 1).count();
        positives as f64 / indices.len() as f64
    }
}

/// Partition rows so each label keeps its share in both partitions.
///
/// Every class must have at least two members so it can appear on both sides.
pub fn stratified_split(labels: &[u8], test_fraction: f64, seed: u64) -> Result<SplitIndices> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(PipelineError::Computation(format!(
            "test fraction must be within (0, 1), got {}",
            test_fraction
        )));
    }

    let mut by_class: [Vec<usize>; 2] = [Vec::new(), Vec::new()];
    for (i, &label) in labels.iter().enumerate() {
        match label {
            0 | 1 => by_class[label as usize].push(i),
            other => {
                return Err(PipelineError::DegenerateDataset(format!(
                    "label {} is not binary",
                    other
                )))
            }
        }
    }

    for (class, members) in by_class.iter().enumerate() {
        if members.len() < 2 {
            return Err(PipelineError::DegenerateDataset(format!(
                "class {} has {} member(s); at least 2 are needed to stratify",
                class,
                members.len()
            )));
        }
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(labels.len());
    let mut test = Vec::new();

    for members in by_class.iter_mut() {
        members.shuffle(&mut rng);
        let n_test = ((members.len() as f64 * test_fraction).round() as usize)
            .clamp(1, members.len() - 1);
        test.extend_from_slice(&members[..n_test]);
        train.extend_from_slice(&members[n_test..]);
    }

    train.shuffle(&mut rng);
    test.shuffle(&mut rng);
    Ok(SplitIndices { train, test })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(n: usize, every: usize) -> Vec<u8> {
        (0..n).map(|i| u8::from(i % every == 0)).collect()
    }

    #[test]
    fn test_positive_rate_preserved() {
        let labels = labels(10_000, 77);
        let split = stratified_split(&labels, 0.2, 42).unwrap();
        let all: Vec<usize> = (0..labels.len()).collect();

        let overall = SplitIndices::positive_rate(&labels, &all);
        let test_rate = SplitIndices::positive_rate(&labels, &split.test);
        let train_rate = SplitIndices::positive_rate(&labels, &split.train);

        assert!((test_rate - overall).abs() <= 0.02);
        assert!((train_rate - overall).abs() <= 0.02);
        assert_eq!(split.train.len() + split.test.len(), labels.len());
        assert!((split.test.len() as f64 - 2000.0).abs() <= 2.0);
    }

    #[test]
    fn test_partitions_are_disjoint_and_complete() {
        let labels = labels(101, 4);
        let split = stratified_split(&labels, 0.2, 42).unwrap();
        let mut all: Vec<usize> = split.train.iter().chain(&split.test).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..101).collect::<Vec<_>>());
    }

    #[test]
    fn test_split_is_reproducible() {
        let labels = labels(500, 9);
        assert_eq!(
            stratified_split(&labels, 0.2, 42).unwrap(),
            stratified_split(&labels, 0.2, 42).unwrap()
        );
        assert_ne!(
            stratified_split(&labels, 0.2, 42).unwrap(),
            stratified_split(&labels, 0.2, 7).unwrap()
        );
    }

    #[test]
    fn test_rare_class_lands_in_both_partitions() {
        let mut labels = vec![0u8; 50];
        labels[3] = 1;
        labels[40] = 1;
        let split = stratified_split(&labels, 0.2, 42).unwrap();
        assert_eq!(split.test.iter().filter(|&&i| labels[i] == 1).count(), 1);
        assert_eq!(split.train.iter().filter(|&&i| labels[i] == 1).count(), 1);
    }

    #[test]
    fn test_single_member_class_rejected() {
        let mut labels = vec![0u8; 20];
        labels[0] = 1;
        assert!(stratified_split(&labels, 0.2, 42).is_err());
        assert!(stratified_split(&[0, 0, 0], 0.2, 42).is_err());
    }
}
