//! Stratified train/test splitting.
//!
//! Rows are grouped by label, each group is shuffled with a seeded RNG and a
//! `test_fraction` share of every group goes to the test split, so both splits
//! keep the class balance of the full set.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

/// Row indices of a train/test split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitIndices {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Stratified split of `labels` into train and test index sets.
///
/// Every class with at least two members contributes at least one row to each
/// split. Returned indices are sorted so downstream order depends only on the
/// seed, not on grouping.
pub fn stratified_split(labels: &[bool], test_fraction: f64, seed: u64) -> SplitIndices {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut train = Vec::new();
    let mut test = Vec::new();

    for class in [false, true] {
        let mut members: Vec<usize> = labels
            .iter()
            .enumerate()
            .filter(|(_, y)| **y == class)
            .map(|(i, _)| i)
            .collect();
        if members.is_empty() {
            continue;
        }
        members.shuffle(&mut rng);

        let n = members.len();
        let mut n_test = (n as f64 * test_fraction).round() as usize;
        if n >= 2 {
            n_test = n_test.clamp(1, n - 1);
        } else {
            n_test = 0;
        }

        test.extend_from_slice(&members[..n_test]);
        train.extend_from_slice(&members[n_test..]);
    }

    train.sort_unstable();
    test.sort_unstable();
    SplitIndices { train, test }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preserves_class_balance() {
        let labels: Vec<bool> = (0..100).map(|i| i % 4 == 0).collect();
        let split = stratified_split(&labels, 0.2, 42);

        assert_eq!(split.test.len(), 20);
        assert_eq!(split.train.len(), 80);
        let test_pos = split.test.iter().filter(|&&i| labels[i]).count();
        assert_eq!(test_pos, 5);
    }

    #[test]
    fn test_splits_are_disjoint_and_complete() {
        let labels: Vec<bool> = (0..37).map(|i| i % 3 == 0).collect();
        let split = stratified_split(&labels, 0.25, 7);
        let mut all: Vec<usize> = split.train.iter().chain(&split.test).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..37).collect::<Vec<_>>());
    }

    #[test]
    fn test_same_seed_same_split() {
        let labels: Vec<bool> = (0..50).map(|i| i % 2 == 0).collect();
        assert_eq!(
            stratified_split(&labels, 0.2, 42),
            stratified_split(&labels, 0.2, 42)
        );
        assert_ne!(
            stratified_split(&labels, 0.2, 42),
            stratified_split(&labels, 0.2, 43)
        );
    }

    #[test]
    fn test_small_classes_keep_a_test_row() {
        let labels = vec![true, true, false, false, false, false, false, false];
        let split = stratified_split(&labels, 0.2, 42);
        assert!(split.test.iter().any(|&i| labels[i]));
        assert!(split.train.iter().any(|&i| labels[i]));
    }
}
