//! Binary classification metrics for held-out evaluation.

use crate::types::TrainingMetrics;

/// Probability cut-off used for the evaluation confusion matrix.
const EVALUATION_CUTOFF: f64 = 0.5;

/// Compute accuracy, precision, recall, F1 and AUC-ROC.
///
/// Precision/recall/F1 are 0 when their denominator is 0. AUC is `None` when
/// `labels` contains a single class.
pub fn evaluate(
    labels: &[bool],
    probabilities: &[f64],
    train_samples: usize,
) -> TrainingMetrics {
    let mut tp = 0usize;
    let mut fp = 0usize;
    let mut tn = 0usize;
    let mut fn_ = 0usize;

    for (&y, &p) in labels.iter().zip(probabilities) {
        match (y, p >= EVALUATION_CUTOFF) {
            (true, true) => tp += 1,
            (false, true) => fp += 1,
            (false, false) => tn += 1,
            (true, false) => fn_ += 1,
        }
    }

    let ratio = |num: usize, den: usize| if den == 0 { 0.0 } else { num as f64 / den as f64 };
    let precision = ratio(tp, tp + fp);
    let recall = ratio(tp, tp + fn_);
    let f1 = if precision + recall == 0.0 {
        0.0
    } else {
        2.0 * precision * recall / (precision + recall)
    };

    TrainingMetrics {
        accuracy: ratio(tp + tn, labels.len()),
        precision,
        recall,
        f1,
        auc_roc: auc_roc(labels, probabilities),
        train_samples,
        test_samples: labels.len(),
    }
}

/// Area under the ROC curve via the Mann-Whitney rank statistic.
///
/// Tied scores receive their average rank.
pub fn auc_roc(labels: &[bool], scores: &[f64]) -> Option<f64> {
    let n_pos = labels.iter().filter(|&&y| y).count();
    let n_neg = labels.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut ranks = vec![0.0; scores.len()];
    let mut start = 0;
    while start < order.len() {
        let mut end = start;
        while end + 1 < order.len() && scores[order[end + 1]] == scores[order[start]] {
            end += 1;
        }
        // 1-based ranks start+1 ..= end+1 share their mean
        let avg = (start + end) as f64 / 2.0 + 1.0;
        for &i in &order[start..=end] {
            ranks[i] = avg;
        }
        start = end + 1;
    }

    let pos_rank_sum: f64 = labels
        .iter()
        .zip(&ranks)
        .filter(|(y, _)| **y)
        .map(|(_, r)| r)
        .sum();
    let n_pos = n_pos as f64;
    let n_neg = n_neg as f64;
    Some((pos_rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg))
}
