//! Detection metrics over per-sample anomaly scores.
//!
//! Convention: a higher score means "more anomalous". Every metric returns
//! `None` when the input holds no anomalous or no normal sample, since the
//! curves are undefined then.
//!
//! Scores are ranked and grouped by [`OrderedFloat`], so NaN is a valid
//! score that ranks above `+inf` and ties with other NaNs.

use ordered_float::OrderedFloat;

use crate::types::AnomalyMetrics;

/// Compute all metrics at once.
pub fn compute_metrics(scores: &[f64], is_anomalous: &[bool]) -> Option<AnomalyMetrics> {
    let roc_auc = roc_auc(scores, is_anomalous)?;
    let average_precision = average_precision(scores, is_anomalous)?;
    let (best_f1, best_threshold) = best_f1(scores, is_anomalous)?;
    Some(AnomalyMetrics {
        roc_auc,
        average_precision,
        best_f1,
        best_threshold,
    })
}

fn class_counts(is_anomalous: &[bool]) -> (usize, usize) {
    let positives = is_anomalous.iter().filter(|&&a| a).count();
    (positives, is_anomalous.len() - positives)
}

fn same_score(a: f64, b: f64) -> bool {
    OrderedFloat(a) == OrderedFloat(b)
}

/// Indices sorted by descending score, stable for ties.
fn descending_order(scores: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by_key(|&i| std::cmp::Reverse(OrderedFloat(scores[i])));
    order
}

/// ROC AUC via the rank-sum statistic; tied scores receive their average rank.
pub fn roc_auc(scores: &[f64], is_anomalous: &[bool]) -> Option<f64> {
    assert_eq!(scores.len(), is_anomalous.len(), "scores and labels must align");
    let (n_pos, n_neg) = class_counts(is_anomalous);
    if n_pos == 0 || n_neg == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by_key(|&i| OrderedFloat(scores[i]));

    let mut rank_sum_pos = 0.0;
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && same_score(scores[order[end]], scores[order[start]]) {
            end += 1;
        }
        // 1-based ranks start+1 ..= end share their mean
        let avg_rank = (start + 1 + end) as f64 / 2.0;
        for &i in &order[start..end] {
            if is_anomalous[i] {
                rank_sum_pos += avg_rank;
            }
        }
        start = end;
    }

    let n_pos = n_pos as f64;
    let n_neg = n_neg as f64;
    Some((rank_sum_pos - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg))
}

/// Average precision: `sum_k (R_k - R_{k-1}) * P_k` over distinct score thresholds.
pub fn average_precision(scores: &[f64], is_anomalous: &[bool]) -> Option<f64> {
    assert_eq!(scores.len(), is_anomalous.len(), "scores and labels must align");
    let (n_pos, _) = class_counts(is_anomalous);
    if n_pos == 0 || n_pos == is_anomalous.len() {
        return None;
    }

    let order = descending_order(scores);
    let mut ap = 0.0;
    let mut tp = 0usize;
    let mut seen = 0usize;
    let mut prev_recall = 0.0;
    let mut k = 0;
    while k < order.len() {
        let threshold = scores[order[k]];
        while k < order.len() && same_score(scores[order[k]], threshold) {
            if is_anomalous[order[k]] {
                tp += 1;
            }
            seen += 1;
            k += 1;
        }
        let precision = tp as f64 / seen as f64;
        let recall = tp as f64 / n_pos as f64;
        ap += (recall - prev_recall) * precision;
        prev_recall = recall;
    }
    Some(ap)
}

/// Best F1 over thresholds `score >= t`, with the threshold that reaches it.
///
/// Ties on F1 keep the highest threshold.
pub fn best_f1(scores: &[f64], is_anomalous: &[bool]) -> Option<(f64, f64)> {
    assert_eq!(scores.len(), is_anomalous.len(), "scores and labels must align");
    let (n_pos, n_neg) = class_counts(is_anomalous);
    if n_pos == 0 || n_neg == 0 {
        return None;
    }

    let order = descending_order(scores);
    let mut best = (0.0, scores[order[0]]);
    let mut tp = 0usize;
    let mut fp = 0usize;
    let mut k = 0;
    while k < order.len() {
        let threshold = scores[order[k]];
        while k < order.len() && same_score(scores[order[k]], threshold) {
            if is_anomalous[order[k]] {
                tp += 1;
            } else {
                fp += 1;
            }
            k += 1;
        }
        let fn_ = n_pos - tp;
        let f1 = 2.0 * tp as f64 / (2 * tp + fp + fn_) as f64;
        if f1 > best.0 {
            best = (f1, threshold);
        }
    }
    Some(best)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Reference case with hand-checked values.
    const SCORES: [f64; 4] = [0.1, 0.4, 0.35, 0.8];
    const LABELS: [bool; 4] = [false, false, true, true];

    #[test]
    fn test_roc_auc_reference() {
        let auc = roc_auc(&SCORES, &LABELS).unwrap();
        assert!((auc - 0.75).abs() < 1e-12, "Expected 0.75, got {auc}");
    }

    #[test]
    fn test_roc_auc_extremes() {
        let labels = [false, false, true, true];
        let perfect = roc_auc(&[0.0, 0.1, 0.9, 1.0], &labels).unwrap();
        assert!((perfect - 1.0).abs() < 1e-12);
        let inverted = roc_auc(&[1.0, 0.9, 0.1, 0.0], &labels).unwrap();
        assert!(inverted.abs() < 1e-12);
        let tied = roc_auc(&[0.5; 4], &labels).unwrap();
        assert!((tied - 0.5).abs() < 1e-12, "All-tied scores should give 0.5, got {tied}");
    }

    #[test]
    fn test_average_precision_reference() {
        let ap = average_precision(&SCORES, &LABELS).unwrap();
        assert!((ap - 5.0 / 6.0).abs() < 1e-12, "Expected 0.8333, got {ap}");
    }

    #[test]
    fn test_best_f1_reference() {
        let (f1, threshold) = best_f1(&SCORES, &LABELS).unwrap();
        assert!((f1 - 0.8).abs() < 1e-12, "Expected F1 0.8, got {f1}");
        assert!((threshold - 0.35).abs() < 1e-12);
    }

    #[test]
    fn test_single_class_is_undefined() {
        assert!(roc_auc(&[0.1, 0.2], &[true, true]).is_none());
        assert!(average_precision(&[0.1, 0.2], &[false, false]).is_none());
        assert!(best_f1(&[0.1, 0.2], &[false, false]).is_none());
        assert!(compute_metrics(&[], &[]).is_none());
    }

    #[test]
    fn test_nan_scores_rank_highest_and_terminate() {
        let scores = [0.1, f64::NAN, 0.3, 0.9];
        let labels = [false, true, false, true];

        let auc = roc_auc(&scores, &labels).unwrap();
        assert!((auc - 1.0).abs() < 1e-12, "Expected 1.0, got {auc}");
        let ap = average_precision(&scores, &labels).unwrap();
        assert!((ap - 1.0).abs() < 1e-12, "Expected 1.0, got {ap}");
        let (f1, threshold) = best_f1(&scores, &labels).unwrap();
        assert!((f1 - 1.0).abs() < 1e-12);
        assert!((threshold - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_tied_nan_scores_group_together() {
        let scores = [f64::NAN, f64::NAN, 0.2, 0.1];
        let labels = [true, false, true, false];
        // NaN group first: P = 1/2 at R = 1/2, then 0.2: P = 2/3 at R = 1.
        let ap = average_precision(&scores, &labels).unwrap();
        assert!((ap - (0.25 + 1.0 / 3.0)).abs() < 1e-12, "got {ap}");
        assert!(compute_metrics(&scores, &labels).is_some());
    }

    #[test]
    fn test_compute_metrics_bundles_all() {
        let m = compute_metrics(&SCORES, &LABELS).unwrap();
        assert!((m.roc_auc - 0.75).abs() < 1e-12);
        assert!((m.best_f1 - 0.8).abs() < 1e-12);
    }
}
