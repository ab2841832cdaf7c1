// src/pipeline/metrics.rs

use crate::core::{LimeError, ModelKind, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Held-out evaluation of a trained classifier.
///
/// Precision, recall and F1 are support-weighted averages over classes;
/// a class that is never predicted contributes a precision of 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    /// `confusion_matrix[true][predicted]`
    pub confusion_matrix: Vec<Vec<usize>>,
    pub support: Vec<usize>,
    /// Only for two-class problems with both classes present.
    pub roc_auc: Option<f64>,
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

/// Computes the metrics for `predicted` against `actual`.
///
/// `positive_scores` are the probabilities of class 1, used for ROC AUC.
pub fn evaluate(
    actual: &[usize],
    predicted: &[usize],
    positive_scores: Option<&[f64]>,
    n_classes: usize,
) -> Result<ClassificationMetrics> {
    if actual.len() != predicted.len() {
        return Err(LimeError::invalid_input(format!(
            "{} labels but {} predictions",
            actual.len(),
            predicted.len()
        )));
    }
    if actual.is_empty() {
        return Err(LimeError::invalid_input("cannot evaluate on zero examples"));
    }
    if actual.iter().chain(predicted).any(|&c| c >= n_classes) {
        return Err(LimeError::invalid_input(format!(
            "label out of range for {n_classes} classes"
        )));
    }

    let mut confusion = vec![vec![0usize; n_classes]; n_classes];
    for (&a, &p) in actual.iter().zip(predicted) {
        confusion[a][p] += 1;
    }
    let total = actual.len();
    let correct: usize = (0..n_classes).map(|k| confusion[k][k]).sum();
    let support: Vec<usize> = confusion.iter().map(|row| row.iter().sum()).collect();

    let (mut precision, mut recall, mut f1) = (0.0, 0.0, 0.0);
    for k in 0..n_classes {
        let tp = confusion[k][k];
        let predicted_k: usize = confusion.iter().map(|row| row[k]).sum();
        let p = ratio(tp, predicted_k);
        let r = ratio(tp, support[k]);
        let f = if p + r > 0.0 { 2.0 * p * r / (p + r) } else { 0.0 };
        let w = ratio(support[k], total);
        precision += w * p;
        recall += w * r;
        f1 += w * f;
    }

    let roc_auc = match positive_scores {
        Some(scores) if n_classes == 2 => {
            if scores.len() != actual.len() {
                return Err(LimeError::invalid_input("one score per example is required"));
            }
            let positives: Vec<bool> = actual.iter().map(|&a| a == 1).collect();
            roc_auc(&positives, scores)
        }
        _ => None,
    };

    Ok(ClassificationMetrics {
        accuracy: ratio(correct, total),
        precision,
        recall,
        f1_score: f1,
        confusion_matrix: confusion,
        support,
        roc_auc,
    })
}

/// Area under the ROC curve via the rank-sum statistic; tied scores share
/// their average rank. `None` when either class is absent.
pub fn roc_auc(positives: &[bool], scores: &[f64]) -> Option<f64> {
    let n_pos = positives.iter().filter(|&&p| p).count();
    let n_neg = positives.len() - n_pos;
    if n_pos == 0 || n_neg == 0 || scores.len() != positives.len() {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut rank_sum = 0.0;
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && scores[order[end]] == scores[order[start]] {
            end += 1;
        }
        // ranks are 1-based: positions start..end share (start + 1 + end) / 2
        let avg_rank = (start + 1 + end) as f64 / 2.0;
        rank_sum += avg_rank * order[start..end].iter().filter(|&&i| positives[i]).count() as f64;
        start = end;
    }

    let n_pos = n_pos as f64;
    Some((rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg as f64))
}

impl ClassificationMetrics {
    /// Human-readable summary with the confusion matrix.
    pub fn report<'a>(&'a self, model_name: &'a str, class_names: &'a [String]) -> MetricsReport<'a> {
        MetricsReport {
            metrics: self,
            model_name,
            class_names,
        }
    }
}

/// [`Display`](fmt::Display) view returned by [`ClassificationMetrics::report`].
pub struct MetricsReport<'a> {
    metrics: &'a ClassificationMetrics,
    model_name: &'a str,
    class_names: &'a [String],
}

impl fmt::Display for MetricsReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = self.metrics;
        writeln!(f, "{}", self.model_name)?;
        writeln!(f, "  accuracy : {:.4}", m.accuracy)?;
        writeln!(f, "  precision: {:.4}", m.precision)?;
        writeln!(f, "  recall   : {:.4}", m.recall)?;
        writeln!(f, "  f1-score : {:.4}", m.f1_score)?;
        if let Some(auc) = m.roc_auc {
            writeln!(f, "  roc-auc  : {auc:.4}")?;
        }
        writeln!(f, "  confusion matrix (rows = actual, columns = predicted):")?;
        for (k, row) in m.confusion_matrix.iter().enumerate() {
            let name = self.class_names.get(k).map(String::as_str).unwrap_or("?");
            write!(f, "    {name:>8} ")?;
            for cell in row {
                write!(f, "{cell:>6}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

/// One metric across cross-validation folds. `std` is the population
/// standard deviation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub mean: f64,
    pub std: f64,
    pub scores: Vec<f64>,
}

impl MetricSummary {
    pub fn from_scores(scores: Vec<f64>) -> Self {
        if scores.is_empty() {
            return MetricSummary { mean: 0.0, std: 0.0, scores };
        }
        let n = scores.len() as f64;
        let mean = scores.iter().sum::<f64>() / n;
        let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
        MetricSummary {
            mean,
            std: variance.sqrt(),
            scores,
        }
    }
}

/// Per-fold metrics of a stratified k-fold run, summarised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossValidation {
    pub model_type: ModelKind,
    pub folds: usize,
    pub accuracy: MetricSummary,
    pub precision: MetricSummary,
    pub recall: MetricSummary,
    pub f1_score: MetricSummary,
}

impl CrossValidation {
    pub fn from_folds(model_type: ModelKind, folds: &[ClassificationMetrics]) -> Self {
        let summary = |pick: fn(&ClassificationMetrics) -> f64| {
            MetricSummary::from_scores(folds.iter().map(pick).collect())
        };
        CrossValidation {
            model_type,
            folds: folds.len(),
            accuracy: summary(|m| m.accuracy),
            precision: summary(|m| m.precision),
            recall: summary(|m| m.recall),
            f1_score: summary(|m| m.f1_score),
        }
    }
}

impl fmt::Display for CrossValidation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} ({}-fold)", self.model_type.as_str(), self.folds)?;
        for (name, summary) in [
            ("accuracy ", &self.accuracy),
            ("precision", &self.precision),
            ("recall   ", &self.recall),
            ("f1-score ", &self.f1_score),
        ] {
            writeln!(f, "  {name}: {:.4} (+/- {:.4})", summary.mean, 2.0 * summary.std)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn perfect_predictions() {
        let y = [0, 1, 1, 0];
        let m = evaluate(&y, &y, Some(&[0.1, 0.9, 0.8, 0.2]), 2).unwrap();
        assert_eq!(m.accuracy, 1.0);
        assert_eq!(m.f1_score, 1.0);
        assert_eq!(m.roc_auc, Some(1.0));
        assert_eq!(m.confusion_matrix, vec![vec![2, 0], vec![0, 2]]);
    }

    #[test]
    fn weighted_averages_match_hand_computation() {
        let actual = [0, 0, 0, 1];
        let predicted = [0, 0, 1, 1];
        let m = evaluate(&actual, &predicted, None, 2).unwrap();
        assert_relative_eq!(m.accuracy, 0.75);
        // class 0: p = 1, r = 2/3; class 1: p = 1/2, r = 1
        assert_relative_eq!(m.precision, 0.75 * 1.0 + 0.25 * 0.5);
        assert_relative_eq!(m.recall, 0.75 * (2.0 / 3.0) + 0.25 * 1.0);
        assert_eq!(m.support, vec![3, 1]);
        assert_eq!(m.roc_auc, None);
    }

    #[test]
    fn never_predicted_class_counts_as_zero_precision() {
        let m = evaluate(&[0, 1], &[0, 0], None, 2).unwrap();
        assert_relative_eq!(m.precision, 0.5 * 0.5);
    }

    #[test]
    fn auc_handles_ties_and_missing_classes() {
        assert_eq!(roc_auc(&[true, false], &[0.5, 0.5]), Some(0.5));
        assert_eq!(roc_auc(&[true, true], &[0.1, 0.2]), None);
        assert_relative_eq!(
            roc_auc(&[false, true, false, true], &[0.1, 0.4, 0.35, 0.8]).unwrap(),
            1.0
        );
        assert_relative_eq!(
            roc_auc(&[false, true, true, false], &[0.1, 0.3, 0.35, 0.8]).unwrap(),
            0.5
        );
    }

    #[test]
    fn mismatched_inputs_fail() {
        assert!(evaluate(&[0, 1], &[0], None, 2).is_err());
        assert!(evaluate(&[], &[], None, 2).is_err());
        assert!(evaluate(&[2], &[0], None, 2).is_err());
    }

    #[test]
    fn report_lists_each_class() {
        let m = evaluate(&[0, 1], &[0, 1], None, 2).unwrap();
        let names = vec!["Real".to_string(), "Fake".to_string()];
        let text = m.report("logistic_regression", &names).to_string();
        assert!(text.contains("accuracy : 1.0000"));
        assert!(text.contains("Real      1     0"), "{text}");
        assert!(text.contains("Real"));
        assert!(text.contains("Fake"));
    }

    #[test]
    fn fold_summary_uses_population_std() {
        let fold = |accuracy: f64| ClassificationMetrics {
            accuracy,
            precision: 0.5,
            recall: accuracy,
            f1_score: 1.0,
            confusion_matrix: vec![vec![1, 0], vec![0, 1]],
            support: vec![1, 1],
            roc_auc: None,
        };
        let cv = CrossValidation::from_folds(ModelKind::NaiveBayes, &[fold(0.8), fold(1.0)]);
        assert_eq!(cv.folds, 2);
        assert_relative_eq!(cv.accuracy.mean, 0.9, epsilon = 1e-12);
        assert_relative_eq!(cv.accuracy.std, 0.1, epsilon = 1e-12);
        assert_eq!(cv.precision.std, 0.0);
        assert_eq!(cv.recall.scores, vec![0.8, 1.0]);

        let text = cv.to_string();
        assert!(text.starts_with("naive_bayes (2-fold)"), "{text}");
        assert!(text.contains("accuracy : 0.9000 (+/- 0.2000)"), "{text}");
        assert_eq!(MetricSummary::from_scores(Vec::new()).mean, 0.0);
    }
}
