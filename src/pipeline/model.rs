// src/pipeline/model.rs

//! Probabilistic classifiers trained on sparse feature rows.

use crate::core::{LimeError, ModelConfig, ModelKind, Result};
use crate::pipeline::features::FeatureRows;
use ndarray::{Array1, Array2, ArrayViewMut1, Axis};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// In-place softmax of one row of scores.
fn softmax_in_place(mut row: ArrayViewMut1<f64>) {
    let max = row.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    row.mapv_inplace(|s| (s - max).exp());
    let sum = row.sum();
    row.mapv_inplace(|p| p / sum);
}

fn check_training_data(x: &FeatureRows, y: &[usize], n_classes: usize) -> Result<()> {
    if x.is_empty() {
        return Err(LimeError::dataset("cannot train on zero examples"));
    }
    if x.len() != y.len() {
        return Err(LimeError::dataset(format!(
            "{} feature rows but {} labels",
            x.len(),
            y.len()
        )));
    }
    if n_classes < 2 {
        return Err(LimeError::dataset("at least two classes are required"));
    }
    if let Some(bad) = y.iter().find(|&&label| label >= n_classes) {
        return Err(LimeError::dataset(format!(
            "label {bad} out of range for {n_classes} classes"
        )));
    }
    Ok(())
}

/// Multinomial logistic regression with an L2 penalty of strength `1 / c`,
/// trained by full-batch gradient descent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    c: f64,
    max_iter: usize,
    learning_rate: f64,
    tolerance: f64,
    /// `n_classes x dim`
    weights: Array2<f64>,
    bias: Array1<f64>,
    iterations: usize,
}

impl LogisticRegression {
    pub fn new(c: f64, max_iter: usize, learning_rate: f64, tolerance: f64) -> Self {
        LogisticRegression {
            c,
            max_iter,
            learning_rate,
            tolerance,
            weights: Array2::zeros((0, 0)),
            bias: Array1::zeros(0),
            iterations: 0,
        }
    }

    pub fn weights(&self) -> &Array2<f64> {
        &self.weights
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    fn scores(&self, x: &FeatureRows) -> Array2<f64> {
        let mut scores = Array2::zeros((x.len(), self.bias.len()));
        for (i, row) in x.rows.iter().enumerate() {
            for (k, w) in self.weights.outer_iter().enumerate() {
                scores[[i, k]] = self.bias[k] + row.dot(w);
            }
        }
        scores
    }

    pub fn fit(&mut self, x: &FeatureRows, y: &[usize], n_classes: usize) -> Result<()> {
        check_training_data(x, y, n_classes)?;
        if !(self.c > 0.0) {
            return Err(LimeError::config(format!("c must be positive, got {}", self.c)));
        }
        let n = x.len() as f64;
        let penalty = 1.0 / (self.c * n);
        self.weights = Array2::zeros((n_classes, x.dim));
        self.bias = Array1::zeros(n_classes);

        let mut previous_loss = f64::INFINITY;
        let mut converged = false;
        for iter in 0..self.max_iter {
            let mut probs = self.scores(x);
            probs.axis_iter_mut(Axis(0)).for_each(softmax_in_place);

            let mut loss = 0.5 * penalty * self.weights.iter().map(|w| w * w).sum::<f64>();
            let mut grad_w = &self.weights * penalty;
            let mut grad_b = Array1::zeros(n_classes);
            for (i, row) in x.rows.iter().enumerate() {
                loss -= probs[[i, y[i]]].max(1e-300).ln() / n;
                for k in 0..n_classes {
                    let diff = (probs[[i, k]] - if y[i] == k { 1.0 } else { 0.0 }) / n;
                    grad_b[k] += diff;
                    for (j, v) in row.iter() {
                        grad_w[[k, j]] += diff * v;
                    }
                }
            }

            self.weights.scaled_add(-self.learning_rate, &grad_w);
            self.bias.scaled_add(-self.learning_rate, &grad_b);
            self.iterations = iter + 1;

            if (previous_loss - loss).abs() < self.tolerance {
                converged = true;
                break;
            }
            previous_loss = loss;
        }

        if !converged {
            warn!(
                max_iter = self.max_iter,
                "logistic regression did not converge; consider raising max_iter"
            );
        }
        debug!(
            iterations = self.iterations,
            classes = n_classes,
            dim = x.dim,
            "trained logistic regression"
        );
        Ok(())
    }

    pub fn predict_proba(&self, x: &FeatureRows) -> Result<Array2<f64>> {
        if self.bias.is_empty() {
            return Err(LimeError::model("logistic regression has not been trained"));
        }
        if x.dim != self.weights.ncols() {
            return Err(LimeError::model(format!(
                "model expects {} features, got {}",
                self.weights.ncols(),
                x.dim
            )));
        }
        let mut probs = self.scores(x);
        probs.axis_iter_mut(Axis(0)).for_each(softmax_in_place);
        Ok(probs)
    }
}

/// Multinomial naive Bayes with additive smoothing. Features must be
/// non-negative (counts or tf-idf weights).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NaiveBayes {
    alpha: f64,
    class_log_prior: Array1<f64>,
    /// `n_classes x dim`
    feature_log_prob: Array2<f64>,
}

impl NaiveBayes {
    pub fn new(alpha: f64) -> Self {
        NaiveBayes {
            alpha,
            class_log_prior: Array1::zeros(0),
            feature_log_prob: Array2::zeros((0, 0)),
        }
    }

    /// `n_classes x dim` smoothed log-likelihoods of each feature.
    pub fn feature_log_prob(&self) -> &Array2<f64> {
        &self.feature_log_prob
    }

    pub fn fit(&mut self, x: &FeatureRows, y: &[usize], n_classes: usize) -> Result<()> {
        check_training_data(x, y, n_classes)?;
        if !(self.alpha > 0.0) {
            return Err(LimeError::config(format!(
                "alpha must be positive, got {}",
                self.alpha
            )));
        }

        let mut class_counts = Array1::<f64>::zeros(n_classes);
        let mut feature_counts = Array2::<f64>::zeros((n_classes, x.dim));
        for (row, &label) in x.rows.iter().zip(y) {
            class_counts[label] += 1.0;
            for (j, v) in row.iter() {
                if v < 0.0 {
                    return Err(LimeError::model(
                        "naive Bayes requires non-negative features",
                    ));
                }
                feature_counts[[label, j]] += v;
            }
        }
        if let Some(empty) = class_counts.iter().position(|&c| c == 0.0) {
            return Err(LimeError::dataset(format!(
                "class {empty} has no training examples"
            )));
        }

        let total = class_counts.sum();
        self.class_log_prior = class_counts.mapv(|c| (c / total).ln());
        let smoothed = feature_counts + self.alpha;
        let row_totals = smoothed.sum_axis(Axis(1));
        self.feature_log_prob = Array2::from_shape_fn(smoothed.dim(), |(k, j)| {
            (smoothed[[k, j]] / row_totals[k]).ln()
        });
        debug!(classes = n_classes, dim = x.dim, "trained naive Bayes");
        Ok(())
    }

    pub fn predict_proba(&self, x: &FeatureRows) -> Result<Array2<f64>> {
        if self.class_log_prior.is_empty() {
            return Err(LimeError::model("naive Bayes has not been trained"));
        }
        if x.dim != self.feature_log_prob.ncols() {
            return Err(LimeError::model(format!(
                "model expects {} features, got {}",
                self.feature_log_prob.ncols(),
                x.dim
            )));
        }
        let n_classes = self.class_log_prior.len();
        let mut joint = Array2::zeros((x.len(), n_classes));
        for (i, row) in x.rows.iter().enumerate() {
            for k in 0..n_classes {
                joint[[i, k]] = self.class_log_prior[k] + row.dot(self.feature_log_prob.row(k));
            }
        }
        joint.axis_iter_mut(Axis(0)).for_each(softmax_in_place);
        Ok(joint)
    }
}

/// The trainable models the pipeline can serve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Model {
    LogisticRegression(LogisticRegression),
    NaiveBayes(NaiveBayes),
}

impl Model {
    pub fn from_config(config: &ModelConfig) -> Self {
        match config.kind {
            ModelKind::LogisticRegression => Model::LogisticRegression(LogisticRegression::new(
                config.c,
                config.max_iter,
                config.learning_rate,
                config.tolerance,
            )),
            ModelKind::NaiveBayes => Model::NaiveBayes(NaiveBayes::new(config.alpha)),
        }
    }

    pub fn kind(&self) -> ModelKind {
        match self {
            Model::LogisticRegression(_) => ModelKind::LogisticRegression,
            Model::NaiveBayes(_) => ModelKind::NaiveBayes,
        }
    }

    /// Per-class weight of every feature, `n_classes x dim`: logistic
    /// coefficients or naive Bayes log-likelihoods. Empty before training.
    pub fn feature_weights(&self) -> &Array2<f64> {
        match self {
            Model::LogisticRegression(m) => m.weights(),
            Model::NaiveBayes(m) => m.feature_log_prob(),
        }
    }

    /// Gradient steps taken by the last fit, for iterative models.
    pub fn iterations(&self) -> Option<usize> {
        match self {
            Model::LogisticRegression(m) => Some(m.iterations()),
            Model::NaiveBayes(_) => None,
        }
    }

    pub fn fit(&mut self, x: &FeatureRows, y: &[usize], n_classes: usize) -> Result<()> {
        match self {
            Model::LogisticRegression(m) => m.fit(x, y, n_classes),
            Model::NaiveBayes(m) => m.fit(x, y, n_classes),
        }
    }

    /// One row per input, columns in class order, each row summing to 1.
    pub fn predict_proba(&self, x: &FeatureRows) -> Result<Array2<f64>> {
        match self {
            Model::LogisticRegression(m) => m.predict_proba(x),
            Model::NaiveBayes(m) => m.predict_proba(x),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::features::SparseRow;
    use approx::assert_relative_eq;

    /// Class 1 rows load on feature 0, class 0 rows on feature 1.
    fn separable() -> (FeatureRows, Vec<usize>) {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..20 {
            let label = i % 2;
            let strong = if label == 1 { 0 } else { 1 };
            rows.push(SparseRow {
                indices: vec![strong, 2],
                values: vec![0.9, 0.1 + (i as f64) / 100.0],
            });
            labels.push(label);
        }
        (FeatureRows { rows, dim: 3 }, labels)
    }

    fn assert_rows_sum_to_one(p: &Array2<f64>) {
        for row in p.rows() {
            assert_relative_eq!(row.sum(), 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn logistic_regression_separates_classes() {
        let (x, y) = separable();
        let mut model = Model::from_config(&ModelConfig::default());
        model.fit(&x, &y, 2).unwrap();
        let p = model.predict_proba(&x).unwrap();
        assert_rows_sum_to_one(&p);
        for (i, &label) in y.iter().enumerate() {
            assert!(p[[i, label]] > 0.5, "row {i} misclassified: {:?}", p.row(i));
        }
    }

    #[test]
    fn weights_put_each_class_on_its_own_feature() {
        let (x, y) = separable();
        for kind in ModelKind::ALL {
            let mut model = Model::from_config(&ModelConfig { kind, ..Default::default() });
            assert_eq!(model.feature_weights().dim(), (0, 0));
            model.fit(&x, &y, 2).unwrap();
            let w = model.feature_weights();
            assert_eq!(w.dim(), (2, 3));
            assert!(w[[1, 0]] > w[[0, 0]], "{kind:?}: {w:?}");
            assert!(w[[0, 1]] > w[[1, 1]], "{kind:?}: {w:?}");
        }
    }

    #[test]
    fn only_gradient_models_report_iterations() {
        let (x, y) = separable();
        let mut lr = Model::from_config(&ModelConfig { max_iter: 7, tolerance: 0.0, ..Default::default() });
        lr.fit(&x, &y, 2).unwrap();
        assert_eq!(lr.iterations(), Some(7));
        let nb = Model::from_config(&ModelConfig { kind: ModelKind::NaiveBayes, ..Default::default() });
        assert_eq!(nb.iterations(), None);
    }

    #[test]
    fn naive_bayes_separates_classes() {
        let (x, y) = separable();
        let mut model = Model::from_config(&ModelConfig {
            kind: ModelKind::NaiveBayes,
            ..Default::default()
        });
        model.fit(&x, &y, 2).unwrap();
        let p = model.predict_proba(&x).unwrap();
        assert_rows_sum_to_one(&p);
        assert!(p[[0, 0]] > 0.5);
        assert!(p[[1, 1]] > 0.5);
    }

    #[test]
    fn empty_rows_still_produce_distributions() {
        let (x, y) = separable();
        for kind in ModelKind::ALL {
            let mut model = Model::from_config(&ModelConfig { kind, ..Default::default() });
            model.fit(&x, &y, 2).unwrap();
            let blank = FeatureRows {
                rows: vec![SparseRow::default()],
                dim: 3,
            };
            let p = model.predict_proba(&blank).unwrap();
            assert_rows_sum_to_one(&p);
            assert_eq!(model.kind(), kind);
        }
    }

    #[test]
    fn rejects_bad_training_data() {
        let (x, y) = separable();
        let mut model = Model::from_config(&ModelConfig::default());
        assert!(matches!(model.fit(&x, &y[..3], 2), Err(LimeError::Dataset(_))));
        assert!(model.fit(&x, &vec![3; y.len()], 2).is_err());
        assert!(matches!(model.predict_proba(&x), Err(LimeError::Model(_))));

        let mut nb = NaiveBayes::new(1.0);
        assert!(matches!(nb.fit(&x, &vec![0; y.len()], 2), Err(LimeError::Dataset(_))));
    }

    #[test]
    fn dimension_mismatch_is_reported() {
        let (x, y) = separable();
        let mut model = Model::from_config(&ModelConfig::default());
        model.fit(&x, &y, 2).unwrap();
        let wide = FeatureRows { rows: vec![SparseRow::default()], dim: 7 };
        assert!(model.predict_proba(&wide).is_err());
    }

    #[test]
    fn serde_keeps_the_model_kind() {
        let (x, y) = separable();
        let mut model = Model::from_config(&ModelConfig {
            kind: ModelKind::NaiveBayes,
            ..Default::default()
        });
        model.fit(&x, &y, 2).unwrap();
        let json = serde_json::to_string(&model).unwrap();
        assert!(json.contains("\"kind\":\"naive_bayes\""));
        let restored: Model = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.kind(), ModelKind::NaiveBayes);
        let before = model.predict_proba(&x).unwrap();
        let after = restored.predict_proba(&x).unwrap();
        for (a, b) in before.iter().zip(after.iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-12);
        }
    }
}
