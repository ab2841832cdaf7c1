// src/algorithms/surrogate.rs

use crate::core::{DistanceMetric, LimeError, Result, SampleBatch, SurrogateModel};
use crate::utils::linalg::solve_ridge;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use tracing::{debug, warn};

/// Outputs whose spread is at or below this are treated as constant.
const ZERO_VARIANCE_TOLERANCE: f64 = 1e-12;

/// Fits a weighted ridge regression of classifier output on perturbation masks.
#[derive(Debug, Clone)]
pub struct SurrogateFitter {
    kernel_width: f64,
    regularization: f64,
    distance: DistanceMetric,
}

impl SurrogateFitter {
    pub fn new(kernel_width: f64, regularization: f64, distance: DistanceMetric) -> Result<Self> {
        if !(kernel_width.is_finite() && kernel_width > 0.0) {
            return Err(LimeError::invalid_input(format!(
                "kernel_width must be positive, got {kernel_width}"
            )));
        }
        if !(regularization.is_finite() && regularization >= 0.0) {
            return Err(LimeError::invalid_input(format!(
                "regularization must be non-negative, got {regularization}"
            )));
        }
        Ok(SurrogateFitter {
            kernel_width,
            regularization,
            distance,
        })
    }

    /// Distance of a 0/1 mask from the all-ones anchor, in `[0, 1]`.
    pub fn distance(&self, mask: ArrayView1<f64>) -> f64 {
        let d = mask.len();
        if d == 0 {
            return 0.0;
        }
        let kept: f64 = mask.sum();
        match self.distance {
            DistanceMetric::Cosine => {
                if kept <= 0.0 {
                    // zero vector: no angle, treat as maximally distant
                    1.0
                } else {
                    // cos(mask, ones) = kept / (sqrt(kept) * sqrt(d))
                    (1.0 - (kept / d as f64).sqrt()).max(0.0)
                }
            }
            DistanceMetric::Hamming => (d as f64 - kept) / d as f64,
        }
    }

    /// `exp(-distance^2 / kernel_width^2)`
    pub fn kernel(&self, distance: f64) -> f64 {
        (-(distance * distance) / (self.kernel_width * self.kernel_width)).exp()
    }

    pub fn similarity(&self, mask: ArrayView1<f64>) -> f64 {
        self.kernel(self.distance(mask))
    }

    pub fn similarity_weights(&self, masks: ArrayView2<f64>) -> Array1<f64> {
        masks.rows().into_iter().map(|row| self.similarity(row)).collect()
    }

    /// Fits the surrogate for `target_class` on a scored batch.
    ///
    /// Uses the batch's attached weights when present, otherwise computes
    /// similarity weights from the masks.
    pub fn fit(&self, batch: &SampleBatch, target_class: usize) -> Result<SurrogateModel> {
        let probabilities = batch
            .probabilities()
            .ok_or_else(|| LimeError::invalid_input("sample batch has not been scored"))?;
        if target_class >= probabilities.ncols() {
            return Err(LimeError::invalid_input(format!(
                "target class {} out of range for {} classes",
                target_class,
                probabilities.ncols()
            )));
        }
        let masks = batch.mask_matrix();
        let weights = match batch.weights() {
            Some(w) => w.clone(),
            None => self.similarity_weights(masks.view()),
        };
        let target = probabilities.column(target_class).to_owned();
        self.fit_weighted(masks.view(), target.view(), weights.view(), target_class)
    }

    fn fit_weighted(
        &self,
        features: ArrayView2<f64>,
        target: ArrayView1<f64>,
        weights: ArrayView1<f64>,
        target_class: usize,
    ) -> Result<SurrogateModel> {
        let n_samples = features.nrows();
        let n_features = features.ncols();
        if n_samples == 0 {
            return Err(LimeError::invalid_input("cannot fit a surrogate on zero samples"));
        }
        if target.len() != n_samples || weights.len() != n_samples {
            return Err(LimeError::invalid_input(format!(
                "misaligned batch: {} masks, {} targets, {} weights",
                n_samples,
                target.len(),
                weights.len()
            )));
        }

        let (min, max) = target
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &y| (lo.min(y), hi.max(y)));
        if max - min <= ZERO_VARIANCE_TOLERANCE {
            debug!(target_class, constant = target[0], "classifier output is constant");
            return Ok(SurrogateModel {
                coefficients: Array1::zeros(n_features),
                intercept: target[0],
                target_class,
                score: 1.0,
                local_prediction: target[0],
                degenerate: true,
            });
        }

        let weight_sum = weights.sum();
        if !(weight_sum.is_finite() && weight_sum > 0.0) {
            return Err(LimeError::Numerical(format!(
                "similarity weights sum to {weight_sum}"
            )));
        }

        // Centre by weighted means so the intercept is not penalized.
        let x_mean = features.t().dot(&weights) / weight_sum;
        let y_mean = target.dot(&weights) / weight_sum;
        let x_centred = &features - &x_mean.view().insert_axis(Axis(0));
        let y_centred = &target - y_mean;

        let sqrt_w = weights.mapv(f64::sqrt);
        let x_w = &x_centred * &sqrt_w.view().insert_axis(Axis(1));
        let y_w = &y_centred * &sqrt_w;

        let gram = x_w.t().dot(&x_w);
        let rhs = x_w.t().dot(&y_w);
        let coefficients = self.solve_penalized(&gram, &rhs)?;

        let intercept = y_mean - x_mean.dot(&coefficients);
        let predictions = features.dot(&coefficients) + intercept;

        let residual: f64 = weights
            .iter()
            .zip(target.iter().zip(predictions.iter()))
            .map(|(&w, (&y, &p))| w * (y - p) * (y - p))
            .sum();
        let total: f64 = weights
            .iter()
            .zip(target.iter())
            .map(|(&w, &y)| w * (y - y_mean) * (y - y_mean))
            .sum();
        let score = if total > 0.0 { 1.0 - residual / total } else { 1.0 };

        Ok(SurrogateModel {
            coefficients,
            intercept,
            target_class,
            score,
            local_prediction: predictions[0],
            degenerate: false,
        })
    }

    /// Solves the penalized normal equations, stepping up the penalty when the
    /// system is singular instead of failing.
    fn solve_penalized(&self, gram: &Array2<f64>, rhs: &Array1<f64>) -> Result<Array1<f64>> {
        let (solution, alpha) = solve_ridge(gram, rhs, self.regularization).ok_or_else(|| {
            LimeError::Numerical("surrogate system stayed singular after ridge fallback".to_string())
        })?;
        if alpha != self.regularization {
            warn!(alpha, "singular surrogate system; solved with ridge fallback");
        }
        Ok(solution)
    }
}
