// src/algorithms/scoring.rs

//! Boundary calls into the classifier capability.

use crate::core::{LimeError, Result};
use crate::traits::ClassifierHandle;
use crate::utils::Deadline;
use ndarray::{concatenate, Array2, ArrayView2, Axis};

/// Allowed deviation of a probability row's sum from 1.0.
pub const ROW_SUM_TOLERANCE: f64 = 1e-3;

/// Checks that `probabilities` has `expected_rows` rows of `expected_classes`
/// finite, non-negative entries summing to 1 within [`ROW_SUM_TOLERANCE`].
pub fn validate_probabilities(
    probabilities: ArrayView2<f64>,
    expected_rows: usize,
    expected_classes: usize,
) -> Result<()> {
    if probabilities.nrows() != expected_rows {
        return Err(LimeError::contract(format!(
            "requested {} rows, classifier returned {}",
            expected_rows,
            probabilities.nrows()
        )));
    }
    if probabilities.ncols() != expected_classes {
        return Err(LimeError::contract(format!(
            "expected {} class columns, classifier returned {}",
            expected_classes,
            probabilities.ncols()
        )));
    }
    for (idx, row) in probabilities.rows().into_iter().enumerate() {
        if row.iter().any(|p| !p.is_finite() || *p < 0.0) {
            return Err(LimeError::contract(format!(
                "row {idx} contains a negative or non-finite probability"
            )));
        }
        let sum = row.sum();
        if (sum - 1.0).abs() > ROW_SUM_TOLERANCE {
            return Err(LimeError::contract(format!(
                "row {idx} sums to {sum:.6}, expected 1.0"
            )));
        }
    }
    Ok(())
}

/// Scores `texts` in chunks of `batch_size`, validating every chunk and
/// checking the deadline after each call.
pub fn score_texts<C>(
    classifier: &C,
    texts: &[String],
    expected_classes: usize,
    batch_size: usize,
    deadline: &Deadline,
) -> Result<Array2<f64>>
where
    C: ClassifierHandle + ?Sized,
{
    if batch_size == 0 {
        return Err(LimeError::invalid_input("classifier batch size must be positive"));
    }
    if texts.is_empty() {
        return Ok(Array2::zeros((0, expected_classes)));
    }

    let mut chunks = Vec::with_capacity(texts.len().div_ceil(batch_size));
    for chunk in texts.chunks(batch_size) {
        let probabilities = classifier.predict_proba(chunk)?;
        validate_probabilities(probabilities.view(), chunk.len(), expected_classes)?;
        chunks.push(probabilities);
        deadline.check("scoring")?;
    }

    if chunks.len() == 1 {
        return Ok(chunks.remove(0));
    }
    let views: Vec<ArrayView2<f64>> = chunks.iter().map(|c| c.view()).collect();
    Ok(concatenate(Axis(0), &views)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn texts(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("text {i}")).collect()
    }

    #[test]
    fn valid_rows_pass() {
        let p = array![[0.25, 0.75], [1.0, 0.0], [0.5, 0.5004]];
        assert!(validate_probabilities(p.view(), 3, 2).is_ok());
    }

    #[test]
    fn wrong_shape_or_sum_is_a_contract_error() {
        let p = array![[0.5, 0.5]];
        assert!(matches!(
            validate_probabilities(p.view(), 2, 2),
            Err(LimeError::ClassifierContract(_))
        ));
        assert!(validate_probabilities(p.view(), 1, 3).is_err());
        let unnormalized = array![[0.5, 0.4]];
        assert!(validate_probabilities(unnormalized.view(), 1, 2).is_err());
        let negative = array![[1.5, -0.5]];
        assert!(validate_probabilities(negative.view(), 1, 2).is_err());
        let nan = array![[f64::NAN, 1.0]];
        assert!(validate_probabilities(nan.view(), 1, 2).is_err());
    }

    #[test]
    fn scores_in_chunks_and_preserves_order() {
        let calls = AtomicUsize::new(0);
        let classifier = |batch: &[String]| -> Result<Array2<f64>> {
            calls.fetch_add(1, Ordering::SeqCst);
            let mut out = Array2::zeros((batch.len(), 2));
            for (i, text) in batch.iter().enumerate() {
                let n: f64 = text.trim_start_matches("text ").parse().unwrap();
                out[[i, 0]] = n / 100.0;
                out[[i, 1]] = 1.0 - n / 100.0;
            }
            Ok(out)
        };
        let scored = score_texts(&classifier, &texts(25), 2, 10, &Deadline::unlimited()).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(scored.nrows(), 25);
        assert_eq!(scored[[24, 0]], 0.24);
    }

    #[test]
    fn short_response_is_rejected() {
        let classifier = |batch: &[String]| -> Result<Array2<f64>> {
            Ok(Array2::from_elem((batch.len().saturating_sub(1), 2), 0.5))
        };
        let err = score_texts(&classifier, &texts(4), 2, 10, &Deadline::unlimited()).unwrap_err();
        assert!(matches!(err, LimeError::ClassifierContract(_)));
    }
}
