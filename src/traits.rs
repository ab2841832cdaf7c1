// src/traits.rs

//! Capabilities the explainer consumes.

use crate::core::Result;
use ndarray::Array2;

/// Anything that turns a batch of texts into class probabilities.
///
/// Returns an `n x k` matrix, one row per input text in order, each row a
/// probability distribution over the `k` classes. The explainer only borrows
/// a handle and may call it from several threads at once, so implementations
/// must be safe for concurrent read-only use.
pub trait ClassifierHandle: Send + Sync {
    fn predict_proba(&self, texts: &[String]) -> Result<Array2<f64>>;
}

impl<F> ClassifierHandle for F
where
    F: Fn(&[String]) -> Result<Array2<f64>> + Send + Sync,
{
    fn predict_proba(&self, texts: &[String]) -> Result<Array2<f64>> {
        self(texts)
    }
}

/// Dense text encoder (e.g. a transformer's pooled output) used by the
/// embedding feature strategies.
pub trait TextEmbedder: Send + Sync + std::fmt::Debug {
    /// Embedding width; every row returned by [`embed`](Self::embed) has this length.
    fn dim(&self) -> usize;

    fn embed(&self, texts: &[String]) -> Result<Array2<f64>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows_for(classifier: &dyn ClassifierHandle, texts: &[String]) -> usize {
        classifier.predict_proba(texts).unwrap().nrows()
    }

    #[test]
    fn closures_are_classifiers() {
        let uniform = |texts: &[String]| -> Result<Array2<f64>> {
            Ok(Array2::from_elem((texts.len(), 2), 0.5))
        };
        let texts = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        assert_eq!(rows_for(&uniform, &texts), 3);
    }
}
