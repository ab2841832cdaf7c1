// src/core/errors.rs
use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the explainer and the classification pipeline.
///
/// A degenerate (zero-variance) surrogate fit is not an error; it is reported
/// as an [`ExplanationNote`](crate::core::ExplanationNote) on the result.
#[derive(Debug, Error)]
pub enum LimeError {
    /// Empty or too-short document, empty vocabulary, `top_k == 0`, bad options.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The classifier returned a probability matrix of the wrong shape or
    /// with rows that are not on the probability simplex.
    #[error("Classifier contract violated: {0}")]
    ClassifierContract(String),

    /// Sampling, scoring and fitting did not finish within the configured limit.
    #[error("Explanation timed out during {stage} after {elapsed:?} (limit {limit:?})")]
    Timeout {
        stage: &'static str,
        elapsed: Duration,
        limit: Duration,
    },

    #[error("Model error: {0}")]
    Model(String),

    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Numerical error: {0}")]
    Numerical(String),

    #[error("Ndarray error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl LimeError {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn contract(msg: impl Into<String>) -> Self {
        Self::ClassifierContract(msg.into())
    }

    pub fn model(msg: impl Into<String>) -> Self {
        Self::Model(msg.into())
    }

    pub fn dataset(msg: impl Into<String>) -> Self {
        Self::Dataset(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// True for the error kinds a caller caused (bad text, bad options).
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidInput(_))
    }
}

// Convenience type alias for Result
pub type Result<T> = std::result::Result<T, LimeError>;
