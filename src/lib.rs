// src/lib.rs

//! `lime_rs` explains individual predictions of a text classifier with LIME
//! (Local Interpretable Model-agnostic Explanations), and ships the real/fake
//! news classifier it was built to explain.
//!
//! The explainer only needs something that maps texts to class probabilities:
//!
//! ```
//! use lime_rs::{ExplainerConfig, LimeTextExplainer, Result};
//! use ndarray::Array2;
//!
//! let classifier = |texts: &[String]| -> Result<Array2<f64>> {
//!     let mut p = Array2::zeros((texts.len(), 2));
//!     for (i, text) in texts.iter().enumerate() {
//!         let fake = if text.contains("shocking") { 0.9 } else { 0.2 };
//!         p[[i, 0]] = 1.0 - fake;
//!         p[[i, 1]] = fake;
//!     }
//!     Ok(p)
//! };
//!
//! let explainer = LimeTextExplainer::new(ExplainerConfig {
//!     num_samples: 500,
//!     ..Default::default()
//! })?;
//! let explanation = explainer.explain("a shocking claim about taxes", &classifier)?;
//! assert_eq!(explanation.predicted_class, "Fake");
//! assert_eq!(explanation.word_importance[0].word, "shocking");
//! # Ok::<(), lime_rs::LimeError>(())
//! ```

// Declare the main modules of the crate
pub mod algorithms;
pub mod context;
pub mod core;
pub mod pipeline;
pub mod report;
pub mod traits;
pub mod utils;

// Re-export key components for easier use by library consumers
pub use crate::algorithms::{ExplainOptions, KernelShapExplainer, LimeTextExplainer};
pub use crate::context::DetectorContext;
pub use crate::core::{
    load_config, AppConfig, Explanation, ExplainerConfig, KernelShapConfig, LimeError, Result,
    ShapExplanation, WordImportance,
};
pub use crate::pipeline::{LabeledDataset, NewsClassifier};
pub use crate::traits::{ClassifierHandle, TextEmbedder};
