// src/core/config.rs

//! Configuration for the explainer, the classification pipeline and the
//! request context.
//!
//! Uses `figment` for layered loading: defaults -> TOML file -> environment.
//! Environment variables are prefixed with `LIME_` and nested with `__`,
//! e.g. `LIME_EXPLAINER__NUM_SAMPLES=2000`.

use crate::core::{LimeError, Result};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Distance between a perturbation mask and the all-ones anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// `1 - cos(mask, ones)`, i.e. `1 - sqrt(kept / d)`.
    #[default]
    Cosine,
    /// Fraction of removed features.
    Hamming,
}

/// How perturbation masks are drawn.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SamplingScheme {
    /// Draw a removal count uniformly from `1..=d`, then remove that many
    /// distinct features chosen uniformly.
    #[default]
    UniformRemovalCount,
    /// Keep each feature independently with the given probability.
    Bernoulli { keep_probability: f64 },
}

/// Configuration for the LIME text explainer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplainerConfig {
    /// Perturbed samples per explanation, including the original document.
    pub num_samples: usize,
    /// Words reported per explanation (top-k by absolute attribution).
    pub num_features: usize,
    /// Decay of the similarity kernel with distance from the original.
    pub kernel_width: f64,
    /// Ridge penalty of the local surrogate.
    pub regularization: f64,
    pub seed: u64,
    pub distance: DistanceMetric,
    pub sampling: SamplingScheme,
    /// Perturbed texts sent to the classifier per call.
    pub classifier_batch_size: usize,
    /// Budget for sampling, scoring and fitting in milliseconds; 0 disables
    /// the limit.
    pub timeout_ms: u64,
    /// Class names in classifier column order.
    pub class_names: Vec<String>,
}

impl Default for ExplainerConfig {
    fn default() -> Self {
        ExplainerConfig {
            num_samples: 5000,
            num_features: 10,
            kernel_width: 0.25,
            regularization: 1.0,
            seed: 42,
            distance: DistanceMetric::Cosine,
            sampling: SamplingScheme::UniformRemovalCount,
            classifier_batch_size: 1000,
            timeout_ms: 120_000,
            class_names: default_class_names(),
        }
    }
}

fn timeout_from_ms(ms: u64) -> Option<Duration> {
    (ms > 0).then(|| Duration::from_millis(ms))
}

impl ExplainerConfig {
    pub fn timeout(&self) -> Option<Duration> {
        timeout_from_ms(self.timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_samples < 2 {
            return Err(LimeError::invalid_input(format!(
                "num_samples must be at least 2, got {}",
                self.num_samples
            )));
        }
        if self.num_features == 0 {
            return Err(LimeError::invalid_input("num_features must be positive"));
        }
        if !(self.kernel_width.is_finite() && self.kernel_width > 0.0) {
            return Err(LimeError::invalid_input(format!(
                "kernel_width must be a positive number, got {}",
                self.kernel_width
            )));
        }
        if !(self.regularization.is_finite() && self.regularization >= 0.0) {
            return Err(LimeError::invalid_input(format!(
                "regularization must be non-negative, got {}",
                self.regularization
            )));
        }
        if self.classifier_batch_size == 0 {
            return Err(LimeError::invalid_input("classifier_batch_size must be positive"));
        }
        if self.class_names.len() < 2 {
            return Err(LimeError::invalid_input("at least two class names are required"));
        }
        if let SamplingScheme::Bernoulli { keep_probability } = self.sampling {
            if !(keep_probability > 0.0 && keep_probability < 1.0) {
                return Err(LimeError::invalid_input(format!(
                    "keep_probability must lie in (0, 1), got {keep_probability}"
                )));
            }
        }
        Ok(())
    }
}

/// How many coalitions KernelSHAP evaluates per document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum KernelShapSamples {
    /// `2 * d + 2048` for a document of `d` words.
    #[default]
    Auto,
    Fixed(usize),
}

/// Configuration for the KernelSHAP text explainer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelShapConfig {
    /// Coalitions per document, counting the empty and the full one. Every
    /// coalition is enumerated when the budget covers them all.
    pub n_samples: KernelShapSamples,
    pub seed: u64,
    pub classifier_batch_size: usize,
    /// 0 disables the limit.
    pub timeout_ms: u64,
}

impl Default for KernelShapConfig {
    fn default() -> Self {
        Self {
            n_samples: KernelShapSamples::Auto,
            seed: 42,
            classifier_batch_size: 1000,
            timeout_ms: 120_000,
        }
    }
}

impl KernelShapConfig {
    pub fn timeout(&self) -> Option<Duration> {
        timeout_from_ms(self.timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if let KernelShapSamples::Fixed(n) = self.n_samples {
            if n < 2 {
                return Err(LimeError::invalid_input(format!(
                    "n_samples must be at least 2, got {n}"
                )));
            }
        }
        if self.classifier_batch_size == 0 {
            return Err(LimeError::invalid_input("classifier_batch_size must be positive"));
        }
        Ok(())
    }
}

/// Class labels of the news dataset: 0 = Real, 1 = Fake.
pub fn default_class_names() -> Vec<String> {
    vec!["Real".to_string(), "Fake".to_string()]
}

/// Text cleaning switches applied before vectorization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    pub remove_stopwords: bool,
    pub lowercase: bool,
    pub remove_urls: bool,
    pub remove_numbers: bool,
    pub min_word_length: usize,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            remove_stopwords: true,
            lowercase: true,
            remove_urls: true,
            remove_numbers: false,
            min_word_length: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TfidfConfig {
    pub max_features: Option<usize>,
    pub ngram_range: (usize, usize),
    /// Minimum number of documents a term must appear in.
    pub min_df: usize,
    /// Maximum fraction of documents a term may appear in.
    pub max_df: f64,
    pub sublinear_tf: bool,
    pub use_idf: bool,
}

impl Default for TfidfConfig {
    fn default() -> Self {
        Self {
            max_features: Some(5000),
            ngram_range: (1, 2),
            min_df: 2,
            max_df: 0.95,
            sublinear_tf: true,
            use_idf: true,
        }
    }
}

/// Which text representation feeds the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FeatureStrategy {
    #[default]
    Tfidf,
    /// Dense embeddings from a caller-supplied encoder.
    Embedding,
    /// TF-IDF columns followed by embedding columns.
    Combined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    #[default]
    LogisticRegression,
    NaiveBayes,
}

impl ModelKind {
    pub const ALL: [ModelKind; 2] = [ModelKind::LogisticRegression, ModelKind::NaiveBayes];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::LogisticRegression => "logistic_regression",
            ModelKind::NaiveBayes => "naive_bayes",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub kind: ModelKind,
    /// Inverse L2 strength of logistic regression.
    pub c: f64,
    pub max_iter: usize,
    pub learning_rate: f64,
    pub tolerance: f64,
    /// Additive smoothing of naive Bayes.
    pub alpha: f64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            kind: ModelKind::LogisticRegression,
            c: 1.0,
            max_iter: 1000,
            learning_rate: 1.0,
            tolerance: 1e-6,
            alpha: 1.0,
        }
    }
}

/// Training-side configuration of the classification pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub preprocess: PreprocessConfig,
    pub tfidf: TfidfConfig,
    pub features: FeatureStrategy,
    pub model: ModelConfig,
    pub test_size: f64,
    /// Folds used by cross-validation.
    pub cv_folds: usize,
    pub seed: u64,
    pub class_names: Vec<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            preprocess: PreprocessConfig::default(),
            tfidf: TfidfConfig::default(),
            features: FeatureStrategy::Tfidf,
            model: ModelConfig::default(),
            test_size: 0.2,
            cv_folds: 5,
            seed: 42,
            class_names: default_class_names(),
        }
    }
}

/// Limits applied by the request context before anything reaches the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub min_text_chars: usize,
    pub max_batch_size: usize,
    pub text_preview_chars: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            min_text_chars: 10,
            max_batch_size: 100,
            text_preview_chars: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub explainer: ExplainerConfig,
    pub shap: KernelShapConfig,
    pub pipeline: PipelineConfig,
    pub api: ApiConfig,
    pub model_dir: PathBuf,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            explainer: ExplainerConfig::default(),
            shap: KernelShapConfig::default(),
            pipeline: PipelineConfig::default(),
            api: ApiConfig::default(),
            model_dir: PathBuf::from("models"),
        }
    }
}

/// Load configuration from layered sources.
///
/// Priority (highest to lowest):
/// 1. Environment variables (prefixed with `LIME_`)
/// 2. The TOML file at `path`, when given and present
/// 3. Built-in defaults
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));

    if let Some(path) = path {
        if !path.exists() {
            return Err(LimeError::config(format!(
                "config file {} does not exist",
                path.display()
            )));
        }
        figment = figment.merge(Toml::file(path));
    }

    figment = figment.merge(Env::prefixed("LIME_").split("__"));

    let config: AppConfig = figment
        .extract()
        .map_err(|e| LimeError::config(e.to_string()))?;
    config.explainer.validate()?;
    config.shap.validate()?;
    Ok(config)
}
