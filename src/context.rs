// src/context.rs

//! Request-level entry points over one loaded classifier.
//!
//! A [`DetectorContext`] is built once and shared read-only; every operation
//! validates its input before anything reaches the model.

use crate::algorithms::assembler::argmax;
use crate::algorithms::{ExplainOptions, KernelShapExplainer, LimeTextExplainer};
use crate::core::{
    ApiConfig, AppConfig, Explanation, ExplainerConfig, FeatureStrategy, KernelShapConfig, LimeError, ModelKind,
    Result, ShapExplanation,
};
use crate::pipeline::{ClassificationMetrics, NewsClassifier};
use crate::traits::TextEmbedder;
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub model_loaded: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub model_type: ModelKind,
    pub feature_strategy: FeatureStrategy,
    pub is_trained: bool,
    pub classes: Vec<String>,
    pub num_features: usize,
    pub training_samples: usize,
    pub trained_at: DateTime<Utc>,
    pub metrics: Option<ClassificationMetrics>,
}

/// A single prediction without explanation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub predicted_class: String,
    pub predicted_index: usize,
    pub confidence: f64,
    pub probabilities: BTreeMap<String, f64>,
}

/// One entry of a batch classification; invalid texts fail alone.
#[derive(Debug)]
pub struct BatchClassification {
    /// Input text cut to the configured preview length.
    pub preview: String,
    pub outcome: Result<Classification>,
}

/// Shortens `text` to `max_chars` characters, marking the cut with `...`.
pub fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[derive(Debug, Clone)]
pub struct DetectorContext {
    classifier: Arc<NewsClassifier>,
    explainer: LimeTextExplainer,
    shap: KernelShapExplainer,
    api: ApiConfig,
}

impl DetectorContext {
    /// The explainer's class names are taken from the classifier so that
    /// probability columns and names always line up.
    pub fn new(classifier: Arc<NewsClassifier>, explainer: ExplainerConfig, api: ApiConfig) -> Result<Self> {
        let explainer = LimeTextExplainer::new(ExplainerConfig {
            class_names: classifier.class_names().to_vec(),
            ..explainer
        })?;
        let shap = KernelShapExplainer::new(KernelShapConfig::default(), classifier.class_names().to_vec())?;
        Ok(DetectorContext {
            classifier,
            explainer,
            shap,
            api,
        })
    }

    /// Replaces the KernelSHAP settings.
    pub fn with_shap_config(mut self, config: KernelShapConfig) -> Result<Self> {
        self.shap = KernelShapExplainer::new(config, self.classifier.class_names().to_vec())?;
        Ok(self)
    }

    /// Loads the classifier saved under `config.model_dir`.
    pub fn from_config(config: &AppConfig, embedder: Option<Arc<dyn TextEmbedder>>) -> Result<Self> {
        let classifier = NewsClassifier::load(&config.model_dir, embedder)?;
        info!(
            model_dir = %config.model_dir.display(),
            model = classifier.model_kind().as_str(),
            "detector context ready"
        );
        Self::new(Arc::new(classifier), config.explainer.clone(), config.api.clone())?
            .with_shap_config(config.shap.clone())
    }

    pub fn classifier(&self) -> &Arc<NewsClassifier> {
        &self.classifier
    }

    pub fn explainer(&self) -> &LimeTextExplainer {
        &self.explainer
    }

    pub fn shap(&self) -> &KernelShapExplainer {
        &self.shap
    }

    pub fn api(&self) -> &ApiConfig {
        &self.api
    }

    pub fn health(&self) -> HealthStatus {
        HealthStatus {
            status: "healthy".to_string(),
            model_loaded: true,
        }
    }

    pub fn model_info(&self) -> ModelInfo {
        let metadata = self.classifier.metadata();
        ModelInfo {
            model_type: metadata.model_type,
            feature_strategy: metadata.feature_strategy,
            is_trained: true,
            classes: metadata.class_names.clone(),
            num_features: metadata.num_features,
            training_samples: metadata.training_samples,
            trained_at: metadata.trained_at,
            metrics: metadata.metrics.clone(),
        }
    }

    fn validate_text<'a>(&self, text: &'a str) -> Result<&'a str> {
        let trimmed = text.trim();
        if trimmed.chars().count() < self.api.min_text_chars {
            return Err(LimeError::invalid_input(format!(
                "text must be at least {} characters long",
                self.api.min_text_chars
            )));
        }
        Ok(trimmed)
    }

    fn validate_batch(&self, texts: &[String]) -> Result<()> {
        if texts.is_empty() {
            return Err(LimeError::invalid_input("texts must be a non-empty list"));
        }
        if texts.len() > self.api.max_batch_size {
            return Err(LimeError::invalid_input(format!(
                "at most {} texts per batch, got {}",
                self.api.max_batch_size,
                texts.len()
            )));
        }
        Ok(())
    }

    fn to_classification(&self, probabilities: ndarray::ArrayView1<f64>) -> Result<Classification> {
        let names = self.classifier.class_names();
        let predicted = argmax(probabilities)
            .ok_or_else(|| LimeError::contract("classifier produced an empty probability row"))?;
        Ok(Classification {
            predicted_class: names[predicted].clone(),
            predicted_index: predicted,
            confidence: probabilities[predicted],
            probabilities: names.iter().cloned().zip(probabilities.iter().copied()).collect(),
        })
    }

    pub fn classify(&self, text: &str) -> Result<Classification> {
        let text = self.validate_text(text)?;
        let probabilities = self.classifier.predict_proba(&[text.to_string()])?;
        self.to_classification(probabilities.row(0))
    }

    /// Classifies up to `max_batch_size` texts with one model call. Texts that
    /// fail validation are reported in place.
    pub fn classify_batch(&self, texts: &[String]) -> Result<Vec<BatchClassification>> {
        self.validate_batch(texts)?;

        let validated: Vec<Result<&str>> = texts.iter().map(|t| self.validate_text(t)).collect();
        let valid: Vec<String> = validated
            .iter()
            .filter_map(|v| v.as_ref().ok().map(|t| t.to_string()))
            .collect();
        let probabilities = if valid.is_empty() {
            None
        } else {
            Some(self.classifier.predict_proba(&valid)?)
        };

        let mut next_row = 0;
        let results = texts
            .iter()
            .zip(validated)
            .map(|(text, check)| {
                let outcome = match (check, probabilities.as_ref()) {
                    (Ok(_), Some(p)) => {
                        let row = p.row(next_row);
                        next_row += 1;
                        self.to_classification(row)
                    }
                    (Ok(_), None) => Err(LimeError::contract("no scores for a valid text")),
                    (Err(e), _) => Err(e),
                };
                BatchClassification {
                    preview: preview(text, self.api.text_preview_chars),
                    outcome,
                }
            })
            .collect();
        debug!(total = texts.len(), scored = valid.len(), "classified batch");
        Ok(results)
    }

    /// Explains the predicted class of `text`, reporting `num_features` words
    /// (the configured default when `None`).
    pub fn explain(&self, text: &str, num_features: Option<usize>) -> Result<Explanation> {
        let options = ExplainOptions {
            num_features,
            ..Default::default()
        };
        self.explain_with(text, options)
    }

    pub fn explain_with(&self, text: &str, options: ExplainOptions) -> Result<Explanation> {
        let text = self.validate_text(text)?;
        self.explainer.explain_with(text, self.classifier.as_ref(), options)
    }

    /// Explains every text in parallel; each entry succeeds or fails alone.
    ///
    /// Text `i` of the request is sampled with seed `seed + i`, whether or not
    /// the texts before it were valid.
    pub fn explain_batch(&self, texts: &[String], num_features: Option<usize>) -> Result<Vec<Result<Explanation>>> {
        self.validate_batch(texts)?;
        let options = ExplainOptions {
            num_features,
            ..Default::default()
        };
        let base_seed = self.explainer.config().seed;
        Ok(texts
            .par_iter()
            .enumerate()
            .map(|(idx, text)| self.explain_with(text, options.with_seed(base_seed.wrapping_add(idx as u64))))
            .collect())
    }

    /// KernelSHAP values for the predicted class of `text`; the ranking is cut
    /// to `num_features` words when given.
    pub fn explain_shap(&self, text: &str, num_features: Option<usize>) -> Result<ShapExplanation> {
        let text = self.validate_text(text)?;
        let mut explanation = self.shap.shap_values(text, self.classifier.as_ref(), None)?;
        if let Some(n) = num_features {
            if n == 0 {
                return Err(LimeError::invalid_input("num_features must be positive"));
            }
            explanation.word_importance.truncate(n);
        }
        Ok(explanation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{PipelineConfig, TfidfConfig};
    use crate::pipeline::LabeledDataset;
    use std::sync::OnceLock;

    fn classifier() -> Arc<NewsClassifier> {
        static TRAINED: OnceLock<Arc<NewsClassifier>> = OnceLock::new();
        TRAINED
            .get_or_init(|| {
                let config = PipelineConfig {
                    tfidf: TfidfConfig {
                        min_df: 1,
                        ..Default::default()
                    },
                    ..Default::default()
                };
                let data = LabeledDataset::synthetic(200, 42);
                Arc::new(NewsClassifier::fit(&data, &config, None).unwrap())
            })
            .clone()
    }

    fn context() -> DetectorContext {
        let explainer = ExplainerConfig {
            num_samples: 300,
            ..Default::default()
        };
        DetectorContext::new(classifier(), explainer, ApiConfig::default()).unwrap()
    }

    #[test]
    fn preview_cuts_on_characters() {
        assert_eq!(preview("short", 10), "short");
        assert_eq!(preview("ééééé", 3), "ééé...");
        assert_eq!(preview("exactly", 7), "exactly");
    }

    #[test]
    fn classify_rejects_short_text() {
        let ctx = context();
        assert!(matches!(ctx.classify("  tiny  "), Err(LimeError::InvalidInput(_))));
        let result = ctx
            .classify("SHOCKING: Government hides economy from public!")
            .unwrap();
        assert_eq!(result.predicted_class, "Fake");
        assert!((result.probabilities.values().sum::<f64>() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn batch_reports_invalid_items_in_place() {
        let ctx = context();
        let texts = vec![
            "Study finds climate may impact growth rates".to_string(),
            "short".to_string(),
            "x".repeat(150),
        ];
        let results = ctx.classify_batch(&texts).unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].outcome.as_ref().unwrap().predicted_class, "Real");
        assert!(matches!(results[1].outcome, Err(LimeError::InvalidInput(_))));
        assert!(results[2].outcome.is_ok());
        assert_eq!(results[2].preview.chars().count(), 103);
    }

    #[test]
    fn batch_size_limits_are_enforced() {
        let ctx = context();
        assert!(ctx.classify_batch(&[]).is_err());
        let too_many = vec!["a long enough article".to_string(); 101];
        assert!(matches!(ctx.classify_batch(&too_many), Err(LimeError::InvalidInput(_))));
    }

    #[test]
    fn explanations_use_the_classifier_class_names() {
        let ctx = context();
        let exp = ctx
            .explain("BREAKING: Scientists discover health causes decline!", Some(3))
            .unwrap();
        assert_eq!(exp.class_names, vec!["Real", "Fake"]);
        assert_eq!(exp.word_importance.len(), 3);
        assert_eq!(exp.predicted_class, "Fake");

        let batch = ctx
            .explain_batch(
                &["too short".to_string(), "Report indicates economy affects growth outcomes".to_string()],
                None,
            )
            .unwrap();
        assert!(batch[0].is_err());
        assert_eq!(batch[1].as_ref().unwrap().predicted_class, "Real");
    }

    #[test]
    fn batch_seeds_follow_request_position() {
        let ctx = context();
        let text = "Report indicates economy affects growth outcomes".to_string();
        let batch = ctx.explain_batch(&["too short".to_string(), text.clone()], None).unwrap();
        let seed = ctx.explainer().config().seed + 1;
        let alone = ctx
            .explain_with(&text, ExplainOptions::default().with_seed(seed))
            .unwrap();
        assert_eq!(batch[1].as_ref().unwrap(), &alone);
    }

    #[test]
    fn shap_explanations_are_additive_and_truncated() {
        let ctx = context()
            .with_shap_config(KernelShapConfig {
                seed: 3,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(ctx.shap().config().seed, 3);
        let exp = ctx
            .explain_shap("SHOCKING: Government hides economy from public!", Some(2))
            .unwrap();
        assert_eq!(exp.predicted_class, "Fake");
        assert_eq!(exp.word_importance.len(), 2);
        assert_eq!(exp.shap_values.len(), exp.words.len());
        assert!((exp.shap_values.sum() - (exp.actual_prediction - exp.expected_value)).abs() < 1e-9);
        assert!(matches!(ctx.explain_shap("tiny", None), Err(LimeError::InvalidInput(_))));
    }

    #[test]
    fn info_reflects_the_metadata() {
        let ctx = context();
        assert!(ctx.health().model_loaded);
        let info = ctx.model_info();
        assert_eq!(info.model_type, ModelKind::LogisticRegression);
        assert_eq!(info.classes, vec!["Real", "Fake"]);
        assert_eq!(info.training_samples, 200);
    }
}
