// src/algorithms/lime_text.rs

use crate::algorithms::assembler::{argmax, assemble};
use crate::algorithms::sampler::PerturbationSampler;
use crate::algorithms::scoring::score_texts;
use crate::algorithms::surrogate::SurrogateFitter;
use crate::core::{Document, Explanation, ExplainerConfig, LimeError, Result};
use crate::traits::ClassifierHandle;
use crate::utils::Deadline;
use rayon::prelude::*;
use tracing::{debug, warn};

/// Per-call overrides of the explainer configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExplainOptions {
    /// Words to report; defaults to `num_features` from the config.
    pub num_features: Option<usize>,
    /// Class to explain; defaults to the predicted class.
    pub target_class: Option<usize>,
    /// Sampling seed; defaults to `seed` from the config.
    pub seed: Option<u64>,
}

impl ExplainOptions {
    pub fn with_num_features(mut self, n: usize) -> Self {
        self.num_features = Some(n);
        self
    }

    pub fn with_target_class(mut self, class: usize) -> Self {
        self.target_class = Some(class);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }
}

/// LIME for text: masks words, scores the neighbours with a classifier and
/// fits a weighted linear surrogate whose coefficients are the attributions.
#[derive(Debug, Clone)]
pub struct LimeTextExplainer {
    config: ExplainerConfig,
    sampler: PerturbationSampler,
    fitter: SurrogateFitter,
}

impl LimeTextExplainer {
    pub fn new(config: ExplainerConfig) -> Result<Self> {
        config.validate()?;
        let sampler = PerturbationSampler::new(config.sampling);
        let fitter = SurrogateFitter::new(config.kernel_width, config.regularization, config.distance)?;
        Ok(LimeTextExplainer {
            config,
            sampler,
            fitter,
        })
    }

    pub fn config(&self) -> &ExplainerConfig {
        &self.config
    }

    pub fn class_names(&self) -> &[String] {
        &self.config.class_names
    }

    /// Explains the predicted class of `text` with the configured defaults.
    pub fn explain<C>(&self, text: &str, classifier: &C) -> Result<Explanation>
    where
        C: ClassifierHandle + ?Sized,
    {
        self.explain_with(text, classifier, ExplainOptions::default())
    }

    pub fn explain_with<C>(&self, text: &str, classifier: &C, options: ExplainOptions) -> Result<Explanation>
    where
        C: ClassifierHandle + ?Sized,
    {
        let deadline = Deadline::start(self.config.timeout());
        let top_k = options.num_features.unwrap_or(self.config.num_features);
        if top_k == 0 {
            return Err(LimeError::invalid_input("num_features must be positive"));
        }
        let class_names = &self.config.class_names;
        if let Some(target) = options.target_class {
            if target >= class_names.len() {
                return Err(LimeError::invalid_input(format!(
                    "target class {target} out of range for {} classes",
                    class_names.len()
                )));
            }
        }

        let document = Document::new(text)?;
        let seed = options.seed.unwrap_or(self.config.seed);
        let mut batch = self.sampler.sample(&document, self.config.num_samples, seed)?;
        deadline.check("sampling")?;

        let probabilities = score_texts(
            classifier,
            &batch.texts(),
            class_names.len(),
            self.config.classifier_batch_size,
            &deadline,
        )?;
        batch.attach_probabilities(probabilities)?;

        let original = batch
            .original_probabilities()
            .ok_or_else(|| LimeError::contract("no score for the original document"))?
            .to_owned();
        let predicted = argmax(original.view())
            .ok_or_else(|| LimeError::contract("classifier produced an empty probability row"))?;
        let target = options.target_class.unwrap_or(predicted);

        let weights = self.fitter.similarity_weights(batch.mask_matrix().view());
        batch.attach_weights(weights)?;

        deadline.check("fitting")?;
        let model = self.fitter.fit(&batch, target)?;
        deadline.check("fitting")?;

        let explanation = assemble(&model, document.vocabulary(), original.view(), class_names, top_k)?;
        if explanation.is_degenerate() {
            warn!(
                features = document.num_features(),
                "classifier output did not vary; explanation is uninformative"
            );
        }
        debug!(
            features = document.num_features(),
            samples = batch.len(),
            predicted = %explanation.predicted_class,
            target = %explanation.target_class,
            local_r2 = model.score,
            elapsed_ms = deadline.elapsed().as_millis() as u64,
            "explained document"
        );
        Ok(explanation)
    }

    /// Explains many documents in parallel.
    ///
    /// Document `i` is sampled with seed `seed + i`, so results do not depend
    /// on scheduling. Each entry succeeds or fails on its own.
    pub fn explain_batch<C>(&self, texts: &[String], classifier: &C, options: ExplainOptions) -> Vec<Result<Explanation>>
    where
        C: ClassifierHandle + ?Sized,
    {
        let base_seed = options.seed.unwrap_or(self.config.seed);
        texts
            .par_iter()
            .enumerate()
            .map(|(idx, text)| {
                let per_doc = options.with_seed(base_seed.wrapping_add(idx as u64));
                self.explain_with(text, classifier, per_doc)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn small_config() -> ExplainerConfig {
        ExplainerConfig {
            num_samples: 400,
            ..Default::default()
        }
    }

    /// P(Fake) = 0.1 + 0.8 * [text contains `word`]
    fn keyword_classifier(word: &'static str) -> impl Fn(&[String]) -> Result<Array2<f64>> + Send + Sync {
        move |texts: &[String]| {
            let mut out = Array2::zeros((texts.len(), 2));
            for (i, text) in texts.iter().enumerate() {
                let fake = if text.split_whitespace().any(|w| w == word) { 0.9 } else { 0.1 };
                out[[i, 0]] = 1.0 - fake;
                out[[i, 1]] = fake;
            }
            Ok(out)
        }
    }

    #[test]
    fn keyword_is_top_feature() {
        let explainer = LimeTextExplainer::new(small_config()).unwrap();
        let classifier = keyword_classifier("miracle");
        let exp = explainer
            .explain("doctors hate this miracle cure for everything", &classifier)
            .unwrap();
        assert_eq!(exp.predicted_class, "Fake");
        assert_eq!(exp.word_importance[0].word, "miracle");
        assert!(exp.word_importance[0].score > 0.0);
        assert_eq!(exp.word_importance[0].direction, "Fake");
    }

    #[test]
    fn explicit_target_flips_sign() {
        let explainer = LimeTextExplainer::new(small_config()).unwrap();
        let classifier = keyword_classifier("miracle");
        let exp = explainer
            .explain_with(
                "doctors hate this miracle cure",
                &classifier,
                ExplainOptions::default().with_target_class(0),
            )
            .unwrap();
        assert_eq!(exp.target_class, "Real");
        assert_eq!(exp.word_importance[0].word, "miracle");
        assert!(exp.word_importance[0].score < 0.0);
        assert_eq!(exp.word_importance[0].direction, "Fake");
    }

    #[test]
    fn invalid_requests_are_rejected() {
        let explainer = LimeTextExplainer::new(small_config()).unwrap();
        let classifier = keyword_classifier("x");
        assert!(matches!(explainer.explain("   ", &classifier), Err(LimeError::InvalidInput(_))));
        assert!(matches!(
            explainer.explain_with("some words", &classifier, ExplainOptions::default().with_num_features(0)),
            Err(LimeError::InvalidInput(_))
        ));
        assert!(matches!(
            explainer.explain_with("some words", &classifier, ExplainOptions::default().with_target_class(5)),
            Err(LimeError::InvalidInput(_))
        ));
    }

    #[test]
    fn class_count_mismatch_is_a_contract_error() {
        let explainer = LimeTextExplainer::new(small_config()).unwrap();
        let three_way = |texts: &[String]| -> Result<Array2<f64>> {
            Ok(Array2::from_elem((texts.len(), 3), 1.0 / 3.0))
        };
        assert!(matches!(
            explainer.explain("one two three", &three_way),
            Err(LimeError::ClassifierContract(_))
        ));
    }

    #[test]
    fn batch_matches_individual_calls_with_offset_seeds() {
        let explainer = LimeTextExplainer::new(small_config()).unwrap();
        let classifier = keyword_classifier("shocking");
        let texts = vec![
            "a shocking claim about taxes".to_string(),
            "".to_string(),
            "officials publish the annual report".to_string(),
        ];
        let results = explainer.explain_batch(&texts, &classifier, ExplainOptions::default());
        assert_eq!(results.len(), 3);
        assert!(results[1].is_err());

        let single = explainer
            .explain_with(&texts[2], &classifier, ExplainOptions::default().with_seed(44))
            .unwrap();
        assert_eq!(results[2].as_ref().unwrap(), &single);
    }
}
