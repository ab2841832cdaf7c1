// src/core/data.rs
use crate::core::{LimeError, Result};
use crate::utils::tokenize::split_spans;
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// A text to be explained, split into word features.
///
/// Features are the distinct word tokens in first-occurrence order; repeated
/// words collapse onto one feature index. Everything that is not a word
/// (whitespace, punctuation) is kept verbatim and never masked.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    raw: String,
    tokens: Vec<String>,
    /// Feature index for each token, `None` for separators.
    token_features: Vec<Option<usize>>,
    vocabulary: Vec<String>,
}

impl Document {
    pub fn new(text: &str) -> Result<Self> {
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut vocabulary = Vec::new();
        let mut tokens = Vec::new();
        let mut token_features = Vec::new();

        for span in split_spans(text) {
            let feature = if span.is_word {
                let next = vocabulary.len();
                let idx = *index.entry(span.text.clone()).or_insert(next);
                if idx == next {
                    vocabulary.push(span.text.clone());
                }
                Some(idx)
            } else {
                None
            };
            tokens.push(span.text);
            token_features.push(feature);
        }

        if vocabulary.is_empty() {
            return Err(LimeError::invalid_input(
                "document has no word features to explain",
            ));
        }

        Ok(Document {
            raw: text.to_string(),
            tokens,
            token_features,
            vocabulary,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn vocabulary(&self) -> &[String] {
        &self.vocabulary
    }

    pub fn num_features(&self) -> usize {
        self.vocabulary.len()
    }

    /// Rebuilds the text keeping only words whose mask bit is set.
    pub fn reconstruct(&self, mask: &[bool]) -> Result<String> {
        if mask.len() != self.vocabulary.len() {
            return Err(LimeError::invalid_input(format!(
                "mask has {} entries, document has {} features",
                mask.len(),
                self.vocabulary.len()
            )));
        }
        let mut out = String::with_capacity(self.raw.len());
        for (token, feature) in self.tokens.iter().zip(&self.token_features) {
            match feature {
                Some(idx) if !mask[*idx] => {}
                _ => out.push_str(token),
            }
        }
        Ok(out)
    }
}

/// One synthetic neighbour of a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PerturbedSample {
    /// One entry per feature: `true` keeps the word, `false` drops it.
    pub mask: Vec<bool>,
    pub text: String,
}

impl PerturbedSample {
    pub fn kept(&self) -> usize {
        self.mask.iter().filter(|&&bit| bit).count()
    }

    pub fn removed(&self) -> usize {
        self.mask.len() - self.kept()
    }
}

/// The samples of one sampling run plus, once scored, aligned classifier
/// probabilities and similarity weights.
///
/// Sample 0 is always the unperturbed document (all-ones mask).
#[derive(Debug, Clone)]
pub struct SampleBatch {
    samples: Vec<PerturbedSample>,
    num_features: usize,
    probabilities: Option<Array2<f64>>,
    weights: Option<Array1<f64>>,
}

impl SampleBatch {
    pub(crate) fn new(samples: Vec<PerturbedSample>, num_features: usize) -> Self {
        SampleBatch {
            samples,
            num_features,
            probabilities: None,
            weights: None,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn num_features(&self) -> usize {
        self.num_features
    }

    pub fn samples(&self) -> &[PerturbedSample] {
        &self.samples
    }

    pub fn texts(&self) -> Vec<String> {
        self.samples.iter().map(|s| s.text.clone()).collect()
    }

    /// Masks as an `n x d` matrix of 0.0 / 1.0.
    pub fn mask_matrix(&self) -> Array2<f64> {
        let mut matrix = Array2::zeros((self.samples.len(), self.num_features));
        for (mut row, sample) in matrix.rows_mut().into_iter().zip(&self.samples) {
            for (cell, &bit) in row.iter_mut().zip(&sample.mask) {
                *cell = if bit { 1.0 } else { 0.0 };
            }
        }
        matrix
    }

    pub fn attach_probabilities(&mut self, probabilities: Array2<f64>) -> Result<()> {
        if probabilities.nrows() != self.samples.len() {
            return Err(LimeError::contract(format!(
                "{} probability rows for {} samples",
                probabilities.nrows(),
                self.samples.len()
            )));
        }
        self.probabilities = Some(probabilities);
        Ok(())
    }

    pub fn attach_weights(&mut self, weights: Array1<f64>) -> Result<()> {
        if weights.len() != self.samples.len() {
            return Err(LimeError::invalid_input(format!(
                "{} weights for {} samples",
                weights.len(),
                self.samples.len()
            )));
        }
        self.weights = Some(weights);
        Ok(())
    }

    pub fn probabilities(&self) -> Option<&Array2<f64>> {
        self.probabilities.as_ref()
    }

    pub fn weights(&self) -> Option<&Array1<f64>> {
        self.weights.as_ref()
    }

    /// Classifier output for the unperturbed document.
    pub fn original_probabilities(&self) -> Option<ArrayView1<'_, f64>> {
        self.probabilities
            .as_ref()
            .filter(|p| p.nrows() > 0)
            .map(|p| p.row(0))
    }
}

/// Weighted linear model fitted around one document for one target class.
#[derive(Debug, Clone, PartialEq)]
pub struct SurrogateModel {
    /// One coefficient per document feature, in vocabulary order.
    pub coefficients: Array1<f64>,
    pub intercept: f64,
    pub target_class: usize,
    /// Weighted R^2 of the fit on the perturbed samples.
    pub score: f64,
    /// Surrogate output for the unperturbed document.
    pub local_prediction: f64,
    /// Set when the classifier output never varied across samples.
    pub degenerate: bool,
}

/// Non-fatal annotations attached to an explanation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExplanationNote {
    /// The classifier returned the same probability for every perturbation,
    /// so no word could be credited with the prediction.
    FitDegenerate { constant_output: f64 },
}

impl fmt::Display for ExplanationNote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExplanationNote::FitDegenerate { constant_output } => write!(
                f,
                "classifier output was constant ({constant_output:.4}) across all perturbations; \
                 the explanation is uninformative"
            ),
        }
    }
}

/// A word and its signed contribution toward the explained class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordImportance {
    pub word: String,
    pub score: f64,
    /// Class name the word pushes toward.
    pub direction: String,
}

/// Result of explaining one prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Explanation {
    pub predicted_class: String,
    pub predicted_index: usize,
    /// Max class probability for the original document.
    pub confidence: f64,
    pub probabilities: BTreeMap<String, f64>,
    /// Class names in classifier column order.
    pub class_names: Vec<String>,
    /// Class the attribution scores are relative to.
    pub target_class: String,
    pub target_index: usize,
    /// Ranked by absolute score, at most `top_k` entries.
    pub word_importance: Vec<WordImportance>,
    pub intercept: f64,
    pub score: f64,
    pub local_prediction: f64,
    pub notes: Vec<ExplanationNote>,
}

impl Explanation {
    pub fn is_degenerate(&self) -> bool {
        self.notes
            .iter()
            .any(|n| matches!(n, ExplanationNote::FitDegenerate { .. }))
    }

    /// Probabilities in classifier column order.
    pub fn ordered_probabilities(&self) -> Vec<(&str, f64)> {
        self.class_names
            .iter()
            .map(|name| {
                let p = self.probabilities.get(name).copied().unwrap_or(0.0);
                (name.as_str(), p)
            })
            .collect()
    }
}

impl fmt::Display for Explanation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Explanation:")?;
        writeln!(f, "  Predicted:   {} ({:.2}%)", self.predicted_class, self.confidence * 100.0)?;
        for (name, p) in self.ordered_probabilities() {
            writeln!(f, "    {name}: {p:.4}")?;
        }
        writeln!(f, "  Explaining:  {}", self.target_class)?;
        writeln!(f, "  Intercept:   {:.4}", self.intercept)?;
        writeln!(f, "  Local fit:   R^2 {:.4}, prediction {:.4}", self.score, self.local_prediction)?;
        writeln!(f, "  Words:")?;
        for item in &self.word_importance {
            writeln!(f, "    '{}': {:+.4} -> {}", item.word, item.score, item.direction)?;
        }
        for note in &self.notes {
            writeln!(f, "  Note: {note}")?;
        }
        Ok(())
    }
}

/// Shapley attributions of the words of one document for one class.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapExplanation {
    pub predicted_class: String,
    pub probabilities: BTreeMap<String, f64>,
    pub target_class: String,
    pub target_index: usize,
    /// Document features in first-occurrence order.
    pub words: Vec<String>,
    /// One value per entry of `words`. They sum to
    /// `actual_prediction - expected_value`.
    pub shap_values: Array1<f64>,
    /// Classifier output for the text with every word removed.
    pub expected_value: f64,
    /// Classifier output for the full text.
    pub actual_prediction: f64,
    /// Every word ranked by absolute Shapley value.
    pub word_importance: Vec<WordImportance>,
}

impl ShapExplanation {
    pub fn top(&self, top_k: usize) -> &[WordImportance] {
        &self.word_importance[..top_k.min(self.word_importance.len())]
    }
}

impl fmt::Display for ShapExplanation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "SHAP values:")?;
        writeln!(f, "  Predicted:   {}", self.predicted_class)?;
        writeln!(f, "  Explaining:  {}", self.target_class)?;
        writeln!(f, "  Base value:  {:.4}", self.expected_value)?;
        writeln!(f, "  Output:      {:.4}", self.actual_prediction)?;
        for item in &self.word_importance {
            writeln!(f, "    '{}': {:+.4} -> {}", item.word, item.score, item.direction)?;
        }
        Ok(())
    }
}
