// src/pipeline/tfidf.rs

use crate::core::{LimeError, Result, TfidfConfig};
use crate::pipeline::features::{FeatureRows, SparseRow};
use crate::utils::tokenize::words;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

/// Term-frequency / inverse-document-frequency vectorizer over word n-grams.
///
/// Rows are L2-normalised. Idf is smoothed as `ln((1 + n) / (1 + df)) + 1`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TfidfVectorizer {
    config: TfidfConfig,
    vocabulary: BTreeMap<String, usize>,
    idf: Vec<f64>,
}

impl TfidfVectorizer {
    pub fn new(config: TfidfConfig) -> Self {
        TfidfVectorizer {
            config,
            vocabulary: BTreeMap::new(),
            idf: Vec::new(),
        }
    }

    pub fn config(&self) -> &TfidfConfig {
        &self.config
    }

    pub fn is_fitted(&self) -> bool {
        !self.vocabulary.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn idf(&self) -> &[f64] {
        &self.idf
    }

    /// Terms in column order.
    pub fn feature_names(&self) -> Vec<String> {
        let mut names = vec![String::new(); self.vocabulary.len()];
        for (term, &idx) in &self.vocabulary {
            names[idx] = term.clone();
        }
        names
    }

    pub fn fit(&mut self, documents: &[String]) -> Result<()> {
        let (min_n, max_n) = self.config.ngram_range;
        if min_n == 0 || min_n > max_n {
            return Err(LimeError::config(format!(
                "invalid ngram range ({min_n}, {max_n})"
            )));
        }
        if documents.is_empty() {
            return Err(LimeError::dataset("cannot fit a vectorizer on an empty corpus"));
        }

        let mut doc_freq: HashMap<String, usize> = HashMap::new();
        let mut term_freq: HashMap<String, usize> = HashMap::new();
        for doc in documents {
            let terms = self.ngrams(doc);
            let mut seen = HashSet::new();
            for term in terms {
                *term_freq.entry(term.clone()).or_default() += 1;
                if seen.insert(term.clone()) {
                    *doc_freq.entry(term).or_default() += 1;
                }
            }
        }

        let n_docs = documents.len();
        let max_doc_count = self.config.max_df * n_docs as f64;
        let mut kept: Vec<(String, usize)> = doc_freq
            .iter()
            .filter(|(_, &df)| df >= self.config.min_df && df as f64 <= max_doc_count)
            .map(|(term, _)| (term.clone(), term_freq[term]))
            .collect();
        if kept.is_empty() {
            return Err(LimeError::dataset(
                "no terms remain after document-frequency pruning; lower min_df or raise max_df",
            ));
        }

        if let Some(max_features) = self.config.max_features {
            kept.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
            kept.truncate(max_features);
        }
        kept.sort_by(|a, b| a.0.cmp(&b.0));

        self.vocabulary = kept
            .iter()
            .enumerate()
            .map(|(idx, (term, _))| (term.clone(), idx))
            .collect();
        self.idf = kept
            .iter()
            .map(|(term, _)| {
                if self.config.use_idf {
                    let df = doc_freq[term] as f64;
                    ((1.0 + n_docs as f64) / (1.0 + df)).ln() + 1.0
                } else {
                    1.0
                }
            })
            .collect();

        debug!(
            documents = n_docs,
            candidates = doc_freq.len(),
            vocabulary = self.vocabulary.len(),
            "fitted tf-idf vocabulary"
        );
        Ok(())
    }

    pub fn transform(&self, documents: &[String]) -> Result<FeatureRows> {
        if !self.is_fitted() {
            return Err(LimeError::model("tf-idf vectorizer has not been fitted"));
        }
        let rows = documents.iter().map(|doc| self.transform_one(doc)).collect();
        Ok(FeatureRows {
            rows,
            dim: self.dim(),
        })
    }

    pub fn fit_transform(&mut self, documents: &[String]) -> Result<FeatureRows> {
        self.fit(documents)?;
        self.transform(documents)
    }

    fn transform_one(&self, document: &str) -> SparseRow {
        let mut counts: BTreeMap<usize, f64> = BTreeMap::new();
        for term in self.ngrams(document) {
            if let Some(&idx) = self.vocabulary.get(&term) {
                *counts.entry(idx).or_default() += 1.0;
            }
        }

        let (indices, mut values): (Vec<usize>, Vec<f64>) = counts
            .into_iter()
            .map(|(idx, count)| {
                let tf = if self.config.sublinear_tf { 1.0 + count.ln() } else { count };
                (idx, tf * self.idf[idx])
            })
            .unzip();

        let norm = values.iter().map(|v| v * v).sum::<f64>().sqrt();
        if norm > 0.0 {
            values.iter_mut().for_each(|v| *v /= norm);
        }
        SparseRow { indices, values }
    }

    fn ngrams(&self, document: &str) -> Vec<String> {
        let tokens = words(document);
        let (min_n, max_n) = self.config.ngram_range;
        let mut terms = Vec::new();
        for n in min_n..=max_n {
            if n > tokens.len() {
                break;
            }
            terms.extend(tokens.windows(n).map(|w| w.join(" ")));
        }
        terms
    }
}
