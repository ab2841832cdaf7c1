// src/pipeline/features.rs

//! Feature extraction strategies feeding the classifier.

use crate::core::{FeatureStrategy, LimeError, Result, TfidfConfig};
use crate::pipeline::tfidf::TfidfVectorizer;
use crate::traits::TextEmbedder;
use ndarray::{Array2, ArrayView1};
use std::sync::Arc;

/// A sparse feature vector; `indices` are strictly increasing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparseRow {
    pub indices: Vec<usize>,
    pub values: Vec<f64>,
}

impl SparseRow {
    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    pub fn dot(&self, dense: ArrayView1<f64>) -> f64 {
        self.indices
            .iter()
            .zip(&self.values)
            .map(|(&j, &v)| v * dense[j])
            .sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.indices.iter().copied().zip(self.values.iter().copied())
    }
}

/// Row-major sparse matrix with a fixed column count.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureRows {
    pub rows: Vec<SparseRow>,
    pub dim: usize,
}

impl FeatureRows {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn from_dense(matrix: &Array2<f64>) -> Self {
        let rows = matrix
            .rows()
            .into_iter()
            .map(|row| {
                let (indices, values) = row
                    .iter()
                    .enumerate()
                    .filter(|(_, v)| **v != 0.0)
                    .map(|(j, v)| (j, *v))
                    .unzip();
                SparseRow { indices, values }
            })
            .collect();
        FeatureRows {
            rows,
            dim: matrix.ncols(),
        }
    }

    pub fn to_dense(&self) -> Array2<f64> {
        let mut dense = Array2::zeros((self.rows.len(), self.dim));
        for (i, row) in self.rows.iter().enumerate() {
            for (j, v) in row.iter() {
                dense[[i, j]] = v;
            }
        }
        dense
    }
}

/// One implementation per representation, chosen when the pipeline is built.
#[derive(Debug, Clone)]
pub enum FeatureExtractor {
    Tfidf(TfidfVectorizer),
    Embedding(Arc<dyn TextEmbedder>),
    Combined {
        tfidf: TfidfVectorizer,
        embedder: Arc<dyn TextEmbedder>,
    },
}

impl FeatureExtractor {
    pub fn build(
        strategy: FeatureStrategy,
        tfidf: &TfidfConfig,
        embedder: Option<Arc<dyn TextEmbedder>>,
    ) -> Result<Self> {
        let need_embedder = || {
            embedder.clone().ok_or_else(|| {
                LimeError::config(format!(
                    "feature strategy {strategy:?} needs a text embedder"
                ))
            })
        };
        Ok(match strategy {
            FeatureStrategy::Tfidf => FeatureExtractor::Tfidf(TfidfVectorizer::new(tfidf.clone())),
            FeatureStrategy::Embedding => FeatureExtractor::Embedding(need_embedder()?),
            FeatureStrategy::Combined => FeatureExtractor::Combined {
                tfidf: TfidfVectorizer::new(tfidf.clone()),
                embedder: need_embedder()?,
            },
        })
    }

    pub fn strategy(&self) -> FeatureStrategy {
        match self {
            FeatureExtractor::Tfidf(_) => FeatureStrategy::Tfidf,
            FeatureExtractor::Embedding(_) => FeatureStrategy::Embedding,
            FeatureExtractor::Combined { .. } => FeatureStrategy::Combined,
        }
    }

    pub fn tfidf(&self) -> Option<&TfidfVectorizer> {
        match self {
            FeatureExtractor::Tfidf(tfidf) | FeatureExtractor::Combined { tfidf, .. } => Some(tfidf),
            FeatureExtractor::Embedding(_) => None,
        }
    }

    pub fn dim(&self) -> usize {
        match self {
            FeatureExtractor::Tfidf(tfidf) => tfidf.dim(),
            FeatureExtractor::Embedding(embedder) => embedder.dim(),
            FeatureExtractor::Combined { tfidf, embedder } => tfidf.dim() + embedder.dim(),
        }
    }

    /// Column names in feature order: TF-IDF terms, then `embedding_<j>` for
    /// dense columns.
    pub fn feature_names(&self) -> Vec<String> {
        let dense = |dim: usize| (0..dim).map(|j| format!("embedding_{j}"));
        match self {
            FeatureExtractor::Tfidf(tfidf) => tfidf.feature_names(),
            FeatureExtractor::Embedding(embedder) => dense(embedder.dim()).collect(),
            FeatureExtractor::Combined { tfidf, embedder } => {
                let mut names = tfidf.feature_names();
                names.extend(dense(embedder.dim()));
                names
            }
        }
    }

    /// Learns whatever the strategy learns from data (the TF-IDF vocabulary);
    /// embedders are used as given.
    pub fn fit(&mut self, texts: &[String]) -> Result<()> {
        match self {
            FeatureExtractor::Tfidf(tfidf) | FeatureExtractor::Combined { tfidf, .. } => tfidf.fit(texts),
            FeatureExtractor::Embedding(_) => Ok(()),
        }
    }

    pub fn transform(&self, texts: &[String]) -> Result<FeatureRows> {
        match self {
            FeatureExtractor::Tfidf(tfidf) => tfidf.transform(texts),
            FeatureExtractor::Embedding(embedder) => Ok(FeatureRows::from_dense(&embed_checked(
                embedder.as_ref(),
                texts,
            )?)),
            FeatureExtractor::Combined { tfidf, embedder } => {
                let sparse = tfidf.transform(texts)?;
                let dense = embed_checked(embedder.as_ref(), texts)?;
                let offset = sparse.dim;
                let rows = sparse
                    .rows
                    .into_iter()
                    .zip(dense.rows())
                    .map(|(mut row, embedding)| {
                        for (j, &v) in embedding.iter().enumerate() {
                            if v != 0.0 {
                                row.indices.push(offset + j);
                                row.values.push(v);
                            }
                        }
                        row
                    })
                    .collect();
                Ok(FeatureRows {
                    rows,
                    dim: offset + dense.ncols(),
                })
            }
        }
    }
}

fn embed_checked(embedder: &dyn TextEmbedder, texts: &[String]) -> Result<Array2<f64>> {
    let embedded = embedder.embed(texts)?;
    if embedded.nrows() != texts.len() || embedded.ncols() != embedder.dim() {
        return Err(LimeError::model(format!(
            "embedder returned a {}x{} matrix for {} texts of width {}",
            embedded.nrows(),
            embedded.ncols(),
            texts.len(),
            embedder.dim()
        )));
    }
    Ok(embedded)
}
