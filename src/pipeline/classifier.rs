// src/pipeline/classifier.rs

use crate::algorithms::assembler::argmax;
use crate::core::{FeatureStrategy, LimeError, ModelKind, PipelineConfig, Result};
use crate::pipeline::dataset::LabeledDataset;
use crate::pipeline::features::FeatureExtractor;
use crate::pipeline::metrics::{evaluate, ClassificationMetrics, CrossValidation};
use crate::pipeline::model::Model;
use crate::pipeline::preprocess::TextPreprocessor;
use crate::pipeline::tfidf::TfidfVectorizer;
use crate::traits::{ClassifierHandle, TextEmbedder};
use chrono::{DateTime, Utc};
use ndarray::{Array2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

pub const MODEL_FILE: &str = "model.json";
pub const METADATA_FILE: &str = "metadata.json";

/// Descriptive facts about a trained classifier, saved next to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub model_type: ModelKind,
    pub feature_strategy: FeatureStrategy,
    pub class_names: Vec<String>,
    /// Width of the feature vector fed to the model.
    pub num_features: usize,
    pub training_samples: usize,
    /// Gradient steps of the last fit; `None` for closed-form models.
    #[serde(default)]
    pub iterations: Option<usize>,
    /// Held-out metrics, when the model was trained with a validation split.
    pub metrics: Option<ClassificationMetrics>,
    pub trained_at: DateTime<Utc>,
    pub saved_at: Option<DateTime<Utc>>,
    pub version: String,
}

#[derive(Serialize, Deserialize)]
struct PersistedModel {
    preprocessor: TextPreprocessor,
    feature_strategy: FeatureStrategy,
    tfidf: Option<TfidfVectorizer>,
    embedding_dim: Option<usize>,
    model: Model,
    class_names: Vec<String>,
}

/// Outcome of training one model kind on a shared split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelComparison {
    pub model_type: ModelKind,
    pub metrics: ClassificationMetrics,
}

/// Global weight of one model feature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    /// Spread of the feature's per-class weights: `|w_fake - w_real|` for a
    /// binary logistic model.
    pub importance: f64,
    /// Class whose weight for the feature is highest.
    pub class: String,
}

/// Real/fake news classifier: text cleaning, feature extraction and a
/// probabilistic model behind one `predict_proba` call.
#[derive(Debug, Clone)]
pub struct NewsClassifier {
    preprocessor: TextPreprocessor,
    extractor: FeatureExtractor,
    model: Model,
    metadata: ModelMetadata,
}

impl NewsClassifier {
    /// Trains on the whole dataset without holding anything out.
    pub fn fit(
        dataset: &LabeledDataset,
        config: &PipelineConfig,
        embedder: Option<Arc<dyn TextEmbedder>>,
    ) -> Result<Self> {
        let class_names = &config.class_names;
        let counts = dataset.label_counts(class_names.len());
        if counts.iter().sum::<usize>() != dataset.len() {
            return Err(LimeError::dataset(format!(
                "labels must lie in 0..{}",
                class_names.len()
            )));
        }
        if let Some(missing) = counts.iter().position(|&c| c == 0) {
            return Err(LimeError::dataset(format!(
                "no training examples for class '{}'",
                class_names[missing]
            )));
        }

        let preprocessor = TextPreprocessor::new(config.preprocess.clone());
        let cleaned = preprocessor.preprocess_batch(&dataset.texts);
        let mut extractor = FeatureExtractor::build(config.features, &config.tfidf, embedder)?;
        extractor.fit(&cleaned)?;
        let features = extractor.transform(&cleaned)?;

        let mut model = Model::from_config(&config.model);
        model.fit(&features, &dataset.labels, class_names.len())?;

        info!(
            model = config.model.kind.as_str(),
            samples = dataset.len(),
            features = extractor.dim(),
            "trained news classifier"
        );
        let metadata = ModelMetadata {
            model_type: config.model.kind,
            feature_strategy: config.features,
            class_names: class_names.clone(),
            num_features: extractor.dim(),
            training_samples: dataset.len(),
            iterations: model.iterations(),
            metrics: None,
            trained_at: Utc::now(),
            saved_at: None,
            version: env!("CARGO_PKG_VERSION").to_string(),
        };
        Ok(NewsClassifier {
            preprocessor,
            extractor,
            model,
            metadata,
        })
    }

    /// Splits off `config.test_size`, trains on the rest and evaluates on the
    /// held-out part. The metrics are kept in the metadata.
    pub fn train(
        dataset: &LabeledDataset,
        config: &PipelineConfig,
        embedder: Option<Arc<dyn TextEmbedder>>,
    ) -> Result<(Self, ClassificationMetrics)> {
        let (train, test) = dataset.train_test_split(config.test_size, config.seed)?;
        let mut classifier = Self::fit(&train, config, embedder)?;
        let metrics = classifier.evaluate(&test)?;
        info!(
            train = train.len(),
            test = test.len(),
            accuracy = metrics.accuracy,
            f1 = metrics.f1_score,
            "validated news classifier"
        );
        classifier.metadata.metrics = Some(metrics.clone());
        Ok((classifier, metrics))
    }

    pub fn class_names(&self) -> &[String] {
        &self.metadata.class_names
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    pub fn model_kind(&self) -> ModelKind {
        self.model.kind()
    }

    pub fn feature_strategy(&self) -> FeatureStrategy {
        self.extractor.strategy()
    }

    /// Class probabilities for raw texts, one row per text.
    pub fn predict_proba(&self, texts: &[String]) -> Result<Array2<f64>> {
        let cleaned = self.preprocessor.preprocess_batch(texts);
        let features = self.extractor.transform(&cleaned)?;
        self.model.predict_proba(&features)
    }

    /// Most probable class index per text; ties go to the lower index.
    pub fn predict(&self, texts: &[String]) -> Result<Vec<usize>> {
        let probabilities = self.predict_proba(texts)?;
        Ok(probabilities
            .axis_iter(Axis(0))
            .map(|row| argmax(row).unwrap_or(0))
            .collect())
    }

    pub fn evaluate(&self, dataset: &LabeledDataset) -> Result<ClassificationMetrics> {
        let probabilities = self.predict_proba(&dataset.texts)?;
        let predicted: Vec<usize> = probabilities
            .axis_iter(Axis(0))
            .map(|row| argmax(row).unwrap_or(0))
            .collect();
        let positive: Option<Vec<f64>> =
            (probabilities.ncols() == 2).then(|| probabilities.column(1).to_vec());
        evaluate(
            &dataset.labels,
            &predicted,
            positive.as_deref(),
            self.class_names().len(),
        )
    }

    /// The `top_n` features with the widest spread of per-class model
    /// weights, largest first; ties go to the earlier column.
    pub fn feature_importance(&self, top_n: usize) -> Result<Vec<FeatureImportance>> {
        if top_n == 0 {
            return Err(LimeError::invalid_input("top_n must be positive"));
        }
        let weights = self.model.feature_weights();
        let names = self.extractor.feature_names();
        if weights.ncols() != names.len() || weights.nrows() != self.class_names().len() {
            return Err(LimeError::model(format!(
                "model has {}x{} weights for {} classes and {} features",
                weights.nrows(),
                weights.ncols(),
                self.class_names().len(),
                names.len()
            )));
        }

        let mut ranked: Vec<(usize, f64, usize)> = weights
            .axis_iter(Axis(1))
            .enumerate()
            .map(|(j, column)| {
                let max = column.iter().copied().fold(f64::NEG_INFINITY, f64::max);
                let min = column.iter().copied().fold(f64::INFINITY, f64::min);
                (j, max - min, argmax(column).unwrap_or(0))
            })
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked.truncate(top_n);
        Ok(ranked
            .into_iter()
            .map(|(j, importance, class)| FeatureImportance {
                feature: names[j].clone(),
                importance,
                class: self.class_names()[class].clone(),
            })
            .collect())
    }

    /// Writes `model.json` and `metadata.json` into `dir`, creating it if needed.
    pub fn save<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let persisted = PersistedModel {
            preprocessor: self.preprocessor.clone(),
            feature_strategy: self.extractor.strategy(),
            tfidf: self.extractor.tfidf().cloned(),
            embedding_dim: match &self.extractor {
                FeatureExtractor::Tfidf(_) => None,
                FeatureExtractor::Embedding(e) | FeatureExtractor::Combined { embedder: e, .. } => Some(e.dim()),
            },
            model: self.model.clone(),
            class_names: self.metadata.class_names.clone(),
        };
        fs::write(dir.join(MODEL_FILE), serde_json::to_vec(&persisted)?)?;

        let mut metadata = self.metadata.clone();
        metadata.saved_at = Some(Utc::now());
        fs::write(dir.join(METADATA_FILE), serde_json::to_vec_pretty(&metadata)?)?;
        info!(dir = %dir.display(), model = metadata.model_type.as_str(), "saved news classifier");
        Ok(())
    }

    /// Restores a classifier written by [`save`](Self::save). Embedding-based
    /// strategies need the same embedder passed back in.
    pub fn load<P: AsRef<Path>>(dir: P, embedder: Option<Arc<dyn TextEmbedder>>) -> Result<Self> {
        let dir = dir.as_ref();
        let model_path = dir.join(MODEL_FILE);
        if !model_path.exists() {
            return Err(LimeError::model(format!(
                "no trained model at {}",
                model_path.display()
            )));
        }
        let persisted: PersistedModel = serde_json::from_slice(&fs::read(&model_path)?)?;
        let metadata: ModelMetadata = serde_json::from_slice(&fs::read(dir.join(METADATA_FILE))?)?;

        let need_tfidf = |tfidf: Option<TfidfVectorizer>| {
            tfidf.ok_or_else(|| LimeError::model("saved model is missing its tf-idf vocabulary"))
        };
        let need_embedder = || -> Result<Arc<dyn TextEmbedder>> {
            let embedder = embedder.clone().ok_or_else(|| {
                LimeError::config(format!(
                    "model was trained with {:?} features; pass the same embedder to load it",
                    persisted.feature_strategy
                ))
            })?;
            if Some(embedder.dim()) != persisted.embedding_dim {
                return Err(LimeError::model(format!(
                    "embedder width {} does not match the saved width {:?}",
                    embedder.dim(),
                    persisted.embedding_dim
                )));
            }
            Ok(embedder)
        };
        let extractor = match persisted.feature_strategy {
            FeatureStrategy::Tfidf => FeatureExtractor::Tfidf(need_tfidf(persisted.tfidf.clone())?),
            FeatureStrategy::Embedding => FeatureExtractor::Embedding(need_embedder()?),
            FeatureStrategy::Combined => FeatureExtractor::Combined {
                tfidf: need_tfidf(persisted.tfidf.clone())?,
                embedder: need_embedder()?,
            },
        };

        if metadata.class_names != persisted.class_names {
            return Err(LimeError::model(format!(
                "metadata class names {:?} disagree with the model's {:?}",
                metadata.class_names, persisted.class_names
            )));
        }
        info!(dir = %dir.display(), model = persisted.model.kind().as_str(), "loaded news classifier");
        Ok(NewsClassifier {
            preprocessor: persisted.preprocessor,
            extractor,
            model: persisted.model,
            metadata,
        })
    }
}

impl ClassifierHandle for NewsClassifier {
    fn predict_proba(&self, texts: &[String]) -> Result<Array2<f64>> {
        NewsClassifier::predict_proba(self, texts)
    }
}

/// Trains every model kind on the same split and ranks them by held-out F1,
/// then accuracy.
pub fn compare_models(
    dataset: &LabeledDataset,
    config: &PipelineConfig,
    embedder: Option<Arc<dyn TextEmbedder>>,
) -> Result<Vec<ModelComparison>> {
    let mut results = Vec::with_capacity(ModelKind::ALL.len());
    for kind in ModelKind::ALL {
        let mut run = config.clone();
        run.model.kind = kind;
        let (_, metrics) = NewsClassifier::train(dataset, &run, embedder.clone())?;
        results.push(ModelComparison {
            model_type: kind,
            metrics,
        });
    }
    results.sort_by(|a, b| {
        b.metrics
            .f1_score
            .total_cmp(&a.metrics.f1_score)
            .then_with(|| b.metrics.accuracy.total_cmp(&a.metrics.accuracy))
    });
    Ok(results)
}

/// Stratified k-fold cross-validation with `config.cv_folds` folds. Each
/// fold trains a fresh classifier; folds run in parallel.
pub fn cross_validate(
    dataset: &LabeledDataset,
    config: &PipelineConfig,
    embedder: Option<Arc<dyn TextEmbedder>>,
) -> Result<CrossValidation> {
    let folds = dataset.stratified_folds(config.cv_folds, config.seed)?;
    let fold_metrics = folds
        .par_iter()
        .map(|(train, test)| NewsClassifier::fit(train, config, embedder.clone())?.evaluate(test))
        .collect::<Result<Vec<_>>>()?;
    let summary = CrossValidation::from_folds(config.model.kind, &fold_metrics);
    info!(
        model = config.model.kind.as_str(),
        folds = summary.folds,
        accuracy = summary.accuracy.mean,
        f1 = summary.f1_score.mean,
        "cross-validated news classifier"
    );
    Ok(summary)
}
