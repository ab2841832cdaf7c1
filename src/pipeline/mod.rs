//! The real/fake news classifier that explanations are computed against.

pub mod classifier;
pub mod dataset;
pub mod features;
pub mod metrics;
pub mod model;
pub mod preprocess;
pub mod tfidf;

pub use classifier::{compare_models, cross_validate, FeatureImportance, ModelComparison, ModelMetadata, NewsClassifier};
pub use dataset::{parse_label, CsvColumns, LabeledDataset};
pub use features::{FeatureExtractor, FeatureRows, SparseRow};
pub use metrics::{ClassificationMetrics, CrossValidation, MetricSummary};
pub use model::{LogisticRegression, Model, NaiveBayes};
pub use preprocess::TextPreprocessor;
pub use tfidf::TfidfVectorizer;
