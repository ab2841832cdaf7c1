// src/pipeline/dataset.rs

//! Labelled news articles: CSV loading, stratified splitting and a small
//! synthetic corpus for demos.

use crate::core::{LimeError, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// Column names to read from a CSV file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsvColumns {
    pub text: String,
    pub label: String,
    /// Prepended to the text when present.
    pub title: Option<String>,
}

impl Default for CsvColumns {
    fn default() -> Self {
        Self {
            text: "text".to_string(),
            label: "label".to_string(),
            title: None,
        }
    }
}

/// Resolves a raw label to a class index.
///
/// Accepts a class name in any case (`"FAKE"`, `"fake"`) or a numeric index.
pub fn parse_label(raw: &str, class_names: &[String]) -> Option<usize> {
    let raw = raw.trim();
    if let Some(idx) = class_names.iter().position(|name| name.eq_ignore_ascii_case(raw)) {
        return Some(idx);
    }
    raw.parse::<usize>().ok().filter(|&idx| idx < class_names.len())
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LabeledDataset {
    pub texts: Vec<String>,
    pub labels: Vec<usize>,
}

impl LabeledDataset {
    pub fn new(texts: Vec<String>, labels: Vec<usize>) -> Result<Self> {
        if texts.len() != labels.len() {
            return Err(LimeError::dataset(format!(
                "{} texts but {} labels",
                texts.len(),
                labels.len()
            )));
        }
        Ok(Self { texts, labels })
    }

    pub fn len(&self) -> usize {
        self.texts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.texts.is_empty()
    }

    pub fn label_counts(&self, n_classes: usize) -> Vec<usize> {
        let mut counts = vec![0; n_classes];
        for &label in &self.labels {
            if label < n_classes {
                counts[label] += 1;
            }
        }
        counts
    }

    /// Loads articles from a CSV file with a header row.
    ///
    /// Rows with an empty text or an unrecognised label are dropped with a
    /// warning; a missing column or an empty result is an error.
    pub fn load_csv<P: AsRef<Path>>(path: P, columns: &CsvColumns, class_names: &[String]) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = csv::Reader::from_path(path)?;
        let headers = reader.headers()?.clone();
        let position = |name: &str| {
            headers.iter().position(|h| h == name).ok_or_else(|| {
                LimeError::dataset(format!(
                    "column '{name}' not found in {}; available: {:?}",
                    path.display(),
                    headers.iter().collect::<Vec<_>>()
                ))
            })
        };
        let text_idx = position(&columns.text)?;
        let label_idx = position(&columns.label)?;
        let title_idx = columns
            .title
            .as_deref()
            .and_then(|name| headers.iter().position(|h| h == name));

        let mut dataset = LabeledDataset::default();
        let mut dropped = 0usize;
        for record in reader.records() {
            let record = record?;
            let text = record.get(text_idx).map(str::trim).unwrap_or_default();
            let label = record
                .get(label_idx)
                .and_then(|raw| parse_label(raw, class_names))
                .filter(|_| !text.is_empty());
            let Some(label) = label else {
                dropped += 1;
                continue;
            };
            let text = match title_idx.and_then(|idx| record.get(idx)).map(str::trim) {
                Some(title) if !title.is_empty() => format!("{title} {text}"),
                _ => text.to_string(),
            };
            dataset.texts.push(text);
            dataset.labels.push(label);
        }

        if dropped > 0 {
            warn!(dropped, path = %path.display(), "skipped rows with missing text or unknown label");
        }
        if dataset.is_empty() {
            return Err(LimeError::dataset(format!(
                "no usable rows in {}",
                path.display()
            )));
        }
        info!(
            rows = dataset.len(),
            distribution = ?dataset.label_counts(class_names.len()),
            "loaded dataset"
        );
        Ok(dataset)
    }

    pub fn write_csv<P: AsRef<Path>>(&self, path: P, class_names: &[String]) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(["text", "label"])?;
        for (text, &label) in self.texts.iter().zip(&self.labels) {
            let name = class_names
                .get(label)
                .ok_or_else(|| LimeError::dataset(format!("label {label} has no class name")))?;
            writer.write_record([text.as_str(), name.as_str()])?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Splits into `(train, test)` preserving class proportions.
    ///
    /// Each class contributes `round(count * test_size)` examples to the test
    /// set, always leaving at least one in training. Original order is kept
    /// within each part.
    pub fn train_test_split(&self, test_size: f64, seed: u64) -> Result<(Self, Self)> {
        if !(test_size > 0.0 && test_size < 1.0) {
            return Err(LimeError::config(format!(
                "test_size must lie in (0, 1), got {test_size}"
            )));
        }
        let n_classes = self.labels.iter().max().map_or(0, |m| m + 1);
        let mut rng = StdRng::seed_from_u64(seed);
        let mut test_mask = vec![false; self.len()];
        for class in 0..n_classes {
            let mut members: Vec<usize> = (0..self.len()).filter(|&i| self.labels[i] == class).collect();
            if members.len() < 2 {
                continue;
            }
            members.shuffle(&mut rng);
            let n_test = ((members.len() as f64 * test_size).round() as usize).min(members.len() - 1);
            for &i in &members[..n_test] {
                test_mask[i] = true;
            }
        }

        let mut train = LabeledDataset::default();
        let mut test = LabeledDataset::default();
        for (i, is_test) in test_mask.into_iter().enumerate() {
            let part = if is_test { &mut test } else { &mut train };
            part.texts.push(self.texts[i].clone());
            part.labels.push(self.labels[i]);
        }
        if test.is_empty() {
            return Err(LimeError::dataset(format!(
                "test split of {} examples is empty; add data or raise test_size",
                self.len()
            )));
        }
        Ok((train, test))
    }

    /// The examples at `indices`, in that order.
    pub fn subset(&self, indices: &[usize]) -> Self {
        LabeledDataset {
            texts: indices.iter().map(|&i| self.texts[i].clone()).collect(),
            labels: indices.iter().map(|&i| self.labels[i]).collect(),
        }
    }

    /// Stratified k-fold splits as `(train, test)` pairs.
    ///
    /// Each class is shuffled with the seeded generator, then the classes are
    /// dealt round-robin into `k` test folds, so every fold keeps roughly the
    /// class proportions of the whole dataset and fold sizes differ by at most
    /// one.
    pub fn stratified_folds(&self, k: usize, seed: u64) -> Result<Vec<(Self, Self)>> {
        if k < 2 {
            return Err(LimeError::config(format!("cross-validation needs at least 2 folds, got {k}")));
        }
        if k > self.len() {
            return Err(LimeError::dataset(format!(
                "cannot split {} examples into {k} folds",
                self.len()
            )));
        }

        let n_classes = self.labels.iter().max().map_or(0, |m| m + 1);
        let mut rng = StdRng::seed_from_u64(seed);
        let mut fold_of = vec![0usize; self.len()];
        let mut position = 0usize;
        let mut smallest = usize::MAX;
        for class in 0..n_classes {
            let mut members: Vec<usize> = (0..self.len()).filter(|&i| self.labels[i] == class).collect();
            if members.is_empty() {
                continue;
            }
            smallest = smallest.min(members.len());
            members.shuffle(&mut rng);
            for i in members {
                fold_of[i] = position % k;
                position += 1;
            }
        }
        if smallest < k {
            warn!(folds = k, smallest_class = smallest, "some folds will miss a class");
        }

        Ok((0..k)
            .map(|fold| {
                let (test, train): (Vec<usize>, Vec<usize>) = (0..self.len()).partition(|&i| fold_of[i] == fold);
                (self.subset(&train), self.subset(&test))
            })
            .collect())
    }

    /// A synthetic corpus of sensationalist (label 1) and sober (label 0)
    /// headlines, reproducible for a given seed.
    pub fn synthetic(num_samples: usize, seed: u64) -> Self {
        const FAKE_TEMPLATES: [&str; 5] = [
            "BREAKING: Scientists discover {a} causes {b}!",
            "SHOCKING: Government hides {a} from public!",
            "You won't believe what {a} revealed about {b}!",
            "EXCLUSIVE: {a} exposed in major scandal!",
            "URGENT: {a} confirms {b} conspiracy!",
        ];
        const REAL_TEMPLATES: [&str; 5] = [
            "Study finds {a} may impact {b} rates",
            "Researchers report {a} in new findings",
            "Analysis shows {a} trend continues",
            "Report indicates {a} affects {b} outcomes",
            "Data suggests {a} correlates with {b}",
        ];
        const TOPICS: [&str; 6] = ["climate", "economy", "health", "technology", "education", "politics"];
        const EFFECTS: [&str; 5] = ["growth", "decline", "changes", "improvements", "challenges"];

        let mut rng = StdRng::seed_from_u64(seed);
        let mut dataset = LabeledDataset::default();
        for _ in 0..num_samples {
            let fake = rng.gen_bool(0.5);
            let templates = if fake { &FAKE_TEMPLATES } else { &REAL_TEMPLATES };
            let template = templates[rng.gen_range(0..templates.len())];
            let topic = TOPICS[rng.gen_range(0..TOPICS.len())];
            let effect = EFFECTS[rng.gen_range(0..EFFECTS.len())];
            dataset
                .texts
                .push(template.replace("{a}", topic).replace("{b}", effect));
            dataset.labels.push(usize::from(fake));
        }
        dataset
    }
}
