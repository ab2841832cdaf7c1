// src/report.rs

//! Serializable response shapes and the plain-text explanation report.

use crate::context::{BatchClassification, Classification};
use crate::core::{Explanation, Result, ShapExplanation, WordImportance};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const REPORT_FILE: &str = "explanation_report.txt";
pub const EXPLANATION_FILE: &str = "explanation.json";
const REPORT_PREVIEW_CHARS: usize = 500;

pub fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

fn rounded(probabilities: &BTreeMap<String, f64>) -> BTreeMap<String, f64> {
    probabilities
        .iter()
        .map(|(name, &p)| (name.clone(), round4(p)))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResponse {
    pub prediction: String,
    pub confidence: f64,
    pub probabilities: BTreeMap<String, f64>,
}

impl From<&Classification> for ClassificationResponse {
    fn from(c: &Classification) -> Self {
        ClassificationResponse {
            prediction: c.predicted_class.clone(),
            confidence: round4(c.confidence),
            probabilities: rounded(&c.probabilities),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WordScore {
    pub word: String,
    pub score: f64,
    pub direction: String,
}

fn word_scores(words: &[WordImportance]) -> Vec<WordScore> {
    words
        .iter()
        .map(|w| WordScore {
            word: w.word.clone(),
            score: round4(w.score),
            direction: w.direction.clone(),
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExplanationResponse {
    pub prediction: String,
    pub confidence: f64,
    pub probabilities: BTreeMap<String, f64>,
    pub explained_class: String,
    pub explanation: Vec<WordScore>,
    /// Weighted R^2 of the local surrogate.
    pub local_fit: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl From<&Explanation> for ExplanationResponse {
    fn from(e: &Explanation) -> Self {
        ExplanationResponse {
            prediction: e.predicted_class.clone(),
            confidence: round4(e.confidence),
            probabilities: rounded(&e.probabilities),
            explained_class: e.target_class.clone(),
            explanation: word_scores(&e.word_importance),
            local_fit: round4(e.score),
            notes: e.notes.iter().map(ToString::to_string).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShapResponse {
    pub prediction: String,
    pub probabilities: BTreeMap<String, f64>,
    pub explained_class: String,
    /// Output for the text with every word removed.
    pub base_value: f64,
    pub output: f64,
    pub shap_values: Vec<WordScore>,
}

impl From<&ShapExplanation> for ShapResponse {
    fn from(e: &ShapExplanation) -> Self {
        ShapResponse {
            prediction: e.predicted_class.clone(),
            probabilities: rounded(&e.probabilities),
            explained_class: e.target_class.clone(),
            base_value: round4(e.expected_value),
            output: round4(e.actual_prediction),
            shap_values: word_scores(&e.word_importance),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchItemResponse {
    pub text: String,
    pub prediction: Option<String>,
    pub confidence: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResponse {
    pub results: Vec<BatchItemResponse>,
    pub total: usize,
}

impl From<&[BatchClassification]> for BatchResponse {
    fn from(items: &[BatchClassification]) -> Self {
        let results: Vec<BatchItemResponse> = items
            .iter()
            .map(|item| match &item.outcome {
                Ok(c) => BatchItemResponse {
                    text: item.preview.clone(),
                    prediction: Some(c.predicted_class.clone()),
                    confidence: Some(round4(c.confidence)),
                    error: None,
                },
                Err(e) => BatchItemResponse {
                    text: item.preview.clone(),
                    prediction: None,
                    confidence: None,
                    error: Some(e.to_string()),
                },
            })
            .collect();
        BatchResponse {
            total: results.len(),
            results,
        }
    }
}

/// Human-readable report of one explanation.
pub struct TextReport<'a> {
    pub text: &'a str,
    pub explanation: &'a Explanation,
}

impl fmt::Display for TextReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let exp = self.explanation;
        let rule = "=".repeat(60);
        let thin = "-".repeat(40);
        writeln!(f, "{rule}\nFAKE NEWS DETECTION - EXPLANATION REPORT\n{rule}\n")?;
        writeln!(f, "INPUT TEXT:\n{thin}")?;
        writeln!(f, "{}\n", crate::context::preview(self.text, REPORT_PREVIEW_CHARS))?;
        writeln!(f, "PREDICTION:\n{thin}")?;
        writeln!(f, "Class: {}", exp.predicted_class)?;
        writeln!(f, "Confidence: {:.2}%\n", exp.confidence * 100.0)?;
        writeln!(f, "PROBABILITIES:\n{thin}")?;
        for (name, p) in exp.ordered_probabilities() {
            writeln!(f, "  {name}: {:.2}%", p * 100.0)?;
        }
        writeln!(f, "\nKEY INFLUENTIAL WORDS (toward {}):\n{thin}", exp.target_class)?;
        for w in &exp.word_importance {
            writeln!(f, "  '{}': {:+.4} -> {}", w.word, w.score, w.direction)?;
        }
        writeln!(f, "\nLocal fit (weighted R^2): {:.4}", exp.score)?;
        for note in &exp.notes {
            writeln!(f, "Note: {note}")?;
        }
        write!(f, "\n{rule}")
    }
}

pub fn render_text_report(text: &str, explanation: &Explanation) -> String {
    TextReport { text, explanation }.to_string()
}

/// Paths written by [`write_report`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPaths {
    pub report: PathBuf,
    pub json: PathBuf,
}

/// Writes the text report and the JSON response into `dir`.
pub fn write_report<P: AsRef<Path>>(dir: P, text: &str, explanation: &Explanation) -> Result<ReportPaths> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;
    let paths = ReportPaths {
        report: dir.join(REPORT_FILE),
        json: dir.join(EXPLANATION_FILE),
    };
    fs::write(&paths.report, render_text_report(text, explanation))?;
    fs::write(
        &paths.json,
        serde_json::to_vec_pretty(&ExplanationResponse::from(explanation))?,
    )?;
    info!(report = %paths.report.display(), "wrote explanation report");
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ExplanationNote, WordImportance};
    use pretty_assertions::assert_eq;

    fn explanation() -> Explanation {
        Explanation {
            predicted_class: "Fake".to_string(),
            predicted_index: 1,
            confidence: 0.876543,
            probabilities: BTreeMap::from([("Real".to_string(), 0.123457), ("Fake".to_string(), 0.876543)]),
            class_names: vec!["Real".to_string(), "Fake".to_string()],
            target_class: "Fake".to_string(),
            target_index: 1,
            word_importance: vec![
                WordImportance {
                    word: "SHOCKING".to_string(),
                    score: 0.412345,
                    direction: "Fake".to_string(),
                },
                WordImportance {
                    word: "study".to_string(),
                    score: -0.1,
                    direction: "Real".to_string(),
                },
            ],
            intercept: 0.3,
            score: 0.91,
            local_prediction: 0.8,
            notes: vec![],
        }
    }

    #[test]
    fn responses_round_to_four_places() {
        let response = ExplanationResponse::from(&explanation());
        assert_eq!(response.confidence, 0.8765);
        assert_eq!(response.probabilities["Real"], 0.1235);
        assert_eq!(response.explanation[0].score, 0.4123);
        let json = serde_json::to_string(&response).unwrap();
        assert!(!json.contains("notes"));
    }

    #[test]
    fn text_report_lists_words_with_signed_scores() {
        let text = render_text_report("Some article", &explanation());
        assert!(text.contains("Class: Fake"));
        assert!(text.contains("Confidence: 87.65%"));
        assert!(text.contains("'SHOCKING': +0.4123 -> Fake"));
        assert!(text.contains("'study': -0.1000 -> Real"));
        assert!(text.find("Real: 12.35%").unwrap() < text.find("Fake: 87.65%").unwrap());
    }

    #[test]
    fn degenerate_note_is_reported() {
        let mut exp = explanation();
        exp.notes.push(ExplanationNote::FitDegenerate { constant_output: 0.5 });
        assert!(render_text_report("x", &exp).contains("Note:"));
        assert_eq!(ExplanationResponse::from(&exp).notes.len(), 1);
    }

    #[test]
    fn long_inputs_are_previewed() {
        let long = "word ".repeat(200);
        let report = render_text_report(&long, &explanation());
        assert!(report.contains("..."));
        assert!(!report.contains(&long));
    }

    #[test]
    fn report_ends_with_the_rule() {
        let report = TextReport {
            text: "Some article",
            explanation: &explanation(),
        }
        .to_string();
        assert!(report.starts_with(&"=".repeat(60)));
        assert!(report.ends_with(&format!("\n{}", "=".repeat(60))));
        assert!(report.contains("Local fit (weighted R^2): 0.9100"));
    }

    #[test]
    fn shap_response_keeps_ranked_words() {
        let shap = ShapExplanation {
            predicted_class: "Fake".to_string(),
            probabilities: BTreeMap::from([("Real".to_string(), 0.2), ("Fake".to_string(), 0.8)]),
            target_class: "Fake".to_string(),
            target_index: 1,
            words: vec!["SHOCKING".to_string(), "study".to_string()],
            shap_values: ndarray::array![0.512345, -0.1],
            expected_value: 0.388888,
            actual_prediction: 0.8,
            word_importance: explanation().word_importance,
        };
        let response = ShapResponse::from(&shap);
        assert_eq!(response.base_value, 0.3889);
        assert_eq!(response.shap_values[0].word, "SHOCKING");
        assert_eq!(response.shap_values[1].score, -0.1);
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["explained_class"], "Fake");
    }

    #[test]
    fn report_files_are_written() {
        let dir = tempfile::tempdir().unwrap();
        let paths = write_report(dir.path().join("out"), "Some article", &explanation()).unwrap();
        let json: ExplanationResponse =
            serde_json::from_slice(&std::fs::read(&paths.json).unwrap()).unwrap();
        assert_eq!(json.prediction, "Fake");
        assert!(std::fs::read_to_string(&paths.report).unwrap().contains("EXPLANATION REPORT"));
    }
}
