// src/algorithms/assembler.rs

use crate::core::{Explanation, ExplanationNote, LimeError, Result, SurrogateModel, WordImportance};
use ndarray::ArrayView1;
use std::collections::BTreeMap;

/// Index of the largest probability; ties resolve to the lower index.
pub fn argmax(probabilities: ArrayView1<f64>) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, &p) in probabilities.iter().enumerate() {
        match best {
            Some((_, best_p)) if p <= best_p => {}
            _ => best = Some((idx, p)),
        }
    }
    best.map(|(idx, _)| idx)
}

/// Feature indices ordered by descending `|coefficient|`, ties by index.
pub fn rank_features(coefficients: ArrayView1<f64>) -> Vec<usize> {
    let mut order: Vec<usize> = (0..coefficients.len()).collect();
    order.sort_by(|&a, &b| {
        coefficients[b]
            .abs()
            .total_cmp(&coefficients[a].abs())
            .then_with(|| a.cmp(&b))
    });
    order
}

/// Class a signed score pushes toward, relative to the explained class.
pub fn direction_label(score: f64, target: usize, class_names: &[String]) -> String {
    if score >= 0.0 {
        return class_names[target].clone();
    }
    if class_names.len() == 2 {
        class_names[1 - target].clone()
    } else {
        format!("not {}", class_names[target])
    }
}

/// Packages a fitted surrogate into a ranked, self-contained explanation.
///
/// Pure: no I/O, and the same inputs always give the same output.
pub fn assemble(
    model: &SurrogateModel,
    vocabulary: &[String],
    original_probabilities: ArrayView1<f64>,
    class_names: &[String],
    top_k: usize,
) -> Result<Explanation> {
    if top_k == 0 {
        return Err(LimeError::invalid_input("top_k must be positive"));
    }
    if model.coefficients.len() != vocabulary.len() {
        return Err(LimeError::invalid_input(format!(
            "{} coefficients for {} vocabulary entries",
            model.coefficients.len(),
            vocabulary.len()
        )));
    }
    if original_probabilities.len() != class_names.len() {
        return Err(LimeError::contract(format!(
            "classifier produced {} classes, {} class names configured",
            original_probabilities.len(),
            class_names.len()
        )));
    }
    let target = model.target_class;
    if target >= class_names.len() {
        return Err(LimeError::invalid_input(format!(
            "target class {target} out of range for {} classes",
            class_names.len()
        )));
    }
    let predicted = argmax(original_probabilities)
        .ok_or_else(|| LimeError::contract("classifier produced an empty probability row"))?;

    let word_importance = rank_features(model.coefficients.view())
        .into_iter()
        .take(top_k)
        .map(|idx| {
            let score = model.coefficients[idx];
            WordImportance {
                word: vocabulary[idx].clone(),
                score,
                direction: direction_label(score, target, class_names),
            }
        })
        .collect();

    let probabilities: BTreeMap<String, f64> = class_names
        .iter()
        .cloned()
        .zip(original_probabilities.iter().copied())
        .collect();

    let mut notes = Vec::new();
    if model.degenerate {
        notes.push(ExplanationNote::FitDegenerate {
            constant_output: model.intercept,
        });
    }

    Ok(Explanation {
        predicted_class: class_names[predicted].clone(),
        predicted_index: predicted,
        confidence: original_probabilities[predicted],
        probabilities,
        class_names: class_names.to_vec(),
        target_class: class_names[target].clone(),
        target_index: target,
        word_importance,
        intercept: model.intercept,
        score: model.score,
        local_prediction: model.local_prediction,
        notes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1};

    fn names() -> Vec<String> {
        vec!["Real".to_string(), "Fake".to_string()]
    }

    fn vocab(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    fn model(coefficients: Array1<f64>, target_class: usize) -> SurrogateModel {
        SurrogateModel {
            coefficients,
            intercept: 0.3,
            target_class,
            score: 0.8,
            local_prediction: 0.7,
            degenerate: false,
        }
    }

    #[test]
    fn ranks_by_magnitude_with_first_occurrence_tie_break() {
        let order = rank_features(array![0.1, -0.5, 0.5, 0.0, -0.1].view());
        assert_eq!(order, vec![1, 2, 0, 4, 3]);
    }

    #[test]
    fn top_k_larger_than_vocabulary_returns_everything() {
        let m = model(array![0.2, -0.4], 1);
        let exp = assemble(&m, &vocab(&["a", "b"]), array![0.3, 0.7].view(), &names(), 10).unwrap();
        assert_eq!(exp.word_importance.len(), 2);
        assert_eq!(exp.word_importance[0].word, "b");
    }

    #[test]
    fn directions_follow_sign_relative_to_target() {
        let m = model(array![0.6, -0.3], 1);
        let exp = assemble(&m, &vocab(&["shocking", "reuters"]), array![0.2, 0.8].view(), &names(), 2)
            .unwrap();
        assert_eq!(exp.predicted_class, "Fake");
        assert_eq!(exp.confidence, 0.8);
        assert_eq!(exp.target_class, "Fake");
        assert_eq!(exp.word_importance[0].direction, "Fake");
        assert_eq!(exp.word_importance[1].direction, "Real");
        assert_eq!(exp.probabilities["Real"], 0.2);
        assert!(exp.notes.is_empty());
    }

    #[test]
    fn multiclass_negative_direction_is_negated_target() {
        let classes = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        assert_eq!(direction_label(-0.1, 2, &classes), "not c");
        assert_eq!(direction_label(0.1, 2, &classes), "c");
    }

    #[test]
    fn degenerate_model_is_annotated() {
        let mut m = model(Array1::zeros(3), 0);
        m.degenerate = true;
        m.intercept = 0.9;
        let exp = assemble(&m, &vocab(&["x", "y", "z"]), array![0.9, 0.1].view(), &names(), 2).unwrap();
        assert!(exp.is_degenerate());
        assert_eq!(exp.notes, vec![ExplanationNote::FitDegenerate { constant_output: 0.9 }]);
    }

    #[test]
    fn assembly_is_idempotent() {
        let m = model(array![0.1, 0.1, -0.1, 0.05], 0);
        let v = vocab(&["w", "x", "y", "z"]);
        let first = assemble(&m, &v, array![0.6, 0.4].view(), &names(), 3).unwrap();
        let second = assemble(&m, &v, array![0.6, 0.4].view(), &names(), 3).unwrap();
        assert_eq!(first, second);
        let words: Vec<&str> = first.word_importance.iter().map(|w| w.word.as_str()).collect();
        assert_eq!(words, vec!["w", "x", "y"]);
    }

    #[test]
    fn rejects_zero_top_k_and_shape_mismatches() {
        let m = model(array![0.1], 0);
        let v = vocab(&["a"]);
        assert!(matches!(
            assemble(&m, &v, array![0.5, 0.5].view(), &names(), 0),
            Err(LimeError::InvalidInput(_))
        ));
        assert!(assemble(&m, &vocab(&["a", "b"]), array![0.5, 0.5].view(), &names(), 1).is_err());
        assert!(matches!(
            assemble(&m, &v, array![0.2, 0.3, 0.5].view(), &names(), 1),
            Err(LimeError::ClassifierContract(_))
        ));
    }

    #[test]
    fn argmax_prefers_lower_index_on_ties() {
        assert_eq!(argmax(array![0.5, 0.5].view()), Some(0));
        assert_eq!(argmax(array![0.1, 0.9].view()), Some(1));
        assert_eq!(argmax(Array1::<f64>::zeros(0).view()), None);
    }
}
