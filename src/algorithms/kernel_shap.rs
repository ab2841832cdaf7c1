// src/algorithms/kernel_shap.rs

use crate::algorithms::assembler::{argmax, direction_label, rank_features};
use crate::algorithms::scoring::score_texts;
use crate::core::{
    Document, KernelShapConfig, KernelShapSamples, LimeError, Result, ShapExplanation, WordImportance,
};
use crate::traits::ClassifierHandle;
use crate::utils::linalg::solve_ridge;
use crate::utils::Deadline;
use ndarray::{s, Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::{debug, warn};

/// Documents with more words than this are always sampled, never enumerated.
const MAX_EXACT_FEATURES: usize = 20;

/// KernelSHAP over the words of a text.
///
/// A coalition keeps some words and drops the rest, so the base value is the
/// classifier's output for the text with every word removed. Values satisfy
/// the efficiency property exactly: they sum to the full-text output minus
/// the base value.
#[derive(Debug, Clone)]
pub struct KernelShapExplainer {
    config: KernelShapConfig,
    class_names: Vec<String>,
}

impl KernelShapExplainer {
    pub fn new(config: KernelShapConfig, class_names: Vec<String>) -> Result<Self> {
        config.validate()?;
        if class_names.len() < 2 {
            return Err(LimeError::invalid_input("at least two class names are required"));
        }
        Ok(KernelShapExplainer { config, class_names })
    }

    pub fn config(&self) -> &KernelShapConfig {
        &self.config
    }

    pub fn class_names(&self) -> &[String] {
        &self.class_names
    }

    /// Shapley values of every word of `text` toward `target_class`, or the
    /// predicted class when `None`.
    pub fn shap_values<C>(&self, text: &str, classifier: &C, target_class: Option<usize>) -> Result<ShapExplanation>
    where
        C: ClassifierHandle + ?Sized,
    {
        let deadline = Deadline::start(self.config.timeout());
        if let Some(target) = target_class {
            if target >= self.class_names.len() {
                return Err(LimeError::invalid_input(format!(
                    "target class {target} out of range for {} classes",
                    self.class_names.len()
                )));
            }
        }

        let document = Document::new(text)?;
        let m = document.num_features();
        let (coalitions, weights) = self.generate_coalitions(m)?;

        // row 0: nothing kept, row 1: everything kept, then the coalitions
        let mut texts = Vec::with_capacity(coalitions.nrows() + 2);
        texts.push(document.reconstruct(&vec![false; m])?);
        texts.push(document.raw().to_string());
        for row in coalitions.rows() {
            let mask: Vec<bool> = row.iter().map(|&v| v == 1.0).collect();
            texts.push(document.reconstruct(&mask)?);
        }
        deadline.check("sampling")?;

        let probabilities = score_texts(
            classifier,
            &texts,
            self.class_names.len(),
            self.config.classifier_batch_size,
            &deadline,
        )?;
        let predicted = argmax(probabilities.row(1))
            .ok_or_else(|| LimeError::contract("classifier produced an empty probability row"))?;
        let target = target_class.unwrap_or(predicted);
        let expected_value = probabilities[[0, target]];
        let actual_prediction = probabilities[[1, target]];
        let outputs = probabilities.slice(s![2.., target]).to_owned();

        deadline.check("fitting")?;
        let shap_values = solve_constrained(
            coalitions.view(),
            outputs.view(),
            weights.view(),
            expected_value,
            actual_prediction,
        )?;
        deadline.check("fitting")?;

        let word_importance = rank_features(shap_values.view())
            .into_iter()
            .map(|j| WordImportance {
                word: document.vocabulary()[j].clone(),
                score: shap_values[j],
                direction: direction_label(shap_values[j], target, &self.class_names),
            })
            .collect();
        debug!(
            features = m,
            coalitions = coalitions.nrows() + 2,
            base = expected_value,
            output = actual_prediction,
            elapsed_ms = deadline.elapsed().as_millis() as u64,
            "computed shap values"
        );

        Ok(ShapExplanation {
            predicted_class: self.class_names[predicted].clone(),
            probabilities: self
                .class_names
                .iter()
                .cloned()
                .zip(probabilities.row(1).iter().copied())
                .collect(),
            target_class: self.class_names[target].clone(),
            target_index: target,
            words: document.vocabulary().to_vec(),
            shap_values,
            expected_value,
            actual_prediction,
            word_importance,
        })
    }

    /// Coalitions strictly between empty and full, with their kernel weights.
    ///
    /// Enumerates all of them when the budget allows, otherwise samples a
    /// coalition size uniformly from `1..m` and then that many words.
    fn generate_coalitions(&self, m: usize) -> Result<(Array2<f64>, Array1<f64>)> {
        if m < 2 {
            return Ok((Array2::zeros((0, m)), Array1::zeros(0)));
        }
        let budget = match self.config.n_samples {
            KernelShapSamples::Auto => 2 * m + 2048,
            KernelShapSamples::Fixed(n) => n,
        };
        let interior_budget = budget.saturating_sub(2);

        let max_coalitions = 1_usize.checked_shl(m as u32).unwrap_or(usize::MAX);
        if m <= MAX_EXACT_FEATURES && interior_budget >= max_coalitions - 2 {
            let n = max_coalitions - 2;
            let mut coalitions = Array2::zeros((n, m));
            let mut weights = Array1::zeros(n);
            for (row, code) in (1..max_coalitions - 1).enumerate() {
                let mut size = 0;
                for j in 0..m {
                    if (code >> j) & 1 == 1 {
                        coalitions[[row, j]] = 1.0;
                        size += 1;
                    }
                }
                weights[row] = kernel_weight(size, m);
            }
            return Ok((coalitions, weights));
        }

        // one equation per free value at the very least
        if interior_budget < m - 1 {
            return Err(LimeError::invalid_input(format!(
                "{budget} coalitions cannot determine {m} Shapley values; raise n_samples"
            )));
        }

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let features_indices: Vec<usize> = (0..m).collect();
        let mut coalitions = Array2::zeros((interior_budget, m));
        let mut weights = Array1::zeros(interior_budget);
        for i in 0..interior_budget {
            let k = rng.gen_range(1..m);
            for &idx in features_indices.choose_multiple(&mut rng, k) {
                coalitions[[i, idx]] = 1.0;
            }
            weights[i] = kernel_weight(k, m);
        }
        Ok((coalitions, weights))
    }
}

/// Shapley kernel `(M - 1) / (C(M, k) * k * (M - k))` for `0 < k < M`.
fn kernel_weight(coalition_size: usize, num_features: usize) -> f64 {
    let m = num_features as f64;
    let k = coalition_size as f64;
    (m - 1.0) / (n_choose_k(num_features, coalition_size) * k * (m - k))
}

fn n_choose_k(n: usize, k: usize) -> f64 {
    if k > n {
        return 0.0;
    }
    // C(n, k) = C(n, n - k)
    let k = k.min(n - k);
    let mut res = 1.0;
    for i in 0..k {
        res *= (n - i) as f64;
        res /= (i + 1) as f64;
    }
    res
}

/// Weighted least squares with the empty and full coalitions as hard
/// constraints: the intercept is `base` and the values sum to `full - base`.
///
/// The last value is eliminated through the sum constraint and the others are
/// solved from the normal equations.
fn solve_constrained(
    coalitions: ArrayView2<f64>,
    outputs: ArrayView1<f64>,
    weights: ArrayView1<f64>,
    base: f64,
    full: f64,
) -> Result<Array1<f64>> {
    let m = coalitions.ncols();
    let total = full - base;
    if m == 1 {
        return Ok(Array1::from_elem(1, total));
    }

    let last = coalitions.column(m - 1);
    let x = &coalitions.slice(s![.., ..m - 1]) - &last.insert_axis(Axis(1));
    let y = &outputs - base - &(&last * total);

    let sqrt_w = weights.mapv(f64::sqrt);
    let x_w = &x * &sqrt_w.view().insert_axis(Axis(1));
    let y_w = &y * &sqrt_w;
    let gram = x_w.t().dot(&x_w);
    let rhs = x_w.t().dot(&y_w);

    let (free, alpha) = solve_ridge(&gram, &rhs, 0.0)
        .ok_or_else(|| LimeError::Numerical("shap system stayed singular after ridge fallback".to_string()))?;
    if alpha > 0.0 {
        warn!(alpha, "singular shap system; solved with ridge fallback");
    }

    let mut values = Array1::zeros(m);
    values.slice_mut(s![..m - 1]).assign(&free);
    values[m - 1] = total - free.sum();
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use crate::core::default_class_names;

    fn explainer(n_samples: KernelShapSamples) -> KernelShapExplainer {
        let config = KernelShapConfig {
            n_samples,
            ..Default::default()
        };
        KernelShapExplainer::new(config, default_class_names()).unwrap()
    }

    /// P(Fake) = 0.1 + 0.3 [alpha] + 0.2 [beta]
    fn additive(texts: &[String]) -> Result<Array2<f64>> {
        let mut out = Array2::zeros((texts.len(), 2));
        for (i, text) in texts.iter().enumerate() {
            let has = |w: &str| text.split(|c: char| !c.is_alphanumeric()).any(|t| t == w);
            let fake = 0.1 + if has("alpha") { 0.3 } else { 0.0 } + if has("beta") { 0.2 } else { 0.0 };
            out[[i, 0]] = 1.0 - fake;
            out[[i, 1]] = fake;
        }
        Ok(out)
    }

    /// P(Fake) = 0.1 + 0.6 [alpha and beta]
    fn conjunction(texts: &[String]) -> Result<Array2<f64>> {
        let mut out = Array2::zeros((texts.len(), 2));
        for (i, text) in texts.iter().enumerate() {
            let words: Vec<&str> = text.split_whitespace().collect();
            let both = words.contains(&"alpha") && words.contains(&"beta");
            let fake = if both { 0.7 } else { 0.1 };
            out[[i, 0]] = 1.0 - fake;
            out[[i, 1]] = fake;
        }
        Ok(out)
    }

    #[test]
    fn kernel_weights_are_symmetric_in_coalition_size() {
        assert_abs_diff_eq!(kernel_weight(1, 5), kernel_weight(4, 5), epsilon = 1e-15);
        assert!(kernel_weight(1, 5) > kernel_weight(2, 5));
        assert_eq!(n_choose_k(5, 2), 10.0);
        assert_eq!(n_choose_k(3, 4), 0.0);
    }

    #[test]
    fn additive_classifier_gets_its_own_coefficients() {
        let shap = explainer(KernelShapSamples::Auto);
        let fake = shap.shap_values("alpha beta gamma", &additive, None).unwrap();
        assert_eq!(fake.predicted_class, "Fake");
        assert_eq!(fake.target_index, 1);
        assert_abs_diff_eq!(fake.expected_value, 0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(fake.actual_prediction, 0.6, epsilon = 1e-12);
        assert_abs_diff_eq!(fake.shap_values[0], 0.3, epsilon = 1e-9);
        assert_abs_diff_eq!(fake.shap_values[1], 0.2, epsilon = 1e-9);
        assert_abs_diff_eq!(fake.shap_values[2], 0.0, epsilon = 1e-9);
        assert_eq!(fake.word_importance[0].word, "alpha");
        assert_eq!(fake.word_importance[0].direction, "Fake");
        assert_eq!(fake.top(2).len(), 2);

        // explaining the other class flips every sign
        let real = shap.shap_values("alpha beta gamma", &additive, Some(0)).unwrap();
        assert_eq!(real.target_class, "Real");
        assert_abs_diff_eq!(real.shap_values[0], -0.3, epsilon = 1e-9);
        assert_eq!(real.word_importance[0].direction, "Fake");
    }

    #[test]
    fn interaction_credit_is_split_evenly() {
        let exp = explainer(KernelShapSamples::Auto)
            .shap_values("alpha gamma beta", &conjunction, Some(1))
            .unwrap();
        assert_abs_diff_eq!(exp.shap_values[0], 0.3, epsilon = 1e-9);
        assert_abs_diff_eq!(exp.shap_values[1], 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(exp.shap_values[2], 0.3, epsilon = 1e-9);
    }

    #[test]
    fn sampled_values_still_sum_to_the_output_gap() {
        let text = (0..30).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ") + " alpha beta";
        let shap = explainer(KernelShapSamples::Fixed(400));
        let exp = shap.shap_values(&text, &additive, Some(1)).unwrap();
        assert_eq!(exp.shap_values.len(), 32);
        assert_abs_diff_eq!(
            exp.shap_values.sum(),
            exp.actual_prediction - exp.expected_value,
            epsilon = 1e-9
        );
        assert!(exp.shap_values.iter().all(|v| v.is_finite()));

        let again = shap.shap_values(&text, &additive, Some(1)).unwrap();
        assert_eq!(exp, again);
    }

    #[test]
    fn single_word_takes_the_whole_gap() {
        let exp = explainer(KernelShapSamples::Auto)
            .shap_values("alpha.", &additive, Some(1))
            .unwrap();
        assert_eq!(exp.shap_values.len(), 1);
        assert_abs_diff_eq!(exp.shap_values[0], 0.3, epsilon = 1e-12);
    }

    #[test]
    fn budget_and_target_are_checked() {
        let text = (0..30).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ");
        assert!(matches!(
            explainer(KernelShapSamples::Fixed(10)).shap_values(&text, &additive, None),
            Err(LimeError::InvalidInput(_))
        ));
        assert!(matches!(
            explainer(KernelShapSamples::Auto).shap_values("alpha beta", &additive, Some(2)),
            Err(LimeError::InvalidInput(_))
        ));
        assert!(KernelShapExplainer::new(KernelShapConfig::default(), vec!["one".into()]).is_err());
    }
}
