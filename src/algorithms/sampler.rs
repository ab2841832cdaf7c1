// src/algorithms/sampler.rs

use crate::core::{Document, LimeError, PerturbedSample, Result, SampleBatch, SamplingScheme};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_distr::{Bernoulli, Distribution, Uniform};
use tracing::debug;

/// Generates masked neighbours of a document.
#[derive(Debug, Clone, Default)]
pub struct PerturbationSampler {
    scheme: SamplingScheme,
}

impl PerturbationSampler {
    pub fn new(scheme: SamplingScheme) -> Self {
        PerturbationSampler { scheme }
    }

    /// Draws `num_samples` masks (the first is always all-ones) and rebuilds
    /// their texts. Identical inputs and seed give identical batches.
    ///
    /// Duplicate masks are kept: a one-word document can only produce the
    /// all-ones and all-zeros masks, and every extra sample repeats one of them.
    pub fn sample(&self, document: &Document, num_samples: usize, seed: u64) -> Result<SampleBatch> {
        if num_samples == 0 {
            return Err(LimeError::invalid_input("num_samples must be positive"));
        }
        let d = document.num_features();
        if d == 0 {
            return Err(LimeError::invalid_input("document has no features"));
        }

        let distinct_masks = 1_usize.checked_shl(d as u32).unwrap_or(usize::MAX);
        if num_samples > distinct_masks {
            debug!(
                features = d,
                num_samples,
                distinct_masks,
                "more samples than distinct masks; duplicates expected"
            );
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let mut samples = Vec::with_capacity(num_samples);

        let anchor = vec![true; d];
        samples.push(PerturbedSample {
            text: document.reconstruct(&anchor)?,
            mask: anchor,
        });

        match self.scheme {
            SamplingScheme::UniformRemovalCount => {
                let features_indices: Vec<usize> = (0..d).collect();
                let removal_count = Uniform::new_inclusive(1, d);
                for _ in 1..num_samples {
                    let k = removal_count.sample(&mut rng);
                    let mut mask = vec![true; d];
                    for &idx in features_indices.choose_multiple(&mut rng, k) {
                        mask[idx] = false;
                    }
                    samples.push(PerturbedSample {
                        text: document.reconstruct(&mask)?,
                        mask,
                    });
                }
            }
            SamplingScheme::Bernoulli { keep_probability } => {
                let keep = Bernoulli::new(keep_probability).map_err(|e| {
                    LimeError::invalid_input(format!("invalid keep_probability: {e}"))
                })?;
                for _ in 1..num_samples {
                    let mask: Vec<bool> = (0..d).map(|_| keep.sample(&mut rng)).collect();
                    samples.push(PerturbedSample {
                        text: document.reconstruct(&mask)?,
                        mask,
                    });
                }
            }
        }

        Ok(SampleBatch::new(samples, d))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(text: &str) -> Document {
        Document::new(text).unwrap()
    }

    #[test]
    fn first_sample_is_the_original_document() {
        let document = doc("the cat sat on the mat");
        let batch = PerturbationSampler::default().sample(&document, 50, 7).unwrap();
        assert_eq!(batch.len(), 50);
        assert!(batch.samples()[0].mask.iter().all(|&b| b));
        assert_eq!(batch.samples()[0].text, document.raw());
    }

    #[test]
    fn uniform_scheme_always_removes_at_least_one_feature() {
        let document = doc("alpha beta gamma delta epsilon zeta");
        let batch = PerturbationSampler::default().sample(&document, 300, 1).unwrap();
        for sample in &batch.samples()[1..] {
            let removed = sample.removed();
            assert!((1..=6).contains(&removed), "removed {removed}");
        }
        // every removal count should show up in 300 draws over 6 options
        let mut seen = [false; 7];
        for sample in &batch.samples()[1..] {
            seen[sample.removed()] = true;
        }
        assert!(seen[1..].iter().all(|&s| s));
    }

    #[test]
    fn same_seed_same_batch() {
        let document = doc("a quick brown fox jumps over a lazy dog");
        let sampler = PerturbationSampler::default();
        let a = sampler.sample(&document, 100, 42).unwrap();
        let b = sampler.sample(&document, 100, 42).unwrap();
        assert_eq!(a.samples(), b.samples());
        let c = sampler.sample(&document, 100, 43).unwrap();
        assert_ne!(a.samples(), c.samples());
    }

    #[test]
    fn single_word_document_yields_only_two_distinct_masks() {
        let document = doc("shocking!");
        let batch = PerturbationSampler::default().sample(&document, 10, 3).unwrap();
        assert_eq!(batch.len(), 10);
        assert_eq!(batch.samples()[0].mask, vec![true]);
        for sample in &batch.samples()[1..] {
            assert_eq!(sample.mask, vec![false]);
            assert_eq!(sample.text, "!");
        }
    }

    #[test]
    fn bernoulli_scheme_is_reproducible_and_anchored() {
        let document = doc("one two three four five");
        let sampler = PerturbationSampler::new(SamplingScheme::Bernoulli { keep_probability: 0.5 });
        let a = sampler.sample(&document, 40, 9).unwrap();
        let b = sampler.sample(&document, 40, 9).unwrap();
        assert_eq!(a.samples(), b.samples());
        assert!(a.samples()[0].mask.iter().all(|&bit| bit));
    }

    #[test]
    fn zero_samples_is_invalid() {
        let document = doc("hello world");
        assert!(matches!(
            PerturbationSampler::default().sample(&document, 0, 1),
            Err(LimeError::InvalidInput(_))
        ));
    }
}
