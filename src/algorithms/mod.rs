pub mod assembler;
pub mod kernel_shap;
pub mod lime_text;
pub mod sampler;
pub mod scoring;
pub mod surrogate;

pub use assembler::assemble;
pub use kernel_shap::KernelShapExplainer;
pub use lime_text::{ExplainOptions, LimeTextExplainer};
pub use sampler::PerturbationSampler;
pub use scoring::{score_texts, validate_probabilities};
pub use surrogate::SurrogateFitter;
