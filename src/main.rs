//! `lime-news`: train the real/fake news classifier and explain its predictions.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use lime_rs::context::DetectorContext;
use lime_rs::core::{load_config, AppConfig, KernelShapSamples, LimeError, ModelKind};
use lime_rs::pipeline::{compare_models, cross_validate, parse_label, CsvColumns, LabeledDataset, NewsClassifier};
use lime_rs::report::{write_report, BatchResponse, ClassificationResponse, ExplanationResponse, ShapResponse};
use lime_rs::ExplainOptions;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Fake news detection with word-level LIME explanations
#[derive(Parser, Debug)]
#[command(name = "lime-news", version, about, long_about = None)]
struct Cli {
    /// Configuration file path (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding model.json and metadata.json
    #[arg(short, long, global = true)]
    model_dir: Option<PathBuf>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ModelArg {
    LogisticRegression,
    NaiveBayes,
}

impl From<ModelArg> for ModelKind {
    fn from(arg: ModelArg) -> Self {
        match arg {
            ModelArg::LogisticRegression => ModelKind::LogisticRegression,
            ModelArg::NaiveBayes => ModelKind::NaiveBayes,
        }
    }
}

#[derive(clap::Args, Debug)]
struct DataArgs {
    /// CSV file with text and label columns; a synthetic corpus is used when omitted
    #[arg(short, long)]
    data: Option<PathBuf>,

    #[arg(long, default_value = "text")]
    text_column: String,

    #[arg(long, default_value = "label")]
    label_column: String,

    /// Optional title column prepended to the text
    #[arg(long)]
    title_column: Option<String>,

    /// Size of the synthetic corpus
    #[arg(long, default_value_t = 500)]
    samples: usize,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Train a classifier, report held-out metrics and save it
    Train {
        #[command(flatten)]
        data: DataArgs,

        #[arg(long, value_enum)]
        model: Option<ModelArg>,
    },
    /// Classify one article
    Classify {
        text: String,

        /// Print the JSON response
        #[arg(long)]
        json: bool,
    },
    /// Classify and explain one article
    Explain {
        text: String,

        #[arg(short = 'n', long)]
        num_features: Option<usize>,

        #[arg(long)]
        num_samples: Option<usize>,

        /// Class to explain (name or index); defaults to the predicted class
        #[arg(long)]
        target_class: Option<String>,

        /// Write explanation_report.txt and explanation.json here
        #[arg(long)]
        report_dir: Option<PathBuf>,

        /// Print the JSON response
        #[arg(long)]
        json: bool,
    },
    /// Explain every line of a file, printing one JSON object per line
    ExplainBatch {
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short = 'n', long)]
        num_features: Option<usize>,
    },
    /// Classify every line of a file
    ClassifyBatch {
        #[arg(short, long)]
        input: PathBuf,
    },
    /// Attribute one article's prediction to its words with KernelSHAP
    Shap {
        text: String,

        #[arg(short = 'n', long)]
        num_features: Option<usize>,

        /// Coalitions to evaluate; enough for exact values on short texts by default
        #[arg(long)]
        num_samples: Option<usize>,

        /// Print the JSON response
        #[arg(long)]
        json: bool,
    },
    /// List the features with the largest global model weights
    Importance {
        #[arg(short = 'n', long, default_value_t = 20)]
        top: usize,
    },
    /// Stratified k-fold cross-validation of the configured model
    Cv {
        #[command(flatten)]
        data: DataArgs,

        #[arg(long)]
        folds: Option<usize>,

        #[arg(long, value_enum)]
        model: Option<ModelArg>,
    },
    /// Train every model kind on the same split and rank them
    Compare {
        #[command(flatten)]
        data: DataArgs,
    },
    /// Train on a synthetic corpus and explain a few headlines
    Demo,
}

fn init_tracing(cli: &Cli) {
    let level = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let human = (!cli.log_json).then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
    });
    let json = cli
        .log_json
        .then(|| tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(filter)
        .with(human)
        .with(json)
        .init();
}

fn load_dataset(args: &DataArgs, config: &AppConfig) -> anyhow::Result<LabeledDataset> {
    match &args.data {
        Some(path) => {
            let columns = CsvColumns {
                text: args.text_column.clone(),
                label: args.label_column.clone(),
                title: args.title_column.clone(),
            };
            LabeledDataset::load_csv(path, &columns, &config.pipeline.class_names)
                .with_context(|| format!("loading {}", path.display()))
        }
        None => {
            info!(samples = args.samples, "no dataset given, generating a synthetic corpus");
            Ok(LabeledDataset::synthetic(args.samples, config.pipeline.seed))
        }
    }
}

fn read_lines(path: &Path) -> anyhow::Result<Vec<String>> {
    let file = std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let mut lines = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if !line.trim().is_empty() {
            lines.push(line);
        }
    }
    Ok(lines)
}

fn context(config: &AppConfig) -> anyhow::Result<DetectorContext> {
    DetectorContext::from_config(config, None).with_context(|| {
        format!(
            "loading model from {} (run `lime-news train` first)",
            config.model_dir.display()
        )
    })
}

fn run_train(data: &DataArgs, model: Option<ModelArg>, config: &mut AppConfig) -> anyhow::Result<()> {
    if let Some(model) = model {
        config.pipeline.model.kind = model.into();
    }
    let dataset = load_dataset(data, config)?;
    let (classifier, metrics) = NewsClassifier::train(&dataset, &config.pipeline, None)?;
    println!(
        "{}",
        metrics.report(config.pipeline.model.kind.as_str(), classifier.class_names())
    );
    classifier
        .save(&config.model_dir)
        .with_context(|| format!("saving model to {}", config.model_dir.display()))?;
    println!("Model saved to {}", config.model_dir.display());
    Ok(())
}

fn run_explain(
    ctx: &DetectorContext,
    text: &str,
    options: ExplainOptions,
    report_dir: Option<&Path>,
    json: bool,
) -> anyhow::Result<()> {
    let explanation = ctx.explain_with(text, options)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&ExplanationResponse::from(&explanation))?);
    } else {
        println!("{explanation}");
    }
    if let Some(dir) = report_dir {
        let paths = write_report(dir, text, &explanation)?;
        println!("Report saved to {}", paths.report.display());
    }
    Ok(())
}

fn run_demo(config: &AppConfig) -> anyhow::Result<()> {
    let dataset = LabeledDataset::synthetic(500, config.pipeline.seed);
    let (classifier, metrics) = NewsClassifier::train(&dataset, &config.pipeline, None)?;
    println!(
        "{}",
        metrics.report(config.pipeline.model.kind.as_str(), classifier.class_names())
    );

    let ctx = DetectorContext::new(Arc::new(classifier), config.explainer.clone(), config.api.clone())?
        .with_shap_config(config.shap.clone())?;
    let headlines = [
        "BREAKING: Scientists discover technology causes decline!",
        "Report indicates education affects growth outcomes",
        "You won't believe what politics revealed about changes!",
    ];
    for headline in headlines {
        println!("\n{headline}");
        let explanation = ctx.explain(headline, Some(5))?;
        println!("{explanation}");
        println!("{}", ctx.explain_shap(headline, Some(5))?);
    }
    Ok(())
}

/// Bad input exits with 2, everything else with 1.
fn exit_code(err: &anyhow::Error) -> u8 {
    let client = err
        .chain()
        .filter_map(|cause| cause.downcast_ref::<LimeError>())
        .any(LimeError::is_client_error);
    if client {
        2
    } else {
        1
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli);
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::from(exit_code(&e))
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = load_config(cli.config.as_deref()).context("Configuration error")?;
    if let Some(dir) = &cli.model_dir {
        config.model_dir = dir.clone();
    }

    match cli.command {
        Commands::Train { data, model } => run_train(&data, model, &mut config)?,
        Commands::Classify { text, json } => {
            let result = context(&config)?.classify(&text)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&ClassificationResponse::from(&result))?);
            } else {
                println!("Prediction: {} ({:.2}%)", result.predicted_class, result.confidence * 100.0);
                for (name, p) in &result.probabilities {
                    println!("  {name}: {p:.4}");
                }
            }
        }
        Commands::Explain {
            text,
            num_features,
            num_samples,
            target_class,
            report_dir,
            json,
        } => {
            if let Some(n) = num_samples {
                config.explainer.num_samples = n;
            }
            let ctx = context(&config)?;
            let target = match target_class {
                Some(name) => match parse_label(&name, ctx.explainer().class_names()) {
                    Some(idx) => Some(idx),
                    None => bail!(
                        "unknown class '{name}', expected one of {:?}",
                        ctx.explainer().class_names()
                    ),
                },
                None => None,
            };
            let options = ExplainOptions {
                num_features,
                target_class: target,
                seed: None,
            };
            run_explain(&ctx, &text, options, report_dir.as_deref(), json)?;
        }
        Commands::ExplainBatch { input, num_features } => {
            let ctx = context(&config)?;
            let texts = read_lines(&input)?;
            for chunk in texts.chunks(ctx.api().max_batch_size.max(1)) {
                for result in ctx.explain_batch(chunk, num_features)? {
                    let line = match result {
                        Ok(explanation) => serde_json::to_string(&ExplanationResponse::from(&explanation))?,
                        Err(e) => serde_json::json!({ "error": e.to_string() }).to_string(),
                    };
                    println!("{line}");
                }
            }
        }
        Commands::ClassifyBatch { input } => {
            let ctx = context(&config)?;
            let texts = read_lines(&input)?;
            for chunk in texts.chunks(ctx.api().max_batch_size.max(1)) {
                let results = ctx.classify_batch(chunk)?;
                println!("{}", serde_json::to_string(&BatchResponse::from(results.as_slice()))?);
            }
        }
        Commands::Shap {
            text,
            num_features,
            num_samples,
            json,
        } => {
            if let Some(n) = num_samples {
                config.shap.n_samples = KernelShapSamples::Fixed(n);
            }
            let explanation = context(&config)?.explain_shap(&text, num_features)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&ShapResponse::from(&explanation))?);
            } else {
                println!("{explanation}");
            }
        }
        Commands::Importance { top } => {
            let ctx = context(&config)?;
            println!("Top {top} features by model weight:");
            for (rank, f) in ctx.classifier().feature_importance(top)?.iter().enumerate() {
                println!("  {:>3}. {:<30} {:.4} -> {}", rank + 1, f.feature, f.importance, f.class);
            }
        }
        Commands::Cv { data, folds, model } => {
            if let Some(k) = folds {
                config.pipeline.cv_folds = k;
            }
            if let Some(model) = model {
                config.pipeline.model.kind = model.into();
            }
            let dataset = load_dataset(&data, &config)?;
            print!("{}", cross_validate(&dataset, &config.pipeline, None)?);
        }
        Commands::Compare { data } => {
            let dataset = load_dataset(&data, &config)?;
            let ranked = compare_models(&dataset, &config.pipeline, None)?;
            for (rank, entry) in ranked.iter().enumerate() {
                println!(
                    "#{} {}",
                    rank + 1,
                    entry
                        .metrics
                        .report(entry.model_type.as_str(), &config.pipeline.class_names)
                );
            }
        }
        Commands::Demo => run_demo(&config)?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_input_exits_with_two() {
        let bad = anyhow::Error::from(LimeError::invalid_input("text too short")).context("explaining");
        assert_eq!(exit_code(&bad), 2);
        assert_eq!(exit_code(&anyhow::Error::from(LimeError::model("no model"))), 1);
        assert_eq!(exit_code(&anyhow::anyhow!("plain failure")), 1);
    }

    #[test]
    fn cv_accepts_fold_and_model_flags() {
        let cli = Cli::try_parse_from(["lime-news", "cv", "--folds", "3", "--model", "naive-bayes"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Cv {
                folds: Some(3),
                model: Some(ModelArg::NaiveBayes),
                ..
            }
        ));
    }
}
