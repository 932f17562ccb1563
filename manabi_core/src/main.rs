//! manabi CLI: serve the adventure, train and evaluate the classifiers,
//! print learner reports and import question banks.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::{info, warn};

use manabi_core::logging::init_tracing;
use manabi_core::ml::training::{EVALUATION_SAMPLES, EVALUATION_SEED};
use manabi_core::ml::{evaluate, train, Analyzer, ModelArtifact, ModelKind, TrainOptions};
use manabi_core::web::{self, AppState};
use manabi_core::{load_bank, write_csv, Config, QuestionBank, ScoreLog};

#[derive(Parser)]
#[command(name = "manabi", version, about = "ManabiFun English Adventure")]
struct Cli {
    /// Config file path (defaults to ./manabi.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the local web server
    Serve {
        /// Override the configured host
        #[arg(long)]
        host: Option<std::net::IpAddr>,

        /// Override the configured port
        #[arg(long)]
        port: Option<u16>,
    },

    /// Train classifiers on synthetic learners and save them
    Train {
        /// Which model to train
        #[arg(long, value_enum, default_value = "all")]
        model: ModelChoice,

        /// Synthetic samples (defaults: 5000 weakness, 3000 trajectory)
        #[arg(long)]
        samples: Option<usize>,

        /// Trees per forest
        #[arg(long)]
        trees: Option<usize>,

        /// Random seed for data generation and training
        #[arg(long)]
        seed: Option<u64>,

        /// Output directory (defaults to the configured models_dir)
        #[arg(long)]
        models_dir: Option<PathBuf>,
    },

    /// Score saved models on a fresh synthetic sample
    Evaluate {
        /// Fresh samples per model
        #[arg(long, default_value_t = EVALUATION_SAMPLES)]
        samples: usize,

        /// Seed for the fresh sample
        #[arg(long, default_value_t = EVALUATION_SEED)]
        seed: u64,

        /// Directory holding the models (defaults to the configured models_dir)
        #[arg(long)]
        models_dir: Option<PathBuf>,
    },

    /// Print the report for one learner from the score log
    Report {
        /// Learner name (case-insensitive)
        learner: String,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Validate a CSV or Excel question bank and write a normalised CSV
    Import {
        /// Source .csv / .xlsx / .xls file
        input: PathBuf,

        /// Destination CSV (defaults to the configured questions_path)
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ModelChoice {
    All,
    Weakness,
    Trajectory,
}

impl ModelChoice {
    fn kinds(self) -> Vec<ModelKind> {
        match self {
            ModelChoice::All => ModelKind::ALL.to_vec(),
            ModelChoice::Weakness => vec![ModelKind::Weakness],
            ModelChoice::Trajectory => vec![ModelKind::Trajectory],
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).context("failed to load configuration")?;
    let _log_guard = init_tracing(&config.log_level);

    match cli.command {
        Commands::Serve { host, port } => serve(config, host, port).await,
        Commands::Train {
            model,
            samples,
            trees,
            seed,
            models_dir,
        } => {
            let dir = models_dir.unwrap_or_else(|| config.models_dir.clone());
            let options = TrainOptions {
                samples,
                trees,
                seed,
            };
            train_models(&dir, model, &options)
        }
        Commands::Evaluate {
            samples,
            seed,
            models_dir,
        } => {
            let dir = models_dir.unwrap_or_else(|| config.models_dir.clone());
            evaluate_models(&dir, samples, seed)
        }
        Commands::Report { learner, json } => report(&config, &learner, json),
        Commands::Import { input, output } => {
            let output = output.unwrap_or_else(|| config.questions_path.clone());
            import(&input, &output)
        }
    }
}

async fn serve(mut config: Config, host: Option<std::net::IpAddr>, port: Option<u16>) -> Result<()> {
    if let Some(host) = host {
        config.host = host;
    }
    if let Some(port) = port {
        config.port = port;
    }
    let state = tokio::task::spawn_blocking(move || AppState::from_config(config))
        .await
        .context("startup task panicked")?
        .context("failed to prepare the adventure")?;
    web::serve(state).await.context("server error")?;
    info!("graceful shutdown complete");
    Ok(())
}

/// Feature importances listed after training.
const TOP_FEATURES: usize = 5;

fn train_models(dir: &Path, choice: ModelChoice, options: &TrainOptions) -> Result<()> {
    for kind in choice.kinds() {
        info!(model = kind.display_name(), "training");
        let artifact = train(kind, options)
            .with_context(|| format!("failed to train the {}", kind.display_name()))?;
        let path = artifact
            .save(dir)
            .with_context(|| format!("failed to save model into {}", dir.display()))?;
        println!(
            "{}: train accuracy {:.3}, test accuracy {:.3} ({} samples) -> {}",
            kind.display_name(),
            artifact.training_accuracy,
            artifact.test_accuracy,
            artifact.sample_size,
            path.display()
        );
        if let Some(cv) = artifact.cross_validation {
            println!(
                "  {}-fold cross-validation {:.3} (+/- {:.3})",
                cv.folds,
                cv.mean,
                cv.std * 2.0
            );
        }
        let top: Vec<String> = artifact
            .ranked_importances()
            .into_iter()
            .take(TOP_FEATURES)
            .map(|(name, importance)| format!("{name} {importance:.3}"))
            .collect();
        println!("  top features: {}", top.join(", "));
    }
    Ok(())
}

fn evaluate_models(dir: &Path, samples: usize, seed: u64) -> Result<()> {
    if samples == 0 {
        bail!("--samples must be at least 1");
    }
    let mut found = 0;
    for kind in ModelKind::ALL {
        let artifact = match ModelArtifact::load(dir, kind) {
            Ok(artifact) => artifact,
            Err(e) if e.is_data_unavailable() => {
                warn!(model = kind.display_name(), "no saved model, skipping");
                println!("{}: not trained (run `manabi train`)", kind.display_name());
                continue;
            }
            Err(e) => return Err(e).with_context(|| format!("failed to load the {}", kind.display_name())),
        };
        let result = evaluate(&artifact, samples, seed)
            .with_context(|| format!("failed to evaluate the {}", kind.display_name()))?;
        println!(
            "{}: accuracy {:.3} on {} fresh samples {}",
            kind.display_name(),
            result.accuracy,
            result.samples,
            result.status
        );
        found += 1;
    }
    if found == 0 {
        bail!("no models found in {}", dir.display());
    }
    Ok(())
}

fn report(config: &Config, learner: &str, json: bool) -> Result<()> {
    let records = ScoreLog::new(&config.scores_path)
        .records_for(learner)
        .with_context(|| format!("failed to read {}", config.scores_path.display()))?;
    let bank = match load_bank(&config.questions_path) {
        Ok(bank) => bank,
        Err(e) if e.is_data_unavailable() => {
            warn!(error = %e, "question bank unavailable, realm mastery will read zero");
            QuestionBank::default()
        }
        Err(e) => return Err(e).context("failed to load the question bank"),
    };
    let analyzer = Analyzer::load(&config.models_dir);
    let report = analyzer.report(learner, &records, &bank, config.chapter_size, config.pass_threshold);

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let summary = &report.summary;
    let analysis = &report.analysis;
    println!("Report for {} ({})", report.student_name, report.report_date);
    println!(
        "  chapters {} | accuracy {:.1}% | questions {} | realms mastered {} | consistency {:.0}%",
        summary.total_chapters,
        summary.overall_accuracy,
        summary.total_questions,
        summary.realms_mastered,
        summary.consistency_score
    );
    if analysis.is_default {
        println!("  not enough data for a prediction yet");
    } else {
        println!(
            "  primary weakness: {} ({:.0}% confidence)",
            analysis.primary_weakness.realm().name,
            analysis.confidence * 100.0
        );
    }
    println!(
        "  trajectory: {} ({:.0}% chance of improving)",
        analysis.learning_trajectory,
        analysis.improvement_probability * 100.0
    );
    for rec in &report.recommendations {
        println!("  [{:?}] {} ({})", rec.priority, rec.action, rec.timeline);
    }
    for insight in &report.insights {
        println!("  * {insight}");
    }
    Ok(())
}

fn import(input: &Path, output: &Path) -> Result<()> {
    let bank = load_bank(input).with_context(|| format!("failed to import {}", input.display()))?;
    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    write_csv(output, bank.all()).with_context(|| format!("failed to write {}", output.display()))?;

    println!("imported {} questions into {}", bank.len(), output.display());
    for (topic, count) in bank.topic_counts() {
        println!("  {:<10} {count}", topic.as_str());
    }
    Ok(())
}
