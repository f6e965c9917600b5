//! Train, test and summary pipelines.

use std::path::{Path, PathBuf};
use std::time::Instant;

use burn::backend::ndarray::NdArray;
use burn::backend::Autodiff;

use anogan::{
    build_reference_gan, AdversarialModel, DataSource, EpochDriver, InMemoryDataset, NullSummarizer,
    ParquetReporter, RunSummarizer, Summarizer,
};
use records::{ImageReader, ScoreReader};

use crate::config::{load_experiment, ExperimentToml, Overrides};

type CliBackend = Autodiff<NdArray<f32>>;

/// Arguments for the `train` subcommand.
#[derive(Debug)]
pub struct TrainArgs {
    /// Path to the experiment TOML file.
    pub config: PathBuf,
    /// Path to the image dataset Parquet file.
    pub data: PathBuf,
    /// Optional root for checkpoints, summaries and results.
    pub output_dir: Option<PathBuf>,
    /// Continue from an existing checkpoint.
    pub resume: bool,
    /// Optional CLI override for the adversarial epoch budget.
    pub epochs: Option<usize>,
    /// Optional CLI override for the run seed.
    pub seed: Option<u64>,
}

/// Arguments for the `test` subcommand.
#[derive(Debug)]
pub struct TestArgs {
    pub config: PathBuf,
    pub data: PathBuf,
    pub output_dir: Option<PathBuf>,
}

/// Arguments for the `summary` subcommand.
#[derive(Debug)]
pub struct SummaryArgs {
    /// Path to a scores Parquet file.
    pub input: PathBuf,
    /// Emit JSON instead of text.
    pub json: bool,
}

fn prepare(config: &Path, overrides: &Overrides) -> anyhow::Result<ExperimentToml> {
    let mut experiment = load_experiment(config)?;
    experiment.apply(overrides);
    Ok(experiment)
}

fn load_dataset(path: &Path, experiment: &ExperimentToml) -> anyhow::Result<InMemoryDataset> {
    let records = ImageReader::read_all(path)?;
    InMemoryDataset::from_records(
        records,
        experiment.data.batch_size,
        experiment.data.test_batch_size,
        experiment.trainer.seed,
    )
}

/// Reference networks sized to the dataset, wrapped in a validated driver.
fn build_driver(
    experiment: &ExperimentToml,
    data: &InMemoryDataset,
) -> anyhow::Result<EpochDriver<CliBackend, impl AdversarialModel<CliBackend>>> {
    let network = experiment.network.to_config(data.dims());
    network.validate()?;
    experiment.optimizer.validate()?;

    let device = Default::default();
    let model = build_reference_gan::<CliBackend>(
        &network,
        experiment.optimizer.clone(),
        experiment.trainer.variant.uses_encoder(),
        &device,
    );
    tracing::info!(
        latent_dim = network.latent_dim,
        hidden_dim = network.hidden_dim,
        encoder = model.has_encoder(),
        "Built reference networks"
    );
    let driver = EpochDriver::new(
        model,
        experiment.trainer.clone(),
        experiment.evaluation.clone(),
        device,
    )?;
    Ok(driver)
}

/// Train the configured variant and evaluate it on the configured schedule.
pub fn run_train(args: TrainArgs) -> anyhow::Result<()> {
    let start = Instant::now();

    // 1. Load config and apply CLI overrides
    let experiment = prepare(
        &args.config,
        &Overrides {
            output_dir: args.output_dir,
            epochs: args.epochs,
            seed: args.seed,
        },
    )?;

    // 2. Load dataset
    let mut data = load_dataset(&args.data, &experiment)?;
    if data.train_batches_per_epoch() == 0 && experiment.trainer.num_iter_per_epoch.is_none() {
        anyhow::bail!(
            "{} training images cannot fill one batch of {}",
            data.train_len(),
            experiment.data.batch_size
        );
    }

    // 3. Build model and driver, optionally resuming
    let mut driver = build_driver(&experiment, &data)?;
    if args.resume {
        driver = driver.resume()?;
    }

    // 4. Train
    let mut summarizer: Box<dyn Summarizer> = if experiment.trainer.enable_summary {
        Box::new(RunSummarizer::new(experiment.summary_dir.clone())?)
    } else {
        Box::new(NullSummarizer)
    };
    let mut reporter = ParquetReporter::new();
    let summary = driver.train(&mut data, summarizer.as_mut(), &mut reporter)?;

    // 5. Print summary
    let elapsed = start.elapsed();
    println!("\n--- Training Summary ---");
    println!("Variant: {}", experiment.trainer.variant);
    println!("Epochs: {} -> {}", summary.start_epoch, summary.end_epoch);
    if let Some(last) = summary.history.last() {
        println!("Last epoch: {}", last.display_losses());
    }
    if let Some((epoch, loss)) = summary.history.best_disc_loss() {
        println!("Best discriminator loss: {loss:.4} (epoch {epoch})");
    }
    println!("Evaluations: {}", summary.evaluations);
    if let Some(output) = &summary.last_evaluation {
        println!("Last evaluation: {} samples", output.len());
    }
    println!("Checkpoint: {}", experiment.trainer.checkpoint_dir.display());
    println!("Elapsed: {:.1}s", elapsed.as_secs_f64());

    Ok(())
}

/// Score the test split with the checkpoint in the configured directory.
pub fn run_test(args: TestArgs) -> anyhow::Result<()> {
    let experiment = prepare(
        &args.config,
        &Overrides {
            output_dir: args.output_dir,
            ..Default::default()
        },
    )?;
    let checkpoint_dir = &experiment.trainer.checkpoint_dir;
    if !checkpoint_dir.join("meta.json").exists() {
        anyhow::bail!("no checkpoint found in {}; run `anogan train` first", checkpoint_dir.display());
    }

    let mut data = load_dataset(&args.data, &experiment)?;
    let mut driver = build_driver(&experiment, &data)?.resume()?;
    let mut reporter = ParquetReporter::new();
    let output = driver.test(&mut data, &mut reporter)?;

    let finite: Vec<f64> = output.scores.iter().copied().filter(|s| s.is_finite()).collect();
    let mean_score = if finite.is_empty() {
        0.0
    } else {
        finite.iter().sum::<f64>() / finite.len() as f64
    };
    println!("--- Evaluation ---");
    println!("Epoch: {}", driver.epoch());
    println!("Samples: {}", output.len());
    println!("Batches: {}", output.batch_sizes.len());
    println!("Diverged batches: {}", output.diverged_batches.len());
    println!("Non-finite scores: {}", output.len() - finite.len());
    println!("Mean score: {mean_score:.4}");
    println!("Mean inference time: {:.3}s/batch", output.mean_inference_secs());
    println!("Results: {}", experiment.evaluation.result_dir.display());

    Ok(())
}

/// Print statistics from a scores Parquet file.
pub fn run_summary(args: SummaryArgs) -> anyhow::Result<()> {
    let summary = ScoreReader::read_summary(&args.input)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("--- Score Summary ---");
    println!("File: {}", args.input.display());
    println!("Total records: {}", summary.total_records);
    println!("Anomalous: {}", summary.anomalous_count);
    println!("Normal: {}", summary.normal_count);
    println!("Mean score: {:.4}", summary.mean_score);
    match &summary.metrics {
        Some(m) => {
            println!("ROC AUC: {:.4}", m.roc_auc);
            println!("Average precision: {:.4}", m.average_precision);
            println!("Best F1: {:.4} (threshold {:.4})", m.best_f1, m.best_threshold);
        }
        None => println!("Metrics: undefined (single class)"),
    }

    Ok(())
}
