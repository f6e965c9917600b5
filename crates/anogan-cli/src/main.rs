mod config;
mod pipeline;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use pipeline::{SummaryArgs, TestArgs, TrainArgs};

#[derive(Parser)]
#[command(name = "anogan", version, about = "GAN-based anomaly detection: train, evaluate, summarize")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Train a GAN / AnoGAN / f-AnoGAN on a Parquet image dataset.
    Train {
        /// Path to the experiment TOML file.
        #[arg(long, default_value = "configs/anogan.toml")]
        config: PathBuf,
        /// Path to the image dataset Parquet file.
        #[arg(long)]
        data: PathBuf,
        /// Root for checkpoints, summaries and results (overrides the TOML paths).
        #[arg(long)]
        output_dir: Option<PathBuf>,
        /// Continue from the checkpoint in the checkpoint directory.
        #[arg(long)]
        resume: bool,
        /// Override the adversarial epoch budget.
        #[arg(long)]
        epochs: Option<usize>,
        /// Override the run seed.
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Score the test split with a trained checkpoint.
    Test {
        /// Path to the experiment TOML file.
        #[arg(long, default_value = "configs/anogan.toml")]
        config: PathBuf,
        /// Path to the image dataset Parquet file.
        #[arg(long)]
        data: PathBuf,
        /// Root the checkpoint was written under (overrides the TOML paths).
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
    /// Print counts and detection metrics of a scores Parquet file.
    Summary {
        /// Path to a scores.parquet file.
        #[arg(long)]
        input: PathBuf,
        /// Print as JSON instead of text.
        #[arg(long)]
        json: bool,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Train {
            config,
            data,
            output_dir,
            resume,
            epochs,
            seed,
        } => pipeline::run_train(TrainArgs {
            config,
            data,
            output_dir,
            resume,
            epochs,
            seed,
        }),
        Command::Test {
            config,
            data,
            output_dir,
        } => pipeline::run_test(TestArgs {
            config,
            data,
            output_dir,
        }),
        Command::Summary { input, json } => pipeline::run_summary(SummaryArgs { input, json }),
    }
}
