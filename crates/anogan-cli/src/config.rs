//! TOML experiment loading for the anogan CLI.
//!
//! Deserializes `configs/*.toml` with `[trainer]`, `[evaluation]`,
//! `[network]`, `[optimizer]` and `[data]` sections, then merges CLI
//! overrides. Priority: library defaults < TOML values < CLI flags.

use std::path::{Path, PathBuf};

use anogan::{EvaluationConfig, ImageDims, NetworkConfig, OptimizerSettings, TrainerConfig};
use serde::Deserialize;

/// Top-level structure of an experiment file.
#[derive(Debug, Deserialize)]
pub struct ExperimentToml {
    /// Directory for the summarizer's log, scalars and image grids.
    #[serde(default = "default_summary_dir")]
    pub summary_dir: PathBuf,
    #[serde(default)]
    pub trainer: TrainerConfig,
    #[serde(default)]
    pub evaluation: EvaluationConfig,
    #[serde(default)]
    pub network: NetworkToml,
    #[serde(default)]
    pub optimizer: OptimizerSettings,
    #[serde(default)]
    pub data: DataToml,
}

fn default_summary_dir() -> PathBuf {
    PathBuf::from("experiments/summaries")
}

/// Network hyperparameters. Image dimensions come from the dataset.
#[derive(Debug, Deserialize)]
pub struct NetworkToml {
    #[serde(default = "default_latent_dim")]
    pub latent_dim: usize,
    #[serde(default = "default_hidden_dim")]
    pub hidden_dim: usize,
    #[serde(default = "default_leaky_slope")]
    pub leaky_slope: f64,
    #[serde(default = "default_dropout")]
    pub dropout: f64,
}

fn default_latent_dim() -> usize {
    64
}
fn default_hidden_dim() -> usize {
    256
}
fn default_leaky_slope() -> f64 {
    0.2
}
fn default_dropout() -> f64 {
    0.3
}

impl Default for NetworkToml {
    fn default() -> Self {
        Self {
            latent_dim: default_latent_dim(),
            hidden_dim: default_hidden_dim(),
            leaky_slope: default_leaky_slope(),
            dropout: default_dropout(),
        }
    }
}

impl NetworkToml {
    /// Full network config for images of shape `dims`.
    pub fn to_config(&self, dims: ImageDims) -> NetworkConfig {
        NetworkConfig::new(self.latent_dim, dims.channels, dims.height, dims.width)
            .with_hidden_dim(self.hidden_dim)
            .with_leaky_slope(self.leaky_slope)
            .with_dropout(self.dropout)
    }
}

/// Batching of the Parquet dataset.
#[derive(Debug, Deserialize)]
pub struct DataToml {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_test_batch_size")]
    pub test_batch_size: usize,
}

fn default_batch_size() -> usize {
    64
}
fn default_test_batch_size() -> usize {
    64
}

impl Default for DataToml {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            test_batch_size: default_test_batch_size(),
        }
    }
}

/// CLI flags that take priority over the TOML file.
#[derive(Debug, Default)]
pub struct Overrides {
    pub output_dir: Option<PathBuf>,
    pub epochs: Option<usize>,
    pub seed: Option<u64>,
}

impl ExperimentToml {
    pub fn apply(&mut self, overrides: &Overrides) {
        if let Some(dir) = &overrides.output_dir {
            self.trainer.checkpoint_dir = dir.join("checkpoints");
            self.evaluation.result_dir = dir.join("results");
            self.summary_dir = dir.join("summaries");
        }
        if let Some(n) = overrides.epochs {
            self.trainer.num_epochs = n;
        }
        if let Some(seed) = overrides.seed {
            self.trainer.seed = seed;
        }
    }
}

/// Load and deserialize an `ExperimentToml` from a TOML file.
pub fn load_experiment(path: &Path) -> anyhow::Result<ExperimentToml> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read config {}: {e}", path.display()))?;
    let config: ExperimentToml =
        toml::from_str(&contents).map_err(|e| anyhow::anyhow!("Failed to parse config {}: {e}", path.display()))?;
    tracing::info!(path = %path.display(), variant = %config.trainer.variant, "Loaded experiment config");
    Ok(config)
}
