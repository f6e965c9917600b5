//! Trainer and evaluation settings, deserialized from the `[trainer]` and
//! `[evaluation]` TOML sections.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Which model family is trained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelVariant {
    /// Plain two-player GAN.
    Gan,
    /// Two-player GAN scored by latent inversion from random codes.
    #[default]
    AnoGan,
    /// Two-player GAN followed by an encoder phase; inversion starts from the encoder's code.
    FAnoGan,
}

impl ModelVariant {
    /// Name passed to the result reporter.
    pub fn model_name(self) -> &'static str {
        match self {
            Self::Gan => "gan",
            Self::AnoGan => "anogan",
            Self::FAnoGan => "fanogan",
        }
    }

    pub fn uses_encoder(self) -> bool {
        self == Self::FAnoGan
    }
}

impl fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.model_name())
    }
}

/// Training loop configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainerConfig {
    #[serde(default)]
    pub variant: ModelVariant,

    /// Adversarial epoch budget.
    #[serde(default = "default_num_epochs")]
    pub num_epochs: usize,

    /// Encoder epochs run after the adversarial ones (f-AnoGAN only).
    #[serde(default)]
    pub encoder_epochs: usize,

    /// Steps per epoch. `None` means one full pass over the training data.
    #[serde(default)]
    pub num_iter_per_epoch: Option<usize>,

    /// Use soft (noisy) labels instead of hard 0/1 targets.
    #[serde(default = "default_true")]
    pub soft_labels: bool,

    /// Swap real and generated targets.
    #[serde(default)]
    pub flip_labels: bool,

    /// Fraction of soft labels flipped per vector.
    #[serde(default = "default_noise_probability")]
    pub noise_probability: f64,

    /// Add annealed Gaussian instance noise to discriminator inputs.
    #[serde(default = "default_true")]
    pub include_noise: bool,

    /// Seed of the run's random stream.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Emit the per-epoch log line every `show_steps` epochs (and at epoch 1).
    #[serde(default = "default_one")]
    pub show_steps: usize,

    /// Write sample images every `sample_every` epochs; 0 disables.
    #[serde(default = "default_one")]
    pub sample_every: usize,

    /// Number of sample images generated from the fixed latent.
    #[serde(default = "default_num_example_imgs")]
    pub num_example_imgs: usize,

    /// Run the evaluation protocol every `frequency_test` epochs; 0 disables.
    #[serde(default = "default_one")]
    pub frequency_test: usize,

    /// Record step summaries (scalars) to the summarizer.
    #[serde(default = "default_true")]
    pub enable_summary: bool,

    #[serde(default = "default_checkpoint_dir")]
    pub checkpoint_dir: PathBuf,

    /// Show an epoch progress bar.
    #[serde(default = "default_true")]
    pub show_progress: bool,
}

fn default_num_epochs() -> usize {
    10
}
fn default_true() -> bool {
    true
}
fn default_one() -> usize {
    1
}
fn default_noise_probability() -> f64 {
    0.05
}
fn default_seed() -> u64 {
    42
}
fn default_num_example_imgs() -> usize {
    16
}
fn default_checkpoint_dir() -> PathBuf {
    PathBuf::from("experiments/checkpoints")
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            variant: ModelVariant::default(),
            num_epochs: default_num_epochs(),
            encoder_epochs: 0,
            num_iter_per_epoch: None,
            soft_labels: true,
            flip_labels: false,
            noise_probability: default_noise_probability(),
            include_noise: true,
            seed: default_seed(),
            show_steps: default_one(),
            sample_every: default_one(),
            num_example_imgs: default_num_example_imgs(),
            frequency_test: default_one(),
            enable_summary: true,
            checkpoint_dir: default_checkpoint_dir(),
            show_progress: true,
        }
    }
}

impl TrainerConfig {
    /// Total epochs across both phases.
    pub fn total_epochs(&self) -> usize {
        if self.variant.uses_encoder() {
            self.num_epochs + self.encoder_epochs
        } else {
            self.num_epochs
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_epochs == 0 {
            return Err(ConfigError::new("num_epochs", "must be > 0"));
        }
        if self.num_iter_per_epoch == Some(0) {
            return Err(ConfigError::new("num_iter_per_epoch", "must be > 0 when set"));
        }
        if !(0.0..=1.0).contains(&self.noise_probability) {
            return Err(ConfigError::new(
                "noise_probability",
                format!("{} is outside [0, 1]", self.noise_probability),
            ));
        }
        if self.show_steps == 0 {
            return Err(ConfigError::new("show_steps", "must be > 0"));
        }
        if self.sample_every > 0 && self.num_example_imgs == 0 {
            return Err(ConfigError::new("num_example_imgs", "must be > 0 when sampling is enabled"));
        }
        if self.variant.uses_encoder() && self.encoder_epochs == 0 {
            return Err(ConfigError::new("encoder_epochs", "f-AnoGAN needs at least one encoder epoch"));
        }
        if !self.variant.uses_encoder() && self.encoder_epochs > 0 {
            tracing::warn!(
                variant = %self.variant,
                encoder_epochs = self.encoder_epochs,
                "encoder_epochs is ignored for this variant"
            );
        }
        Ok(())
    }
}

/// Latent-inversion evaluation configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationConfig {
    /// Inner gradient steps per test batch.
    #[serde(default = "default_steps_number")]
    pub steps_number: usize,

    /// Learning rate of the per-batch latent optimizer.
    #[serde(default = "default_inversion_lr")]
    pub inversion_lr: f64,

    /// Weight `w` of the discriminator term in the inversion loss.
    #[serde(default = "default_weight")]
    pub weight: f64,

    /// Label value marking anomalous test samples.
    #[serde(default = "default_anomalous_label")]
    pub anomalous_label: i64,

    /// Name recorded with results.
    #[serde(default = "default_dataset_name")]
    pub dataset_name: String,

    /// Name of the discriminator loss recorded with results.
    #[serde(default = "default_loss_name")]
    pub loss_name: String,

    /// Cap on test batches per evaluation; `None` means the whole test set.
    #[serde(default)]
    pub max_test_batches: Option<usize>,

    #[serde(default = "default_result_dir")]
    pub result_dir: PathBuf,
}

fn default_steps_number() -> usize {
    50
}
fn default_inversion_lr() -> f64 {
    1e-2
}
fn default_weight() -> f64 {
    0.1
}
fn default_anomalous_label() -> i64 {
    1
}
fn default_dataset_name() -> String {
    "synthetic".to_string()
}
fn default_loss_name() -> String {
    "cross_e".to_string()
}
fn default_result_dir() -> PathBuf {
    PathBuf::from("experiments/results")
}

impl Default for EvaluationConfig {
    fn default() -> Self {
        Self {
            steps_number: default_steps_number(),
            inversion_lr: default_inversion_lr(),
            weight: default_weight(),
            anomalous_label: default_anomalous_label(),
            dataset_name: default_dataset_name(),
            loss_name: default_loss_name(),
            max_test_batches: None,
            result_dir: default_result_dir(),
        }
    }
}

impl EvaluationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.inversion_lr.is_finite() && self.inversion_lr > 0.0) {
            return Err(ConfigError::new("inversion_lr", format!("{} must be finite and > 0", self.inversion_lr)));
        }
        if !(0.0..=1.0).contains(&self.weight) {
            return Err(ConfigError::new("weight", format!("{} is outside [0, 1]", self.weight)));
        }
        if self.max_test_batches == Some(0) {
            return Err(ConfigError::new("max_test_batches", "must be > 0 when set"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trainer_defaults() {
        let cfg = TrainerConfig::default();
        assert_eq!(cfg.variant, ModelVariant::AnoGan);
        assert_eq!(cfg.num_epochs, 10);
        assert!(cfg.soft_labels);
        assert!(!cfg.flip_labels);
        assert!((cfg.noise_probability - 0.05).abs() < 1e-12);
        assert_eq!(cfg.seed, 42);
        assert!(cfg.num_iter_per_epoch.is_none());
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_empty_toml_matches_default() {
        let cfg: TrainerConfig = from_json("{}");
        let default = TrainerConfig::default();
        assert_eq!(cfg.num_epochs, default.num_epochs);
        assert_eq!(cfg.show_steps, default.show_steps);
        assert_eq!(cfg.checkpoint_dir, default.checkpoint_dir);
    }

    fn from_json(json: &str) -> TrainerConfig {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_variant_serde_names() {
        let v: ModelVariant = serde_json::from_str("\"fanogan\"").unwrap();
        assert_eq!(v, ModelVariant::FAnoGan);
        assert_eq!(v.model_name(), "fanogan");
        assert!(v.uses_encoder());
        assert!(!ModelVariant::AnoGan.uses_encoder());
    }

    #[test]
    fn test_total_epochs() {
        let mut cfg = TrainerConfig { num_epochs: 4, encoder_epochs: 3, ..Default::default() };
        assert_eq!(cfg.total_epochs(), 4, "encoder epochs ignored without an encoder");
        cfg.variant = ModelVariant::FAnoGan;
        assert_eq!(cfg.total_epochs(), 7);
    }

    #[test]
    fn test_trainer_validation_errors() {
        let bad = TrainerConfig { noise_probability: 1.5, ..Default::default() };
        assert_eq!(bad.validate().unwrap_err().field, "noise_probability");

        let bad = TrainerConfig { num_iter_per_epoch: Some(0), ..Default::default() };
        assert_eq!(bad.validate().unwrap_err().field, "num_iter_per_epoch");

        let bad = TrainerConfig { variant: ModelVariant::FAnoGan, ..Default::default() };
        assert_eq!(bad.validate().unwrap_err().field, "encoder_epochs");

        let bad = TrainerConfig { show_steps: 0, ..Default::default() };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_evaluation_defaults_and_validation() {
        let cfg = EvaluationConfig::default();
        assert_eq!(cfg.loss_name, "cross_e");
        assert_eq!(cfg.anomalous_label, 1);
        assert!(cfg.validate().is_ok());

        let bad = EvaluationConfig { weight: -0.1, ..Default::default() };
        assert_eq!(bad.validate().unwrap_err().field, "weight");
        let bad = EvaluationConfig { inversion_lr: f64::NAN, ..Default::default() };
        assert_eq!(bad.validate().unwrap_err().field, "inversion_lr");
    }
}
