//! Adversarial anomaly detection: GAN, AnoGAN and f-AnoGAN training with
//! latent-inversion scoring.
//!
//! The core is model-agnostic: it drives any [`AdversarialModel`] through
//! two-player (and, for f-AnoGAN, encoder) updates with annealed instance
//! noise and soft/flipped labels, then scores a test set by optimizing a
//! per-batch latent code against the frozen networks. [`model::gan::Gan`]
//! with the [`model::networks`] MLPs is the reference model.

pub mod error;
pub mod evaluation;
pub mod mocks;
pub mod model;
pub mod training;

pub use error::{ConfigError, TrainError};
pub use evaluation::{
    EvaluationOutput, EvaluationProtocol, EvaluationReport, LatentInit, ParquetReporter, ResultReporter,
};
pub use model::gan::{build_reference_gan, Gan, OptimizerSettings};
pub use model::networks::NetworkConfig;
pub use model::{AdversarialModel, CheckpointMeta, ParamGroup, Phase};
pub use training::config::{EvaluationConfig, ModelVariant, TrainerConfig};
pub use training::data::{DataSource, ImageBatch, ImageDims, InMemoryDataset, LabeledBatch};
pub use training::driver::{EpochDriver, TrainSummary};
pub use training::labels::{LabelBundle, LabelPolicy};
pub use training::noise::NoiseScheduler;
pub use training::step::AdversarialStepExecutor;
pub use training::summary::{NullSummarizer, RunSummarizer, Summarizer, Summary};
