//! Model capability interfaces, the reference MLP networks, and the
//! optimizer-owning [`gan::Gan`] that ties them together.
//!
//! The training core only talks to [`AdversarialModel`]. Network code only
//! implements [`GeneratorNet`], [`DiscriminatorNet`] and [`EncoderNet`].

pub mod bridge;
pub mod gan;
pub mod networks;

use std::fmt;
use std::path::Path;

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};

/// What a forward call is being made for.
///
/// Replaces per-network "is training" switches: networks decide from the
/// phase whether train-only layers (dropout) are active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// Sampling outside any update (periodic sample images).
    Idle,
    TrainingDiscriminator,
    TrainingGenerator,
    TrainingEncoder,
    /// Test-time latent inversion.
    Evaluating,
}

impl Phase {
    /// Whether this phase is part of a parameter update.
    pub fn is_training(self) -> bool {
        matches!(
            self,
            Phase::TrainingDiscriminator | Phase::TrainingGenerator | Phase::TrainingEncoder
        )
    }
}

/// A set of parameters updated together by one optimizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParamGroup {
    Generator,
    Discriminator,
    Encoder,
}

impl fmt::Display for ParamGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generator => write!(f, "generator"),
            Self::Discriminator => write!(f, "discriminator"),
            Self::Encoder => write!(f, "encoder"),
        }
    }
}

/// Latent code → image batch `(batch, channels, height, width)`.
pub trait GeneratorNet<B: Backend>: Module<B> {
    /// Width of the latent code this generator consumes.
    fn latent_dim(&self) -> usize;
    fn generate(&self, latent: Tensor<B, 2>, phase: Phase) -> Tensor<B, 4>;
}

/// Image batch → real/fake logits `(batch, 1)`.
pub trait DiscriminatorNet<B: Backend>: Module<B> {
    fn discriminate(&self, images: Tensor<B, 4>, phase: Phase) -> Tensor<B, 2>;
}

/// Image batch → latent codes `(batch, latent_dim)`.
pub trait EncoderNet<B: Backend>: Module<B> {
    fn encode(&self, images: Tensor<B, 4>, phase: Phase) -> Tensor<B, 2>;
}

/// Metadata saved alongside each checkpoint for resuming training.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CheckpointMeta {
    /// Number of completed epochs.
    pub epoch: usize,
    /// Seed of the run that wrote the checkpoint.
    pub seed: u64,
}

/// The model as seen by the training and evaluation core.
///
/// Every parameter update goes through [`apply_gradients`](Self::apply_gradients),
/// which touches exactly one [`ParamGroup`]; gradients reaching other groups
/// are discarded.
pub trait AdversarialModel<B: AutodiffBackend> {
    fn latent_dim(&self) -> usize;

    /// Whether [`encode`](Self::encode) and [`encoder_loss`](Self::encoder_loss) are available.
    fn has_encoder(&self) -> bool;

    fn generate(&self, latent: Tensor<B, 2>, phase: Phase) -> Tensor<B, 4>;

    fn discriminate(&self, images: Tensor<B, 4>, phase: Phase) -> Tensor<B, 2>;

    fn encode(&self, images: Tensor<B, 4>, phase: Phase) -> anyhow::Result<Tensor<B, 2>>;

    /// Reconstruction-consistency loss minimized by the encoder sub-step.
    fn encoder_loss(&self, images: Tensor<B, 4>, phase: Phase) -> anyhow::Result<Tensor<B, 1>>;

    /// Take one optimizer step on `group` using the gradients of a backward pass.
    fn apply_gradients(&mut self, group: ParamGroup, grads: B::Gradients) -> anyhow::Result<()>;

    /// Persist weights, optimizer state and `meta` under `dir`.
    fn save(&self, dir: &Path, meta: &CheckpointMeta) -> anyhow::Result<()>;

    /// Restore from `dir`. Returns `None` metadata (and the model unchanged)
    /// when no checkpoint exists there.
    fn load(self, dir: &Path) -> anyhow::Result<(Self, Option<CheckpointMeta>)>
    where
        Self: Sized;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_training_phases() {
        assert!(Phase::TrainingDiscriminator.is_training());
        assert!(Phase::TrainingGenerator.is_training());
        assert!(Phase::TrainingEncoder.is_training());
        assert!(!Phase::Idle.is_training());
        assert!(!Phase::Evaluating.is_training());
    }

    #[test]
    fn test_param_group_display() {
        assert_eq!(ParamGroup::Discriminator.to_string(), "discriminator");
        assert_eq!(ParamGroup::Encoder.to_string(), "encoder");
    }

    #[test]
    fn test_checkpoint_meta_json() {
        let meta = CheckpointMeta { epoch: 7, seed: 42 };
        let json = serde_json::to_string(&meta).unwrap();
        let back: CheckpointMeta = serde_json::from_str(&json).unwrap();
        assert_eq!(back, meta);
    }
}
