//! Test-time latent inversion: optimize a per-batch latent code so the fixed
//! generator reconstructs the batch.

use std::time::Instant;

use burn::module::Param;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;

use crate::model::bridge::{tensor_to_f64s, tensor_to_images, tensor_to_vec};
use crate::model::{AdversarialModel, Phase};
use crate::training::data::ImageBatch;
use crate::training::loss::{inversion_loss_per_sample, l1_residual_per_sample};

/// The trainable latent of one inversion.
#[derive(Module, Debug)]
pub struct LatentCode<B: Backend> {
    pub code: Param<Tensor<B, 2>>,
}

impl<B: Backend> LatentCode<B> {
    pub fn new(initial: Tensor<B, 2>) -> Self {
        Self { code: Param::from_tensor(initial) }
    }
}

/// Per-sample readout of a finished inversion.
#[derive(Debug, Clone)]
pub struct InversionResult {
    /// Mean absolute residual per sample.
    pub reconstruction_errors: Vec<f64>,
    /// Final invert loss per sample.
    pub scores: Vec<f64>,
    /// Optimized latent codes, row-major `batch × latent_dim`.
    pub latents: Vec<f32>,
    pub reconstruction: ImageBatch,
    /// Any non-finite score, residual or batch loss seen along the way.
    pub diverged: bool,
    pub elapsed_secs: f64,
}

/// Inner-loop settings.
#[derive(Debug, Clone, Copy)]
pub struct LatentInversion {
    pub steps: usize,
    pub lr: f64,
    /// Weight of the discriminator term.
    pub weight: f64,
}

impl LatentInversion {
    pub fn new(steps: usize, lr: f64, weight: f64) -> Self {
        Self { steps, lr, weight }
    }

    /// Run `steps` Adam updates on `initial` against `images`, then read out.
    ///
    /// The latent and its optimizer are created here, so nothing carries
    /// over between calls.
    pub fn invert<B, M>(&self, model: &M, images: Tensor<B, 4>, initial: Tensor<B, 2>) -> anyhow::Result<InversionResult>
    where
        B: AutodiffBackend,
        M: AdversarialModel<B>,
    {
        let start = Instant::now();
        let mut latent = LatentCode::new(initial.detach());
        let mut optimizer = AdamConfig::new().init::<B, LatentCode<B>>();
        let images = images.detach();
        let mut diverged = false;

        for step in 0..self.steps {
            let per_sample = self.per_sample_loss(model, images.clone(), latent.code.val()).0;
            let loss = per_sample.mean();
            let value: f32 = loss.clone().into_scalar().elem();
            if !value.is_finite() {
                tracing::debug!(step, value, "Inversion loss became non-finite");
                diverged = true;
            }
            let grads = GradientsParams::from_grads(loss.backward(), &latent);
            latent = optimizer.step(self.lr, latent, grads);
        }

        let code = latent.code.val().detach();
        let (per_sample, residual, reconstruction) = self.per_sample_loss(model, images, code.clone());
        let scores = tensor_to_f64s(per_sample)?;
        let reconstruction_errors = tensor_to_f64s(residual)?;
        diverged |= scores.iter().chain(&reconstruction_errors).any(|v| !v.is_finite());

        Ok(InversionResult {
            reconstruction_errors,
            scores,
            latents: tensor_to_vec(code)?,
            reconstruction: tensor_to_images(reconstruction)?,
            diverged,
            elapsed_secs: start.elapsed().as_secs_f64(),
        })
    }

    /// `(invert loss, residual, reconstruction)` per sample.
    fn per_sample_loss<B, M>(
        &self,
        model: &M,
        images: Tensor<B, 4>,
        latent: Tensor<B, 2>,
    ) -> (Tensor<B, 2>, Tensor<B, 2>, Tensor<B, 4>)
    where
        B: AutodiffBackend,
        M: AdversarialModel<B>,
    {
        let reconstruction = model.generate(latent, Phase::Evaluating);
        let residual = l1_residual_per_sample(images, reconstruction.clone());
        let logits = model.discriminate(reconstruction.clone(), Phase::Evaluating);
        let loss = inversion_loss_per_sample(residual.clone(), logits, self.weight);
        (loss, residual, reconstruction)
    }
}
