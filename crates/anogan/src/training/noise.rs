//! Latent noise and annealed instance noise.
//!
//! Everything here is a pure function of the epoch index and the caller's
//! random stream; nothing is stored between calls.

use rand::Rng;
use rand_distr::StandardNormal;

use crate::training::data::{ImageBatch, ImageDims};

/// Instance-noise standard deviation at epoch 0.
pub const INITIAL_SIGMA: f64 = 0.75;
/// Lower clamp for the annealed standard deviation.
pub const SIGMA_FLOOR: f64 = 0.05;
/// Epochs over which sigma decays linearly toward zero before the clamp.
pub const ANNEAL_EPOCHS: f64 = 10.0;

/// Additive perturbation for the real and the generated branch.
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceNoise {
    pub real: ImageBatch,
    pub fake: ImageBatch,
}

/// Draws latent codes and instance noise.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoiseScheduler;

impl NoiseScheduler {
    /// `max(0.75 · (10 − epoch) / 10, 0.05)`.
    pub fn sigma(epoch: usize) -> f64 {
        (INITIAL_SIGMA * (ANNEAL_EPOCHS - epoch as f64) / ANNEAL_EPOCHS).max(SIGMA_FLOOR)
    }

    /// I.i.d. standard-normal values, row-major `batch_size × dim`.
    pub fn latent<R: Rng + ?Sized>(&self, rng: &mut R, batch_size: usize, dim: usize) -> Vec<f32> {
        (0..batch_size * dim).map(|_| rng.sample::<f32, _>(StandardNormal)).collect()
    }

    /// Real/fake instance noise of shape `[batch_size] + dims`.
    ///
    /// Disabled noise is all zeros, so callers add it unconditionally.
    pub fn instance_noise<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        enabled: bool,
        batch_size: usize,
        dims: ImageDims,
        epoch: usize,
    ) -> InstanceNoise {
        if !enabled {
            return InstanceNoise {
                real: ImageBatch::zeros(dims, batch_size),
                fake: ImageBatch::zeros(dims, batch_size),
            };
        }
        let sigma = Self::sigma(epoch) as f32;
        let n = batch_size * dims.numel();
        let mut draw = || -> Vec<f32> {
            (0..n).map(|_| sigma * rng.sample::<f32, _>(StandardNormal)).collect()
        };
        let real = draw();
        let fake = draw();
        InstanceNoise {
            real: ImageBatch { dims, pixels: real },
            fake: ImageBatch { dims, pixels: fake },
        }
    }
}
