//! Adversarial, reconstruction and inversion losses.
//!
//! All functions are generic over `B: Backend`. Discriminator outputs are
//! logits; targets are probabilities in `[0, 1]` (soft labels allowed).

use burn::prelude::*;

/// Per-element sigmoid cross-entropy on logits.
///
/// Uses the stable form `max(x, 0) - x·z + ln(1 + e^{-|x|})`.
///
/// # Arguments
/// - `logits`: shape `(batch, 1)`
/// - `targets`: shape `(batch, 1)`, values in `[0, 1]`
pub fn sigmoid_cross_entropy_per_sample<B: Backend>(
    logits: Tensor<B, 2>,
    targets: Tensor<B, 2>,
) -> Tensor<B, 2> {
    let positive_part = logits.clone().clamp_min(0.0);
    let log_term = logits.clone().abs().neg().exp().log1p();
    positive_part - logits * targets + log_term
}

/// Mean sigmoid cross-entropy over the batch. Returns shape `(1,)`.
pub fn sigmoid_cross_entropy<B: Backend>(logits: Tensor<B, 2>, targets: Tensor<B, 2>) -> Tensor<B, 1> {
    sigmoid_cross_entropy_per_sample(logits, targets).mean()
}

/// Discriminator loss: real logits against `true_labels` plus fake logits
/// against `generated_labels`.
///
/// Returns `(total, real_part, fake_part)`, each of shape `(1,)`.
pub fn discriminator_loss<B: Backend>(
    real_logits: Tensor<B, 2>,
    fake_logits: Tensor<B, 2>,
    true_labels: Tensor<B, 2>,
    generated_labels: Tensor<B, 2>,
) -> (Tensor<B, 1>, Tensor<B, 1>, Tensor<B, 1>) {
    let real = sigmoid_cross_entropy(real_logits, true_labels);
    let fake = sigmoid_cross_entropy(fake_logits, generated_labels);
    (real.clone() + fake.clone(), real, fake)
}

/// Mean squared error over all elements. Returns shape `(1,)`.
pub fn mse<B: Backend, const D: usize>(a: Tensor<B, D>, b: Tensor<B, D>) -> Tensor<B, 1> {
    (a - b).powf_scalar(2.0).mean()
}

/// Per-image mean absolute residual `mean |x - x̂|`. Returns shape `(batch, 1)`.
pub fn l1_residual_per_sample<B: Backend>(images: Tensor<B, 4>, reconstructed: Tensor<B, 4>) -> Tensor<B, 2> {
    let [batch, channels, height, width] = images.dims();
    (images - reconstructed)
        .abs()
        .reshape([batch, channels * height * width])
        .mean_dim(1)
}

/// Per-sample inversion loss `(1 - w)·residual + w·CE(D(G(z)), 1)`.
///
/// # Arguments
/// - `residual`: `(batch, 1)` reconstruction error per sample
/// - `fake_logits`: `(batch, 1)` discriminator logits of the reconstruction
/// - `weight`: `w` in `[0, 1]`
pub fn inversion_loss_per_sample<B: Backend>(
    residual: Tensor<B, 2>,
    fake_logits: Tensor<B, 2>,
    weight: f64,
) -> Tensor<B, 2> {
    let targets = Tensor::<B, 2>::ones(fake_logits.dims(), &fake_logits.device());
    let disc = sigmoid_cross_entropy_per_sample(fake_logits, targets);
    residual * (1.0 - weight) + disc * weight
}

/// izi_f encoder loss: image reconstruction MSE plus `kappa` times the MSE
/// between discriminator outputs on the real and the reconstructed image.
pub fn izi_f_loss<B: Backend>(
    images: Tensor<B, 4>,
    reconstructed: Tensor<B, 4>,
    real_logits: Tensor<B, 2>,
    reconstructed_logits: Tensor<B, 2>,
    kappa: f64,
) -> Tensor<B, 1> {
    mse(images, reconstructed) + mse(real_logits, reconstructed_logits) * kappa
}
