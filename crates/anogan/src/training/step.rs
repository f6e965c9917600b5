//! One adversarial training step: discriminator sub-step, then generator
//! sub-step, each on its own fresh latent, labels and instance noise. The
//! f-AnoGAN encoder phase has its own single-sub-step variant.

use burn::tensor::backend::AutodiffBackend;
use rand::Rng;

use crate::error::TrainError;
use crate::model::bridge::{column_to_tensor, images_to_tensor, matrix_to_tensor, tensor_to_f64};
use crate::model::{AdversarialModel, ParamGroup, Phase};
use crate::training::data::{ImageBatch, ImageDims};
use crate::training::labels::{LabelBundle, LabelPolicy};
use crate::training::loss::{discriminator_loss, sigmoid_cross_entropy};
use crate::training::noise::{InstanceNoise, NoiseScheduler};
use crate::training::summary::Summary;

/// Everything randomly drawn for one sub-step.
#[derive(Debug, Clone)]
pub struct StepFeed {
    /// Row-major `batch × latent_dim`.
    pub latent: Vec<f32>,
    pub labels: LabelBundle,
    pub noise: InstanceNoise,
}

/// Losses of one two-player step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GanStepOutput {
    pub disc_loss: f64,
    pub disc_real_loss: f64,
    pub disc_fake_loss: f64,
    pub gen_loss: f64,
}

impl GanStepOutput {
    pub fn summaries(&self) -> Vec<Summary> {
        vec![
            Summary::scalar("discriminator_loss", self.disc_loss),
            Summary::scalar("discriminator_real_loss", self.disc_real_loss),
            Summary::scalar("discriminator_fake_loss", self.disc_fake_loss),
            Summary::scalar("generator_loss", self.gen_loss),
        ]
    }
}

/// Where in the run a step happens; carried into errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepIndex {
    pub epoch: usize,
    pub step: usize,
}

/// Runs training sub-steps against an [`AdversarialModel`].
#[derive(Debug, Clone, Copy)]
pub struct AdversarialStepExecutor {
    pub noise: NoiseScheduler,
    pub labels: LabelPolicy,
    pub include_noise: bool,
}

impl AdversarialStepExecutor {
    pub fn new(labels: LabelPolicy, include_noise: bool) -> Self {
        Self { noise: NoiseScheduler, labels, include_noise }
    }

    /// Draw latent, labels and instance noise, in that order.
    pub fn draw<R: Rng + ?Sized>(
        &self,
        rng: &mut R,
        batch_size: usize,
        latent_dim: usize,
        dims: ImageDims,
        epoch: usize,
        include_noise: bool,
    ) -> StepFeed {
        let latent = self.noise.latent(rng, batch_size, latent_dim);
        let labels = self.labels.labels(rng, batch_size);
        let noise = self.noise.instance_noise(rng, include_noise, batch_size, dims, epoch);
        StepFeed { latent, labels, noise }
    }

    /// Discriminator update followed by a generator update.
    ///
    /// The discriminator sees the real batch plus real noise against
    /// `true_labels`, and `G(z) + fake noise` against `generated_labels`.
    /// The generator then draws a fresh feed and is trained to make
    /// `D(G(z') + fake noise')` match that feed's `true_labels`.
    pub fn gan_step<B, M, R>(
        &self,
        model: &mut M,
        batch: &ImageBatch,
        at: StepIndex,
        rng: &mut R,
        device: &B::Device,
    ) -> Result<GanStepOutput, TrainError>
    where
        B: AutodiffBackend,
        M: AdversarialModel<B>,
        R: Rng + ?Sized,
    {
        let batch_size = batch.len();
        let latent_dim = model.latent_dim();
        let dims = batch.dims;

        // Discriminator sub-step.
        let feed = self.draw(rng, batch_size, latent_dim, dims, at.epoch, self.include_noise);
        let phase = Phase::TrainingDiscriminator;
        let real = images_to_tensor::<B>(batch, device) + images_to_tensor::<B>(&feed.noise.real, device);
        let z = matrix_to_tensor::<B>(&feed.latent, batch_size, latent_dim, device);
        let fake = model.generate(z, phase).detach() + images_to_tensor::<B>(&feed.noise.fake, device);
        let (total, real_part, fake_part) = discriminator_loss(
            model.discriminate(real, phase),
            model.discriminate(fake, phase),
            column_to_tensor::<B>(&feed.labels.true_labels, device),
            column_to_tensor::<B>(&feed.labels.generated_labels, device),
        );
        let disc_loss = finite(tensor_to_f64(total.clone()), ParamGroup::Discriminator, at)?;
        let disc_real_loss = tensor_to_f64(real_part);
        let disc_fake_loss = tensor_to_f64(fake_part);
        model
            .apply_gradients(ParamGroup::Discriminator, total.backward())
            .map_err(TrainError::Model)?;

        // Generator sub-step.
        let feed = self.draw(rng, batch_size, latent_dim, dims, at.epoch, self.include_noise);
        let phase = Phase::TrainingGenerator;
        let z = matrix_to_tensor::<B>(&feed.latent, batch_size, latent_dim, device);
        let fake = model.generate(z, phase) + images_to_tensor::<B>(&feed.noise.fake, device);
        let gen = sigmoid_cross_entropy(
            model.discriminate(fake, phase),
            column_to_tensor::<B>(&feed.labels.true_labels, device),
        );
        let gen_loss = finite(tensor_to_f64(gen.clone()), ParamGroup::Generator, at)?;
        model
            .apply_gradients(ParamGroup::Generator, gen.backward())
            .map_err(TrainError::Model)?;

        tracing::debug!(
            epoch = at.epoch,
            step = at.step,
            disc_loss,
            gen_loss,
            "Adversarial step"
        );
        Ok(GanStepOutput { disc_loss, disc_real_loss, disc_fake_loss, gen_loss })
    }

    /// One encoder update on a real batch.
    ///
    /// The feed is drawn the same way as for a discriminator sub-step;
    /// only its real-branch noise is used.
    pub fn encoder_step<B, M, R>(
        &self,
        model: &mut M,
        batch: &ImageBatch,
        at: StepIndex,
        rng: &mut R,
        device: &B::Device,
    ) -> Result<f64, TrainError>
    where
        B: AutodiffBackend,
        M: AdversarialModel<B>,
        R: Rng + ?Sized,
    {
        let feed = self.draw(rng, batch.len(), model.latent_dim(), batch.dims, at.epoch, self.include_noise);
        let images = images_to_tensor::<B>(batch, device) + images_to_tensor::<B>(&feed.noise.real, device);
        let loss = model
            .encoder_loss(images, Phase::TrainingEncoder)
            .map_err(TrainError::Model)?;
        let enc_loss = finite(tensor_to_f64(loss.clone()), ParamGroup::Encoder, at)?;
        model
            .apply_gradients(ParamGroup::Encoder, loss.backward())
            .map_err(TrainError::Model)?;
        tracing::debug!(epoch = at.epoch, step = at.step, enc_loss, "Encoder step");
        Ok(enc_loss)
    }
}

fn finite(value: f64, group: ParamGroup, at: StepIndex) -> Result<f64, TrainError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(TrainError::NonFiniteLoss { group, epoch: at.epoch, step: at.step, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::MockModel;
    use burn::backend::ndarray::NdArray;
    use burn::backend::Autodiff;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    type TestAutodiffBackend = Autodiff<NdArray<f32>>;

    fn dims() -> ImageDims {
        ImageDims::new(1, 2, 2)
    }

    fn batch(n: usize) -> ImageBatch {
        ImageBatch::new(dims(), (0..n * 4).map(|v| (v as f32 * 0.1).sin()).collect()).unwrap()
    }

    fn hard_executor() -> AdversarialStepExecutor {
        AdversarialStepExecutor::new(LabelPolicy::new(false, 0.0, false), false)
    }

    const AT: StepIndex = StepIndex { epoch: 0, step: 0 };

    #[test]
    fn test_gan_step_updates_each_player_once_in_order() {
        let device = Default::default();
        let mut model = MockModel::<TestAutodiffBackend>::new(2, dims(), false, &device);
        let mut rng = StdRng::seed_from_u64(0);

        let out = hard_executor()
            .gan_step(&mut model, &batch(4), AT, &mut rng, &device)
            .unwrap();

        assert_eq!(model.updates(), vec![ParamGroup::Discriminator, ParamGroup::Generator]);
        assert!(out.disc_loss.is_finite() && out.gen_loss.is_finite());
        assert!((out.disc_loss - (out.disc_real_loss + out.disc_fake_loss)).abs() < 1e-5);
    }

    #[test]
    fn test_gan_step_uses_two_distinct_latents() {
        let device = Default::default();
        let mut model = MockModel::<TestAutodiffBackend>::new(2, dims(), false, &device);
        let mut rng = StdRng::seed_from_u64(1);
        hard_executor()
            .gan_step(&mut model, &batch(4), AT, &mut rng, &device)
            .unwrap();

        let latents = model.latents();
        assert_eq!(latents.len(), 2);
        assert_eq!(latents[0].len(), 8, "batch 4 x latent 2");
        assert_ne!(latents[0], latents[1], "each sub-step draws its own latent");
        assert_eq!(
            model.phases(),
            vec![Phase::TrainingDiscriminator, Phase::TrainingGenerator]
        );
    }

    #[test]
    fn test_draw_order_is_reproducible() {
        let exec = AdversarialStepExecutor::new(LabelPolicy::new(true, 0.1, false), true);
        let a = exec.draw(&mut StdRng::seed_from_u64(3), 4, 2, dims(), 2, true);
        let b = exec.draw(&mut StdRng::seed_from_u64(3), 4, 2, dims(), 2, true);
        assert_eq!(a.latent, b.latent);
        assert_eq!(a.labels, b.labels);
        assert_eq!(a.noise, b.noise);
    }

    #[test]
    fn test_encoder_step_updates_encoder_only() {
        let device = Default::default();
        let mut model = MockModel::<TestAutodiffBackend>::new(2, dims(), true, &device);
        let mut rng = StdRng::seed_from_u64(4);
        let loss = hard_executor()
            .encoder_step(&mut model, &batch(3), AT, &mut rng, &device)
            .unwrap();
        assert!(loss.is_finite());
        assert_eq!(model.updates(), vec![ParamGroup::Encoder]);
        assert_eq!(model.phases(), vec![Phase::TrainingEncoder]);
    }

    #[test]
    fn test_non_finite_loss_is_an_error() {
        let device = Default::default();
        let mut model = MockModel::<TestAutodiffBackend>::new(2, dims(), false, &device);
        let mut poisoned = batch(2);
        poisoned.pixels[0] = f32::NAN;
        let err = hard_executor()
            .gan_step(&mut model, &poisoned, StepIndex { epoch: 2, step: 5 }, &mut StdRng::seed_from_u64(0), &device)
            .unwrap_err();
        match err {
            TrainError::NonFiniteLoss { group, epoch, step, .. } => {
                assert_eq!(group, ParamGroup::Discriminator);
                assert_eq!((epoch, step), (2, 5));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(model.updates().is_empty(), "no update after a non-finite loss");
    }

    #[test]
    fn test_summaries_names() {
        let out = GanStepOutput { disc_loss: 1.0, disc_real_loss: 0.4, disc_fake_loss: 0.6, gen_loss: 0.7 };
        let names: Vec<String> = out.summaries().iter().map(|s| s.name().to_string()).collect();
        assert_eq!(
            names,
            ["discriminator_loss", "discriminator_real_loss", "discriminator_fake_loss", "generator_loss"]
        );
    }
}
