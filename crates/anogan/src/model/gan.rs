//! Concrete adversarial model: generator, discriminator, optional encoder,
//! and one optimizer per parameter group.

use std::marker::PhantomData;
use std::path::Path;

use burn::module::AutodiffModule;
use burn::optim::{AdamConfig, GradientsParams, Optimizer};
use burn::prelude::*;
use burn::record::{FullPrecisionSettings, NamedMpkFileRecorder, Recorder};
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::model::networks::{MlpDiscriminator, MlpEncoder, MlpGenerator, NetworkConfig};
use crate::model::{
    AdversarialModel, CheckpointMeta, DiscriminatorNet, EncoderNet, GeneratorNet, ParamGroup, Phase,
};
use crate::training::loss::izi_f_loss;

const META_FILE: &str = "meta.json";

/// Adam settings shared by the three parameter groups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerSettings {
    #[serde(default = "default_lr")]
    pub generator_lr: f64,
    #[serde(default = "default_lr")]
    pub discriminator_lr: f64,
    #[serde(default = "default_lr")]
    pub encoder_lr: f64,
    #[serde(default = "default_beta1")]
    pub beta1: f32,
    #[serde(default = "default_beta2")]
    pub beta2: f32,
    /// Weight of the discriminator-feature term in the encoder loss.
    #[serde(default = "default_kappa")]
    pub kappa: f64,
}

fn default_lr() -> f64 {
    2e-4
}
fn default_beta1() -> f32 {
    0.5
}
fn default_beta2() -> f32 {
    0.999
}
fn default_kappa() -> f64 {
    1.0
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self {
            generator_lr: default_lr(),
            discriminator_lr: default_lr(),
            encoder_lr: default_lr(),
            beta1: default_beta1(),
            beta2: default_beta2(),
            kappa: default_kappa(),
        }
    }
}

impl OptimizerSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, lr) in [
            ("generator_lr", self.generator_lr),
            ("discriminator_lr", self.discriminator_lr),
            ("encoder_lr", self.encoder_lr),
        ] {
            if !(lr.is_finite() && lr > 0.0) {
                return Err(ConfigError::new(field, format!("{lr} must be finite and > 0")));
            }
        }
        for (field, beta) in [("beta1", self.beta1), ("beta2", self.beta2)] {
            if !(0.0..1.0).contains(&beta) {
                return Err(ConfigError::new(field, format!("{beta} is outside [0, 1)")));
            }
        }
        if !(self.kappa.is_finite() && self.kappa >= 0.0) {
            return Err(ConfigError::new("kappa", format!("{} must be finite and >= 0", self.kappa)));
        }
        Ok(())
    }

    /// Adam configured with these betas.
    pub fn adam(&self) -> AdamConfig {
        AdamConfig::new().with_beta_1(self.beta1).with_beta_2(self.beta2)
    }
}

/// Generator/discriminator pair with an optional encoder.
///
/// Each network is updated only by its own optimizer, so gradients a loss
/// produces for another group are dropped by [`GradientsParams::from_grads`].
pub struct Gan<B, G, D, E, OG, OD, OE>
where
    B: AutodiffBackend,
{
    pub generator: G,
    pub discriminator: D,
    pub encoder: Option<E>,
    optim_g: OG,
    optim_d: OD,
    optim_e: OE,
    settings: OptimizerSettings,
    device: B::Device,
    _backend: PhantomData<B>,
}

impl<B, G, D, E, OG, OD, OE> Gan<B, G, D, E, OG, OD, OE>
where
    B: AutodiffBackend,
    G: GeneratorNet<B> + AutodiffModule<B>,
    D: DiscriminatorNet<B> + AutodiffModule<B>,
    E: EncoderNet<B> + AutodiffModule<B>,
    OG: Optimizer<G, B>,
    OD: Optimizer<D, B>,
    OE: Optimizer<E, B>,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        generator: G,
        discriminator: D,
        encoder: Option<E>,
        optim_g: OG,
        optim_d: OD,
        optim_e: OE,
        settings: OptimizerSettings,
        device: B::Device,
    ) -> Self {
        Self {
            generator,
            discriminator,
            encoder,
            optim_g,
            optim_d,
            optim_e,
            settings,
            device,
            _backend: PhantomData,
        }
    }

    pub fn device(&self) -> &B::Device {
        &self.device
    }

    pub fn settings(&self) -> &OptimizerSettings {
        &self.settings
    }

    fn require_encoder(&self) -> anyhow::Result<&E> {
        self.encoder
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("model was built without an encoder"))
    }
}

/// Build the reference MLP GAN with Adam optimizers.
pub fn build_reference_gan<B: AutodiffBackend>(
    network: &NetworkConfig,
    settings: OptimizerSettings,
    with_encoder: bool,
    device: &B::Device,
) -> Gan<
    B,
    MlpGenerator<B>,
    MlpDiscriminator<B>,
    MlpEncoder<B>,
    impl Optimizer<MlpGenerator<B>, B>,
    impl Optimizer<MlpDiscriminator<B>, B>,
    impl Optimizer<MlpEncoder<B>, B>,
> {
    let adam = settings.adam();
    let optim_g = adam.init::<B, MlpGenerator<B>>();
    let optim_d = adam.init::<B, MlpDiscriminator<B>>();
    let optim_e = adam.init::<B, MlpEncoder<B>>();
    let encoder = with_encoder.then(|| network.init_encoder::<B>(device));
    tracing::debug!(
        latent_dim = network.latent_dim,
        hidden_dim = network.hidden_dim,
        with_encoder,
        "Initialized reference networks"
    );
    Gan::new(
        network.init_generator::<B>(device),
        network.init_discriminator::<B>(device),
        encoder,
        optim_g,
        optim_d,
        optim_e,
        settings,
        device.clone(),
    )
}

impl<B, G, D, E, OG, OD, OE> AdversarialModel<B> for Gan<B, G, D, E, OG, OD, OE>
where
    B: AutodiffBackend,
    G: GeneratorNet<B> + AutodiffModule<B>,
    D: DiscriminatorNet<B> + AutodiffModule<B>,
    E: EncoderNet<B> + AutodiffModule<B>,
    OG: Optimizer<G, B>,
    OD: Optimizer<D, B>,
    OE: Optimizer<E, B>,
{
    fn latent_dim(&self) -> usize {
        self.generator.latent_dim()
    }

    fn has_encoder(&self) -> bool {
        self.encoder.is_some()
    }

    fn generate(&self, latent: Tensor<B, 2>, phase: Phase) -> Tensor<B, 4> {
        self.generator.generate(latent, phase)
    }

    fn discriminate(&self, images: Tensor<B, 4>, phase: Phase) -> Tensor<B, 2> {
        self.discriminator.discriminate(images, phase)
    }

    fn encode(&self, images: Tensor<B, 4>, phase: Phase) -> anyhow::Result<Tensor<B, 2>> {
        Ok(self.require_encoder()?.encode(images, phase))
    }

    fn encoder_loss(&self, images: Tensor<B, 4>, phase: Phase) -> anyhow::Result<Tensor<B, 1>> {
        let encoder = self.require_encoder()?;
        let latent = encoder.encode(images.clone(), phase);
        let reconstructed = self.generator.generate(latent, phase);
        let real_logits = self.discriminator.discriminate(images.clone(), phase);
        let reconstructed_logits = self.discriminator.discriminate(reconstructed.clone(), phase);
        Ok(izi_f_loss(images, reconstructed, real_logits, reconstructed_logits, self.settings.kappa))
    }

    fn apply_gradients(&mut self, group: ParamGroup, grads: B::Gradients) -> anyhow::Result<()> {
        match group {
            ParamGroup::Generator => {
                let grads = GradientsParams::from_grads(grads, &self.generator);
                let lr = self.settings.generator_lr;
                self.generator = self.optim_g.step(lr, self.generator.clone(), grads);
            }
            ParamGroup::Discriminator => {
                let grads = GradientsParams::from_grads(grads, &self.discriminator);
                let lr = self.settings.discriminator_lr;
                self.discriminator = self.optim_d.step(lr, self.discriminator.clone(), grads);
            }
            ParamGroup::Encoder => {
                let encoder = self.require_encoder()?.clone();
                let grads = GradientsParams::from_grads(grads, &encoder);
                let lr = self.settings.encoder_lr;
                self.encoder = Some(self.optim_e.step(lr, encoder, grads));
            }
        }
        Ok(())
    }

    fn save(&self, dir: &Path, meta: &CheckpointMeta) -> anyhow::Result<()> {
        std::fs::create_dir_all(dir)?;
        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        let epoch = meta.epoch;

        self.generator
            .clone()
            .save_file(dir.join("generator"), &recorder)
            .map_err(|e| anyhow::anyhow!("Failed to save generator at epoch {epoch}: {e}"))?;
        self.discriminator
            .clone()
            .save_file(dir.join("discriminator"), &recorder)
            .map_err(|e| anyhow::anyhow!("Failed to save discriminator at epoch {epoch}: {e}"))?;
        recorder
            .record(self.optim_g.to_record(), dir.join("optimizer_generator"))
            .map_err(|e| anyhow::anyhow!("Failed to save generator optimizer at epoch {epoch}: {e}"))?;
        recorder
            .record(self.optim_d.to_record(), dir.join("optimizer_discriminator"))
            .map_err(|e| anyhow::anyhow!("Failed to save discriminator optimizer at epoch {epoch}: {e}"))?;

        if let Some(encoder) = &self.encoder {
            encoder
                .clone()
                .save_file(dir.join("encoder"), &recorder)
                .map_err(|e| anyhow::anyhow!("Failed to save encoder at epoch {epoch}: {e}"))?;
            recorder
                .record(self.optim_e.to_record(), dir.join("optimizer_encoder"))
                .map_err(|e| anyhow::anyhow!("Failed to save encoder optimizer at epoch {epoch}: {e}"))?;
        }

        // Metadata last: its presence marks a complete checkpoint.
        let meta_path = dir.join(META_FILE);
        serde_json::to_writer_pretty(std::fs::File::create(&meta_path)?, meta)?;

        tracing::debug!(epoch, dir = %dir.display(), "Checkpoint saved (networks + optimizers + meta)");
        Ok(())
    }

    fn load(mut self, dir: &Path) -> anyhow::Result<(Self, Option<CheckpointMeta>)> {
        let meta_path = dir.join(META_FILE);
        if !meta_path.exists() {
            return Ok((self, None));
        }
        let meta: CheckpointMeta = serde_json::from_reader(
            std::fs::File::open(&meta_path)
                .map_err(|e| anyhow::anyhow!("Failed to open {}: {e}", meta_path.display()))?,
        )
        .map_err(|e| anyhow::anyhow!("Failed to parse {}: {e}", meta_path.display()))?;

        let recorder = NamedMpkFileRecorder::<FullPrecisionSettings>::new();
        let device = self.device.clone();
        let shown = dir.display();

        self.generator = self
            .generator
            .load_file(dir.join("generator"), &recorder, &device)
            .map_err(|e| anyhow::anyhow!("Failed to load generator from {shown}: {e}"))?;
        self.discriminator = self
            .discriminator
            .load_file(dir.join("discriminator"), &recorder, &device)
            .map_err(|e| anyhow::anyhow!("Failed to load discriminator from {shown}: {e}"))?;

        let record = recorder
            .load(dir.join("optimizer_generator"), &device)
            .map_err(|e| anyhow::anyhow!("Failed to load generator optimizer from {shown}: {e}"))?;
        self.optim_g = self.optim_g.load_record(record);
        let record = recorder
            .load(dir.join("optimizer_discriminator"), &device)
            .map_err(|e| anyhow::anyhow!("Failed to load discriminator optimizer from {shown}: {e}"))?;
        self.optim_d = self.optim_d.load_record(record);

        if let Some(encoder) = self.encoder.take() {
            let encoder = encoder
                .load_file(dir.join("encoder"), &recorder, &device)
                .map_err(|e| anyhow::anyhow!("Failed to load encoder from {shown}: {e}"))?;
            self.encoder = Some(encoder);
            let record = recorder
                .load(dir.join("optimizer_encoder"), &device)
                .map_err(|e| anyhow::anyhow!("Failed to load encoder optimizer from {shown}: {e}"))?;
            self.optim_e = self.optim_e.load_record(record);
        }

        tracing::info!(epoch = meta.epoch, seed = meta.seed, dir = %shown, "Restored checkpoint");
        Ok((self, Some(meta)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::bridge::{tensor_to_f64, tensor_to_vec};
    use burn::backend::ndarray::NdArray;
    use burn::backend::Autodiff;
    use burn::tensor::Distribution;
    use tempfile::TempDir;

    type TestAutodiffBackend = Autodiff<NdArray<f32>>;

    fn network() -> NetworkConfig {
        NetworkConfig::new(3, 1, 2, 2).with_hidden_dim(8).with_dropout(0.0)
    }

    fn images(batch: usize) -> Tensor<TestAutodiffBackend, 4> {
        Tensor::random([batch, 1, 2, 2], Distribution::Uniform(-1.0, 1.0), &Default::default())
    }

    #[test]
    fn test_settings_defaults_and_validation() {
        let settings = OptimizerSettings::default();
        assert!((settings.beta1 - 0.5).abs() < 1e-9);
        assert!(settings.validate().is_ok());

        let bad = OptimizerSettings { generator_lr: 0.0, ..Default::default() };
        assert_eq!(bad.validate().unwrap_err().field, "generator_lr");
        let bad = OptimizerSettings { beta2: 1.0, ..Default::default() };
        assert_eq!(bad.validate().unwrap_err().field, "beta2");
    }

    #[test]
    fn test_discriminator_update_leaves_generator_untouched() {
        let device = Default::default();
        let mut gan = build_reference_gan::<TestAutodiffBackend>(&network(), OptimizerSettings::default(), false, &device);
        let z = Tensor::<TestAutodiffBackend, 2>::random([4, 3], Distribution::Normal(0.0, 1.0), &device);
        let x = images(4);

        let gen_before = tensor_to_vec(gan.generate(z.clone(), Phase::Idle)).unwrap();
        let disc_before = tensor_to_vec(gan.discriminate(x.clone(), Phase::Idle)).unwrap();

        // Loss depends on both networks; only the discriminator may move.
        let fake = gan.generate(z.clone(), Phase::TrainingDiscriminator);
        let loss = gan.discriminate(fake, Phase::TrainingDiscriminator).sum()
            + gan.discriminate(x.clone(), Phase::TrainingDiscriminator).sum();
        gan.apply_gradients(ParamGroup::Discriminator, loss.backward()).unwrap();

        let gen_after = tensor_to_vec(gan.generate(z, Phase::Idle)).unwrap();
        let disc_after = tensor_to_vec(gan.discriminate(x, Phase::Idle)).unwrap();
        assert_eq!(gen_before, gen_after, "generator must not change on a discriminator update");
        assert_ne!(disc_before, disc_after, "discriminator should change");
    }

    #[test]
    fn test_encoder_requires_encoder() {
        let device = Default::default();
        let mut gan = build_reference_gan::<TestAutodiffBackend>(&network(), OptimizerSettings::default(), false, &device);
        assert!(!gan.has_encoder());
        assert!(gan.encode(images(2), Phase::Evaluating).is_err());
        assert!(gan.encoder_loss(images(2), Phase::TrainingEncoder).is_err());

        let loss = gan.discriminate(images(2), Phase::TrainingDiscriminator).sum();
        assert!(gan.apply_gradients(ParamGroup::Encoder, loss.backward()).is_err());
    }

    #[test]
    fn test_encoder_loss_is_finite_and_updates_encoder_only() {
        let device = Default::default();
        let mut gan = build_reference_gan::<TestAutodiffBackend>(&network(), OptimizerSettings::default(), true, &device);
        let x = images(3);
        let z = Tensor::<TestAutodiffBackend, 2>::random([3, 3], Distribution::Normal(0.0, 1.0), &device);

        let gen_before = tensor_to_vec(gan.generate(z.clone(), Phase::Idle)).unwrap();
        let enc_before = tensor_to_vec(gan.encode(x.clone(), Phase::Evaluating).unwrap()).unwrap();

        let loss = gan.encoder_loss(x.clone(), Phase::TrainingEncoder).unwrap();
        assert!(tensor_to_f64(loss.clone()).is_finite());
        gan.apply_gradients(ParamGroup::Encoder, loss.backward()).unwrap();

        assert_eq!(gen_before, tensor_to_vec(gan.generate(z, Phase::Idle)).unwrap());
        assert_ne!(enc_before, tensor_to_vec(gan.encode(x, Phase::Evaluating).unwrap()).unwrap());
    }

    #[test]
    fn test_checkpoint_round_trip() {
        let tmp = TempDir::new().unwrap();
        let device = Default::default();
        let mut gan = build_reference_gan::<TestAutodiffBackend>(&network(), OptimizerSettings::default(), true, &device);
        let x = images(2);

        // One update so optimizer state is non-empty.
        let loss = gan.discriminate(x.clone(), Phase::TrainingDiscriminator).sum();
        gan.apply_gradients(ParamGroup::Discriminator, loss.backward()).unwrap();

        let expected = tensor_to_vec(gan.discriminate(x.clone(), Phase::Evaluating)).unwrap();
        let meta = CheckpointMeta { epoch: 3, seed: 11 };
        gan.save(tmp.path(), &meta).unwrap();
        assert!(tmp.path().join("meta.json").exists());

        let fresh = build_reference_gan::<TestAutodiffBackend>(&network(), OptimizerSettings::default(), true, &device);
        let (restored, loaded) = fresh.load(tmp.path()).unwrap();
        assert_eq!(loaded, Some(meta));
        let got = tensor_to_vec(restored.discriminate(x, Phase::Evaluating)).unwrap();
        assert_eq!(got, expected);
    }

    #[test]
    fn test_load_without_checkpoint_is_noop() {
        let tmp = TempDir::new().unwrap();
        let device = Default::default();
        let gan = build_reference_gan::<TestAutodiffBackend>(&network(), OptimizerSettings::default(), false, &device);
        let (_, meta) = gan.load(tmp.path()).unwrap();
        assert!(meta.is_none());
    }
}
