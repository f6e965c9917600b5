use burn::nn::{Dropout, DropoutConfig, Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::{leaky_relu, tanh};

use crate::error::ConfigError;
use crate::model::{DiscriminatorNet, EncoderNet, GeneratorNet, Phase};
use crate::training::data::ImageDims;

/// Configuration for the reference MLP networks.
///
/// ```text
/// generator:     (batch, latent) → Linear → LeakyReLU → Linear → LeakyReLU
///                → Linear(→ c·h·w) → tanh → (batch, c, h, w)
/// discriminator: (batch, c, h, w) → flatten → Linear → LeakyReLU → Dropout
///                → Linear → LeakyReLU → Dropout → Linear(→ 1) → (batch, 1) logits
/// encoder:       (batch, c, h, w) → flatten → Linear → LeakyReLU → Linear
///                → LeakyReLU → Linear(→ latent) → (batch, latent)
/// ```
#[derive(Config, Debug)]
pub struct NetworkConfig {
    /// Latent code width (`noise_dim`).
    pub latent_dim: usize,
    pub channels: usize,
    pub height: usize,
    pub width: usize,
    /// Width of both hidden layers.
    #[config(default = 256)]
    pub hidden_dim: usize,
    /// Negative slope of the LeakyReLU activations.
    #[config(default = 0.2)]
    pub leaky_slope: f64,
    /// Discriminator dropout, active only in training phases.
    #[config(default = 0.3)]
    pub dropout: f64,
}

impl NetworkConfig {
    pub fn image_dims(&self) -> ImageDims {
        ImageDims::new(self.channels, self.height, self.width)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.latent_dim == 0 {
            return Err(ConfigError::new("latent_dim", "must be > 0"));
        }
        if self.image_dims().numel() == 0 {
            return Err(ConfigError::new("channels/height/width", "must all be > 0"));
        }
        if self.hidden_dim == 0 {
            return Err(ConfigError::new("hidden_dim", "must be > 0"));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(ConfigError::new("dropout", format!("{} is outside [0, 1)", self.dropout)));
        }
        Ok(())
    }

    pub fn init_generator<B: Backend>(&self, device: &B::Device) -> MlpGenerator<B> {
        MlpGenerator {
            fc1: LinearConfig::new(self.latent_dim, self.hidden_dim).init(device),
            fc2: LinearConfig::new(self.hidden_dim, self.hidden_dim).init(device),
            out: LinearConfig::new(self.hidden_dim, self.image_dims().numel()).init(device),
            latent_dim: self.latent_dim,
            channels: self.channels,
            height: self.height,
            width: self.width,
            leaky_slope: self.leaky_slope,
        }
    }

    pub fn init_discriminator<B: Backend>(&self, device: &B::Device) -> MlpDiscriminator<B> {
        MlpDiscriminator {
            fc1: LinearConfig::new(self.image_dims().numel(), self.hidden_dim).init(device),
            fc2: LinearConfig::new(self.hidden_dim, self.hidden_dim).init(device),
            out: LinearConfig::new(self.hidden_dim, 1).init(device),
            dropout: DropoutConfig::new(self.dropout).init(),
            leaky_slope: self.leaky_slope,
        }
    }

    pub fn init_encoder<B: Backend>(&self, device: &B::Device) -> MlpEncoder<B> {
        MlpEncoder {
            fc1: LinearConfig::new(self.image_dims().numel(), self.hidden_dim).init(device),
            fc2: LinearConfig::new(self.hidden_dim, self.hidden_dim).init(device),
            out: LinearConfig::new(self.hidden_dim, self.latent_dim).init(device),
            leaky_slope: self.leaky_slope,
        }
    }
}

fn flatten_images<B: Backend>(images: Tensor<B, 4>) -> Tensor<B, 2> {
    let [batch, channels, height, width] = images.dims();
    images.reshape([batch, channels * height * width])
}

#[derive(Module, Debug)]
pub struct MlpGenerator<B: Backend> {
    fc1: Linear<B>,
    fc2: Linear<B>,
    out: Linear<B>,
    latent_dim: usize,
    channels: usize,
    height: usize,
    width: usize,
    leaky_slope: f64,
}

impl<B: Backend> GeneratorNet<B> for MlpGenerator<B> {
    fn latent_dim(&self) -> usize {
        self.latent_dim
    }

    fn generate(&self, latent: Tensor<B, 2>, _phase: Phase) -> Tensor<B, 4> {
        let [batch, _] = latent.dims();
        let x = leaky_relu(self.fc1.forward(latent), self.leaky_slope);
        let x = leaky_relu(self.fc2.forward(x), self.leaky_slope);
        tanh(self.out.forward(x)).reshape([batch, self.channels, self.height, self.width])
    }
}

#[derive(Module, Debug)]
pub struct MlpDiscriminator<B: Backend> {
    fc1: Linear<B>,
    fc2: Linear<B>,
    out: Linear<B>,
    dropout: Dropout,
    leaky_slope: f64,
}

impl<B: Backend> MlpDiscriminator<B> {
    fn maybe_dropout(&self, x: Tensor<B, 2>, phase: Phase) -> Tensor<B, 2> {
        if phase.is_training() {
            self.dropout.forward(x)
        } else {
            x
        }
    }
}

impl<B: Backend> DiscriminatorNet<B> for MlpDiscriminator<B> {
    fn discriminate(&self, images: Tensor<B, 4>, phase: Phase) -> Tensor<B, 2> {
        let x = flatten_images(images);
        let x = leaky_relu(self.fc1.forward(x), self.leaky_slope);
        let x = self.maybe_dropout(x, phase);
        let x = leaky_relu(self.fc2.forward(x), self.leaky_slope);
        let x = self.maybe_dropout(x, phase);
        self.out.forward(x)
    }
}

#[derive(Module, Debug)]
pub struct MlpEncoder<B: Backend> {
    fc1: Linear<B>,
    fc2: Linear<B>,
    out: Linear<B>,
    leaky_slope: f64,
}

impl<B: Backend> EncoderNet<B> for MlpEncoder<B> {
    fn encode(&self, images: Tensor<B, 4>, _phase: Phase) -> Tensor<B, 2> {
        let x = flatten_images(images);
        let x = leaky_relu(self.fc1.forward(x), self.leaky_slope);
        let x = leaky_relu(self.fc2.forward(x), self.leaky_slope);
        self.out.forward(x)
    }
}
