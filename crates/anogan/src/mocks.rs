//! Mock model for testing the step, driver and evaluation contracts without
//! the reference networks.

use std::cell::RefCell;
use std::path::Path;

use burn::nn::{Linear, LinearConfig};
use burn::prelude::*;
use burn::tensor::activation::tanh;
use burn::tensor::backend::AutodiffBackend;

use crate::model::{AdversarialModel, CheckpointMeta, ParamGroup, Phase};
use crate::training::data::{DataSource, ImageBatch, ImageDims, LabeledBatch};

const MOCK_META: &str = "mock_meta.json";

#[derive(Debug, Default)]
struct CallLog {
    latents: Vec<Vec<f32>>,
    phases: Vec<Phase>,
    updates: Vec<ParamGroup>,
    saves: Vec<CheckpointMeta>,
}

// ---------------------------------------------------------------------------
// MockModel
// ---------------------------------------------------------------------------

/// Single-layer generator/discriminator/encoder that records its calls.
///
/// - every latent passed to `generate` (flattened), with the call's phase;
/// - the phase of every `encoder_loss` call;
/// - every parameter group handed to `apply_gradients` (gradients are dropped);
/// - every checkpoint saved.
pub struct MockModel<B: Backend> {
    generator: Linear<B>,
    discriminator: Linear<B>,
    encoder: Option<Linear<B>>,
    latent_dim: usize,
    dims: ImageDims,
    log: RefCell<CallLog>,
}

impl<B: Backend> MockModel<B> {
    pub fn new(latent_dim: usize, dims: ImageDims, with_encoder: bool, device: &B::Device) -> Self {
        let numel = dims.numel();
        Self {
            generator: LinearConfig::new(latent_dim, numel).init(device),
            discriminator: LinearConfig::new(numel, 1).init(device),
            encoder: with_encoder.then(|| LinearConfig::new(numel, latent_dim).init(device)),
            latent_dim,
            dims,
            log: RefCell::new(CallLog::default()),
        }
    }

    /// Latents received by `generate`, in call order.
    pub fn latents(&self) -> Vec<Vec<f32>> {
        self.log.borrow().latents.clone()
    }

    /// Phases of `generate` and `encoder_loss` calls, in call order.
    pub fn phases(&self) -> Vec<Phase> {
        self.log.borrow().phases.clone()
    }

    /// Parameter groups updated, in call order.
    pub fn updates(&self) -> Vec<ParamGroup> {
        self.log.borrow().updates.clone()
    }

    pub fn saves(&self) -> Vec<CheckpointMeta> {
        self.log.borrow().saves.clone()
    }

    pub fn clear_log(&self) {
        *self.log.borrow_mut() = CallLog::default();
    }

    fn flatten(images: Tensor<B, 4>) -> Tensor<B, 2> {
        let [batch, c, h, w] = images.dims();
        images.reshape([batch, c * h * w])
    }
}

impl<B: AutodiffBackend> AdversarialModel<B> for MockModel<B> {
    fn latent_dim(&self) -> usize {
        self.latent_dim
    }

    fn has_encoder(&self) -> bool {
        self.encoder.is_some()
    }

    fn generate(&self, latent: Tensor<B, 2>, phase: Phase) -> Tensor<B, 4> {
        let values = latent.to_data().to_vec::<f32>().unwrap_or_default();
        {
            let mut log = self.log.borrow_mut();
            log.latents.push(values);
            log.phases.push(phase);
        }
        let [batch, _] = latent.dims();
        tanh(self.generator.forward(latent)).reshape(self.dims.batch_shape(batch))
    }

    fn discriminate(&self, images: Tensor<B, 4>, _phase: Phase) -> Tensor<B, 2> {
        self.discriminator.forward(Self::flatten(images))
    }

    fn encode(&self, images: Tensor<B, 4>, _phase: Phase) -> anyhow::Result<Tensor<B, 2>> {
        let encoder = self
            .encoder
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("mock built without an encoder"))?;
        Ok(encoder.forward(Self::flatten(images)))
    }

    fn encoder_loss(&self, images: Tensor<B, 4>, phase: Phase) -> anyhow::Result<Tensor<B, 1>> {
        let latent = self.encode(images.clone(), phase)?;
        self.log.borrow_mut().phases.push(phase);
        let [batch, _] = latent.dims();
        let reconstructed = tanh(self.generator.forward(latent)).reshape(self.dims.batch_shape(batch));
        Ok((images - reconstructed).powf_scalar(2.0).mean())
    }

    fn apply_gradients(&mut self, group: ParamGroup, _grads: B::Gradients) -> anyhow::Result<()> {
        if group == ParamGroup::Encoder && self.encoder.is_none() {
            anyhow::bail!("mock built without an encoder");
        }
        self.log.borrow_mut().updates.push(group);
        Ok(())
    }

    fn save(&self, dir: &Path, meta: &CheckpointMeta) -> anyhow::Result<()> {
        std::fs::create_dir_all(dir)?;
        serde_json::to_writer(std::fs::File::create(dir.join(MOCK_META))?, meta)?;
        self.log.borrow_mut().saves.push(meta.clone());
        Ok(())
    }

    fn load(self, dir: &Path) -> anyhow::Result<(Self, Option<CheckpointMeta>)> {
        let path = dir.join(MOCK_META);
        if !path.exists() {
            return Ok((self, None));
        }
        let meta: CheckpointMeta = serde_json::from_reader(std::fs::File::open(path)?)?;
        Ok((self, Some(meta)))
    }
}

// ---------------------------------------------------------------------------
// ScriptedData
// ---------------------------------------------------------------------------

/// Data source replaying fixed batches; counts resets.
pub struct ScriptedData {
    dims: ImageDims,
    train: Vec<ImageBatch>,
    test: Vec<LabeledBatch>,
    train_cursor: usize,
    test_cursor: usize,
    pub train_resets: usize,
    pub test_resets: usize,
}

impl ScriptedData {
    pub fn new(dims: ImageDims, train: Vec<ImageBatch>, test: Vec<LabeledBatch>) -> Self {
        Self {
            dims,
            train,
            test,
            train_cursor: 0,
            test_cursor: 0,
            train_resets: 0,
            test_resets: 0,
        }
    }

    /// `n_train` training batches of `batch_size` and test batches of the
    /// given sizes, labels alternating 0/1.
    pub fn uniform(dims: ImageDims, n_train: usize, batch_size: usize, test_sizes: &[usize]) -> Self {
        let image = |seed: usize, n: usize| {
            let pixels = (0..n * dims.numel())
                .map(|i| ((seed * 31 + i) as f32 * 0.37).sin())
                .collect();
            ImageBatch { dims, pixels }
        };
        let train = (0..n_train).map(|b| image(b, batch_size)).collect();
        let mut offset = 0;
        let test = test_sizes
            .iter()
            .enumerate()
            .map(|(b, &n)| {
                let labels = (offset..offset + n).map(|i| (i % 2) as i64).collect();
                offset += n;
                LabeledBatch { images: image(100 + b, n), labels }
            })
            .collect();
        Self::new(dims, train, test)
    }
}

impl DataSource for ScriptedData {
    fn dims(&self) -> ImageDims {
        self.dims
    }

    fn train_batches_per_epoch(&self) -> usize {
        self.train.len()
    }

    fn reset_train(&mut self) {
        self.train_cursor = 0;
        self.train_resets += 1;
    }

    fn next_train_batch(&mut self) -> Option<ImageBatch> {
        let batch = self.train.get(self.train_cursor).cloned();
        self.train_cursor += 1;
        batch
    }

    fn reset_test(&mut self) {
        self.test_cursor = 0;
        self.test_resets += 1;
    }

    fn next_test_batch(&mut self) -> Option<LabeledBatch> {
        let batch = self.test.get(self.test_cursor).cloned();
        self.test_cursor += 1;
        batch
    }
}
