use burn::tensor::backend::AutodiffBackend;
use rand::Rng;

use crate::evaluation::inversion::LatentInversion;
use crate::evaluation::report::{EvaluationReport, ResultReporter};
use crate::model::bridge::{images_to_tensor, matrix_to_tensor};
use crate::model::{AdversarialModel, Phase};
use crate::training::config::EvaluationConfig;
use crate::training::data::{DataSource, ImageBatch};
use crate::training::noise::NoiseScheduler;

/// Where each batch's latent starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatentInit {
    /// Fresh standard-normal draws from the run stream.
    Random,
    /// The encoder's code for the batch.
    Encoded,
}

/// Concatenated evaluation records, aligned with `labels`.
#[derive(Debug, Clone, Default)]
pub struct EvaluationOutput {
    pub reconstruction_errors: Vec<f64>,
    pub scores: Vec<f64>,
    /// Row-major `len() × latent_dim`.
    pub latents: Vec<f32>,
    pub latent_dim: usize,
    pub labels: Vec<i64>,
    pub batch_sizes: Vec<usize>,
    /// Inversion wall time of each batch.
    pub inference_secs: Vec<f64>,
    /// Indices of batches flagged as diverged.
    pub diverged_batches: Vec<usize>,
    /// Reconstruction of the first test batch.
    pub first_reconstruction: Option<ImageBatch>,
}

impl EvaluationOutput {
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn mean_inference_secs(&self) -> f64 {
        if self.inference_secs.is_empty() {
            0.0
        } else {
            self.inference_secs.iter().sum::<f64>() / self.inference_secs.len() as f64
        }
    }

    /// Latent code of sample `i`.
    pub fn latent(&self, i: usize) -> &[f32] {
        &self.latents[i * self.latent_dim..(i + 1) * self.latent_dim]
    }
}

/// Run metadata forwarded to the reporter with the scores.
#[derive(Debug, Clone)]
pub struct ReportContext {
    pub model_name: String,
    pub seed: u64,
    pub epoch: usize,
}

/// Scores the test set by per-batch latent inversion.
#[derive(Debug, Clone)]
pub struct EvaluationProtocol {
    pub config: EvaluationConfig,
    pub init: LatentInit,
    noise: NoiseScheduler,
}

impl EvaluationProtocol {
    pub fn new(config: EvaluationConfig, init: LatentInit) -> Self {
        Self { config, init, noise: NoiseScheduler }
    }

    fn inversion(&self) -> LatentInversion {
        LatentInversion::new(self.config.steps_number, self.config.inversion_lr, self.config.weight)
    }

    /// Invert every test batch (up to `max_test_batches`) and concatenate
    /// the results in batch order.
    pub fn run<B, M, R>(
        &self,
        model: &M,
        data: &mut dyn DataSource,
        rng: &mut R,
        device: &B::Device,
    ) -> anyhow::Result<EvaluationOutput>
    where
        B: AutodiffBackend,
        M: AdversarialModel<B>,
        R: Rng + ?Sized,
    {
        if self.init == LatentInit::Encoded && !model.has_encoder() {
            anyhow::bail!("encoder-initialized evaluation needs a model with an encoder");
        }
        let latent_dim = model.latent_dim();
        let inversion = self.inversion();
        let mut out = EvaluationOutput { latent_dim, ..Default::default() };

        data.reset_test();
        let mut index = 0;
        while let Some(batch) = data.next_test_batch() {
            if self.config.max_test_batches.is_some_and(|max| index >= max) {
                break;
            }
            let n = batch.images.len();
            if n != batch.labels.len() {
                anyhow::bail!("test batch {index} has {n} images but {} labels", batch.labels.len());
            }
            let images = images_to_tensor::<B>(&batch.images, device);
            let initial = match self.init {
                LatentInit::Random => {
                    let values = self.noise.latent(rng, n, latent_dim);
                    matrix_to_tensor::<B>(&values, n, latent_dim, device)
                }
                LatentInit::Encoded => model.encode(images.clone(), Phase::Evaluating)?,
            };

            let result = inversion.invert(model, images, initial)?;
            if result.diverged {
                tracing::warn!(batch = index, "Latent inversion diverged; keeping its values");
                out.diverged_batches.push(index);
            }
            tracing::debug!(batch = index, size = n, secs = result.elapsed_secs, "Inverted test batch");

            out.reconstruction_errors.extend(result.reconstruction_errors);
            out.scores.extend(result.scores);
            out.latents.extend(result.latents);
            out.labels.extend(batch.labels);
            out.batch_sizes.push(n);
            out.inference_secs.push(result.elapsed_secs);
            if out.first_reconstruction.is_none() {
                out.first_reconstruction = Some(result.reconstruction);
            }
            index += 1;
        }

        tracing::info!(
            samples = out.len(),
            batches = out.batch_sizes.len(),
            diverged = out.diverged_batches.len(),
            mean_inference_secs = format!("{:.4}", out.mean_inference_secs()),
            "Evaluation finished"
        );
        Ok(out)
    }

    /// [`run`](Self::run), then hand scores and labels to `reporter` once.
    #[allow(clippy::too_many_arguments)]
    pub fn evaluate<B, M, R>(
        &self,
        model: &M,
        data: &mut dyn DataSource,
        rng: &mut R,
        device: &B::Device,
        reporter: &mut dyn ResultReporter,
        context: &ReportContext,
    ) -> anyhow::Result<EvaluationOutput>
    where
        B: AutodiffBackend,
        M: AdversarialModel<B>,
        R: Rng + ?Sized,
    {
        let output = self.run(model, data, rng, device)?;
        let report = EvaluationReport {
            output_dir: self.config.result_dir.clone(),
            scores: output.scores.clone(),
            labels: output.labels.clone(),
            model_name: context.model_name.clone(),
            dataset_name: self.config.dataset_name.clone(),
            loss_name: self.config.loss_name.clone(),
            weight: self.config.weight,
            anomalous_label: self.config.anomalous_label,
            seed: context.seed,
            epoch: context.epoch,
        };
        reporter.save_results(&report)?;
        Ok(output)
    }
}
