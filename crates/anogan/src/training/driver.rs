//! Epoch loop: steps, mean losses, samples, checkpoints, log lines and
//! periodic evaluation.
//!
//! Schedule: `num_epochs` adversarial epochs, then (f-AnoGAN only)
//! `encoder_epochs` encoder epochs. The epoch counter lives here and is the
//! only state that advances between epochs.

use std::marker::PhantomData;
use std::time::Instant;

use burn::tensor::backend::AutodiffBackend;
use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::error::{ConfigError, TrainError};
use crate::evaluation::{EvaluationOutput, EvaluationProtocol, LatentInit, ReportContext, ResultReporter};
use crate::model::bridge::{matrix_to_tensor, tensor_to_images};
use crate::model::{AdversarialModel, CheckpointMeta, Phase};
use crate::training::config::{EvaluationConfig, TrainerConfig};
use crate::training::data::DataSource;
use crate::training::labels::LabelPolicy;
use crate::training::metrics::{EpochPhase, EpochStats, LossAverager, MetricsHistory};
use crate::training::noise::NoiseScheduler;
use crate::training::step::{AdversarialStepExecutor, StepIndex};
use crate::training::summary::{Summarizer, Summary};

/// Outcome of a [`EpochDriver::train`] call.
#[derive(Debug)]
pub struct TrainSummary {
    pub start_epoch: usize,
    /// Epoch counter after the run (number of completed epochs).
    pub end_epoch: usize,
    pub history: MetricsHistory,
    pub evaluations: usize,
    pub last_evaluation: Option<EvaluationOutput>,
    pub elapsed_secs: f64,
}

/// Owns the model, the run's random stream and the epoch counter.
pub struct EpochDriver<B: AutodiffBackend, M: AdversarialModel<B>> {
    model: M,
    trainer: TrainerConfig,
    executor: AdversarialStepExecutor,
    protocol: EvaluationProtocol,
    device: B::Device,
    rng: StdRng,
    /// Row-major `num_example_imgs × latent_dim`, fixed for the whole run.
    sample_latent: Vec<f32>,
    epoch: usize,
    _backend: PhantomData<B>,
}

/// Training stream seed for a run (re)starting at `start_epoch`.
pub fn stream_seed(seed: u64, start_epoch: usize) -> u64 {
    seed.wrapping_add(1).wrapping_add(start_epoch as u64)
}

impl<B: AutodiffBackend, M: AdversarialModel<B>> EpochDriver<B, M> {
    /// Validate the configuration against the model and set up the run at epoch 0.
    pub fn new(
        model: M,
        trainer: TrainerConfig,
        evaluation: EvaluationConfig,
        device: B::Device,
    ) -> Result<Self, TrainError> {
        trainer.validate()?;
        evaluation.validate()?;
        if trainer.variant.uses_encoder() && !model.has_encoder() {
            return Err(ConfigError::new("variant", "f-AnoGAN needs a model with an encoder").into());
        }

        let executor = AdversarialStepExecutor::new(
            LabelPolicy::new(trainer.soft_labels, trainer.noise_probability, trainer.flip_labels),
            trainer.include_noise,
        );
        let init = if trainer.variant.uses_encoder() {
            LatentInit::Encoded
        } else {
            LatentInit::Random
        };
        let sample_latent = NoiseScheduler.latent(
            &mut StdRng::seed_from_u64(trainer.seed),
            trainer.num_example_imgs,
            model.latent_dim(),
        );

        tracing::info!(
            variant = %trainer.variant,
            num_epochs = trainer.num_epochs,
            encoder_epochs = trainer.encoder_epochs,
            seed = trainer.seed,
            soft_labels = trainer.soft_labels,
            flip_labels = trainer.flip_labels,
            include_noise = trainer.include_noise,
            "Epoch driver ready"
        );

        Ok(Self {
            rng: StdRng::seed_from_u64(stream_seed(trainer.seed, 0)),
            model,
            executor,
            protocol: EvaluationProtocol::new(evaluation, init),
            trainer,
            device,
            sample_latent,
            epoch: 0,
            _backend: PhantomData,
        })
    }

    /// Restore model and epoch counter from `checkpoint_dir`, if a checkpoint exists.
    pub fn resume(mut self) -> anyhow::Result<Self> {
        let (model, meta) = self.model.load(&self.trainer.checkpoint_dir)?;
        self.model = model;
        match meta {
            Some(meta) => {
                if meta.seed != self.trainer.seed {
                    tracing::warn!(
                        checkpoint_seed = meta.seed,
                        config_seed = self.trainer.seed,
                        "Resuming a checkpoint written under a different seed"
                    );
                }
                self.epoch = meta.epoch;
                self.rng = StdRng::seed_from_u64(stream_seed(self.trainer.seed, meta.epoch));
                tracing::info!(start_epoch = self.epoch, "Resumed training from checkpoint");
            }
            None => tracing::info!(
                dir = %self.trainer.checkpoint_dir.display(),
                "No checkpoint found; starting from epoch 0"
            ),
        }
        Ok(self)
    }

    pub fn epoch(&self) -> usize {
        self.epoch
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn into_model(self) -> M {
        self.model
    }

    fn phase_of(&self, epoch: usize) -> EpochPhase {
        if epoch < self.trainer.num_epochs {
            EpochPhase::Adversarial
        } else {
            EpochPhase::Encoder
        }
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.trainer.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        pb
    }

    /// Run epochs until the configured budget is exhausted.
    ///
    /// Any step error aborts the run; epochs already completed stay
    /// checkpointed.
    pub fn train(
        &mut self,
        data: &mut dyn DataSource,
        summarizer: &mut dyn Summarizer,
        reporter: &mut dyn ResultReporter,
    ) -> Result<TrainSummary, TrainError> {
        let start_epoch = self.epoch;
        let total = self.trainer.total_epochs();
        let run_start = Instant::now();
        let mut history = MetricsHistory::new();
        let mut evaluations = 0;
        let mut last_evaluation = None;

        if start_epoch >= total {
            tracing::info!(start_epoch, total, "Epoch budget already spent; nothing to train");
        }
        let pb = self.progress_bar(total.saturating_sub(start_epoch));

        while self.epoch < total {
            let epoch = self.epoch;
            let stats = self.run_epoch(epoch, data, summarizer)?;
            pb.set_message(stats.display_losses());

            self.record_samples(epoch, summarizer)?;

            self.model
                .save(&self.trainer.checkpoint_dir, &CheckpointMeta { epoch: epoch + 1, seed: self.trainer.seed })
                .map_err(TrainError::Model)?;

            if epoch % self.trainer.show_steps == 0 || epoch == 1 {
                let total_secs = run_start.elapsed().as_secs_f64();
                let line = format!(
                    "Epoch {epoch} ({}): time {:.1}s (total {total_secs:.1}s), {}",
                    stats.phase,
                    stats.elapsed_secs,
                    stats.display_losses()
                );
                tracing::info!(
                    epoch,
                    phase = %stats.phase,
                    epoch_secs = format!("{:.1}", stats.elapsed_secs),
                    total_secs = format!("{total_secs:.1}"),
                    "{}",
                    stats.display_losses()
                );
                summarizer.log(&line);
            }
            for warning in stats.health_check() {
                tracing::warn!(epoch, "{warning}");
            }
            history.push(stats);

            if self.trainer.frequency_test > 0 && (epoch + 1) % self.trainer.frequency_test == 0 {
                let output = self.evaluate(epoch + 1, data, reporter).map_err(TrainError::Evaluation)?;
                self.record_evaluation(epoch, &output, summarizer);
                evaluations += 1;
                last_evaluation = Some(output);
            }

            self.epoch += 1;
            pb.inc(1);
        }
        pb.finish_and_clear();

        let elapsed_secs = run_start.elapsed().as_secs_f64();
        tracing::info!(
            start_epoch,
            end_epoch = self.epoch,
            evaluations,
            elapsed_secs = format!("{elapsed_secs:.1}"),
            "Training finished"
        );
        Ok(TrainSummary {
            start_epoch,
            end_epoch: self.epoch,
            history,
            evaluations,
            last_evaluation,
            elapsed_secs,
        })
    }

    /// Run the evaluation protocol once against the current model.
    pub fn test(
        &mut self,
        data: &mut dyn DataSource,
        reporter: &mut dyn ResultReporter,
    ) -> anyhow::Result<EvaluationOutput> {
        let epoch = self.epoch;
        self.evaluate(epoch, data, reporter)
    }

    fn evaluate(
        &mut self,
        epoch: usize,
        data: &mut dyn DataSource,
        reporter: &mut dyn ResultReporter,
    ) -> anyhow::Result<EvaluationOutput> {
        let context = ReportContext {
            model_name: self.trainer.variant.model_name().to_string(),
            seed: self.trainer.seed,
            epoch,
        };
        self.protocol
            .evaluate(&self.model, data, &mut self.rng, &self.device, reporter, &context)
    }

    fn run_epoch(
        &mut self,
        epoch: usize,
        data: &mut dyn DataSource,
        summarizer: &mut dyn Summarizer,
    ) -> Result<EpochStats, TrainError> {
        let epoch_start = Instant::now();
        let phase = self.phase_of(epoch);
        data.reset_train();
        let steps = self
            .trainer
            .num_iter_per_epoch
            .unwrap_or_else(|| data.train_batches_per_epoch());
        if steps == 0 {
            return Err(ConfigError::new("num_iter_per_epoch", "training data yields no full batch").into());
        }

        let mut disc = LossAverager::default();
        let mut gen = LossAverager::default();
        let mut enc = LossAverager::default();

        for step in 0..steps {
            let batch = data
                .next_train_batch()
                .ok_or(TrainError::DataExhausted { epoch, step, expected: steps })?;
            let at = StepIndex { epoch, step };
            let global_step = epoch * steps + step;

            match phase {
                EpochPhase::Adversarial => {
                    let out = self
                        .executor
                        .gan_step(&mut self.model, &batch, at, &mut self.rng, &self.device)?;
                    disc.push(out.disc_loss);
                    gen.push(out.gen_loss);
                    if self.trainer.enable_summary {
                        summarizer.record(global_step, &out.summaries());
                    }
                }
                EpochPhase::Encoder => {
                    let loss = self
                        .executor
                        .encoder_step(&mut self.model, &batch, at, &mut self.rng, &self.device)?;
                    enc.push(loss);
                    if self.trainer.enable_summary {
                        summarizer.record(global_step, &[Summary::scalar("encoder_loss", loss)]);
                    }
                }
            }
        }

        Ok(EpochStats {
            epoch,
            phase,
            steps,
            gen_loss: gen.mean(),
            disc_loss: disc.mean(),
            enc_loss: enc.mean(),
            elapsed_secs: epoch_start.elapsed().as_secs_f64(),
        })
    }

    /// Generate images from the fixed latent on the `sample_every` stride.
    fn record_samples(&self, epoch: usize, summarizer: &mut dyn Summarizer) -> Result<(), TrainError> {
        let every = self.trainer.sample_every;
        if every == 0 || epoch % every != 0 {
            return Ok(());
        }
        let n = self.trainer.num_example_imgs;
        let latent = matrix_to_tensor::<B>(&self.sample_latent, n, self.model.latent_dim(), &self.device);
        let images = tensor_to_images(self.model.generate(latent, Phase::Idle)).map_err(TrainError::Model)?;
        summarizer.record(epoch, &[Summary::images("samples", images)]);
        Ok(())
    }

    fn record_evaluation(&self, epoch: usize, output: &EvaluationOutput, summarizer: &mut dyn Summarizer) {
        if output.is_empty() {
            return;
        }
        let mean_score = output.scores.iter().sum::<f64>() / output.len() as f64;
        let mean_residual = output.reconstruction_errors.iter().sum::<f64>() / output.len() as f64;
        let mut summaries = vec![
            Summary::scalar("test_mean_score", mean_score),
            Summary::scalar("test_mean_reconstruction_error", mean_residual),
            Summary::scalar("test_mean_inference_secs", output.mean_inference_secs()),
        ];
        if let Some(reconstruction) = &output.first_reconstruction {
            summaries.push(Summary::images("test_reconstructions", reconstruction.clone()));
        }
        summarizer.record(epoch, &summaries);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation::RecordingReporter;
    use crate::mocks::{MockModel, ScriptedData};
    use crate::model::ParamGroup;
    use crate::training::config::ModelVariant;
    use crate::training::data::ImageDims;
    use crate::training::summary::RecordingSummarizer;
    use burn::backend::ndarray::NdArray;
    use burn::backend::Autodiff;
    use tempfile::TempDir;

    type TestAutodiffBackend = Autodiff<NdArray<f32>>;

    fn dims() -> ImageDims {
        ImageDims::new(1, 2, 2)
    }

    fn trainer(dir: &TempDir) -> TrainerConfig {
        TrainerConfig {
            num_epochs: 3,
            soft_labels: false,
            include_noise: false,
            show_progress: false,
            num_example_imgs: 4,
            frequency_test: 0,
            checkpoint_dir: dir.path().join("ckpt"),
            ..Default::default()
        }
    }

    fn evaluation(dir: &TempDir) -> EvaluationConfig {
        EvaluationConfig { steps_number: 1, result_dir: dir.path().join("results"), ..Default::default() }
    }

    fn driver(
        trainer: TrainerConfig,
        evaluation: EvaluationConfig,
        with_encoder: bool,
    ) -> EpochDriver<TestAutodiffBackend, MockModel<TestAutodiffBackend>> {
        let device = Default::default();
        let model = MockModel::new(2, dims(), with_encoder, &device);
        EpochDriver::new(model, trainer, evaluation, device).unwrap()
    }

    #[test]
    fn test_stream_seed_depends_on_start_epoch() {
        assert_ne!(stream_seed(42, 0), stream_seed(42, 3));
        assert_eq!(stream_seed(u64::MAX, 0), 0);
    }

    #[test]
    fn test_runs_budget_with_checkpoint_every_epoch() {
        let tmp = TempDir::new().unwrap();
        let mut driver = driver(trainer(&tmp), evaluation(&tmp), false);
        let mut data = ScriptedData::uniform(dims(), 2, 4, &[]);
        let mut summarizer = RecordingSummarizer::default();
        let mut reporter = RecordingReporter::default();

        let summary = driver.train(&mut data, &mut summarizer, &mut reporter).unwrap();
        assert_eq!((summary.start_epoch, summary.end_epoch), (0, 3));
        assert_eq!(summary.history.len(), 3);
        assert_eq!(data.train_resets, 3);

        let model = driver.model();
        let saved: Vec<usize> = model.saves().iter().map(|m| m.epoch).collect();
        assert_eq!(saved, vec![1, 2, 3]);
        // Two steps per epoch, each a D then a G update.
        assert_eq!(model.updates().len(), 3 * 2 * 2);
        assert!(reporter.reports.is_empty(), "evaluation disabled");
    }

    #[test]
    fn test_mean_losses_and_step_summaries() {
        let tmp = TempDir::new().unwrap();
        let mut cfg = trainer(&tmp);
        cfg.num_epochs = 1;
        let mut driver = driver(cfg, evaluation(&tmp), false);
        let mut data = ScriptedData::uniform(dims(), 3, 2, &[]);
        let mut summarizer = RecordingSummarizer::default();

        let summary = driver
            .train(&mut data, &mut summarizer, &mut RecordingReporter::default())
            .unwrap();
        let disc: Vec<f64> = summarizer
            .named("discriminator_loss")
            .iter()
            .map(|(_, s)| match s {
                Summary::Scalar { value, .. } => *value,
                Summary::Images { .. } => unreachable!(),
            })
            .collect();
        assert_eq!(disc.len(), 3);
        let mean = disc.iter().sum::<f64>() / 3.0;
        let stats = summary.history.last().unwrap();
        assert!((stats.disc_loss.unwrap() - mean).abs() < 1e-9);
        assert!(stats.enc_loss.is_none());

        // Sampling stride 1: one image summary from the fixed latent.
        assert_eq!(summarizer.named("samples").len(), 1);
        assert_eq!(summarizer.lines.len(), 1, "epoch 0 is logged");
    }

    #[test]
    fn test_data_exhaustion_is_fatal() {
        let tmp = TempDir::new().unwrap();
        let mut cfg = trainer(&tmp);
        cfg.num_iter_per_epoch = Some(5);
        let mut driver = driver(cfg, evaluation(&tmp), false);
        let mut data = ScriptedData::uniform(dims(), 2, 2, &[]);

        let err = driver
            .train(&mut data, &mut RecordingSummarizer::default(), &mut RecordingReporter::default())
            .unwrap_err();
        match err {
            TrainError::DataExhausted { epoch, step, expected } => assert_eq!((epoch, step, expected), (0, 2, 5)),
            other => panic!("unexpected error: {other}"),
        }
        assert!(driver.model().saves().is_empty(), "no checkpoint for an aborted epoch");
    }

    #[test]
    fn test_evaluation_stride_reports_once_per_cycle() {
        let tmp = TempDir::new().unwrap();
        let mut cfg = trainer(&tmp);
        cfg.num_epochs = 4;
        cfg.frequency_test = 2;
        let mut driver = driver(cfg, evaluation(&tmp), false);
        let mut data = ScriptedData::uniform(dims(), 1, 2, &[2, 1]);
        let mut reporter = RecordingReporter::default();

        let summary = driver
            .train(&mut data, &mut RecordingSummarizer::default(), &mut reporter)
            .unwrap();
        assert_eq!(summary.evaluations, 2);
        let epochs: Vec<usize> = reporter.reports.iter().map(|r| r.epoch).collect();
        assert_eq!(epochs, vec![2, 4]);
        assert_eq!(reporter.reports[0].scores.len(), 3);
        assert_eq!(reporter.reports[0].model_name, "anogan");
    }

    #[test]
    fn test_training_and_test_reports_use_checkpoint_epoch() {
        let tmp = TempDir::new().unwrap();
        let mut cfg = trainer(&tmp);
        cfg.num_epochs = 2;
        cfg.frequency_test = 2;
        let mut driver = driver(cfg, evaluation(&tmp), false);
        let mut data = ScriptedData::uniform(dims(), 1, 2, &[2]);
        let mut reporter = RecordingReporter::default();
        driver
            .train(&mut data, &mut RecordingSummarizer::default(), &mut reporter)
            .unwrap();
        driver.test(&mut data, &mut reporter).unwrap();

        let last_saved = driver.model().saves().last().map(|m| m.epoch);
        let epochs: Vec<usize> = reporter.reports.iter().map(|r| r.epoch).collect();
        assert_eq!(last_saved, Some(2));
        assert_eq!(epochs, vec![2, 2]);
    }

    #[test]
    fn test_log_line_reports_epoch_wall_time() {
        let tmp = TempDir::new().unwrap();
        let mut cfg = trainer(&tmp);
        cfg.num_epochs = 2;
        let mut driver = driver(cfg, evaluation(&tmp), false);
        let mut data = ScriptedData::uniform(dims(), 1, 2, &[]);
        let mut summarizer = RecordingSummarizer::default();
        let summary = driver
            .train(&mut data, &mut summarizer, &mut RecordingReporter::default())
            .unwrap();

        assert_eq!(summarizer.lines.len(), 2);
        for (line, stats) in summarizer.lines.iter().zip(&summary.history.epochs) {
            let expected = format!("Epoch {} (adversarial): time {:.1}s (total ", stats.epoch, stats.elapsed_secs);
            assert!(line.starts_with(&expected), "{line:?} should start with {expected:?}");
        }
    }

    #[test]
    fn test_fanogan_schedule_runs_encoder_phase_last() {
        let tmp = TempDir::new().unwrap();
        let mut cfg = trainer(&tmp);
        cfg.variant = ModelVariant::FAnoGan;
        cfg.num_epochs = 1;
        cfg.encoder_epochs = 2;
        let mut driver = driver(cfg, evaluation(&tmp), true);
        let mut data = ScriptedData::uniform(dims(), 1, 2, &[]);

        let summary = driver
            .train(&mut data, &mut RecordingSummarizer::default(), &mut RecordingReporter::default())
            .unwrap();
        let phases: Vec<EpochPhase> = summary.history.epochs.iter().map(|s| s.phase).collect();
        assert_eq!(phases, vec![EpochPhase::Adversarial, EpochPhase::Encoder, EpochPhase::Encoder]);
        assert_eq!(
            driver.model().updates(),
            vec![ParamGroup::Discriminator, ParamGroup::Generator, ParamGroup::Encoder, ParamGroup::Encoder]
        );
    }

    #[test]
    fn test_fanogan_requires_encoder() {
        let tmp = TempDir::new().unwrap();
        let cfg = TrainerConfig { variant: ModelVariant::FAnoGan, encoder_epochs: 1, ..trainer(&tmp) };
        let device = Default::default();
        let model = MockModel::<TestAutodiffBackend>::new(2, dims(), false, &device);
        let result = EpochDriver::new(model, cfg, evaluation(&tmp), device);
        assert!(matches!(result, Err(TrainError::Config(e)) if e.field == "variant"));
    }

    #[test]
    fn test_resume_continues_epoch_counter() {
        let tmp = TempDir::new().unwrap();
        let mut cfg = trainer(&tmp);
        cfg.num_epochs = 2;
        let mut first = driver(cfg.clone(), evaluation(&tmp), false);
        let mut data = ScriptedData::uniform(dims(), 1, 2, &[]);
        first
            .train(&mut data, &mut RecordingSummarizer::default(), &mut RecordingReporter::default())
            .unwrap();

        cfg.num_epochs = 5;
        let mut resumed = driver(cfg, evaluation(&tmp), false).resume().unwrap();
        assert_eq!(resumed.epoch(), 2);
        let summary = resumed
            .train(&mut data, &mut RecordingSummarizer::default(), &mut RecordingReporter::default())
            .unwrap();
        assert_eq!((summary.start_epoch, summary.end_epoch), (2, 5));
        let saved: Vec<usize> = resumed.model().saves().iter().map(|m| m.epoch).collect();
        assert_eq!(saved, vec![3, 4, 5]);
    }
}
