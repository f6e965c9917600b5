//! Result reporting: the [`ResultReporter`] interface and its Parquet/JSON
//! implementation.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use records::{compute_metrics, AnomalyMetrics, ScoreWriter};

/// Everything handed to a reporter after one evaluation.
#[derive(Debug, Clone)]
pub struct EvaluationReport {
    pub output_dir: PathBuf,
    /// Anomaly scores, aligned with `labels`.
    pub scores: Vec<f64>,
    pub labels: Vec<i64>,
    pub model_name: String,
    pub dataset_name: String,
    pub loss_name: String,
    pub weight: f64,
    pub anomalous_label: i64,
    pub seed: u64,
    /// Completed epochs of the evaluated model, as in its checkpoint.
    pub epoch: usize,
}

impl EvaluationReport {
    /// `<model>_<dataset>_<loss>_w<weight>_seed<seed>` under `output_dir`.
    pub fn run_dir(&self) -> PathBuf {
        self.output_dir.join(format!(
            "{}_{}_{}_w{}_seed{}",
            self.model_name, self.dataset_name, self.loss_name, self.weight, self.seed
        ))
    }

    pub fn anomalous_flags(&self) -> Vec<bool> {
        self.labels.iter().map(|&l| l == self.anomalous_label).collect()
    }
}

/// Receives evaluation results; called at most once per evaluation.
pub trait ResultReporter {
    fn save_results(&mut self, report: &EvaluationReport) -> anyhow::Result<()>;
}

/// One `metrics.json` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsEntry {
    pub epoch: usize,
    pub model_name: String,
    pub dataset_name: String,
    pub loss_name: String,
    pub weight: f64,
    pub seed: u64,
    pub anomalous_label: i64,
    pub total: usize,
    pub anomalous_count: usize,
    /// Samples whose score is NaN or infinite (diverged inversions).
    #[serde(default)]
    pub non_finite_count: usize,
    /// Mean over the finite scores; `None` when there are none.
    pub mean_score: Option<f64>,
    /// Over the finite scores only. `None` when those hold a single class.
    pub metrics: Option<AnomalyMetrics>,
}

impl MetricsEntry {
    pub fn from_report(report: &EvaluationReport) -> Self {
        let flags = report.anomalous_flags();
        let (finite_scores, finite_flags): (Vec<f64>, Vec<bool>) = report
            .scores
            .iter()
            .zip(&flags)
            .filter(|(score, _)| score.is_finite())
            .map(|(&score, &flag)| (score, flag))
            .unzip();
        let mean_score =
            (!finite_scores.is_empty()).then(|| finite_scores.iter().sum::<f64>() / finite_scores.len() as f64);
        Self {
            epoch: report.epoch,
            model_name: report.model_name.clone(),
            dataset_name: report.dataset_name.clone(),
            loss_name: report.loss_name.clone(),
            weight: report.weight,
            seed: report.seed,
            anomalous_label: report.anomalous_label,
            total: report.scores.len(),
            anomalous_count: flags.iter().filter(|&&a| a).count(),
            non_finite_count: report.scores.len() - finite_scores.len(),
            mean_score,
            metrics: compute_metrics(&finite_scores, &finite_flags),
        }
    }
}

/// Writes `scores.parquet` (latest evaluation) and appends to `metrics.json`
/// in the report's run directory.
#[derive(Debug, Default)]
pub struct ParquetReporter;

impl ParquetReporter {
    pub fn new() -> Self {
        Self
    }

    /// Read the `metrics.json` history of a run directory (empty if absent).
    pub fn read_history(run_dir: &Path) -> anyhow::Result<Vec<MetricsEntry>> {
        let path = run_dir.join("metrics.json");
        if !path.exists() {
            return Ok(Vec::new());
        }
        let contents = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Failed to read {}: {e}", path.display()))?;
        serde_json::from_str(&contents).map_err(|e| anyhow::anyhow!("Failed to parse {}: {e}", path.display()))
    }
}

impl ResultReporter for ParquetReporter {
    fn save_results(&mut self, report: &EvaluationReport) -> anyhow::Result<()> {
        let run_dir = report.run_dir();
        std::fs::create_dir_all(&run_dir)?;

        let mut writer = ScoreWriter::new(run_dir.join("scores.parquet"));
        writer.record_all(ScoreWriter::from_scores(&report.scores, &report.labels, report.anomalous_label)?);
        writer.finish()?;

        let entry = MetricsEntry::from_report(report);
        let mut history = Self::read_history(&run_dir)?;
        history.push(entry.clone());
        std::fs::write(run_dir.join("metrics.json"), serde_json::to_string_pretty(&history)?)?;

        if entry.non_finite_count > 0 {
            tracing::warn!(
                epoch = entry.epoch,
                non_finite = entry.non_finite_count,
                "Non-finite scores kept in scores.parquet and left out of the metrics"
            );
        }
        match &entry.metrics {
            Some(m) => tracing::info!(
                epoch = entry.epoch,
                roc_auc = format!("{:.4}", m.roc_auc),
                average_precision = format!("{:.4}", m.average_precision),
                best_f1 = format!("{:.4}", m.best_f1),
                "Evaluation results saved to {}",
                run_dir.display()
            ),
            None => tracing::warn!(
                epoch = entry.epoch,
                total = entry.total,
                "Finite scores hold a single class; metrics undefined. Scores saved to {}",
                run_dir.display()
            ),
        }
        Ok(())
    }
}

/// Keeps every report in memory.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    pub reports: Vec<EvaluationReport>,
}

impl ResultReporter for RecordingReporter {
    fn save_results(&mut self, report: &EvaluationReport) -> anyhow::Result<()> {
        self.reports.push(report.clone());
        Ok(())
    }
}
