//! Data types for image dataset rows, per-sample anomaly scores, and their summaries.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Which part of a dataset a row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Test,
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Train => write!(f, "train"),
            Self::Test => write!(f, "test"),
        }
    }
}

impl Split {
    /// Parse from the on-disk string form. Returns `None` for unrecognized values.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "train" => Some(Self::Train),
            "test" => Some(Self::Test),
            _ => None,
        }
    }
}

/// One image of a dataset, stored channel-major (`channels × height × width`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRecord {
    /// Train or test split.
    pub split: Split,
    /// Integer class label. Test rows compare it against the anomalous label value.
    pub label: i64,
    pub channels: u32,
    pub height: u32,
    pub width: u32,
    /// Flattened pixel values, length `channels * height * width`.
    pub pixels: Vec<f32>,
}

impl ImageRecord {
    /// Number of values one image of this shape holds.
    pub fn numel(&self) -> usize {
        self.channels as usize * self.height as usize * self.width as usize
    }
}

/// Anomaly score of one test sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    /// Position of the sample in the evaluation order.
    pub index: u64,
    /// Anomaly score (higher = more anomalous).
    pub score: f64,
    /// Ground-truth label of the sample.
    pub label: i64,
    /// Whether `label` equals the anomalous label value of the run.
    pub is_anomalous: bool,
}

/// Threshold-free and best-threshold detection quality of a score set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnomalyMetrics {
    /// Area under the ROC curve.
    pub roc_auc: f64,
    /// Area under the precision-recall curve (step interpolation).
    pub average_precision: f64,
    /// Best F1 over all score thresholds.
    pub best_f1: f64,
    /// Score threshold (predict anomalous when `score >= threshold`) reaching `best_f1`.
    pub best_threshold: f64,
}

/// Summary statistics for a score Parquet file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoreSummary {
    pub total_records: usize,
    pub anomalous_count: usize,
    pub normal_count: usize,
    pub mean_score: f64,
    /// `None` when only one class is present.
    pub metrics: Option<AnomalyMetrics>,
}
