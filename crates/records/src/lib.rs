//! Parquet I/O for image datasets and anomaly-score results.
//!
//! Image datasets are stored one row per image with a train/test split and an
//! integer label. Evaluation runs write one row per test sample with its
//! anomaly score, which can be read back and summarized with detection metrics.

pub mod metrics;
pub mod reader;
pub mod types;
pub mod writer;

pub use metrics::compute_metrics;
pub use reader::{ImageReader, ScoreReader};
pub use types::{AnomalyMetrics, ImageRecord, ScoreRecord, ScoreSummary, Split};
pub use writer::{ImageWriter, ScoreWriter};
