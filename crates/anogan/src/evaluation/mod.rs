//! Test-time anomaly scoring by latent inversion, and result reporting.

pub mod inversion;
pub mod protocol;
pub mod report;

pub use inversion::{InversionResult, LatentCode, LatentInversion};
pub use protocol::{EvaluationOutput, EvaluationProtocol, LatentInit, ReportContext};
pub use report::{EvaluationReport, MetricsEntry, ParquetReporter, RecordingReporter, ResultReporter};
