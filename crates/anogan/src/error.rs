//! Error types for configuration and the training loop.

use crate::model::ParamGroup;

/// A hyperparameter rejected at startup.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("invalid `{field}`: {reason}")]
pub struct ConfigError {
    /// Name of the offending setting.
    pub field: &'static str,
    pub reason: String,
}

impl ConfigError {
    pub fn new(field: &'static str, reason: impl Into<String>) -> Self {
        Self { field, reason: reason.into() }
    }
}

/// Errors that abort a training run.
#[derive(Debug, thiserror::Error)]
pub enum TrainError {
    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    /// The training sequence ran dry before the epoch's step budget was spent.
    #[error("training data exhausted at epoch {epoch}, step {step} (epoch needs {expected} steps)")]
    DataExhausted {
        epoch: usize,
        step: usize,
        expected: usize,
    },
    /// A training loss came out NaN or infinite.
    #[error("non-finite {group} loss ({value}) at epoch {epoch}, step {step}")]
    NonFiniteLoss {
        group: ParamGroup,
        epoch: usize,
        step: usize,
        value: f64,
    },
    /// Forward pass, optimizer update or checkpoint I/O failed inside the model.
    #[error("model error: {0}")]
    Model(#[source] anyhow::Error),
    /// The evaluation protocol or the result reporter failed.
    #[error("evaluation error: {0}")]
    Evaluation(#[source] anyhow::Error),
}
