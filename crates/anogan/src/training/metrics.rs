//! Per-epoch loss statistics with health checks.

use std::fmt;

use serde::Serialize;

/// Discriminator loss below this is treated as a collapsed game.
pub const DISC_COLLAPSE_THRESHOLD: f64 = 1e-3;
/// Generator loss above this is treated as exploding.
pub const GEN_EXPLOSION_THRESHOLD: f64 = 50.0;

/// Which schedule phase an epoch belonged to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EpochPhase {
    Adversarial,
    Encoder,
}

impl fmt::Display for EpochPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Adversarial => write!(f, "adversarial"),
            Self::Encoder => write!(f, "encoder"),
        }
    }
}

/// Mean losses of one completed epoch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpochStats {
    pub epoch: usize,
    pub phase: EpochPhase,
    pub steps: usize,
    /// `None` in encoder epochs.
    pub gen_loss: Option<f64>,
    pub disc_loss: Option<f64>,
    /// `None` in adversarial epochs.
    pub enc_loss: Option<f64>,
    pub elapsed_secs: f64,
}

impl EpochStats {
    /// Warnings for a degenerate adversarial game. Empty when healthy.
    pub fn health_check(&self) -> Vec<String> {
        let mut warnings = Vec::new();
        if let Some(d) = self.disc_loss {
            if d < DISC_COLLAPSE_THRESHOLD {
                warnings.push(format!(
                    "discriminator loss {d:.2e} near zero: discriminator is winning outright"
                ));
            }
        }
        if let Some(g) = self.gen_loss {
            if g > GEN_EXPLOSION_THRESHOLD {
                warnings.push(format!("generator loss {g:.2} exceeds {GEN_EXPLOSION_THRESHOLD}"));
            }
        }
        warnings
    }

    /// Compact loss display for log lines.
    pub fn display_losses(&self) -> String {
        let mut parts = Vec::new();
        if let Some(d) = self.disc_loss {
            parts.push(format!("d_loss={d:.4}"));
        }
        if let Some(g) = self.gen_loss {
            parts.push(format!("g_loss={g:.4}"));
        }
        if let Some(e) = self.enc_loss {
            parts.push(format!("e_loss={e:.4}"));
        }
        parts.join(" ")
    }
}

/// Running arithmetic mean of one loss.
#[derive(Debug, Clone, Copy, Default)]
pub struct LossAverager {
    sum: f64,
    count: usize,
}

impl LossAverager {
    pub fn push(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// `None` before the first value.
    pub fn mean(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

/// Every epoch's stats, in order.
#[derive(Debug, Default, Serialize)]
pub struct MetricsHistory {
    pub epochs: Vec<EpochStats>,
}

impl MetricsHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, stats: EpochStats) {
        self.epochs.push(stats);
    }

    pub fn last(&self) -> Option<&EpochStats> {
        self.epochs.last()
    }

    pub fn len(&self) -> usize {
        self.epochs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epochs.is_empty()
    }

    /// Lowest mean discriminator loss seen, with its epoch.
    pub fn best_disc_loss(&self) -> Option<(usize, f64)> {
        self.epochs
            .iter()
            .filter_map(|s| s.disc_loss.map(|d| (s.epoch, d)))
            .min_by(|a, b| a.1.total_cmp(&b.1))
    }
}
