use serde::{Deserialize, Serialize};

/// Per-epoch summary emitted by `EpochController`.
///
/// When a `progress_tx` channel is configured in `TrainConfig`, the
/// controller sends one `EpochStats` value at the end of every completed
/// epoch. Receivers use it for progress indicators; the full series live in
/// `MetricsLog`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochStats {
    /// Zero-based epoch index.
    pub epoch: usize,
    /// Total epochs requested for this run.
    pub total_epochs: usize,
    /// Iteration count at the end of this epoch's training phase.
    pub iteration: usize,
    /// Loss of the last training batch of the epoch.
    pub last_train_loss: Option<f64>,
    /// Mean validation loss over every validation item examined.
    pub val_loss: f64,
    /// Fraction of validation items classified correctly.
    pub val_accuracy: f64,
    /// Learning rate used during this epoch.
    pub learning_rate: f64,
    /// Patience left after this epoch's early-stopping update.
    pub patience_remaining: usize,
    /// Whether this epoch set a new best validation loss.
    pub improved: bool,
    /// Wall-clock duration of the training phase in milliseconds.
    pub train_ms: u64,
    /// Wall-clock duration of the whole epoch in milliseconds.
    pub elapsed_ms: u64,
}
