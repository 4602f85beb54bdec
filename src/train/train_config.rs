use std::sync::mpsc;
use std::sync::{atomic::AtomicBool, Arc};

use serde::{Deserialize, Serialize};

use crate::display::DisplayWindows;
use crate::error::ConfigurationError;
use crate::pipeline::DEFAULT_QUEUE_CAPACITY;
use crate::train::epoch_stats::EpochStats;

/// Whether the early-stopping state is in play.
///
/// Pretraining runs the same loop over a different pair of directories but
/// never touches the best metric or patience, so it always runs to the epoch
/// limit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingMode {
    #[default]
    Normal,
    Pretraining,
}

/// Configuration for one `EpochController` run.
///
/// # Fields
/// - `epochs`         : upper bound on the number of epochs
/// - `patience`       : consecutive non-improving epochs tolerated
/// - `learning_rate`  : initial rate; decayed at 50% and 75% of `epochs`
/// - `producer_count` : prefetch threads per pipeline
/// - `queue_capacity` : batches buffered per pipeline
/// - `mode`           : normal training or pretraining
/// - `windows`        : window sizes passed to the metrics display
/// - `progress_tx`    : optional channel; one `EpochStats` is sent per
///                       completed epoch. A dropped receiver is ignored and
///                       does not end the run; stopping is `stop_flag`'s job.
/// - `stop_flag`      : optional atomic flag; when set from another thread
///                       the run ends after the current batch.
pub struct TrainConfig {
    pub epochs: usize,
    pub patience: usize,
    pub learning_rate: f64,
    pub producer_count: usize,
    pub queue_capacity: usize,
    pub mode: TrainingMode,
    pub windows: DisplayWindows,
    pub progress_tx: Option<mpsc::Sender<EpochStats>>,
    pub stop_flag: Option<Arc<AtomicBool>>,
}

impl TrainConfig {
    /// Creates a `TrainConfig` with one producer, the default queue, no
    /// progress channel and no stop flag.
    pub fn new(epochs: usize, patience: usize, learning_rate: f64) -> Self {
        TrainConfig {
            epochs,
            patience,
            learning_rate,
            producer_count: 1,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            mode: TrainingMode::Normal,
            windows: DisplayWindows::default(),
            progress_tx: None,
            stop_flag: None,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(ConfigurationError::invalid(
                "learning_rate",
                format!("must be a positive number (got {})", self.learning_rate),
            ));
        }
        if self.producer_count < 1 {
            return Err(ConfigurationError::ProducerCount(self.producer_count as i64));
        }
        if self.queue_capacity < 1 {
            return Err(ConfigurationError::QueueCapacity(self.queue_capacity as i64));
        }
        Ok(())
    }
}
