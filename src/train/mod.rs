pub mod controller;
pub mod epoch_state;
pub mod epoch_stats;
pub mod metrics;
pub mod schedule;
pub mod step;
pub mod train_config;

pub use controller::{EpochController, RunState, RunSummary, ValidationTally};
pub use epoch_state::EpochState;
pub use epoch_stats::EpochStats;
pub use metrics::{MetricSeries, MetricsLog};
pub use schedule::DecaySchedule;
pub use step::{FnSteps, TrainOutcome, TrainStep, ValidateStep, ValidationOutcome};
pub use train_config::{TrainConfig, TrainingMode};
