pub mod config;
pub mod data;
pub mod display;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod train;

// Convenience re-exports
pub use config::{DataPaths, RunConfig};
pub use data::{Batch, BatchSource, ImageFolderSource, InMemorySource};
pub use display::{HttpMonitor, LogDisplay, MetricsDisplay, NoDisplay};
pub use error::{ConfigurationError, SourceError, StepError, TrainError};
pub use model::{Classifier, ClassifierSpec};
pub use pipeline::{PrefetchPipeline, StopReason};
pub use train::{EpochController, MetricsLog, RunState, RunSummary, TrainConfig, TrainingMode};
