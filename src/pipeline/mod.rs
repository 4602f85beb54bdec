pub mod pipeline_config;
pub mod prefetch;
pub mod stop_signal;

pub use pipeline_config::{PipelineConfig, DEFAULT_QUEUE_CAPACITY, PRODUCER_BACKOFF};
pub use prefetch::{PipelineState, PrefetchPipeline, StopReason};
pub use stop_signal::StopSignal;
