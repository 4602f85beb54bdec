//! Error types for the training pipeline.
//!
//! Three failure classes exist at the library boundary: bad parameters
//! (`ConfigurationError`), a failing batch source (`SourceError`) and a
//! failing train/validate step (`StepError`). `TrainError` wraps all of them
//! for callers that drive a whole run.

use std::path::PathBuf;

use thiserror::Error;

/// Invalid pipeline or run parameters. Raised before any thread starts.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    /// Fewer than one producer requested.
    #[error("producer_count must be at least 1 (got {0})")]
    ProducerCount(i64),

    /// Negative target item count.
    #[error("target_item_count must not be negative (got {0})")]
    NegativeTarget(i64),

    /// Queue with no room for a single batch.
    #[error("queue_capacity must be at least 1 (got {0})")]
    QueueCapacity(i64),

    /// Any other out-of-range setting.
    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigurationError {
    /// Creates an `Invalid` error for the named field.
    #[must_use]
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid { field, reason: reason.into() }
    }
}

/// Failure inside a batch source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode image {path}: {reason}")]
    Decode { path: PathBuf, reason: String },

    #[error("source has no items: {0}")]
    Empty(String),

    #[error("batch source failed: {0}")]
    Other(String),
}

impl SourceError {
    /// Creates an I/O error tied to a path.
    #[must_use]
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    #[must_use]
    pub fn other(reason: impl Into<String>) -> Self {
        Self::Other(reason.into())
    }
}

/// Failure inside a train or validate step.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StepError {
    #[error("batch shape mismatch: expected {expected} values per item, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("step requires labels but the batch has none")]
    MissingLabels,

    #[error("step produced a non-finite {0}")]
    NonFinite(&'static str),

    #[error("step failed: {0}")]
    Other(String),
}

impl StepError {
    #[must_use]
    pub fn other(reason: impl Into<String>) -> Self {
        Self::Other(reason.into())
    }
}

/// Any error that ends a training run.
#[derive(Debug, Error)]
pub enum TrainError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigurationError),

    #[error("source error: {0}")]
    Source(#[from] SourceError),

    #[error("step error: {0}")]
    Step(#[from] StepError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for whole-run operations.
pub type Result<T> = std::result::Result<T, TrainError>;
