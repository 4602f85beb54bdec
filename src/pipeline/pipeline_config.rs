use std::time::Duration;

use crate::error::ConfigurationError;

/// Queue capacity used when the caller has no preference.
pub const DEFAULT_QUEUE_CAPACITY: usize = 50;

/// How long a producer sleeps after finding the queue full.
pub const PRODUCER_BACKOFF: Duration = Duration::from_millis(50);

/// Parameters of a single `PrefetchPipeline`. Immutable once built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    queue_capacity: usize,
    producer_count: usize,
    target_item_count: usize,
}

impl PipelineConfig {
    pub fn new(
        target_item_count: usize,
        producer_count: usize,
        queue_capacity: usize,
    ) -> Result<PipelineConfig, ConfigurationError> {
        if producer_count < 1 {
            return Err(ConfigurationError::ProducerCount(producer_count as i64));
        }
        if queue_capacity < 1 {
            return Err(ConfigurationError::QueueCapacity(queue_capacity as i64));
        }
        Ok(PipelineConfig { queue_capacity, producer_count, target_item_count })
    }

    /// Same as `new`, for callers holding signed values (e.g. parsed from a
    /// config file) that may be negative.
    pub fn from_signed(
        target_item_count: i64,
        producer_count: i64,
        queue_capacity: i64,
    ) -> Result<PipelineConfig, ConfigurationError> {
        if producer_count < 1 {
            return Err(ConfigurationError::ProducerCount(producer_count));
        }
        if target_item_count < 0 {
            return Err(ConfigurationError::NegativeTarget(target_item_count));
        }
        if queue_capacity < 1 {
            return Err(ConfigurationError::QueueCapacity(queue_capacity));
        }
        PipelineConfig::new(target_item_count as usize, producer_count as usize, queue_capacity as usize)
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    pub fn producer_count(&self) -> usize {
        self.producer_count
    }

    pub fn target_item_count(&self) -> usize {
        self.target_item_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_producers_rejected() {
        assert_eq!(PipelineConfig::new(10, 0, 50), Err(ConfigurationError::ProducerCount(0)));
    }

    #[test]
    fn zero_capacity_rejected() {
        assert_eq!(PipelineConfig::new(10, 1, 0), Err(ConfigurationError::QueueCapacity(0)));
    }

    #[test]
    fn negative_target_rejected() {
        assert_eq!(PipelineConfig::from_signed(-1, 2, 50), Err(ConfigurationError::NegativeTarget(-1)));
    }

    #[test]
    fn negative_producers_rejected_before_target() {
        assert_eq!(PipelineConfig::from_signed(-1, -3, 50), Err(ConfigurationError::ProducerCount(-3)));
    }

    #[test]
    fn zero_target_is_valid() {
        let config = PipelineConfig::from_signed(0, 1, 1).unwrap();
        assert_eq!(config.target_item_count(), 0);
    }
}
