use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread;

use tracing::{debug, warn};

use crate::data::batch::Batch;
use crate::data::source::BatchSource;
use crate::error::{ConfigurationError, SourceError};
use crate::pipeline::pipeline_config::{PipelineConfig, PRODUCER_BACKOFF};
use crate::pipeline::stop_signal::StopSignal;

type QueueItem = Result<Batch, SourceError>;

/// Why a pipeline stopped. Recorded once; later stop requests are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The consumer saw at least `target_item_count` items.
    TargetReached,
    /// The consumer cancelled (explicitly or by dropping the pipeline).
    Cancelled,
    /// The source failed; the error was handed to the consumer.
    SourceFailed,
}

/// Consumer-side bookkeeping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineState {
    pub items_consumed: usize,
    pub stop_reason: Option<StopReason>,
}

impl PipelineState {
    pub fn stopped(&self) -> bool {
        self.stop_reason.is_some()
    }
}

/// Background prefetch over a `BatchSource`.
///
/// `producer_count` detached threads pull batches from the shared source and
/// push them into a bounded queue; the thread iterating the pipeline is the
/// single consumer. Iteration ends as soon as the running item count reaches
/// `target_item_count`, at which point producers are told to stop and any
/// batches still in flight are discarded.
///
/// With more than one producer the delivery order is whatever order the
/// producers managed to enqueue in. Use a single producer when order matters.
///
/// A pipeline is single use: once it has ended it yields `None` forever.
/// Dropping it cancels the producers.
pub struct PrefetchPipeline {
    config: PipelineConfig,
    queue: Receiver<QueueItem>,
    stop: StopSignal,
    state: PipelineState,
}

impl PrefetchPipeline {
    /// Validates the parameters and starts the producers.
    ///
    /// # Arguments
    /// - `source`            : shared by every producer; serializes its own cursor
    /// - `target_item_count` : items after which the sequence ends
    /// - `producer_count`    : detached producer threads, at least 1
    /// - `queue_capacity`    : batches buffered ahead of the consumer, at least 1
    ///
    /// # Errors
    /// `ConfigurationError` when a count is out of range. No thread is started
    /// in that case.
    pub fn create(
        source: Arc<dyn BatchSource>,
        target_item_count: usize,
        producer_count: usize,
        queue_capacity: usize,
    ) -> Result<PrefetchPipeline, ConfigurationError> {
        let config = PipelineConfig::new(target_item_count, producer_count, queue_capacity)?;
        Ok(PrefetchPipeline::new(source, config))
    }

    /// Starts the producers for an already validated config.
    ///
    /// A zero target starts no threads at all: the pipeline is born stopped.
    pub fn new(source: Arc<dyn BatchSource>, config: PipelineConfig) -> PrefetchPipeline {
        let (sender, queue) = mpsc::sync_channel(config.queue_capacity());
        let mut pipeline = PrefetchPipeline {
            config,
            queue,
            stop: StopSignal::new(),
            state: PipelineState::default(),
        };

        if config.target_item_count() == 0 {
            pipeline.finish(StopReason::TargetReached);
            return pipeline;
        }

        for worker in 0..config.producer_count() {
            let source = Arc::clone(&source);
            let sender = sender.clone();
            let stop = pipeline.stop.clone();
            thread::spawn(move || produce(worker, source.as_ref(), &sender, &stop));
        }
        debug!(
            target_items = config.target_item_count(),
            producers = config.producer_count(),
            capacity = config.queue_capacity(),
            "prefetch pipeline started"
        );
        pipeline
    }

    /// Stops the producers and ends the sequence. Safe to call repeatedly
    /// and before anything has been consumed.
    pub fn cancel(&mut self) {
        self.finish(StopReason::Cancelled);
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn items_consumed(&self) -> usize {
        self.state.items_consumed
    }

    pub fn is_stopped(&self) -> bool {
        self.state.stopped()
    }

    pub fn stop_reason(&self) -> Option<StopReason> {
        self.state.stop_reason
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    fn finish(&mut self, reason: StopReason) {
        if self.state.stop_reason.is_some() {
            return;
        }
        self.state.stop_reason = Some(reason);
        self.stop.trigger();
        debug!(?reason, items = self.state.items_consumed, "prefetch pipeline stopped");
    }
}

impl Iterator for PrefetchPipeline {
    type Item = Result<Batch, SourceError>;

    /// Blocks until a producer delivers. The batch that brings the count to
    /// the target is still yielded; the stop signal is set before it is
    /// returned.
    fn next(&mut self) -> Option<Self::Item> {
        if self.state.stopped() {
            return None;
        }
        match self.queue.recv() {
            Ok(Ok(batch)) => {
                self.state.items_consumed += batch.len();
                if self.state.items_consumed >= self.config.target_item_count() {
                    self.finish(StopReason::TargetReached);
                }
                Some(Ok(batch))
            }
            Ok(Err(err)) => {
                self.finish(StopReason::SourceFailed);
                Some(Err(err))
            }
            // Every producer is gone without reporting why (a panicking source).
            Err(_) => {
                self.finish(StopReason::SourceFailed);
                Some(Err(SourceError::other("all producers exited before the target was reached")))
            }
        }
    }
}

impl Drop for PrefetchPipeline {
    fn drop(&mut self) {
        self.stop.trigger();
    }
}

// ---------------------------------------------------------------------------
// Producer side
// ---------------------------------------------------------------------------

/// Producer loop. Exits when the stop signal is seen, the queue is gone, or
/// after forwarding a source error.
///
/// # Backpressure
/// A full queue is retried every `PRODUCER_BACKOFF`, checking the stop
/// signal before each retry, so a stopped pipeline releases its producers
/// within one backoff interval.
fn produce(worker: usize, source: &dyn BatchSource, queue: &SyncSender<QueueItem>, stop: &StopSignal) {
    while !stop.is_triggered() {
        let mut item = source.next_batch();
        let failed = item.is_err();
        loop {
            match queue.try_send(item) {
                Ok(()) => break,
                Err(TrySendError::Full(returned)) => {
                    if stop.is_triggered() {
                        return;
                    }
                    item = returned;
                    thread::sleep(PRODUCER_BACKOFF);
                }
                Err(TrySendError::Disconnected(_)) => return,
            }
        }
        if failed {
            warn!(worker, "batch source failed; producer exiting");
            return;
        }
    }
}
