use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use conveyor_nn::data::{Batch, BatchSource, InMemorySource};
use conveyor_nn::error::SourceError;
use conveyor_nn::{PrefetchPipeline, StopReason};

fn counting_source(items: usize, batch_size: usize) -> Arc<dyn BatchSource> {
    let images = (0..items).map(|i| vec![i as f64]).collect();
    Arc::new(InMemorySource::new(images, None, batch_size).unwrap())
}

/// Counts `next_batch` calls and never runs out.
struct Endless {
    batch_size: usize,
    calls: AtomicUsize,
}

impl BatchSource for Endless {
    fn next_batch(&self) -> Result<Batch, SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Batch::unlabeled(vec![vec![0.0]; self.batch_size]))
    }

    fn item_count(&self) -> usize {
        usize::MAX
    }
}

#[test]
fn any_producer_count_stops_within_one_batch_of_target() {
    for producers in 1..=4 {
        let mut pipeline = PrefetchPipeline::create(counting_source(10, 4), 10, producers, 3).unwrap();
        let sizes: Vec<usize> = pipeline.by_ref().map(|b| b.unwrap().len()).collect();
        let total: usize = sizes.iter().sum();
        assert!(total >= 10 && total < 14, "producers={} sizes={:?}", producers, sizes);
        assert_eq!(pipeline.items_consumed(), total);
        assert_eq!(pipeline.stop_reason(), Some(StopReason::TargetReached));
    }
}

#[test]
fn single_producer_yields_4_4_2() {
    let mut pipeline = PrefetchPipeline::create(counting_source(10, 4), 10, 1, 50).unwrap();
    let batches: Vec<Batch> = pipeline.by_ref().map(Result::unwrap).collect();
    assert_eq!(batches.iter().map(Batch::len).collect::<Vec<_>>(), vec![4, 4, 2]);
    let flat: Vec<f64> = batches.iter().flat_map(|b| b.images().iter().map(|x| x[0])).collect();
    assert_eq!(flat, (0..10).map(|i| i as f64).collect::<Vec<_>>());
    assert_eq!(pipeline.items_consumed(), 10);
}

#[test]
fn still_running_until_the_batch_that_reaches_the_target() {
    let mut pipeline = PrefetchPipeline::create(counting_source(10, 4), 10, 1, 50).unwrap();
    let mut seen = Vec::new();
    while let Some(batch) = pipeline.next() {
        seen.push((batch.unwrap().len(), pipeline.is_stopped()));
    }
    assert_eq!(seen, vec![(4, false), (4, false), (2, true)]);
    assert_eq!(pipeline.stop_reason(), Some(StopReason::TargetReached));
}

#[test]
fn ended_pipeline_is_not_restartable() {
    let mut pipeline = PrefetchPipeline::create(counting_source(4, 2), 4, 2, 2).unwrap();
    assert_eq!(pipeline.by_ref().count(), 2);
    for _ in 0..3 {
        assert!(pipeline.next().is_none());
    }
}

#[test]
fn cancel_before_first_item_ends_immediately() {
    let mut pipeline = PrefetchPipeline::create(counting_source(100, 1), 100, 3, 5).unwrap();
    pipeline.cancel();
    pipeline.cancel();
    assert!(pipeline.next().is_none());
    assert_eq!(pipeline.stop_reason(), Some(StopReason::Cancelled));
    assert_eq!(pipeline.items_consumed(), 0);
}

#[test]
fn dropping_a_pipeline_stops_its_producers() {
    let source = Arc::new(Endless { batch_size: 1, calls: AtomicUsize::new(0) });
    {
        let mut pipeline = PrefetchPipeline::create(source.clone(), 1_000_000, 4, 2).unwrap();
        assert!(pipeline.next().is_some());
    }
    // One backoff interval is enough for every producer to observe the stop.
    std::thread::sleep(Duration::from_millis(200));
    let settled = source.calls.load(Ordering::SeqCst);
    std::thread::sleep(Duration::from_millis(200));
    assert_eq!(source.calls.load(Ordering::SeqCst), settled);
}

#[test]
fn infinite_source_is_bounded_by_the_target() {
    let source = Arc::new(Endless { batch_size: 3, calls: AtomicUsize::new(0) });
    let started = Instant::now();
    let pipeline = PrefetchPipeline::create(source, 30, 2, 4).unwrap();
    let total: usize = pipeline.map(|b| b.unwrap().len()).sum();
    assert!(total >= 30 && total < 33);
    assert!(started.elapsed() < Duration::from_secs(5));
}
