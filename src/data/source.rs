use std::sync::{Mutex, PoisonError};

use rand::seq::SliceRandom;

use crate::data::batch::Batch;
use crate::error::{ConfigurationError, SourceError};

/// Anything that can hand out batches on request.
///
/// `next_batch` may be called indefinitely; sources are expected to wrap
/// around (and possibly reshuffle) once a pass is exhausted. Several
/// prefetch producers pull from one source concurrently, so implementations
/// serialize their own cursor.
pub trait BatchSource: Send + Sync {
    /// Produces the next batch.
    fn next_batch(&self) -> Result<Batch, SourceError>;

    /// Number of items in one full pass.
    fn item_count(&self) -> usize;
}

/// Position within the current pass over an in-memory dataset.
#[derive(Debug)]
struct Cursor {
    order: Vec<usize>,
    position: usize,
}

/// Batch source over samples already held in memory.
///
/// Batches never span a pass boundary, so the last batch of each pass may be
/// short. With `shuffled()` the sample order is reshuffled at every wrap.
#[derive(Debug)]
pub struct InMemorySource {
    images: Vec<Vec<f64>>,
    labels: Option<Vec<Vec<f64>>>,
    batch_size: usize,
    shuffle: bool,
    cursor: Mutex<Cursor>,
}

impl InMemorySource {
    pub fn new(
        images: Vec<Vec<f64>>,
        labels: Option<Vec<Vec<f64>>>,
        batch_size: usize,
    ) -> Result<InMemorySource, ConfigurationError> {
        if batch_size == 0 {
            return Err(ConfigurationError::invalid("batch_size", "must be at least 1"));
        }
        if let Some(ref labels) = labels {
            if labels.len() != images.len() {
                return Err(ConfigurationError::invalid(
                    "labels",
                    format!("{} labels for {} images", labels.len(), images.len()),
                ));
            }
        }
        let order = (0..images.len()).collect();
        Ok(InMemorySource {
            images,
            labels,
            batch_size,
            shuffle: false,
            cursor: Mutex::new(Cursor { order, position: 0 }),
        })
    }

    /// Shuffles sample order now and on every subsequent pass.
    pub fn shuffled(mut self) -> InMemorySource {
        self.shuffle = true;
        let cursor = self.cursor.get_mut().unwrap_or_else(PoisonError::into_inner);
        cursor.order.shuffle(&mut rand::thread_rng());
        self
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn take_indices(&self) -> Vec<usize> {
        let mut cursor = self.cursor.lock().unwrap_or_else(PoisonError::into_inner);
        if cursor.position >= cursor.order.len() {
            cursor.position = 0;
            if self.shuffle {
                cursor.order.shuffle(&mut rand::thread_rng());
            }
        }
        let start = cursor.position;
        let end = (start + self.batch_size).min(cursor.order.len());
        cursor.position = end;
        cursor.order[start..end].to_vec()
    }
}

impl BatchSource for InMemorySource {
    fn next_batch(&self) -> Result<Batch, SourceError> {
        if self.images.is_empty() {
            return Err(SourceError::Empty("in-memory dataset".into()));
        }
        let indices = self.take_indices();
        let images = indices.iter().map(|&i| self.images[i].clone()).collect();
        match self.labels {
            Some(ref labels) => {
                Batch::labeled(images, indices.iter().map(|&i| labels[i].clone()).collect())
            }
            None => Ok(Batch::unlabeled(images)),
        }
    }

    fn item_count(&self) -> usize {
        self.images.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbered(n: usize) -> Vec<Vec<f64>> {
        (0..n).map(|i| vec![i as f64]).collect()
    }

    #[test]
    fn ten_items_in_batches_of_four() {
        let source = InMemorySource::new(numbered(10), None, 4).unwrap();
        let sizes: Vec<usize> = (0..3).map(|_| source.next_batch().unwrap().len()).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
        assert_eq!(source.item_count(), 10);
    }

    #[test]
    fn wraps_around_after_a_pass() {
        let source = InMemorySource::new(numbered(3), None, 2).unwrap();
        source.next_batch().unwrap();
        source.next_batch().unwrap();
        let third = source.next_batch().unwrap();
        assert_eq!(third.images(), &[vec![0.0], vec![1.0]]);
    }

    #[test]
    fn shuffled_pass_still_covers_every_item() {
        let source = InMemorySource::new(numbered(12), None, 5).unwrap().shuffled();
        let mut seen: Vec<f64> = (0..3)
            .flat_map(|_| source.next_batch().unwrap().into_parts().0)
            .map(|v| v[0])
            .collect();
        seen.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_eq!(seen, (0..12).map(|i| i as f64).collect::<Vec<_>>());
    }

    #[test]
    fn labels_follow_their_images() {
        let labels = (0..4).map(|i| vec![i as f64 * 10.0]).collect();
        let source = InMemorySource::new(numbered(4), Some(labels), 4).unwrap().shuffled();
        let batch = source.next_batch().unwrap();
        for (image, label) in batch.images().iter().zip(batch.labels().unwrap()) {
            assert_eq!(label[0], image[0] * 10.0);
        }
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        assert!(InMemorySource::new(numbered(1), None, 0).is_err());
    }

    #[test]
    fn empty_dataset_is_a_source_error() {
        let source = InMemorySource::new(Vec::new(), None, 1).unwrap();
        assert!(matches!(source.next_batch(), Err(SourceError::Empty(_))));
    }
}
