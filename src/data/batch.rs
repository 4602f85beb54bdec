use crate::error::SourceError;

/// One unit of data pulled from a `BatchSource`.
///
/// `images` holds one flattened item per entry, so its length is the batch's
/// leading dimension. `labels`, when present, is aligned with `images`
/// (one one-hot row per item). Inference-only sources produce no labels.
#[derive(Debug, Clone, PartialEq)]
pub struct Batch {
    images: Vec<Vec<f64>>,
    labels: Option<Vec<Vec<f64>>>,
}

impl Batch {
    /// Builds a labelled batch; fails if the two payloads are not aligned.
    pub fn labeled(images: Vec<Vec<f64>>, labels: Vec<Vec<f64>>) -> Result<Batch, SourceError> {
        if images.len() != labels.len() {
            return Err(SourceError::other(format!(
                "batch has {} images but {} labels",
                images.len(),
                labels.len()
            )));
        }
        Ok(Batch { images, labels: Some(labels) })
    }

    pub fn unlabeled(images: Vec<Vec<f64>>) -> Batch {
        Batch { images, labels: None }
    }

    /// Number of items (leading dimension of the data payload).
    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    pub fn images(&self) -> &[Vec<f64>] {
        &self.images
    }

    pub fn labels(&self) -> Option<&[Vec<f64>]> {
        self.labels.as_deref()
    }

    /// Width of the first item, if any.
    pub fn feature_count(&self) -> Option<usize> {
        self.images.first().map(Vec::len)
    }

    pub fn into_parts(self) -> (Vec<Vec<f64>>, Option<Vec<Vec<f64>>>) {
        (self.images, self.labels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn len_is_leading_dimension() {
        let batch = Batch::labeled(
            vec![vec![0.0; 3], vec![1.0; 3]],
            vec![vec![1.0, 0.0], vec![0.0, 1.0]],
        )
        .unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.feature_count(), Some(3));
        assert_eq!(batch.labels().map(<[Vec<f64>]>::len), Some(2));
    }

    #[test]
    fn misaligned_labels_are_rejected() {
        let result = Batch::labeled(vec![vec![0.0]], vec![]);
        assert!(matches!(result, Err(SourceError::Other(_))));
    }

    #[test]
    fn unlabeled_batch_has_no_labels() {
        let batch = Batch::unlabeled(vec![vec![0.5]]);
        assert!(batch.labels().is_none());
        assert!(!batch.is_empty());
    }
}
