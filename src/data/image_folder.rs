use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use image::{GenericImageView, ImageError};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::data::augment::{to_rgb_input, Augmentation};
use crate::data::batch::Batch;
use crate::data::source::BatchSource;
use crate::error::SourceError;

/// Only files with this (case-sensitive) extension are picked up.
pub const IMAGE_EXTENSION: &str = "jpg";

/// Sorted names of the sub-directories of `dir`; each one is a class label.
pub fn discover_labels(dir: &Path) -> io::Result<Vec<String>> {
    let mut labels = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            labels.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    labels.sort();
    Ok(labels)
}

/// Every `.jpg` file below `dir`, recursively, in sorted order.
pub fn collect_images(dir: &Path) -> io::Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    let mut pending = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in fs::read_dir(&current)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if path.extension().map_or(false, |ext| ext == IMAGE_EXTENSION) {
                found.push(path);
            }
        }
    }
    found.sort();
    Ok(found)
}

/// How an `ImageFolderSource` turns files into batches.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FolderOptions {
    /// Side of the square crop fed to the network.
    pub image_width: u32,
    pub batch_size: usize,
    pub augmentation: Augmentation,
    /// Reshuffle file order on every pass.
    pub shuffle: bool,
    /// Fixed seed for shuffling and augmentation; entropy when `None`.
    pub seed: Option<u64>,
}

impl FolderOptions {
    /// Random crops and flips, shuffled every pass.
    pub fn training(image_width: u32, batch_size: usize) -> FolderOptions {
        FolderOptions {
            image_width,
            batch_size,
            augmentation: Augmentation::training(),
            shuffle: true,
            seed: None,
        }
    }

    /// Centre crops in a fixed order.
    pub fn evaluation(image_width: u32, batch_size: usize) -> FolderOptions {
        FolderOptions {
            image_width,
            batch_size,
            augmentation: Augmentation::evaluation(),
            shuffle: false,
            seed: None,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> FolderOptions {
        self.seed = Some(seed);
        self
    }
}

#[derive(Debug)]
struct FolderCursor {
    order: Vec<usize>,
    position: usize,
    rng: StdRng,
}

/// Streams augmented images from a directory tree, cycling forever.
///
/// In labelled mode the tree is `root/<label>/**/*.jpg` and every batch
/// carries one-hot labels over the sorted label names. In unlabelled mode all
/// images below `root` are used and batches carry no labels.
#[derive(Debug)]
pub struct ImageFolderSource {
    files: Vec<(PathBuf, Option<usize>)>,
    labels: Vec<String>,
    options: FolderOptions,
    cursor: Mutex<FolderCursor>,
}

impl ImageFolderSource {
    pub fn labeled(root: &Path, options: FolderOptions) -> Result<ImageFolderSource, SourceError> {
        let labels = discover_labels(root).map_err(|e| SourceError::io(root, e))?;
        let mut files = Vec::new();
        for (index, label) in labels.iter().enumerate() {
            let dir = root.join(label);
            let images = collect_images(&dir).map_err(|e| SourceError::io(&dir, e))?;
            files.extend(images.into_iter().map(|path| (path, Some(index))));
        }
        ImageFolderSource::build(root, files, labels, options)
    }

    pub fn unlabeled(root: &Path, options: FolderOptions) -> Result<ImageFolderSource, SourceError> {
        let files = collect_images(root)
            .map_err(|e| SourceError::io(root, e))?
            .into_iter()
            .map(|path| (path, None))
            .collect();
        ImageFolderSource::build(root, files, Vec::new(), options)
    }

    fn build(
        root: &Path,
        files: Vec<(PathBuf, Option<usize>)>,
        labels: Vec<String>,
        options: FolderOptions,
    ) -> Result<ImageFolderSource, SourceError> {
        if files.is_empty() {
            return Err(SourceError::Empty(format!("no .{} files under {}", IMAGE_EXTENSION, root.display())));
        }
        if options.batch_size == 0 || options.image_width == 0 {
            return Err(SourceError::other("batch_size and image_width must be at least 1"));
        }
        let mut rng = match options.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut order: Vec<usize> = (0..files.len()).collect();
        if options.shuffle {
            order.shuffle(&mut rng);
        }
        debug!(root = %root.display(), images = files.len(), labels = labels.len(), "image folder source ready");
        Ok(ImageFolderSource {
            files,
            labels,
            options,
            cursor: Mutex::new(FolderCursor { order, position: 0, rng }),
        })
    }

    /// Label names in one-hot order. Empty for unlabelled sources.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn options(&self) -> &FolderOptions {
        &self.options
    }

    /// Image paths in unshuffled order. Without `shuffle`, the first pass
    /// of batches follows this order.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.files.iter().map(|(path, _)| path.as_path())
    }

    /// Picks the next slice of files plus a seed for their augmentation.
    /// Decoding happens after the lock is released.
    fn take(&self) -> (Vec<usize>, u64) {
        let mut cursor = self.cursor.lock().unwrap_or_else(PoisonError::into_inner);
        if cursor.position >= cursor.order.len() {
            cursor.position = 0;
            if self.options.shuffle {
                let FolderCursor { order, rng, .. } = &mut *cursor;
                order.shuffle(rng);
            }
        }
        let start = cursor.position;
        let end = (start + self.options.batch_size).min(cursor.order.len());
        cursor.position = end;
        let seed = cursor.rng.gen();
        (cursor.order[start..end].to_vec(), seed)
    }

    fn load(&self, path: &Path, rng: &mut StdRng) -> Result<Vec<f64>, SourceError> {
        let img = image::open(path).map_err(|e| match e {
            ImageError::IoError(io) => SourceError::io(path, io),
            other => SourceError::Decode { path: path.to_path_buf(), reason: other.to_string() },
        })?;
        let (w, h) = img.dimensions();
        if w == 0 || h == 0 {
            return Err(SourceError::Decode { path: path.to_path_buf(), reason: "image has no pixels".into() });
        }
        let augmented = self.options.augmentation.apply(&img, self.options.image_width, rng);
        Ok(to_rgb_input(&augmented))
    }

    fn one_hot(&self, index: usize) -> Vec<f64> {
        let mut row = vec![0.0; self.labels.len()];
        row[index] = 1.0;
        row
    }
}

impl BatchSource for ImageFolderSource {
    fn next_batch(&self) -> Result<Batch, SourceError> {
        let (indices, seed) = self.take();
        let mut rng = StdRng::seed_from_u64(seed);
        let mut images = Vec::with_capacity(indices.len());
        let mut labels = Vec::with_capacity(indices.len());
        for &i in &indices {
            let (path, label) = &self.files[i];
            images.push(self.load(path, &mut rng)?);
            if let Some(label) = *label {
                labels.push(self.one_hot(label));
            }
        }
        if self.labels.is_empty() {
            Ok(Batch::unlabeled(images))
        } else {
            Batch::labeled(images, labels)
        }
    }

    fn item_count(&self) -> usize {
        self.files.len()
    }
}
