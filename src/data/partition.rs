//! On-disk dataset partitioning.
//!
//! These helpers move image files between the directory trees the trainer
//! reads from. Moves use `fs::rename`, so source and destination must live
//! on the same filesystem.
use std::fs;
use std::path::Path;

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::info;

use crate::data::image_folder::{collect_images, discover_labels};
use crate::error::{ConfigurationError, Result};

/// Moves `floor(split * n)` randomly chosen images of every label from
/// `training_dir` into the mirrored location under `validation_dir`.
///
/// Returns the number of files moved.
pub fn separate_validation_set<R: Rng + ?Sized>(
    training_dir: &Path,
    validation_dir: &Path,
    split: f64,
    rng: &mut R,
) -> Result<usize> {
    if !(0.0..=1.0).contains(&split) {
        return Err(ConfigurationError::invalid("validation_split", format!("{} is outside [0, 1]", split)).into());
    }
    let mut moved = 0;
    for label in discover_labels(training_dir)? {
        fs::create_dir_all(validation_dir.join(&label))?;
        let images = collect_images(&training_dir.join(&label))?;
        let count = (split * images.len() as f64).floor() as usize;
        for image in images.choose_multiple(rng, count) {
            move_under(image, training_dir, validation_dir)?;
            moved += 1;
        }
    }
    info!(moved, split, "separated validation set");
    Ok(moved)
}

/// Moves every image under `validation_dir` back to its place under
/// `training_dir`.
pub fn recombine(validation_dir: &Path, training_dir: &Path) -> Result<usize> {
    let images = collect_images(validation_dir)?;
    for image in &images {
        move_under(image, validation_dir, training_dir)?;
    }
    info!(moved = images.len(), "recombined validation set into training set");
    Ok(images.len())
}

/// Splits a flat pool of pretraining images into two label directories,
/// `0` and `1`, choosing each image's side uniformly at random.
pub fn divide_pretraining<R: Rng + ?Sized>(
    source_dir: &Path,
    destination_dir: &Path,
    rng: &mut R,
) -> Result<usize> {
    for side in ["0", "1"] {
        fs::create_dir_all(destination_dir.join(side))?;
    }
    let images = collect_images(source_dir)?;
    for image in &images {
        let side = if rng.gen_bool(0.5) { "1" } else { "0" };
        if let Some(name) = image.file_name() {
            fs::rename(image, destination_dir.join(side).join(name))?;
        }
    }
    info!(moved = images.len(), "divided pretraining images");
    Ok(images.len())
}

fn move_under(path: &Path, from_root: &Path, to_root: &Path) -> Result<()> {
    let relative = path.strip_prefix(from_root).map_err(|_| {
        ConfigurationError::invalid("path", format!("{} is not under {}", path.display(), from_root.display()))
    })?;
    let destination = to_root.join(relative);
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::rename(path, destination)?;
    Ok(())
}
