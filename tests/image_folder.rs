use std::fs;
use std::path::Path;
use std::sync::Arc;

use image::{Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::SeedableRng;

use conveyor_nn::data::image_folder::{collect_images, FolderOptions};
use conveyor_nn::data::partition::{divide_pretraining, recombine, separate_validation_set};
use conveyor_nn::data::{BatchSource, ImageFolderSource};
use conveyor_nn::display::NoDisplay;
use conveyor_nn::error::{SourceError, TrainError};
use conveyor_nn::model::{Classifier, ClassifierSpec};
use conveyor_nn::{EpochController, RunState, TrainConfig};

fn write_jpg(path: &Path, shade: u8) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    RgbImage::from_pixel(12, 8, Rgb([shade, 255 - shade, 128])).save(path).unwrap();
}

/// `root/<label>/img<i>.jpg` with `per_label` images each.
fn make_tree(root: &Path, labels: &[&str], per_label: usize) {
    for (l, label) in labels.iter().enumerate() {
        for i in 0..per_label {
            write_jpg(&root.join(label).join(format!("img{}.jpg", i)), (l * 200) as u8);
        }
    }
}

#[test]
fn labelled_source_yields_one_hot_batches() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write_jpg(&root.join("cat/a.jpg"), 10);
    write_jpg(&root.join("cat/b.jpg"), 20);
    write_jpg(&root.join("dog/c.jpg"), 200);
    write_jpg(&root.join("dog/nested/d.jpg"), 220);
    fs::write(root.join("dog/notes.txt"), "ignored").unwrap();
    RgbImage::new(4, 4).save(root.join("dog/e.png")).unwrap();

    let source = ImageFolderSource::labeled(root, FolderOptions::evaluation(4, 3).with_seed(7)).unwrap();
    assert_eq!(source.labels(), &["cat".to_owned(), "dog".to_owned()]);
    assert_eq!(source.item_count(), 4);

    let first = source.next_batch().unwrap();
    assert_eq!(first.len(), 3);
    assert_eq!(first.feature_count(), Some(4 * 4 * 3));
    let labels = first.labels().unwrap();
    assert_eq!(labels[0], vec![1.0, 0.0]);
    assert_eq!(labels[2], vec![0.0, 1.0]);
    assert!(first.images().iter().flatten().all(|v| (0.0..=1.0).contains(v)));

    // The pass ends with a short batch, then wraps.
    assert_eq!(source.next_batch().unwrap().len(), 1);
    assert_eq!(source.next_batch().unwrap().len(), 3);
}

#[test]
fn unlabelled_source_has_no_labels() {
    let dir = tempfile::tempdir().unwrap();
    make_tree(dir.path(), &["x"], 3);
    let source = ImageFolderSource::unlabeled(dir.path(), FolderOptions::evaluation(4, 8)).unwrap();
    assert!(source.labels().is_empty());
    assert_eq!(source.paths().count(), 3);
    let batch = source.next_batch().unwrap();
    assert_eq!(batch.len(), 3);
    assert!(batch.labels().is_none());
}

#[test]
fn empty_and_corrupt_folders_are_source_errors() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("a")).unwrap();
    assert!(matches!(
        ImageFolderSource::labeled(dir.path(), FolderOptions::evaluation(4, 2)),
        Err(SourceError::Empty(_))
    ));

    fs::write(dir.path().join("a/broken.jpg"), b"not a jpeg").unwrap();
    let source = ImageFolderSource::labeled(dir.path(), FolderOptions::evaluation(4, 2)).unwrap();
    assert!(matches!(source.next_batch(), Err(SourceError::Decode { .. })));
}

#[test]
fn split_then_recombine_round_trips_the_tree() {
    let dir = tempfile::tempdir().unwrap();
    let training = dir.path().join("training");
    let validation = dir.path().join("validation");
    make_tree(&training, &["a", "b"], 10);
    let mut rng = StdRng::seed_from_u64(3);

    let moved = separate_validation_set(&training, &validation, 0.3, &mut rng).unwrap();
    assert_eq!(moved, 6);
    assert_eq!(collect_images(&validation.join("a")).unwrap().len(), 3);
    assert_eq!(collect_images(&training.join("b")).unwrap().len(), 7);

    assert_eq!(recombine(&validation, &training).unwrap(), 6);
    assert_eq!(collect_images(&training).unwrap().len(), 20);
    assert!(collect_images(&validation).unwrap().is_empty());
}

#[test]
fn split_outside_unit_interval_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    make_tree(&dir.path().join("training"), &["a"], 2);
    let mut rng = StdRng::seed_from_u64(0);
    let result = separate_validation_set(&dir.path().join("training"), &dir.path().join("validation"), 1.5, &mut rng);
    assert!(matches!(result, Err(TrainError::Config(_))));
    assert_eq!(collect_images(&dir.path().join("training")).unwrap().len(), 2);
}

#[test]
fn pretraining_pool_is_divided_into_two_labels() {
    let dir = tempfile::tempdir().unwrap();
    let pool = dir.path().join("pretraining_source");
    let dest = dir.path().join("pretraining");
    for i in 0..6 {
        write_jpg(&pool.join(format!("p{}.jpg", i)), 50);
    }
    let mut rng = StdRng::seed_from_u64(11);
    assert_eq!(divide_pretraining(&pool, &dest, &mut rng).unwrap(), 6);
    let zero = collect_images(&dest.join("0")).unwrap().len();
    let one = collect_images(&dest.join("1")).unwrap().len();
    assert_eq!(zero + one, 6);
    assert!(collect_images(&pool).unwrap().is_empty());
}

#[test]
fn classifier_trains_end_to_end_on_image_folders() {
    let dir = tempfile::tempdir().unwrap();
    let training = dir.path().join("training");
    let validation = dir.path().join("validation");
    make_tree(&training, &["dark", "light"], 4);
    make_tree(&validation, &["dark", "light"], 2);

    let width = 4;
    let train = ImageFolderSource::labeled(&training, FolderOptions::training(width, 3).with_seed(1)).unwrap();
    let val = ImageFolderSource::labeled(&validation, FolderOptions::evaluation(width, 3)).unwrap();
    let spec = ClassifierSpec::image_classifier("e2e", (width * width * 3) as usize, &[6], 2);
    let mut classifier = Classifier::from_spec(&spec, train.labels().to_vec()).unwrap();

    let mut config = TrainConfig::new(3, 10, 0.05);
    config.producer_count = 2;
    let mut controller = EpochController::new(config).unwrap();
    let summary = controller
        .run(Arc::new(train), Arc::new(val), &mut classifier, &mut NoDisplay)
        .unwrap();

    assert_eq!(summary.outcome, RunState::StoppedByEpochLimit);
    assert_eq!(summary.epochs_completed, 3);
    assert_eq!(controller.metrics().validation_loss().len(), 3);
    assert!(summary.best_validation_loss.is_finite());
}
