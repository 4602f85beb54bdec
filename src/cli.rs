use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, warn};

use conveyor_nn::data::image_folder::FolderOptions;
use conveyor_nn::data::partition::{divide_pretraining, recombine, separate_validation_set};
use conveyor_nn::data::BatchSource;
use conveyor_nn::display::{HttpMonitor, LogDisplay, MetricsDisplay};
use conveyor_nn::model::{Classifier, ClassifierSpec};
use conveyor_nn::{DataPaths, EpochController, ImageFolderSource, RunConfig, TrainingMode};

const MODEL_DIR: &str = "trained_models";

#[derive(Parser, Debug)]
#[command(
    name = "conveyor-nn",
    version,
    about = "Train an image classifier from a directory of labelled .jpg files."
)]
pub struct Cli {
    /// JSON run configuration. Defaults apply when omitted.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Overrides `data_dir` from the configuration.
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Seed for shuffling, augmentation and partitioning.
    #[arg(long, global = true)]
    pub seed: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Train on `training`, validate on `validation`, stop early on patience.
    Train(TrainArgs),
    /// Train on `pretraining`/`pretraining_validation` to the epoch limit.
    Pretrain(TrainArgs),
    /// Move a random fraction of each label into the validation tree.
    Split(PartitionArgs),
    /// Move the validation tree back into the training tree.
    Recombine(PartitionArgs),
    /// Divide `pretraining_source` at random into labels `0` and `1`.
    DividePretraining,
    /// Classify every image under `testing` with a saved model.
    Predict(PredictArgs),
}

#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Model name; the model is saved to `trained_models/<name>.json`.
    #[arg(long, default_value = "classifier")]
    pub name: String,

    #[arg(long)]
    pub epochs: Option<usize>,

    #[arg(long)]
    pub learning_rate: Option<f64>,

    /// Prefetch threads per pipeline.
    #[arg(long)]
    pub threads: Option<usize>,

    /// Serve live metrics over HTTP on this address, e.g. 127.0.0.1:7878.
    #[arg(long)]
    pub monitor: Option<String>,

    /// Write the metrics log here as JSON when the run ends.
    #[arg(long)]
    pub metrics_out: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct PartitionArgs {
    /// Operate on the pretraining trees instead.
    #[arg(long)]
    pub pretraining: bool,
}

#[derive(Args, Debug)]
pub struct PredictArgs {
    /// Saved model JSON.
    #[arg(long)]
    pub model: PathBuf,
}

impl Cli {
    pub fn run(self) -> Result<()> {
        let mut config = match &self.config {
            Some(path) => RunConfig::load_json(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => RunConfig::default(),
        };
        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        let mut rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let paths = config.paths();

        match self.command {
            Command::Train(args) => train(config, args, TrainingMode::Normal, self.seed),
            Command::Pretrain(args) => train(config, args, TrainingMode::Pretraining, self.seed),
            Command::Split(args) => {
                let mode = partition_mode(&args);
                let (train_dir, val_dir) = paths.for_mode(mode);
                let split = DataPaths::split_for(&config, mode);
                let moved = separate_validation_set(train_dir, val_dir, split, &mut rng)?;
                println!("Moved {} images into {}", moved, val_dir.display());
                Ok(())
            }
            Command::Recombine(args) => {
                let (train_dir, val_dir) = paths.for_mode(partition_mode(&args));
                let moved = recombine(val_dir, train_dir)?;
                println!("Moved {} images back into {}", moved, train_dir.display());
                Ok(())
            }
            Command::DividePretraining => {
                let moved = divide_pretraining(&paths.pretraining_source, &paths.pretraining, &mut rng)?;
                println!("Divided {} images into {}", moved, paths.pretraining.display());
                Ok(())
            }
            Command::Predict(args) => predict(&config, &paths.testing, &args.model),
        }
    }
}

fn partition_mode(args: &PartitionArgs) -> TrainingMode {
    if args.pretraining {
        TrainingMode::Pretraining
    } else {
        TrainingMode::Normal
    }
}

fn train(mut config: RunConfig, args: TrainArgs, mode: TrainingMode, seed: Option<u64>) -> Result<()> {
    if let Some(epochs) = args.epochs {
        config.epochs = epochs;
    }
    if let Some(lr) = args.learning_rate {
        config.learning_rate = lr;
    }
    if let Some(threads) = args.threads {
        config.threads = threads;
    }
    config.validate()?;

    let paths = config.paths();
    let (train_dir, val_dir) = paths.for_mode(mode);
    let mut train_options = FolderOptions::training(config.image_width, config.batch_size);
    let mut val_options = FolderOptions::evaluation(config.image_width, config.batch_size);
    if let Some(seed) = seed {
        train_options = train_options.with_seed(seed);
        val_options = val_options.with_seed(seed.wrapping_add(1));
    }
    let train_source = ImageFolderSource::labeled(train_dir, train_options)
        .with_context(|| format!("cannot read training images from {}", train_dir.display()))?;
    let val_source = ImageFolderSource::labeled(val_dir, val_options)
        .with_context(|| format!("cannot read validation images from {}", val_dir.display()))?;
    if train_source.labels() != val_source.labels() {
        bail!(
            "training labels {:?} differ from validation labels {:?}",
            train_source.labels(),
            val_source.labels()
        );
    }

    let labels = train_source.labels().to_vec();
    let spec = ClassifierSpec::image_classifier(&args.name, config.input_size(), &config.hidden_layers, labels.len());
    let mut classifier = Classifier::from_spec(&spec, labels)?;
    info!(
        name = %args.name,
        mode = ?mode,
        train_images = train_source.item_count(),
        validation_images = val_source.item_count(),
        "starting run"
    );

    let mut controller = EpochController::new(config.train_config(mode))?;
    let train_source: Arc<dyn BatchSource> = Arc::new(train_source);
    let val_source: Arc<dyn BatchSource> = Arc::new(val_source);
    let mut display: Box<dyn MetricsDisplay> = match &args.monitor {
        Some(addr) => Box::new((LogDisplay, HttpMonitor::bind(addr)?)),
        None => Box::new(LogDisplay),
    };
    let result = controller.run(train_source, val_source, &mut classifier, display.as_mut());

    // Metrics are worth keeping even when the run failed part way.
    if let Some(path) = &args.metrics_out {
        if let Err(e) = controller.metrics().save_json(path) {
            warn!(path = %path.display(), error = %e, "could not write metrics");
        }
    }
    let summary = result?;

    std::fs::create_dir_all(MODEL_DIR)?;
    let model_path = Path::new(MODEL_DIR).join(format!("{}.json", args.name));
    classifier.save_json(&model_path)?;
    println!(
        "{:?} after {} epochs ({} iterations), best validation loss {:.4}. Model saved to {}",
        summary.outcome,
        summary.epochs_completed,
        summary.iterations,
        summary.best_validation_loss,
        model_path.display()
    );
    Ok(())
}

fn predict(config: &RunConfig, testing_dir: &Path, model_path: &Path) -> Result<()> {
    let classifier = Classifier::load_json(model_path)
        .with_context(|| format!("failed to load model {}", model_path.display()))?;
    let source = ImageFolderSource::unlabeled(testing_dir, FolderOptions::evaluation(config.image_width, config.batch_size))?;
    let paths: Vec<PathBuf> = source.paths().map(Path::to_path_buf).collect();

    let mut done = 0;
    while done < paths.len() {
        let batch = source.next_batch()?;
        for (path, class) in paths[done..].iter().zip(classifier.classify(batch.images())?) {
            let label = classifier.labels.get(class).map_or("?", String::as_str);
            println!("{}\t{}", path.display(), label);
        }
        done += batch.len();
    }
    Ok(())
}
