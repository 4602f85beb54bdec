use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{ConfigurationError, Result};
use crate::pipeline::DEFAULT_QUEUE_CAPACITY;
use crate::train::{TrainConfig, TrainingMode};

/// Parameters for a whole training run, read from a JSON file.
///
/// Every field has a default, so `{}` is a valid config. Unknown keys are
/// rejected; in particular there is no `iterations` key because run length
/// is counted in epochs only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    pub patience: usize,
    pub epochs: usize,
    /// Side length of the square crop fed to the network.
    pub image_width: u32,
    pub batch_size: usize,
    /// Prefetch threads per pipeline.
    pub threads: usize,
    pub learning_rate: f64,
    /// Fraction of each training label moved into the validation set.
    pub validation_split: f64,
    pub pretraining_validation_split: f64,
    pub queue_capacity: usize,
    pub data_dir: PathBuf,
    pub hidden_layers: Vec<usize>,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            patience: 5,
            epochs: 30,
            image_width: 32,
            batch_size: 32,
            threads: 2,
            learning_rate: 0.01,
            validation_split: 0.1,
            pretraining_validation_split: 0.1,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            data_dir: PathBuf::from("data"),
            hidden_layers: vec![128],
        }
    }
}

impl RunConfig {
    pub fn load_json(path: &Path) -> Result<RunConfig> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        let config: RunConfig = serde_json::from_reader(reader)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_json(&self, path: &Path) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn validate(&self) -> std::result::Result<(), ConfigurationError> {
        if self.image_width == 0 {
            return Err(ConfigurationError::invalid("image_width", "must be at least 1"));
        }
        if self.batch_size == 0 {
            return Err(ConfigurationError::invalid("batch_size", "must be at least 1"));
        }
        if self.threads == 0 {
            return Err(ConfigurationError::ProducerCount(0));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigurationError::QueueCapacity(0));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(ConfigurationError::invalid(
                "learning_rate",
                format!("must be a positive number (got {})", self.learning_rate),
            ));
        }
        for (field, split) in [
            ("validation_split", self.validation_split),
            ("pretraining_validation_split", self.pretraining_validation_split),
        ] {
            if !(0.0..=1.0).contains(&split) {
                return Err(ConfigurationError::invalid(field, format!("must lie in [0, 1] (got {})", split)));
            }
        }
        if self.hidden_layers.contains(&0) {
            return Err(ConfigurationError::invalid("hidden_layers", "layer sizes must be at least 1"));
        }
        Ok(())
    }

    pub fn paths(&self) -> DataPaths {
        DataPaths::under(&self.data_dir)
    }

    /// Controller settings for one run in `mode`. Progress channel and stop
    /// flag are left for the caller to attach.
    pub fn train_config(&self, mode: TrainingMode) -> TrainConfig {
        let mut config = TrainConfig::new(self.epochs, self.patience, self.learning_rate);
        config.producer_count = self.threads;
        config.queue_capacity = self.queue_capacity;
        config.mode = mode;
        config
    }

    /// Flattened RGB input length for the configured crop size.
    pub fn input_size(&self) -> usize {
        let w = self.image_width as usize;
        w * w * 3
    }
}

/// Directory layout under the data root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataPaths {
    pub training: PathBuf,
    pub validation: PathBuf,
    pub pretraining: PathBuf,
    pub pretraining_validation: PathBuf,
    pub pretraining_source: PathBuf,
    pub testing: PathBuf,
}

impl DataPaths {
    pub fn under(root: &Path) -> DataPaths {
        DataPaths {
            training: root.join("training"),
            validation: root.join("validation"),
            pretraining: root.join("pretraining"),
            pretraining_validation: root.join("pretraining_validation"),
            pretraining_source: root.join("pretraining_source"),
            testing: root.join("testing"),
        }
    }

    /// `(train, validate)` directories for a run in `mode`.
    pub fn for_mode(&self, mode: TrainingMode) -> (&Path, &Path) {
        match mode {
            TrainingMode::Normal => (&self.training, &self.validation),
            TrainingMode::Pretraining => (&self.pretraining, &self.pretraining_validation),
        }
    }

    /// Validation split fraction matching `for_mode`.
    pub fn split_for(config: &RunConfig, mode: TrainingMode) -> f64 {
        match mode {
            TrainingMode::Normal => config.validation_split,
            TrainingMode::Pretraining => config.pretraining_validation_split,
        }
    }
}
