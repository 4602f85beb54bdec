use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::data::batch::Batch;
use crate::error::{ConfigurationError, StepError};
use crate::model::activation::Activation;
use crate::model::dense::{Dense, Gradients};
use crate::model::loss::{argmax, correct_count, cross_entropy_sum};
use crate::model::matrix::Matrix;
use crate::train::step::{TrainOutcome, TrainStep, ValidateStep, ValidationOutcome};

/// Describes one layer in a classifier specification.
///
/// Fields:
/// - `size`      : number of outputs of this layer
/// - `input_size`: number of inputs (output size of the previous layer, or
///                  the flattened image length for the first layer)
/// - `activation`: activation applied after the affine transform
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSpec {
    pub size: usize,
    pub input_size: usize,
    pub activation: Activation,
}

/// Declarative layer stack for an image classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifierSpec {
    pub name: String,
    pub layers: Vec<LayerSpec>,
}

impl ClassifierSpec {
    /// `input_size → hidden[0] → … → classes`, ReLU hidden layers and a
    /// softmax output.
    pub fn image_classifier(name: &str, input_size: usize, hidden: &[usize], classes: usize) -> ClassifierSpec {
        let mut layers = Vec::with_capacity(hidden.len() + 1);
        let mut fan_in = input_size;
        for &size in hidden {
            layers.push(LayerSpec { size, input_size: fan_in, activation: Activation::ReLU });
            fan_in = size;
        }
        layers.push(LayerSpec { size: classes, input_size: fan_in, activation: Activation::Softmax });
        ClassifierSpec { name: name.to_owned(), layers }
    }

    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let last = self
            .layers
            .last()
            .ok_or_else(|| ConfigurationError::invalid("layers", "a classifier needs at least one layer"))?;
        if last.activation != Activation::Softmax {
            return Err(ConfigurationError::invalid("layers", "the output layer must use Softmax"));
        }
        if self.layers.iter().any(|l| l.size == 0 || l.input_size == 0) {
            return Err(ConfigurationError::invalid("layers", "layer sizes must be at least 1"));
        }
        for (i, pair) in self.layers.windows(2).enumerate() {
            if pair[0].size != pair[1].input_size {
                return Err(ConfigurationError::invalid(
                    "layers",
                    format!("layer {} outputs {} values but layer {} expects {}", i, pair[0].size, i + 1, pair[1].input_size),
                ));
            }
        }
        Ok(())
    }
}

/// Dense softmax classifier trained with plain SGD on cross-entropy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Classifier {
    pub name: String,
    /// Class names in output order.
    pub labels: Vec<String>,
    layers: Vec<Dense>,
}

impl Classifier {
    pub fn from_spec(spec: &ClassifierSpec, labels: Vec<String>) -> Result<Classifier, ConfigurationError> {
        spec.validate()?;
        let classes = spec.layers.last().map_or(0, |l| l.size);
        if !labels.is_empty() && labels.len() != classes {
            return Err(ConfigurationError::invalid(
                "labels",
                format!("{} label names for {} outputs", labels.len(), classes),
            ));
        }
        let layers = spec
            .layers
            .iter()
            .map(|l| Dense::new(l.size, l.input_size, l.activation))
            .collect();
        Ok(Classifier { name: spec.name.clone(), labels, layers })
    }

    pub fn input_size(&self) -> usize {
        self.layers.first().map_or(0, Dense::input_size)
    }

    pub fn output_size(&self) -> usize {
        self.layers.last().map_or(0, Dense::size)
    }

    /// Class probabilities for each image.
    pub fn forward_batch(&self, images: &[Vec<f64>]) -> Result<Matrix, StepError> {
        let x = stack(images, self.input_size())?;
        Ok(self.forward(&x).pop().map(|(_, a)| a).unwrap_or(x))
    }

    /// Index of the most likely class for each image.
    pub fn classify(&self, images: &[Vec<f64>]) -> Result<Vec<usize>, StepError> {
        Ok(self.forward_batch(images)?.rows_iter().map(argmax).collect())
    }

    /// One SGD step on the batch. Reports the mean cross-entropy over the
    /// batch and the L2 norm of the full gradient.
    pub fn train_batch(&mut self, batch: &Batch, learning_rate: f64) -> Result<TrainOutcome, StepError> {
        let (x, y) = self.labelled_inputs(batch)?;
        let n = batch.len() as f64;
        let cache = self.forward(&x);
        let probs = match cache.last() {
            Some((_, a)) => a,
            None => return Err(StepError::other("classifier has no layers")),
        };

        let loss = cross_entropy_sum(probs, &y) / n;
        if !loss.is_finite() {
            return Err(StepError::NonFinite("loss"));
        }

        // Softmax + cross-entropy: ∂L/∂z = (p - y) / n for the mean loss.
        let mut delta = probs.clone();
        delta.sub_scaled(&y, 1.0);
        let mut delta = delta.map(|v| v / n);

        let mut grads: Vec<Gradients> = Vec::with_capacity(self.layers.len());
        for l in (0..self.layers.len()).rev() {
            let input = if l == 0 { &x } else { &cache[l - 1].1 };
            grads.push(self.layers[l].gradients(input, &delta));
            if l > 0 {
                let mut back = delta.matmul_transpose(&self.layers[l].weights);
                back.hadamard_assign(&self.layers[l - 1].activation.derivative(&cache[l - 1].0));
                delta = back;
            }
        }
        grads.reverse();

        let gradient_norm = grads.iter().map(Gradients::squared_norm).sum::<f64>().sqrt();
        if !gradient_norm.is_finite() {
            return Err(StepError::NonFinite("gradient norm"));
        }
        for (layer, g) in self.layers.iter_mut().zip(&grads) {
            layer.apply(g, learning_rate);
        }
        Ok(TrainOutcome { loss, gradient_norm })
    }

    /// Summed cross-entropy and number of correct predictions over the batch.
    pub fn evaluate_batch(&self, batch: &Batch) -> Result<ValidationOutcome, StepError> {
        let (x, y) = self.labelled_inputs(batch)?;
        let probs = match self.forward(&x).pop() {
            Some((_, a)) => a,
            None => return Err(StepError::other("classifier has no layers")),
        };
        Ok(ValidationOutcome {
            loss_sum: cross_entropy_sum(&probs, &y),
            correct: correct_count(&probs, &y) as f64,
        })
    }

    /// Serializes the classifier to a pretty-printed JSON file.
    pub fn save_json(&self, path: &Path) -> std::io::Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))
    }

    /// Deserializes a classifier previously written by `save_json`.
    ///
    /// The layer shapes are checked after parsing; a file whose layers do not
    /// chain is rejected with `ErrorKind::InvalidData`.
    pub fn load_json(path: &Path) -> std::io::Result<Classifier> {
        let file = std::fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        let classifier: Classifier = serde_json::from_reader(reader)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        classifier
            .check_shapes()
            .map_err(|reason| std::io::Error::new(std::io::ErrorKind::InvalidData, reason))?;
        Ok(classifier)
    }

    fn check_shapes(&self) -> Result<(), String> {
        if self.layers.is_empty() {
            return Err("classifier has no layers".to_owned());
        }
        for (i, layer) in self.layers.iter().enumerate() {
            let w = &layer.weights;
            if w.rows == 0 || w.cols == 0 || w.as_slice().len() != w.rows * w.cols {
                return Err(format!("layer {} has a {}x{} weight matrix holding {} values", i, w.rows, w.cols, w.as_slice().len()));
            }
            if layer.biases.len() != w.cols {
                return Err(format!("layer {} has {} biases for {} outputs", i, layer.biases.len(), w.cols));
            }
        }
        for (i, pair) in self.layers.windows(2).enumerate() {
            if pair[0].size() != pair[1].input_size() {
                return Err(format!(
                    "layer {} outputs {} values but layer {} expects {}",
                    i,
                    pair[0].size(),
                    i + 1,
                    pair[1].input_size()
                ));
            }
        }
        if !self.labels.is_empty() && self.labels.len() != self.output_size() {
            return Err(format!("{} label names for {} outputs", self.labels.len(), self.output_size()));
        }
        Ok(())
    }

    /// `(z, a)` for every layer, input to output.
    fn forward(&self, x: &Matrix) -> Vec<(Matrix, Matrix)> {
        let mut cache: Vec<(Matrix, Matrix)> = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            let input = cache.last().map_or(x, |(_, a)| a);
            let out = layer.forward(input);
            cache.push(out);
        }
        cache
    }

    fn labelled_inputs(&self, batch: &Batch) -> Result<(Matrix, Matrix), StepError> {
        if batch.is_empty() {
            return Err(StepError::other("empty batch"));
        }
        let labels = batch.labels().ok_or(StepError::MissingLabels)?;
        Ok((stack(batch.images(), self.input_size())?, stack(labels, self.output_size())?))
    }
}

impl TrainStep for Classifier {
    fn train(&mut self, batch: &Batch, learning_rate: f64) -> Result<TrainOutcome, StepError> {
        self.train_batch(batch, learning_rate)
    }
}

impl ValidateStep for Classifier {
    fn validate(&mut self, batch: &Batch) -> Result<ValidationOutcome, StepError> {
        self.evaluate_batch(batch)
    }
}

fn stack(rows: &[Vec<f64>], cols: usize) -> Result<Matrix, StepError> {
    Matrix::from_rows(rows, cols).ok_or_else(|| StepError::ShapeMismatch {
        expected: cols,
        actual: rows.iter().map(Vec::len).find(|&len| len != cols).unwrap_or(cols),
    })
}
