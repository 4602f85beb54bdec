use serde::{Deserialize, Serialize};

use crate::model::activation::Activation;
use crate::model::matrix::Matrix;

/// Gradients of one dense layer for one batch.
#[derive(Debug, Clone)]
pub struct Gradients {
    pub weights: Matrix,
    pub biases: Vec<f64>,
}

impl Gradients {
    pub fn squared_norm(&self) -> f64 {
        self.weights.squared_norm() + self.biases.iter().map(|b| b * b).sum::<f64>()
    }
}

/// Fully connected layer. `weights` is (inputs × outputs) so a batch
/// (items × inputs) multiplies on the left.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dense {
    pub weights: Matrix,
    pub biases: Vec<f64>,
    pub activation: Activation,
}

impl Dense {
    pub fn new(size: usize, input_size: usize, activation: Activation) -> Dense {
        Dense {
            weights: Matrix::he(input_size, size),
            biases: vec![0.0; size],
            activation,
        }
    }

    pub fn input_size(&self) -> usize {
        self.weights.rows
    }

    pub fn size(&self) -> usize {
        self.weights.cols
    }

    /// Returns `(z, a)`: pre-activations and activations for the batch.
    pub fn forward(&self, input: &Matrix) -> (Matrix, Matrix) {
        let mut z = input.matmul(&self.weights);
        z.add_row(&self.biases);
        let a = self.activation.forward(&z);
        (z, a)
    }

    /// `delta` is ∂L/∂z for this layer, one row per item.
    pub fn gradients(&self, input: &Matrix, delta: &Matrix) -> Gradients {
        Gradients {
            weights: input.transpose_matmul(delta),
            biases: delta.column_sums(),
        }
    }

    /// Plain SGD update.
    pub fn apply(&mut self, grads: &Gradients, learning_rate: f64) {
        self.weights.sub_scaled(&grads.weights, learning_rate);
        for (b, g) in self.biases.iter_mut().zip(&grads.biases) {
            *b -= learning_rate * g;
        }
    }
}
