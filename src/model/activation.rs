use serde::{Deserialize, Serialize};

use crate::model::matrix::Matrix;

/// Activation applied after a dense layer's affine transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Activation {
    ReLU,
    Identity,
    /// Row-wise softmax. Only meaningful on the output layer, where it is
    /// paired with cross-entropy and the combined gradient is
    /// `predicted - expected`.
    Softmax,
}

impl Activation {
    /// Applies the activation to pre-activations `z` (one row per item).
    pub fn forward(&self, z: &Matrix) -> Matrix {
        match self {
            Activation::ReLU => z.map(|x| if x > 0.0 { x } else { 0.0 }),
            Activation::Identity => z.clone(),
            Activation::Softmax => {
                let mut out = z.clone();
                for r in 0..out.rows {
                    softmax_in_place(out.row_mut(r));
                }
                out
            }
        }
    }

    /// Element-wise derivative at `z`. Softmax reports 1.0 so the combined
    /// softmax + cross-entropy delta passes through unchanged.
    pub fn derivative(&self, z: &Matrix) -> Matrix {
        match self {
            Activation::ReLU => z.map(|x| if x > 0.0 { 1.0 } else { 0.0 }),
            Activation::Identity | Activation::Softmax => z.map(|_| 1.0),
        }
    }
}

fn softmax_in_place(row: &mut [f64]) {
    let max = row.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let mut sum = 0.0;
    for v in row.iter_mut() {
        *v = (*v - max).exp();
        sum += *v;
    }
    for v in row.iter_mut() {
        *v /= sum;
    }
}
