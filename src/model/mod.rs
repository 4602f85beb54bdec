pub mod activation;
pub mod classifier;
pub mod dense;
pub mod loss;
pub mod matrix;

pub use activation::Activation;
pub use classifier::{Classifier, ClassifierSpec, LayerSpec};
pub use matrix::Matrix;
