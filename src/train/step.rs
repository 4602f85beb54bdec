use crate::data::batch::Batch;
use crate::error::StepError;

/// What one training step reports back.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainOutcome {
    /// Loss over the batch (as the step defines it; usually the mean).
    pub loss: f64,
    /// L2 norm of the gradient applied in this step.
    pub gradient_norm: f64,
}

/// What one validation step reports back. Both fields are sums over the
/// batch; the controller divides by the number of items examined.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ValidationOutcome {
    pub loss_sum: f64,
    pub correct: f64,
}

/// Runs one optimisation step on a batch at the given learning rate.
pub trait TrainStep {
    fn train(&mut self, batch: &Batch, learning_rate: f64) -> Result<TrainOutcome, StepError>;
}

/// Evaluates one batch without updating anything.
pub trait ValidateStep {
    fn validate(&mut self, batch: &Batch) -> Result<ValidationOutcome, StepError>;
}

/// Pairs a training closure with a validation closure so plain functions can
/// drive an `EpochController`.
pub struct FnSteps<T, V> {
    pub train: T,
    pub validate: V,
}

impl<T, V> FnSteps<T, V> {
    pub fn new(train: T, validate: V) -> FnSteps<T, V> {
        FnSteps { train, validate }
    }
}

impl<T, V> TrainStep for FnSteps<T, V>
where
    T: FnMut(&Batch, f64) -> Result<TrainOutcome, StepError>,
{
    fn train(&mut self, batch: &Batch, learning_rate: f64) -> Result<TrainOutcome, StepError> {
        (self.train)(batch, learning_rate)
    }
}

impl<T, V> ValidateStep for FnSteps<T, V>
where
    V: FnMut(&Batch) -> Result<ValidationOutcome, StepError>,
{
    fn validate(&mut self, batch: &Batch) -> Result<ValidationOutcome, StepError> {
        (self.validate)(batch)
    }
}
